use serde::{Deserialize, Serialize};

use crate::models::{Answer, AnswerEvaluation, Question, QuestionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub score: u32,
    pub total_marks: u32,
    pub percentage: u32,
}

/// Scores MCQ answers against the question bank. Every question counts toward
/// `total_marks`; only correct MCQ answers count toward `score`. Answers are
/// matched to questions by position.
pub fn score(questions: &[Question], answers: &[Answer]) -> ScoreSummary {
    let mut score = 0u32;
    let mut total_marks = 0u32;

    for (index, question) in questions.iter().enumerate() {
        let points = question.effective_points();
        total_marks = total_marks.saturating_add(points);
        if is_correct(question, answers.get(index)) == Some(true) {
            score = score.saturating_add(points);
        }
    }

    ScoreSummary {
        score,
        total_marks,
        percentage: percentage(score, total_marks),
    }
}

/// Per-answer grading detail; `is_correct` is only set for MCQ questions.
pub fn evaluate(questions: &[Question], answers: &[Answer]) -> Vec<AnswerEvaluation> {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let answer = answers.get(index);
            let is_correct = is_correct(question, answer);
            AnswerEvaluation {
                question_id: question.id.clone(),
                answer: answer.map(|a| a.value.clone()).unwrap_or_default(),
                is_correct,
                points_earned: if is_correct == Some(true) {
                    question.effective_points()
                } else {
                    0
                },
                explanation: question.explanation.clone(),
            }
        })
        .collect()
}

/// `round(100 * score / total)` with halves rounded up; 0 when `total` is 0.
pub fn percentage(score: u32, total_marks: u32) -> u32 {
    if total_marks == 0 {
        return 0;
    }
    let score = u64::from(score);
    let total = u64::from(total_marks);
    ((200 * score + total) / (2 * total)) as u32
}

fn is_correct(question: &Question, answer: Option<&Answer>) -> Option<bool> {
    if question.question_type != QuestionType::Mcq {
        return None;
    }
    let answer = answer.filter(|a| a.is_answered());
    Some(match (answer, question.correct_option()) {
        (Some(answer), Some(correct)) => answer.value == correct,
        _ => false,
    })
}
