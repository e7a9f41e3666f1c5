use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    Coding,
    Practical,
}

/// Question as loaded from the question bank. Read-only to the session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: Option<usize>,
    #[serde(default = "default_points")]
    pub points: u32,
    /// Why the correct answer is correct. Only revealed after submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Question {
    /// Points awarded for this question; a zero value in the bank counts as 1.
    pub fn effective_points(&self) -> u32 {
        if self.points == 0 {
            1
        } else {
            self.points
        }
    }

    /// Text of the correct option, only for well-formed MCQ questions.
    pub fn correct_option(&self) -> Option<&str> {
        if self.question_type != QuestionType::Mcq {
            return None;
        }
        self.correct_answer
            .and_then(|index| self.options.get(index))
            .map(String::as_str)
    }
}

fn default_points() -> u32 {
    1
}

/// Question as sent to the candidate: no correct answer, no explanation.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub points: u32,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            title: question.title.clone(),
            description: question.description.clone(),
            question_type: question.question_type,
            options: question.options.clone(),
            points: question.effective_points(),
        }
    }
}

/// Ordered questions for one assessment plus the settings needed to time it.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    pub title: String,
    pub skill: Option<String>,
    pub duration_seconds: u32,
    pub questions: Vec<Question>,
}
