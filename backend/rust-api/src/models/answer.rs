use serde::{Deserialize, Serialize};
use validator::Validate;

/// One answer slot. `time_spent` is advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub value: String,
    pub time_spent: u32,
}

impl Answer {
    pub fn empty(question_id: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            value: String::new(),
            time_spent: 0,
        }
    }

    pub fn is_answered(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

/// Per-question grading detail stored with the final attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEvaluation {
    pub question_id: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    pub points_earned: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    pub index: usize,
    #[validate(length(max = 20000))]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub index: usize,
}
