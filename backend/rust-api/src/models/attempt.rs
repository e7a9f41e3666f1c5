use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::answer::AnswerEvaluation;
use super::session::{SessionStatus, SubmitReason};
use super::violation::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    AutoSubmitted,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::AutoSubmitted => "auto-submitted",
            AttemptStatus::Abandoned => "abandoned",
        }
    }
}

impl From<SessionStatus> for AttemptStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::NotStarted | SessionStatus::Active => AttemptStatus::InProgress,
            SessionStatus::Completed => AttemptStatus::Completed,
            SessionStatus::AutoSubmitted => AttemptStatus::AutoSubmitted,
            SessionStatus::Abandoned => AttemptStatus::Abandoned,
        }
    }
}

/// Initial fields written to the attempt store before a session may go active.
#[derive(Debug, Clone, Serialize)]
pub struct NewAttempt {
    pub session_id: String,
    pub assessment_id: String,
    pub student_id: String,
    pub total_marks: u32,
    pub question_count: usize,
    pub duration_seconds: u32,
    pub started_at: DateTime<Utc>,
}

/// Immutable record produced on the terminal transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub attempt_id: String,
    pub assessment_id: String,
    pub student_id: String,
    pub status: SessionStatus,
    pub reason: SubmitReason,
    pub score: u32,
    pub total_marks: u32,
    pub percentage: u32,
    pub passed: bool,
    pub time_spent: u32,
    pub tab_switch_count: u32,
    pub fullscreen_exit_count: u32,
    pub violations: Vec<Violation>,
    pub answers: Vec<AnswerEvaluation>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
}
