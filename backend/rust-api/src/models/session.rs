use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::violation::Violation;
use crate::engine::answers::AnswerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    Active,
    Completed,
    AutoSubmitted,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::AutoSubmitted | SessionStatus::Abandoned
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "not_started",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::AutoSubmitted => "auto_submitted",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitReason {
    Manual,
    Timeout,
    Integrity,
}

impl SubmitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitReason::Manual => "manual",
            SubmitReason::Timeout => "timeout",
            SubmitReason::Integrity => "integrity",
        }
    }

    /// Terminal status a submission with this reason lands in.
    pub fn terminal_status(&self) -> SessionStatus {
        match self {
            SubmitReason::Integrity => SessionStatus::AutoSubmitted,
            SubmitReason::Manual | SubmitReason::Timeout => SessionStatus::Completed,
        }
    }
}

/// Who is taking what. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub session_id: String,
    pub assessment_id: String,
    pub student_id: String,
}

/// One attempt at an assessment, owned by a single `SessionController`.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: String,
    pub assessment_id: String,
    pub student_id: String,
    pub attempt_id: Option<String>,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub duration_seconds: u32,
    pub time_remaining_seconds: u32,
    pub answers: AnswerStore,
    pub violations: Vec<Violation>,
    pub tab_switch_count: u32,
    pub fullscreen_exit_count: u32,
    pub score: u32,
    pub total_marks: u32,
    pub percentage: u32,
    pub submit_reason: Option<SubmitReason>,
}

impl Session {
    pub fn new(identity: SessionIdentity, duration_seconds: u32) -> Self {
        Self {
            session_id: identity.session_id,
            assessment_id: identity.assessment_id,
            student_id: identity.student_id,
            attempt_id: None,
            status: SessionStatus::NotStarted,
            started_at: None,
            submitted_at: None,
            duration_seconds,
            time_remaining_seconds: duration_seconds,
            answers: AnswerStore::default(),
            violations: Vec::new(),
            tab_switch_count: 0,
            fullscreen_exit_count: 0,
            score: 0,
            total_marks: 0,
            percentage: 0,
            submit_reason: None,
        }
    }

    pub fn time_spent_seconds(&self) -> u32 {
        self.duration_seconds
            .saturating_sub(self.time_remaining_seconds)
    }
}

/// Live read model for the rendering layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub attempt_id: Option<String>,
    pub assessment_id: String,
    pub status: SessionStatus,
    pub current_question_index: usize,
    pub question_count: usize,
    pub answered: Vec<bool>,
    pub answered_count: usize,
    pub duration_seconds: u32,
    pub time_remaining_seconds: u32,
    pub violation_count: usize,
    pub tab_switch_count: u32,
    pub tab_switch_limit: u32,
    pub fullscreen_exit_count: u32,
    pub fullscreen_enforced: bool,
    pub submit_reason: Option<SubmitReason>,
}
