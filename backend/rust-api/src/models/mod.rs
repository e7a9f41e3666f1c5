use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod answer;
pub mod attempt;
pub mod certificate;
pub mod enrollment;
pub mod question;
pub mod session;
pub mod timer;
pub mod violation;

pub use answer::{Answer, AnswerEvaluation, NavigateRequest, RecordAnswerRequest};
pub use attempt::{AttemptStatus, NewAttempt, SessionResult};
pub use certificate::{Certificate, CertificateRequest, CertificateStatus};
pub use enrollment::EnrollmentStatus;
pub use question::{Question, QuestionSet, QuestionType, QuestionView};
pub use session::{Session, SessionIdentity, SessionStatus, SessionView, SubmitReason};
pub use violation::{ReportViolationRequest, Violation, ViolationType};

use crate::engine::Directive;

/// What the candidate is being assessed on. The skill flow uses generated
/// questions and updates the skill enrollment after submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionTarget {
    Assessment { assessment_id: String },
    Skill { skill_id: String },
}

impl SessionTarget {
    pub fn assessment_id(&self) -> String {
        match self {
            SessionTarget::Assessment { assessment_id } => assessment_id.clone(),
            SessionTarget::Skill { skill_id } => format!("skill-{}", skill_id),
        }
    }

    pub fn skill_id(&self) -> Option<&str> {
        match self {
            SessionTarget::Assessment { .. } => None,
            SessionTarget::Skill { skill_id } => Some(skill_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(min = 1, max = 128))]
    pub student_id: String,
    pub target: SessionTarget,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub attempt_id: String,
    pub resumed: bool,
    pub title: String,
    pub questions: Vec<QuestionView>,
    pub session: SessionView,
    pub directives: Vec<Directive>,
}

/// Response to any signal delivered to a live session.
#[derive(Debug, Serialize)]
pub struct SignalResponse {
    pub session: SessionView,
    pub directives: Vec<Directive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SessionResult>,
}
