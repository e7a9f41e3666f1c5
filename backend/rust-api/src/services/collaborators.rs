use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    CertificateRequest, EnrollmentStatus, NewAttempt, QuestionSet, SessionResult, SessionTarget,
};

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Ordered questions for the target. An unknown assessment or skill is
    /// `NotFound`; an empty set is returned as-is.
    async fn load_questions(&self, target: &SessionTarget)
        -> Result<QuestionSet, CollaboratorError>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn create_attempt(&self, attempt: &NewAttempt) -> anyhow::Result<String>;

    async fn update_attempt(&self, attempt_id: &str, result: &SessionResult) -> anyhow::Result<()>;

    /// Records the certificate issued for an already saved attempt.
    async fn link_certificate(&self, attempt_id: &str, certificate_id: &str) -> anyhow::Result<()>;

    async fn mark_abandoned(&self, attempt_id: &str, at: DateTime<Utc>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Returns the certificate id. Issuing twice for the same attempt returns
    /// the existing certificate.
    async fn issue_certificate(&self, request: &CertificateRequest) -> anyhow::Result<String>;
}

#[async_trait]
pub trait EnrollmentUpdater: Send + Sync {
    async fn update_enrollment(
        &self,
        student_id: &str,
        skill_id: &str,
        status: EnrollmentStatus,
        certificate_id: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// External systems the session driver talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub questions: Arc<dyn QuestionSource>,
    pub attempts: Arc<dyn AttemptStore>,
    pub certificates: Arc<dyn CertificateIssuer>,
    pub enrollments: Arc<dyn EnrollmentUpdater>,
}
