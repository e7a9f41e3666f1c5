use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("assessment has no questions")]
    NoQuestions,

    #[error("attempt id is missing")]
    MissingAttemptId,

    #[error("assessment duration must be greater than zero")]
    InvalidDuration,

    #[error("session has already been started")]
    AlreadyStarted,

    #[error("question index {index} is out of range for {len} questions")]
    QuestionIndexOutOfRange { index: usize, len: usize },
}

impl EngineError {
    /// Precondition failures are fatal to `start` and create no session.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EngineError::NoQuestions | EngineError::MissingAttemptId | EngineError::InvalidDuration
        )
    }
}
