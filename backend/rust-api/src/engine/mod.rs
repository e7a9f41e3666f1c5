//! Proctored assessment session engine.
//!
//! Everything in here is synchronous and free of I/O: the controller reacts to
//! typed signals and hands back directives for the client plus, exactly once,
//! the finalized result. Persistence and certificate issuance live in
//! `services::session_service`.

pub mod answers;
pub mod error;
pub mod monitor;
pub mod policy;
pub mod scoring;
pub mod session;
pub mod timer;

pub use answers::AnswerStore;
pub use error::EngineError;
pub use monitor::{BrowserEvent, ClipboardAction, IntegrityMonitor, MonitorOutput};
pub use policy::{KeyCombo, PolicyRule, ProctoringPolicy};
pub use scoring::ScoreSummary;
pub use session::{Directive, Reaction, SessionController, Signal, WarningSeverity};
pub use timer::{Countdown, TickOutcome};
