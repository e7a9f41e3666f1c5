use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::answers::AnswerStore;
use super::error::EngineError;
use super::monitor::{BrowserEvent, IntegrityMonitor, MonitorOutput};
use super::policy::ProctoringPolicy;
use super::scoring;
use super::timer::{Countdown, TickOutcome};
use crate::models::{
    Question, Session, SessionIdentity, SessionResult, SessionStatus, SessionView, SubmitReason,
    Violation, ViolationType,
};

/// Inputs to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// One timer second elapsed.
    Tick,
    TimerExpired,
    ViolationDetected(Violation),
    Browser(BrowserEvent),
    AnswerChanged { index: usize, value: String },
    Navigate { index: usize },
    SubmitRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Warning,
    Critical,
}

/// Instruction for the client rendering the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    Warn {
        message: String,
        severity: WarningSeverity,
    },
    SuppressDefault,
    RequestFullscreen,
    ExitFullscreen,
}

impl Directive {
    fn warn(message: impl Into<String>) -> Self {
        Directive::Warn {
            message: message.into(),
            severity: WarningSeverity::Warning,
        }
    }

    fn critical(message: impl Into<String>) -> Self {
        Directive::Warn {
            message: message.into(),
            severity: WarningSeverity::Critical,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub directives: Vec<Directive>,
    /// Set exactly once per session, on the scoring terminal transition.
    pub finalized: Option<SessionResult>,
}

impl Reaction {
    fn with(directives: Vec<Directive>) -> Self {
        Self {
            directives,
            finalized: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty() && self.finalized.is_none()
    }
}

/// Owns one session and every transition it goes through.
#[derive(Debug)]
pub struct SessionController {
    session: Session,
    policy: Arc<ProctoringPolicy>,
    questions: Arc<Vec<Question>>,
    timer: Countdown,
    monitor: IntegrityMonitor,
    escalation_count: u32,
    current_index: usize,
    result: Option<SessionResult>,
}

impl SessionController {
    pub fn new(
        identity: SessionIdentity,
        duration_seconds: u32,
        policy: Arc<ProctoringPolicy>,
    ) -> Self {
        Self {
            session: Session::new(identity, duration_seconds),
            monitor: IntegrityMonitor::new(policy.clone()),
            policy,
            questions: Arc::new(Vec::new()),
            timer: Countdown::new(duration_seconds),
            escalation_count: 0,
            current_index: 0,
            result: None,
        }
    }

    /// Moves the session to `Active`. Nothing changes when a precondition
    /// fails. The returned directives ask the client to enter fullscreen when
    /// the policy requires it.
    pub fn start(
        &mut self,
        questions: Arc<Vec<Question>>,
        attempt_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Directive>, EngineError> {
        if self.session.status != SessionStatus::NotStarted {
            return Err(EngineError::AlreadyStarted);
        }
        if questions.is_empty() {
            return Err(EngineError::NoQuestions);
        }
        if attempt_id.trim().is_empty() {
            return Err(EngineError::MissingAttemptId);
        }
        if self.session.duration_seconds == 0 {
            return Err(EngineError::InvalidDuration);
        }

        self.session.answers = AnswerStore::for_questions(&questions);
        self.session.attempt_id = Some(attempt_id.to_string());
        self.session.started_at = Some(now);
        self.session.time_remaining_seconds = self.session.duration_seconds;
        self.questions = questions;
        self.timer = Countdown::new(self.session.duration_seconds);
        self.monitor.start();
        self.session.status = SessionStatus::Active;

        tracing::info!(
            session_id = %self.session.session_id,
            attempt_id = %attempt_id,
            questions = self.questions.len(),
            duration_seconds = self.session.duration_seconds,
            "Session started"
        );

        let mut directives = Vec::new();
        if self.monitor.fullscreen_enforced() {
            directives.push(Directive::RequestFullscreen);
        }
        Ok(directives)
    }

    /// Applies one signal. Outside `Active` every signal is a no-op.
    pub fn handle(&mut self, signal: Signal, now: DateTime<Utc>) -> Result<Reaction, EngineError> {
        if self.session.status != SessionStatus::Active {
            return Ok(Reaction::default());
        }

        match signal {
            Signal::Tick => Ok(self.on_tick(now)),
            Signal::TimerExpired => Ok(self.on_timer_expired(now)),
            Signal::ViolationDetected(violation) => Ok(self.on_violation(violation, now)),
            Signal::Browser(event) => Ok(self.on_browser_event(&event, now)),
            Signal::AnswerChanged { index, value } => self.record_answer(index, &value),
            Signal::Navigate { index } => self.navigate(index),
            Signal::SubmitRequested => Ok(self.submit(SubmitReason::Manual, now)),
        }
    }

    pub fn record_answer(&mut self, index: usize, value: &str) -> Result<Reaction, EngineError> {
        if self.session.status != SessionStatus::Active {
            return Ok(Reaction::default());
        }
        self.session.answers.record(index, value)?;
        Ok(Reaction::default())
    }

    pub fn navigate(&mut self, index: usize) -> Result<Reaction, EngineError> {
        if self.session.status != SessionStatus::Active {
            return Ok(Reaction::default());
        }
        let len = self.questions.len();
        if index >= len {
            return Err(EngineError::QuestionIndexOutOfRange { index, len });
        }
        self.current_index = index;
        Ok(Reaction::default())
    }

    pub fn on_timer_expired(&mut self, now: DateTime<Utc>) -> Reaction {
        if self.session.status != SessionStatus::Active {
            return Reaction::default();
        }
        self.session.time_remaining_seconds = 0;
        self.submit(SubmitReason::Timeout, now)
    }

    pub fn on_violation(&mut self, violation: Violation, now: DateTime<Utc>) -> Reaction {
        if self.session.status != SessionStatus::Active {
            return Reaction::default();
        }

        let violation_type = violation.violation_type;
        let rule = self.policy.rule(violation_type);

        tracing::warn!(
            session_id = %self.session.session_id,
            violation_type = violation_type.as_str(),
            detail = %violation.detail,
            "Integrity violation"
        );
        self.session.violations.push(violation);

        match violation_type {
            ViolationType::TabSwitch => self.session.tab_switch_count += 1,
            ViolationType::FullscreenExit => self.session.fullscreen_exit_count += 1,
            _ => {}
        }

        let mut directives = Vec::new();
        if rule.suppress_default {
            directives.push(Directive::SuppressDefault);
        }

        if rule.counts_toward_limit {
            self.escalation_count += 1;
            if self.policy.limit_reached(self.escalation_count) {
                directives.push(Directive::critical(
                    "Multiple tab switches detected. Assessment will be auto-submitted.",
                ));
                let mut reaction = self.submit(SubmitReason::Integrity, now);
                directives.append(&mut reaction.directives);
                reaction.directives = directives;
                return reaction;
            }
        }

        if rule.warn {
            directives.push(Directive::warn(self.warning_for(violation_type)));
        }
        if rule.request_fullscreen && self.monitor.fullscreen_enforced() {
            directives.push(Directive::RequestFullscreen);
        }
        Reaction::with(directives)
    }

    /// The single scoring terminal transition. Status flips before any side
    /// effect so a second call is a no-op.
    pub fn submit(&mut self, reason: SubmitReason, now: DateTime<Utc>) -> Reaction {
        if self.session.status != SessionStatus::Active {
            return Reaction::default();
        }
        self.session.status = reason.terminal_status();
        self.session.submit_reason = Some(reason);
        self.session.submitted_at = Some(now);
        self.teardown();

        let answers = self.session.answers.as_slice();
        let summary = scoring::score(&self.questions, answers);
        let evaluations = scoring::evaluate(&self.questions, answers);
        self.session.score = summary.score;
        self.session.total_marks = summary.total_marks;
        self.session.percentage = summary.percentage;

        let result = SessionResult {
            session_id: self.session.session_id.clone(),
            attempt_id: self.session.attempt_id.clone().unwrap_or_default(),
            assessment_id: self.session.assessment_id.clone(),
            student_id: self.session.student_id.clone(),
            status: self.session.status,
            reason,
            score: summary.score,
            total_marks: summary.total_marks,
            percentage: summary.percentage,
            passed: self.policy.passes(summary.percentage),
            time_spent: self.session.time_spent_seconds(),
            tab_switch_count: self.session.tab_switch_count,
            fullscreen_exit_count: self.session.fullscreen_exit_count,
            violations: self.session.violations.clone(),
            answers: evaluations,
            submitted_at: now,
            certificate_id: None,
        };

        tracing::info!(
            session_id = %result.session_id,
            status = result.status.as_str(),
            reason = reason.as_str(),
            score = result.score,
            total_marks = result.total_marks,
            percentage = result.percentage,
            "Session finalized"
        );

        self.result = Some(result.clone());
        Reaction {
            directives: vec![Directive::ExitFullscreen],
            finalized: Some(result),
        }
    }

    /// Leaves an active session without scoring. Runs the same teardown as
    /// `submit`. Returns false when the session was not active.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> bool {
        if self.session.status != SessionStatus::Active {
            return false;
        }
        self.session.status = SessionStatus::Abandoned;
        self.session.submitted_at = Some(now);
        self.teardown();

        tracing::info!(session_id = %self.session.session_id, "Session abandoned");
        true
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn questions(&self) -> &Arc<Vec<Question>> {
        &self.questions
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn monitor_active(&self) -> bool {
        self.monitor.is_active()
    }

    pub fn view(&self) -> SessionView {
        let answers = &self.session.answers;
        SessionView {
            session_id: self.session.session_id.clone(),
            attempt_id: self.session.attempt_id.clone(),
            assessment_id: self.session.assessment_id.clone(),
            status: self.session.status,
            current_question_index: self.current_index,
            question_count: answers.len(),
            answered: answers.answered_flags(),
            answered_count: answers.answered_count(),
            duration_seconds: self.session.duration_seconds,
            time_remaining_seconds: self.session.time_remaining_seconds,
            violation_count: self.session.violations.len(),
            tab_switch_count: self.session.tab_switch_count,
            tab_switch_limit: self.policy.tab_switch_limit,
            fullscreen_exit_count: self.session.fullscreen_exit_count,
            fullscreen_enforced: self.monitor.fullscreen_enforced(),
            submit_reason: self.session.submit_reason,
        }
    }

    fn on_tick(&mut self, now: DateTime<Utc>) -> Reaction {
        match self.timer.tick() {
            TickOutcome::Running { remaining_seconds } => {
                self.session.time_remaining_seconds = remaining_seconds;
                self.session.answers.accrue_time(self.current_index, 1);
                Reaction::default()
            }
            TickOutcome::Expired => {
                self.session.time_remaining_seconds = 0;
                self.session.answers.accrue_time(self.current_index, 1);
                self.submit(SubmitReason::Timeout, now)
            }
            TickOutcome::Halted => Reaction::default(),
        }
    }

    fn on_browser_event(&mut self, event: &BrowserEvent, now: DateTime<Utc>) -> Reaction {
        match self.monitor.classify(event, now) {
            MonitorOutput::Violation(violation) => self.on_violation(violation, now),
            MonitorOutput::CapabilityWarning(reason) => {
                tracing::warn!(
                    session_id = %self.session.session_id,
                    reason = %reason,
                    "Fullscreen unavailable, continuing without fullscreen enforcement"
                );
                Reaction::default()
            }
            MonitorOutput::Ignored => Reaction::default(),
        }
    }

    fn teardown(&mut self) {
        self.timer.cancel();
        self.monitor.stop();
        self.session.answers.seal();
    }

    fn warning_for(&self, violation_type: ViolationType) -> String {
        match violation_type {
            ViolationType::TabSwitch => {
                let limit = self.policy.tab_switch_limit;
                format!(
                    "Warning: Tab switch detected ({}/{}). Assessment will auto-submit after {} switches.",
                    self.session.tab_switch_count, limit, limit
                )
            }
            ViolationType::FullscreenExit => {
                "Fullscreen mode exited. Please re-enter fullscreen to continue.".to_string()
            }
            ViolationType::RightClick => {
                "Right-click is disabled during the assessment.".to_string()
            }
            ViolationType::BlockedShortcut => "This keyboard shortcut is disabled.".to_string(),
            ViolationType::CopyPaste => "Copy/Paste is disabled during the assessment.".to_string(),
        }
    }
}
