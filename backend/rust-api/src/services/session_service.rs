use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

use super::collaborators::{CollaboratorError, Collaborators};
use crate::config::SessionSettings;
use crate::engine::{
    scoring, BrowserEvent, Directive, EngineError, ProctoringPolicy, SessionController, Signal,
};
use crate::metrics::{
    record_cache_hit, record_cache_miss, track_cache_operation, ANSWERS_RECORDED_TOTAL,
    ATTEMPT_STORE_FAILURES_TOTAL, CERTIFICATES_ISSUED_TOTAL, INTEGRITY_VIOLATIONS_TOTAL,
    SESSIONS_ACTIVE, SESSIONS_TOTAL,
};
use crate::models::timer::{SessionFinalized, TimeExpired, TimerEvent, TimerTick};
use crate::models::{
    CertificateRequest, EnrollmentStatus, NewAttempt, QuestionView, SessionIdentity,
    SessionResult, SessionStatus, SessionTarget, SessionView, SignalResponse,
    StartSessionRequest, StartSessionResponse, SubmitReason,
};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const RESULT_CACHE_PREFIX: &str = "session_result:";
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("result for session {0} was not saved, retry persisting it")]
    ResultNotSaved(String),

    #[error("session {0} has no unsaved result")]
    NothingToPersist(String),

    #[error("service temporarily unavailable: {0}")]
    Transient(#[source] anyhow::Error),
}

impl From<CollaboratorError> for SessionError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::NotFound(what) => SessionError::NotFound(what),
            CollaboratorError::Other(e) => SessionError::Transient(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionServiceConfig {
    pub tick_interval: Duration,
    pub result_cache_ttl: Duration,
    /// How long a terminal session whose save failed stays available to
    /// `persist`.
    pub pending_save_ttl: Duration,
    pub retry: RetryConfig,
}

impl Default for SessionServiceConfig {
    fn default() -> Self {
        Self::from_settings(&SessionSettings::default())
    }
}

impl SessionServiceConfig {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            tick_interval: Duration::from_millis(settings.tick_interval_ms.max(1)),
            result_cache_ttl: Duration::from_secs(settings.result_cache_ttl_seconds),
            pending_save_ttl: Duration::from_secs(settings.pending_save_ttl_seconds),
            retry: RetryConfig::aggressive(),
        }
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Live,
    /// Terminal, but the attempt store has not acknowledged the result.
    PendingSave(SessionResult),
    Saved(SessionResult),
}

/// Dropping the guard ends the session's ticker task.
struct TickerGuard {
    _stop: oneshot::Sender<()>,
}

struct LiveSession {
    controller: SessionController,
    target: SessionTarget,
    title: String,
    skill: Option<String>,
    ticker: Option<TickerGuard>,
    events: broadcast::Sender<TimerEvent>,
    outcome: Outcome,
    certificate_requested: bool,
}

type SessionKey = (String, String);

/// A created session that is not registered yet, plus its ticker's stop signal.
type Started = (StartSessionResponse, Arc<Mutex<LiveSession>>, oneshot::Receiver<()>);

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, Arc<Mutex<LiveSession>>>,
    active: HashMap<SessionKey, String>,
    /// Terminal sessions waiting for `persist`, with the instant they expire.
    pending: HashMap<String, Instant>,
}

impl Registry {
    fn drop_expired_pending(&mut self, now: Instant) {
        let Registry {
            sessions,
            pending,
            ..
        } = self;
        pending.retain(|session_id, expires_at| {
            if *expires_at > now {
                return true;
            }
            tracing::warn!(
                session_id = %session_id,
                "Dropping session whose result was never saved"
            );
            sessions.remove(session_id);
            false
        });
    }
}

/// Marks a (student, assessment) pair as starting. The mark is released on
/// drop, so a cancelled start never blocks the pair.
struct StartingGuard {
    inner: Arc<Inner>,
    key: SessionKey,
}

impl StartingGuard {
    fn claim(inner: &Arc<Inner>, key: SessionKey) -> Option<Self> {
        let mut starting = inner.starting.lock().unwrap_or_else(PoisonError::into_inner);
        if !starting.insert(key.clone()) {
            return None;
        }
        Some(Self {
            inner: inner.clone(),
            key,
        })
    }
}

impl Drop for StartingGuard {
    fn drop(&mut self) {
        self.inner
            .starting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

struct CachedResult {
    result: SessionResult,
    expires_at: Instant,
}

struct Inner {
    policy: Arc<ProctoringPolicy>,
    collaborators: Collaborators,
    redis: Option<ConnectionManager>,
    config: SessionServiceConfig,
    registry: Mutex<Registry>,
    /// Only locked while the registry lock is held, or on its own in
    /// `StartingGuard::drop`.
    starting: std::sync::Mutex<HashSet<SessionKey>>,
    results: Mutex<HashMap<String, CachedResult>>,
}

/// Drives live sessions: owns the controllers, their tickers, and the
/// finalize pipeline into the attempt store, certificate issuer and
/// enrollment updater.
///
/// Lock order is session, then registry. The registry lock is never held
/// while waiting on a session.
#[derive(Clone)]
pub struct SessionService {
    inner: Arc<Inner>,
}

impl SessionService {
    pub fn new(
        policy: ProctoringPolicy,
        collaborators: Collaborators,
        redis: Option<ConnectionManager>,
        config: SessionServiceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy: Arc::new(policy),
                collaborators,
                redis,
                config,
                registry: Mutex::new(Registry::default()),
                starting: std::sync::Mutex::new(HashSet::new()),
                results: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn policy(&self) -> &ProctoringPolicy {
        &self.inner.policy
    }

    /// Starts a session, or resumes the live one for the same student and
    /// assessment.
    pub async fn start(
        &self,
        request: StartSessionRequest,
    ) -> Result<StartSessionResponse, SessionError> {
        let assessment_id = request.target.assessment_id();
        let key: SessionKey = (request.student_id.clone(), assessment_id.clone());

        let starting = {
            let registry = self.inner.registry.lock().await;
            let existing = registry
                .active
                .get(&key)
                .and_then(|session_id| registry.sessions.get(session_id))
                .cloned();
            if let Some(live) = existing {
                drop(registry);
                return self.resume(&live).await;
            }
            StartingGuard::claim(&self.inner, key.clone()).ok_or_else(|| {
                SessionError::Conflict(format!(
                    "a session for assessment {} is already starting",
                    assessment_id
                ))
            })?
        };

        let (response, live, stop_rx) = self.start_new(request, assessment_id).await?;

        let mut registry = self.inner.registry.lock().await;
        // No await from here on: registration, metrics and the ticker happen
        // together or not at all.
        registry.drop_expired_pending(Instant::now());
        registry
            .sessions
            .insert(response.session_id.clone(), live.clone());
        registry.active.insert(key, response.session_id.clone());
        drop(starting);

        SESSIONS_TOTAL.with_label_values(&["started"]).inc();
        SESSIONS_ACTIVE.inc();
        self.spawn_ticker(&live, stop_rx);
        Ok(response)
    }

    async fn resume(
        &self,
        live: &Arc<Mutex<LiveSession>>,
    ) -> Result<StartSessionResponse, SessionError> {
        let live = live.lock().await;
        if live.controller.status() != SessionStatus::Active {
            return Err(SessionError::Conflict(format!(
                "session {} is being finalized",
                live.controller.session().session_id
            )));
        }

        tracing::info!(
            session_id = %live.controller.session().session_id,
            "Resuming active session"
        );
        let mut directives = Vec::new();
        if live.controller.view().fullscreen_enforced {
            directives.push(Directive::RequestFullscreen);
        }
        Ok(start_response(&live, true, directives))
    }

    async fn start_new(
        &self,
        request: StartSessionRequest,
        assessment_id: String,
    ) -> Result<Started, SessionError> {
        let collaborators = &self.inner.collaborators;
        let set = collaborators.questions.load_questions(&request.target).await?;

        if set.questions.is_empty() {
            return Err(EngineError::NoQuestions.into());
        }
        if set.duration_seconds == 0 {
            return Err(EngineError::InvalidDuration.into());
        }

        let session_id = Uuid::new_v4().to_string();
        let questions = Arc::new(set.questions);
        let now = Utc::now();

        let new_attempt = NewAttempt {
            session_id: session_id.clone(),
            assessment_id: assessment_id.clone(),
            student_id: request.student_id.clone(),
            total_marks: scoring::score(questions.as_slice(), &[]).total_marks,
            question_count: questions.len(),
            duration_seconds: set.duration_seconds,
            started_at: now,
        };

        let attempts = collaborators.attempts.as_ref();
        let attempt_id = {
            let new_attempt = &new_attempt;
            retry_async_with_config(self.inner.config.retry.clone(), move || {
                attempts.create_attempt(new_attempt)
            })
            .await
        }
        .map_err(|e| {
            ATTEMPT_STORE_FAILURES_TOTAL
                .with_label_values(&["create"])
                .inc();
            tracing::error!("Failed to create attempt for session {}: {:#}", session_id, e);
            SessionError::Transient(e)
        })?;

        let mut controller = SessionController::new(
            SessionIdentity {
                session_id: session_id.clone(),
                assessment_id,
                student_id: request.student_id.clone(),
            },
            set.duration_seconds,
            self.inner.policy.clone(),
        );
        let directives = controller.start(questions, &attempt_id, now)?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        let live = Arc::new(Mutex::new(LiveSession {
            controller,
            target: request.target,
            title: set.title,
            skill: set.skill,
            ticker: Some(TickerGuard { _stop: stop_tx }),
            events,
            outcome: Outcome::Live,
            certificate_requested: false,
        }));

        let response = start_response(&*live.lock().await, false, directives);

        tracing::info!(
            session_id = %session_id,
            student_id = %request.student_id,
            attempt_id = %attempt_id,
            "Session created"
        );

        Ok((response, live, stop_rx))
    }

    /// Delivers one signal to a live session and runs the finalize pipeline
    /// when it produces a terminal transition.
    pub async fn apply(
        &self,
        session_id: &str,
        signal: Signal,
    ) -> Result<SignalResponse, SessionError> {
        let live = self.live(session_id).await?;
        let mut live = live.lock().await;

        let was_active = live.controller.status() == SessionStatus::Active;
        let violations_before = live.controller.session().violations.len();
        let records_answer = matches!(signal, Signal::AnswerChanged { .. });

        let reaction = live.controller.handle(signal, Utc::now())?;

        if was_active && records_answer {
            ANSWERS_RECORDED_TOTAL.inc();
        }
        for violation in &live.controller.session().violations[violations_before..] {
            INTEGRITY_VIOLATIONS_TOTAL
                .with_label_values(&[violation.violation_type.as_str()])
                .inc();
        }

        let result = match reaction.finalized {
            Some(result) => Some(self.finalize(&mut live, result).await?),
            None => None,
        };

        Ok(SignalResponse {
            session: live.controller.view(),
            directives: reaction.directives,
            result,
        })
    }

    pub async fn record_answer(
        &self,
        session_id: &str,
        index: usize,
        value: String,
    ) -> Result<SignalResponse, SessionError> {
        self.apply(session_id, Signal::AnswerChanged { index, value })
            .await
    }

    pub async fn navigate(
        &self,
        session_id: &str,
        index: usize,
    ) -> Result<SignalResponse, SessionError> {
        self.apply(session_id, Signal::Navigate { index }).await
    }

    pub async fn browser_event(
        &self,
        session_id: &str,
        event: BrowserEvent,
    ) -> Result<SignalResponse, SessionError> {
        self.apply(session_id, Signal::Browser(event)).await
    }

    pub async fn submit(&self, session_id: &str) -> Result<SignalResponse, SessionError> {
        self.apply(session_id, Signal::SubmitRequested).await
    }

    /// Leaves an active session without scoring.
    pub async fn abandon(&self, session_id: &str) -> Result<SessionView, SessionError> {
        let live = self.live(session_id).await?;
        let mut live = live.lock().await;

        let now = Utc::now();
        if !live.controller.abandon(now) {
            return Err(SessionError::Conflict(format!(
                "session {} is not active",
                session_id
            )));
        }

        live.ticker = None;
        SESSIONS_ACTIVE.dec();
        SESSIONS_TOTAL.with_label_values(&["abandoned"]).inc();
        self.release_active(&live, false).await;

        if let Some(attempt_id) = live.controller.session().attempt_id.clone() {
            let attempts = self.inner.collaborators.attempts.as_ref();
            let attempt_id = attempt_id.as_str();
            let marked = retry_async_with_config(self.inner.config.retry.clone(), move || {
                attempts.mark_abandoned(attempt_id, now)
            })
            .await;
            if let Err(e) = marked {
                ATTEMPT_STORE_FAILURES_TOTAL
                    .with_label_values(&["abandon"])
                    .inc();
                tracing::warn!("Failed to mark attempt {} abandoned: {:#}", attempt_id, e);
            }
        }

        let _ = live
            .events
            .send(TimerEvent::SessionFinalized(SessionFinalized {
                session_id: session_id.to_string(),
                status: Some(SessionStatus::Abandoned),
                percentage: None,
                timestamp: now,
            }));
        self.unregister(session_id).await;

        Ok(live.controller.view())
    }

    pub async fn view(&self, session_id: &str) -> Result<SessionView, SessionError> {
        let live = self.live(session_id).await?;
        let live = live.lock().await;
        Ok(live.controller.view())
    }

    pub async fn result(&self, session_id: &str) -> Result<SessionResult, SessionError> {
        if let Ok(live) = self.live(session_id).await {
            let live = live.lock().await;
            return match &live.outcome {
                Outcome::PendingSave(result) | Outcome::Saved(result) => Ok(result.clone()),
                Outcome::Live => Err(SessionError::Conflict(format!(
                    "session {} has not been submitted",
                    session_id
                ))),
            };
        }

        self.cached_result(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(format!("result for session {}", session_id)))
    }

    /// Retries saving a terminal session whose result the attempt store has
    /// not acknowledged.
    pub async fn persist(&self, session_id: &str) -> Result<SessionResult, SessionError> {
        match self.live(session_id).await {
            Ok(live) => {
                let mut live = live.lock().await;
                self.save(&mut live).await
            }
            Err(not_found) => {
                if self.cached_result(session_id).await.is_some() {
                    Err(SessionError::NothingToPersist(session_id.to_string()))
                } else {
                    Err(not_found)
                }
            }
        }
    }

    /// Current timer snapshot plus a receiver for subsequent timer events.
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(TimerTick, broadcast::Receiver<TimerEvent>), SessionError> {
        let live = self.live(session_id).await?;
        let live = live.lock().await;
        Ok((timer_tick(&live), live.events.subscribe()))
    }

    pub async fn active_session_count(&self) -> usize {
        self.inner.registry.lock().await.active.len()
    }

    /// Terminal sessions still waiting for their result to be saved.
    pub async fn pending_save_count(&self) -> usize {
        self.inner.registry.lock().await.pending.len()
    }

    pub async fn cached_result_count(&self) -> usize {
        self.inner.results.lock().await.len()
    }

    async fn live(&self, session_id: &str) -> Result<Arc<Mutex<LiveSession>>, SessionError> {
        self.inner
            .registry
            .lock()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("session {}", session_id)))
    }

    async fn finalize(
        &self,
        live: &mut LiveSession,
        result: SessionResult,
    ) -> Result<SessionResult, SessionError> {
        live.ticker = None;
        SESSIONS_ACTIVE.dec();
        SESSIONS_TOTAL
            .with_label_values(&[result.status.as_str()])
            .inc();

        if result.reason == SubmitReason::Timeout {
            let _ = live.events.send(TimerEvent::TimeExpired(TimeExpired {
                session_id: result.session_id.clone(),
                timestamp: result.submitted_at,
                message: "Time limit exceeded".to_string(),
            }));
        }

        self.release_active(live, true).await;
        live.outcome = Outcome::PendingSave(result);
        self.save(live).await
    }

    /// Attempt update, then certificate, then enrollment. Only the attempt
    /// update can fail the save.
    async fn save(&self, live: &mut LiveSession) -> Result<SessionResult, SessionError> {
        let session_id = live.controller.session().session_id.clone();
        let mut result = match &live.outcome {
            Outcome::PendingSave(result) => result.clone(),
            Outcome::Live | Outcome::Saved(_) => {
                return Err(SessionError::NothingToPersist(session_id))
            }
        };

        let collaborators = &self.inner.collaborators;
        let attempts = collaborators.attempts.as_ref();
        let saved = {
            let result = &result;
            retry_async_with_config(self.inner.config.retry.clone(), move || {
                attempts.update_attempt(&result.attempt_id, result)
            })
            .await
        };
        if let Err(e) = saved {
            ATTEMPT_STORE_FAILURES_TOTAL
                .with_label_values(&["update"])
                .inc();
            tracing::error!(
                "Failed to save result for session {} (attempt {}): {:#}",
                session_id,
                result.attempt_id,
                e
            );
            return Err(SessionError::ResultNotSaved(session_id));
        }

        if result.passed && !live.certificate_requested {
            live.certificate_requested = true;
            let request = CertificateRequest::from_result(
                &result,
                &live.title,
                live.skill.as_deref(),
                self.inner.policy.pass_threshold,
            );
            match collaborators.certificates.issue_certificate(&request).await {
                Ok(certificate_id) => {
                    self.link_certificate(&result.attempt_id, &certificate_id).await;
                    result.certificate_id = Some(certificate_id);
                }
                Err(e) => {
                    CERTIFICATES_ISSUED_TOTAL
                        .with_label_values(&["failed"])
                        .inc();
                    tracing::warn!(
                        "Failed to issue certificate for attempt {}: {:#}",
                        result.attempt_id,
                        e
                    );
                }
            }
        }

        if let Some(skill_id) = live.target.skill_id() {
            let status = if result.certificate_id.is_some() {
                EnrollmentStatus::Certified
            } else {
                EnrollmentStatus::Completed
            };
            if let Err(e) = collaborators
                .enrollments
                .update_enrollment(
                    &result.student_id,
                    skill_id,
                    status,
                    result.certificate_id.as_deref(),
                )
                .await
            {
                tracing::warn!(
                    "Failed to update enrollment for skill {} student {}: {:#}",
                    skill_id,
                    result.student_id,
                    e
                );
            }
        }

        live.outcome = Outcome::Saved(result.clone());
        self.cache_result(&result).await;

        let _ = live
            .events
            .send(TimerEvent::SessionFinalized(SessionFinalized {
                session_id: session_id.clone(),
                status: Some(result.status),
                percentage: Some(result.percentage),
                timestamp: Utc::now(),
            }));
        self.unregister(&session_id).await;

        tracing::info!(
            session_id = %session_id,
            attempt_id = %result.attempt_id,
            certificate_id = ?result.certificate_id,
            "Session result saved"
        );
        Ok(result)
    }

    async fn link_certificate(&self, attempt_id: &str, certificate_id: &str) {
        let attempts = self.inner.collaborators.attempts.as_ref();
        let linked = retry_async_with_config(self.inner.config.retry.clone(), move || {
            attempts.link_certificate(attempt_id, certificate_id)
        })
        .await;
        if let Err(e) = linked {
            ATTEMPT_STORE_FAILURES_TOTAL
                .with_label_values(&["link_certificate"])
                .inc();
            tracing::warn!(
                "Failed to link certificate {} to attempt {}: {:#}",
                certificate_id,
                attempt_id,
                e
            );
        }
    }

    /// Frees the (student, assessment) pair. A session leaving through the
    /// save pipeline is tracked as pending until it is unregistered.
    async fn release_active(&self, live: &LiveSession, pending_save: bool) {
        let session = live.controller.session();
        let key: SessionKey = (session.student_id.clone(), session.assessment_id.clone());
        let now = Instant::now();
        let mut registry = self.inner.registry.lock().await;
        if registry.active.get(&key) == Some(&session.session_id) {
            registry.active.remove(&key);
        }
        registry.drop_expired_pending(now);
        if pending_save {
            registry.pending.insert(
                session.session_id.clone(),
                now + self.inner.config.pending_save_ttl,
            );
        }
    }

    async fn unregister(&self, session_id: &str) {
        let mut registry = self.inner.registry.lock().await;
        registry.sessions.remove(session_id);
        registry.pending.remove(session_id);
    }

    async fn cache_result(&self, result: &SessionResult) {
        let ttl = self.inner.config.result_cache_ttl;
        let now = Instant::now();
        {
            let mut results = self.inner.results.lock().await;
            results.retain(|_, cached| cached.expires_at > now);
            results.insert(
                result.session_id.clone(),
                CachedResult {
                    result: result.clone(),
                    expires_at: now + ttl,
                },
            );
        }

        let Some(redis) = &self.inner.redis else {
            return;
        };
        let mut conn = redis.clone();
        let key = format!("{}{}", RESULT_CACHE_PREFIX, result.session_id);
        let cached = track_cache_operation("setex", async {
            let json = serde_json::to_string(result)?;
            redis::cmd("SETEX")
                .arg(&key)
                .arg(ttl.as_secs().max(1))
                .arg(json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to cache session result in Redis")
        })
        .await;
        if let Err(e) = cached {
            tracing::warn!("{:#}", e);
        }
    }

    async fn cached_result(&self, session_id: &str) -> Option<SessionResult> {
        {
            let mut results = self.inner.results.lock().await;
            match results.get(session_id) {
                Some(cached) if cached.expires_at > Instant::now() => {
                    record_cache_hit();
                    return Some(cached.result.clone());
                }
                Some(_) => {
                    results.remove(session_id);
                }
                None => {}
            }
        }

        let Some(redis) = &self.inner.redis else {
            record_cache_miss();
            return None;
        };
        let mut conn = redis.clone();
        let key = format!("{}{}", RESULT_CACHE_PREFIX, session_id);
        let fetched = track_cache_operation("get", async {
            let json: Option<String> = redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .context("Failed to read session result from Redis")?;
            json.map(|json| serde_json::from_str::<SessionResult>(&json))
                .transpose()
                .context("Cached session result is malformed")
        })
        .await;

        match fetched {
            Ok(Some(result)) => {
                record_cache_hit();
                Some(result)
            }
            Ok(None) => {
                record_cache_miss();
                None
            }
            Err(e) => {
                tracing::warn!("{:#}", e);
                record_cache_miss();
                None
            }
        }
    }

    fn spawn_ticker(
        &self,
        live: &Arc<Mutex<LiveSession>>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let inner = Arc::downgrade(&self.inner);
        let live: Weak<Mutex<LiveSession>> = Arc::downgrade(live);
        let period = self.inner.config.tick_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let (Some(inner), Some(live)) = (inner.upgrade(), live.upgrade()) else {
                            break;
                        };
                        let service = SessionService { inner };
                        if !service.tick(&live).await {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// One timer second. Returns false once the session is no longer active.
    async fn tick(&self, live: &Mutex<LiveSession>) -> bool {
        let mut live = live.lock().await;
        if live.controller.status() != SessionStatus::Active {
            return false;
        }

        let reaction = match live.controller.handle(Signal::Tick, Utc::now()) {
            Ok(reaction) => reaction,
            Err(e) => {
                tracing::warn!("Tick rejected: {}", e);
                return false;
            }
        };

        let _ = live.events.send(TimerEvent::TimerTick(timer_tick(&live)));
        tracing::debug!(
            session_id = %live.controller.session().session_id,
            remaining_seconds = live.controller.session().time_remaining_seconds,
            "Tick"
        );

        if let Some(result) = reaction.finalized {
            let session_id = result.session_id.clone();
            if let Err(e) = self.finalize(&mut live, result).await {
                tracing::warn!("Timed-out session {} not saved: {}", session_id, e);
            }
            return false;
        }
        live.controller.status() == SessionStatus::Active
    }
}

fn start_response(
    live: &LiveSession,
    resumed: bool,
    directives: Vec<Directive>,
) -> StartSessionResponse {
    let session = live.controller.session();
    StartSessionResponse {
        session_id: session.session_id.clone(),
        attempt_id: session.attempt_id.clone().unwrap_or_default(),
        resumed,
        title: live.title.clone(),
        questions: live
            .controller
            .questions()
            .iter()
            .map(QuestionView::from)
            .collect(),
        session: live.controller.view(),
        directives,
    }
}

fn timer_tick(live: &LiveSession) -> TimerTick {
    let session = live.controller.session();
    TimerTick {
        session_id: session.session_id.clone(),
        remaining_seconds: session.time_remaining_seconds,
        elapsed_seconds: session.time_spent_seconds(),
        total_seconds: session.duration_seconds,
        violation_count: session.violations.len(),
        timestamp: Utc::now(),
    }
}
