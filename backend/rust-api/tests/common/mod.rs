#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use skillvault_api::{
    config::{Config, ProctoringSettings, SessionSettings},
    create_router,
    engine::ProctoringPolicy,
    models::{
        CertificateRequest, EnrollmentStatus, NewAttempt, Question, QuestionSet, QuestionType,
        SessionResult, SessionTarget, StartSessionRequest,
    },
    services::{
        collaborators::{
            AttemptStore, CertificateIssuer, CollaboratorError, Collaborators, EnrollmentUpdater,
            QuestionSource,
        },
        session_service::{SessionService, SessionServiceConfig},
        AppState,
    },
    utils::retry::RetryConfig,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// MCQ with options A..D where `correct` is the index of the right one.
pub fn mcq(id: &str, correct: usize, points: u32) -> Question {
    Question {
        id: id.to_string(),
        title: format!("Question {}", id),
        description: String::new(),
        question_type: QuestionType::Mcq,
        options: ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
        correct_answer: Some(correct),
        points,
        explanation: None,
    }
}

pub fn question_set(questions: Vec<Question>, duration_seconds: u32) -> QuestionSet {
    QuestionSet {
        title: "Rust Fundamentals".to_string(),
        skill: Some("rust".to_string()),
        duration_seconds,
        questions,
    }
}

/// Ten 10-point MCQs whose correct option is always "A".
pub fn ten_questions() -> Vec<Question> {
    (0..10).map(|i| mcq(&format!("q{}", i), 0, 10)).collect()
}

pub fn assessment_request(student_id: &str, assessment_id: &str) -> StartSessionRequest {
    StartSessionRequest {
        student_id: student_id.to_string(),
        target: SessionTarget::Assessment {
            assessment_id: assessment_id.to_string(),
        },
    }
}

pub fn skill_request(student_id: &str, skill_id: &str) -> StartSessionRequest {
    StartSessionRequest {
        student_id: student_id.to_string(),
        target: SessionTarget::Skill {
            skill_id: skill_id.to_string(),
        },
    }
}

#[derive(Default)]
pub struct FakeQuestions {
    pub set: Mutex<Option<QuestionSet>>,
    pub unavailable: AtomicBool,
}

impl FakeQuestions {
    pub fn with_set(set: QuestionSet) -> Self {
        Self {
            set: Mutex::new(Some(set)),
            unavailable: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl QuestionSource for FakeQuestions {
    async fn load_questions(
        &self,
        target: &SessionTarget,
    ) -> Result<QuestionSet, CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("question bank unreachable").into());
        }
        self.set
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CollaboratorError::NotFound(target.assessment_id()))
    }
}

#[derive(Default)]
pub struct FakeAttempts {
    pub created: Mutex<Vec<NewAttempt>>,
    pub updates: Mutex<Vec<(String, SessionResult)>>,
    pub abandoned: Mutex<Vec<String>>,
    pub certificate_links: Mutex<Vec<(String, String)>>,
    pub fail_create: AtomicBool,
    /// The next `create_attempt` call never completes.
    pub stall_next_create: AtomicBool,
    /// Number of upcoming `update_attempt` calls that fail.
    pub failing_updates: AtomicUsize,
}

impl FakeAttempts {
    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[async_trait]
impl AttemptStore for FakeAttempts {
    async fn create_attempt(&self, attempt: &NewAttempt) -> anyhow::Result<String> {
        if self.stall_next_create.swap(false, Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            anyhow::bail!("attempt store unavailable");
        }
        let mut created = self.created.lock().unwrap();
        created.push(attempt.clone());
        Ok(format!("attempt-{}", created.len()))
    }

    async fn update_attempt(&self, attempt_id: &str, result: &SessionResult) -> anyhow::Result<()> {
        let failing = self.failing_updates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_updates.store(failing - 1, Ordering::SeqCst);
            anyhow::bail!("attempt store write failed");
        }
        self.updates
            .lock()
            .unwrap()
            .push((attempt_id.to_string(), result.clone()));
        Ok(())
    }

    async fn link_certificate(&self, attempt_id: &str, certificate_id: &str) -> anyhow::Result<()> {
        self.certificate_links
            .lock()
            .unwrap()
            .push((attempt_id.to_string(), certificate_id.to_string()));
        Ok(())
    }

    async fn mark_abandoned(&self, attempt_id: &str, _at: DateTime<Utc>) -> anyhow::Result<()> {
        self.abandoned.lock().unwrap().push(attempt_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCertificates {
    pub issued: Mutex<Vec<CertificateRequest>>,
    pub fail: AtomicBool,
}

impl FakeCertificates {
    pub fn issued_count(&self) -> usize {
        self.issued.lock().unwrap().len()
    }
}

#[async_trait]
impl CertificateIssuer for FakeCertificates {
    async fn issue_certificate(&self, request: &CertificateRequest) -> anyhow::Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("certificate service down");
        }
        let mut issued = self.issued.lock().unwrap();
        issued.push(request.clone());
        Ok(format!("CERT-TEST-{}", issued.len()))
    }
}

#[derive(Default)]
pub struct FakeEnrollments {
    pub updates: Mutex<Vec<(String, String, EnrollmentStatus, Option<String>)>>,
}

#[async_trait]
impl EnrollmentUpdater for FakeEnrollments {
    async fn update_enrollment(
        &self,
        student_id: &str,
        skill_id: &str,
        status: EnrollmentStatus,
        certificate_id: Option<&str>,
    ) -> anyhow::Result<()> {
        self.updates.lock().unwrap().push((
            student_id.to_string(),
            skill_id.to_string(),
            status,
            certificate_id.map(str::to_string),
        ));
        Ok(())
    }
}

/// In-memory collaborators plus handles to inspect what the driver did.
pub struct Fakes {
    pub questions: Arc<FakeQuestions>,
    pub attempts: Arc<FakeAttempts>,
    pub certificates: Arc<FakeCertificates>,
    pub enrollments: Arc<FakeEnrollments>,
}

impl Fakes {
    pub fn new(set: QuestionSet) -> Self {
        Self {
            questions: Arc::new(FakeQuestions::with_set(set)),
            attempts: Arc::new(FakeAttempts::default()),
            certificates: Arc::new(FakeCertificates::default()),
            enrollments: Arc::new(FakeEnrollments::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            questions: self.questions.clone(),
            attempts: self.attempts.clone(),
            certificates: self.certificates.clone(),
            enrollments: self.enrollments.clone(),
        }
    }
}

pub fn fast_service_config() -> SessionServiceConfig {
    SessionServiceConfig {
        tick_interval: Duration::from_secs(1),
        result_cache_ttl: Duration::from_secs(60),
        pending_save_ttl: Duration::from_secs(120),
        retry: RetryConfig::fixed(3, Duration::from_millis(1)),
    }
}

pub fn session_service(fakes: &Fakes, policy: ProctoringPolicy) -> SessionService {
    init_tracing();
    SessionService::new(policy, fakes.collaborators(), None, fast_service_config())
}

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017".to_string(),
        mongo_database: "skillvault_test".to_string(),
        redis_uri: None,
        question_api_url: "http://localhost:3000".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        proctoring: ProctoringSettings {
            fullscreen_required: false,
            ..ProctoringSettings::default()
        },
        session: SessionSettings::default(),
    }
}

pub fn create_test_app(fakes: &Fakes) -> Router {
    init_tracing();
    let state = AppState::from_parts(test_config(), fakes.collaborators(), None)
        .expect("Failed to build test app state");
    create_router(Arc::new(state))
}
