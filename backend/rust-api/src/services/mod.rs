use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

use self::attempt_service::AttemptService;
use self::certificate_service::CertificateService;
use self::collaborators::Collaborators;
use self::enrollment_service::EnrollmentService;
use self::question_service::{QuestionService, SkillAssessmentSettings};
use self::session_service::{SessionService, SessionServiceConfig};

pub struct AppState {
    pub config: Config,
    /// `None` only when the state is assembled from in-memory collaborators.
    pub mongo: Option<Database>,
    pub redis: Option<ConnectionManager>,
    pub sessions: SessionService,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        let redis = match &config.redis_uri {
            Some(uri) => connect_redis(uri).await,
            None => {
                tracing::info!("Redis not configured, session results cached in-process only");
                None
            }
        };

        let collaborators = Collaborators {
            questions: Arc::new(QuestionService::new(
                mongo.clone(),
                SkillAssessmentSettings {
                    generator_url: config.question_api_url.clone(),
                    duration_seconds: config.session.skill_duration_seconds,
                    question_count: config.session.skill_question_count,
                },
            )),
            attempts: Arc::new(AttemptService::new(mongo.clone())),
            certificates: Arc::new(CertificateService::new(mongo.clone())),
            enrollments: Arc::new(EnrollmentService::new(mongo.clone())),
        };

        let mut state = Self::from_parts(config, collaborators, redis)?;
        state.mongo = Some(mongo);
        Ok(state)
    }

    /// Builds the state around arbitrary collaborators.
    pub fn from_parts(
        config: Config,
        collaborators: Collaborators,
        redis: Option<ConnectionManager>,
    ) -> anyhow::Result<Self> {
        let policy = config.proctoring.to_policy()?;
        let sessions = SessionService::new(
            policy,
            collaborators,
            redis.clone(),
            SessionServiceConfig::from_settings(&config.session),
        );

        Ok(Self {
            config,
            mongo: None,
            redis,
            sessions,
        })
    }
}

/// Redis is a cache here: a failed connection degrades to in-process caching.
async fn connect_redis(uri: &str) -> Option<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let client = match redis::Client::open(uri) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Invalid Redis URI, continuing without Redis: {}", e);
            return None;
        }
    };

    let manager =
        match tokio::time::timeout(Duration::from_secs(30), ConnectionManager::new(client)).await {
            Ok(Ok(manager)) => manager,
            Ok(Err(e)) => {
                tracing::warn!("Redis connection failed, continuing without Redis: {}", e);
                return None;
            }
            Err(_) => {
                tracing::warn!("Redis connection timeout after 30s, continuing without Redis");
                return None;
            }
        };

    let mut conn = manager.clone();
    match tokio::time::timeout(
        Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    {
        Ok(Ok(_)) => {
            tracing::info!("Redis connection established successfully");
            Some(manager)
        }
        Ok(Err(e)) => {
            tracing::warn!("Redis PING failed, continuing without Redis: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("Redis PING timeout after 5s, continuing without Redis");
            None
        }
    }
}

pub mod attempt_service;
pub mod certificate_service;
pub mod collaborators;
pub mod enrollment_service;
pub mod question_service;
pub mod session_service;
