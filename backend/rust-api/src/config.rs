use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::engine::policy::{KeyComboParseError, DEFAULT_BLOCKED_SHORTCUTS};
use crate::engine::{KeyCombo, PolicyRule, ProctoringPolicy};
use crate::models::ViolationType;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Redis is optional; without it results are cached in-process only.
    pub redis_uri: Option<String>,
    pub question_api_url: String,
    pub bind_addr: String,
    pub proctoring: ProctoringSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProctoringSettings {
    pub tab_switch_limit: u32,
    pub pass_threshold: u32,
    pub fullscreen_required: bool,
    pub auto_submit_on_limit: bool,
    pub count_fullscreen_exits: bool,
    pub count_blocked_shortcuts: bool,
    pub blocked_shortcuts: Vec<String>,
}

impl Default for ProctoringSettings {
    fn default() -> Self {
        Self {
            tab_switch_limit: 3,
            pass_threshold: 70,
            fullscreen_required: true,
            auto_submit_on_limit: true,
            count_fullscreen_exits: false,
            count_blocked_shortcuts: false,
            blocked_shortcuts: DEFAULT_BLOCKED_SHORTCUTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ProctoringSettings {
    pub fn to_policy(&self) -> Result<ProctoringPolicy, KeyComboParseError> {
        let blocked_shortcuts = self
            .blocked_shortcuts
            .iter()
            .map(|combo| combo.parse::<KeyCombo>())
            .collect::<Result<Vec<_>, _>>()?;

        let policy = ProctoringPolicy {
            tab_switch_limit: self.tab_switch_limit,
            auto_submit_on_limit: self.auto_submit_on_limit,
            fullscreen_required: self.fullscreen_required,
            pass_threshold: self.pass_threshold,
            blocked_shortcuts,
            ..ProctoringPolicy::default()
        }
        .with_rule(
            ViolationType::FullscreenExit,
            PolicyRule::warn_and_refullscreen().counted(self.count_fullscreen_exits),
        )
        .with_rule(
            ViolationType::BlockedShortcut,
            PolicyRule::block_and_warn().counted(self.count_blocked_shortcuts),
        );
        Ok(policy)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub skill_duration_seconds: u32,
    pub skill_question_count: u32,
    pub tick_interval_ms: u64,
    pub result_cache_ttl_seconds: u64,
    /// How long an unsaved result waits for `persist` before it is dropped.
    pub pending_save_ttl_seconds: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            skill_duration_seconds: 30 * 60,
            skill_question_count: 5,
            tick_interval_ms: 1000,
            result_cache_ttl_seconds: 3600,
            pending_save_ttl_seconds: 24 * 3600,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml, overridden by APP__SECTION__KEY variables
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "skillvault".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let question_api_url = settings
            .get_string("question_api.url")
            .or_else(|_| env::var("QUESTION_API_URL"))
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let defaults = ProctoringSettings::default();
        let blocked_shortcuts = settings
            .get_string("proctoring.blocked_shortcuts")
            .or_else(|_| env::var("PROCTORING_BLOCKED_SHORTCUTS"))
            .map(|list| split_list(&list))
            .unwrap_or(defaults.blocked_shortcuts);

        let proctoring = ProctoringSettings {
            tab_switch_limit: read(
                &settings,
                "proctoring.tab_switch_limit",
                "PROCTORING_TAB_SWITCH_LIMIT",
                defaults.tab_switch_limit,
            )?,
            pass_threshold: read(
                &settings,
                "proctoring.pass_threshold",
                "PROCTORING_PASS_THRESHOLD",
                defaults.pass_threshold,
            )?,
            fullscreen_required: read(
                &settings,
                "proctoring.fullscreen_required",
                "PROCTORING_FULLSCREEN_REQUIRED",
                defaults.fullscreen_required,
            )?,
            auto_submit_on_limit: read(
                &settings,
                "proctoring.auto_submit_on_limit",
                "PROCTORING_AUTO_SUBMIT_ON_LIMIT",
                defaults.auto_submit_on_limit,
            )?,
            count_fullscreen_exits: read(
                &settings,
                "proctoring.count_fullscreen_exits",
                "PROCTORING_COUNT_FULLSCREEN_EXITS",
                defaults.count_fullscreen_exits,
            )?,
            count_blocked_shortcuts: read(
                &settings,
                "proctoring.count_blocked_shortcuts",
                "PROCTORING_COUNT_BLOCKED_SHORTCUTS",
                defaults.count_blocked_shortcuts,
            )?,
            blocked_shortcuts,
        };

        let session_defaults = SessionSettings::default();
        let session = SessionSettings {
            skill_duration_seconds: read(
                &settings,
                "session.skill_duration_seconds",
                "SKILL_ASSESSMENT_DURATION_SECONDS",
                session_defaults.skill_duration_seconds,
            )?,
            skill_question_count: read(
                &settings,
                "session.skill_question_count",
                "SKILL_ASSESSMENT_QUESTION_COUNT",
                session_defaults.skill_question_count,
            )?,
            tick_interval_ms: read(
                &settings,
                "session.tick_interval_ms",
                "SESSION_TICK_INTERVAL_MS",
                session_defaults.tick_interval_ms,
            )?
            .max(1),
            result_cache_ttl_seconds: read(
                &settings,
                "session.result_cache_ttl_seconds",
                "RESULT_CACHE_TTL_SECONDS",
                session_defaults.result_cache_ttl_seconds,
            )?,
            pending_save_ttl_seconds: read(
                &settings,
                "session.pending_save_ttl_seconds",
                "PENDING_SAVE_TTL_SECONDS",
                session_defaults.pending_save_ttl_seconds,
            )?,
        };

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            question_api_url,
            bind_addr,
            proctoring,
            session,
        })
    }
}

/// Reads `key` from the layered settings, then the plain `env_name` variable,
/// then falls back to `default`. Unparseable values are an error.
fn read<T>(
    settings: &config::Config,
    key: &str,
    env_name: &str,
    default: T,
) -> Result<T, config::ConfigError>
where
    T: FromStr,
{
    let raw = match settings.get_string(key) {
        Ok(value) => value,
        Err(_) => match env::var(env_name) {
            Ok(value) => value,
            Err(_) => return Ok(default),
        },
    };
    raw.trim()
        .parse()
        .map_err(|_| config::ConfigError::Message(format!("invalid value for {}: {}", key, raw)))
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
