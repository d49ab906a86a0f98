//! Configuration for the Vision API

use core_config::{
    AppInfo, ConfigError, FromEnv, app_info, env_optional, env_parse_or_default,
    server::ServerConfig,
};
use domain_vision::{
    OrchestratorConfig, ProviderKind, SessionStoreConfig, extractor::DEFAULT_MIN_CONFIDENCE,
    orchestrator::DEFAULT_MAX_RANKINGS,
    session::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL, DEFAULT_SWEEP_INTERVAL},
};
use std::time::Duration;

pub use core_config::Environment;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub server: ServerConfig,
    pub environment: Environment,
    pub provider: ProviderKind,
    pub sessions: SessionStoreConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?;
        let provider = env_parse_or_default("VISION_PROVIDER", ProviderKind::Gemini)?;
        let sessions = session_config_from_env()?;
        let orchestrator = orchestrator_config_from_env()?;

        Ok(Self {
            app: app_info!(),
            server,
            environment,
            provider,
            sessions,
            orchestrator,
        })
    }
}

fn session_config_from_env() -> Result<SessionStoreConfig, ConfigError> {
    let ttl = env_parse_or_default("SESSION_TTL_SECS", DEFAULT_SESSION_TTL.as_secs())?;
    let max_entries = env_parse_or_default("SESSION_MAX_ENTRIES", DEFAULT_MAX_SESSIONS)?;
    let sweep = env_parse_or_default(
        "SESSION_SWEEP_INTERVAL_SECS",
        DEFAULT_SWEEP_INTERVAL.as_secs(),
    )?;

    if sweep == 0 {
        return Err(ConfigError::ParseError {
            key: "SESSION_SWEEP_INTERVAL_SECS".to_string(),
            details: "must be greater than zero".to_string(),
        });
    }

    Ok(SessionStoreConfig {
        ttl: Duration::from_secs(ttl),
        max_entries,
        sweep_interval: Duration::from_secs(sweep),
    })
}

fn orchestrator_config_from_env() -> Result<OrchestratorConfig, ConfigError> {
    let min_confidence = env_parse_or_default("MIN_ITEM_CONFIDENCE", DEFAULT_MIN_CONFIDENCE)?;
    let deadline = match env_optional("STREAM_DEADLINE_SECS") {
        Some(raw) => {
            let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::ParseError {
                    key: "STREAM_DEADLINE_SECS".to_string(),
                    details: e.to_string(),
                }
            })?;
            Some(Duration::from_secs(secs))
        }
        None => None,
    };

    Ok(OrchestratorConfig {
        min_confidence,
        max_rankings: DEFAULT_MAX_RANKINGS,
        deadline,
    })
}
