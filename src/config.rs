//! Application-level configuration loading: scoring table, session rules and
//! WebSocket limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::services::scoring::{ScoreTier, ScoringPolicy};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_LIVE_CONFIG_PATH";

const DEFAULT_HOST_NICKNAME: &str = "Host";
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_MESSAGE_BYTES: usize = 4096;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Points table applied to submitted answers.
    pub scoring: ScoringPolicy,
    /// Whether the host, registered as a player at creation, may also answer.
    pub host_may_answer: bool,
    /// Nickname given to the host's player row.
    pub host_nickname: String,
    /// Interval between server pings on idle WebSocket connections.
    pub heartbeat_interval: Duration,
    /// Connections silent for longer than this are closed.
    pub idle_timeout: Duration,
    /// Largest inbound WebSocket message accepted.
    pub max_message_bytes: usize,
    /// Reject WebSocket upgrades that carry no caller identity header.
    pub require_ws_identity: bool,
    /// Quiz catalog loaded into memory when no database is configured.
    pub catalog_seed_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        host_may_answer = app_config.host_may_answer,
                        require_ws_identity = app_config.require_ws_identity,
                        tiers = app_config.scoring.tiers().len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringPolicy::default(),
            host_may_answer: true,
            host_nickname: DEFAULT_HOST_NICKNAME.to_owned(),
            heartbeat_interval: DEFAULT_HEARTBEAT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            require_ws_identity: false,
            catalog_seed_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    scoring: Option<RawScoring>,
    host_may_answer: Option<bool>,
    host_nickname: Option<String>,
    heartbeat_interval_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
    max_message_bytes: Option<usize>,
    require_ws_identity: Option<bool>,
    catalog_seed_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawScoring {
    tiers: Vec<ScoreTier>,
    fallback_points: u32,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();

        let scoring = match value.scoring {
            Some(raw) => ScoringPolicy::new(raw.tiers, raw.fallback_points).unwrap_or_else(|err| {
                warn!(error = %err, "invalid scoring table; using default tiers");
                defaults.scoring.clone()
            }),
            None => defaults.scoring.clone(),
        };

        let host_nickname = value
            .host_nickname
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or(defaults.host_nickname);

        let idle_timeout = value
            .idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map_or(defaults.idle_timeout, Duration::from_secs);
        let mut heartbeat_interval = value
            .heartbeat_interval_secs
            .filter(|secs| *secs > 0)
            .map_or(defaults.heartbeat_interval, Duration::from_secs);
        if heartbeat_interval >= idle_timeout {
            warn!(
                heartbeat_secs = heartbeat_interval.as_secs(),
                idle_secs = idle_timeout.as_secs(),
                "heartbeat must be shorter than the idle timeout; using half of it"
            );
            heartbeat_interval = idle_timeout / 2;
        }

        Self {
            scoring,
            host_may_answer: value.host_may_answer.unwrap_or(defaults.host_may_answer),
            host_nickname,
            heartbeat_interval,
            idle_timeout,
            max_message_bytes: value
                .max_message_bytes
                .filter(|bytes| *bytes > 0)
                .unwrap_or(defaults.max_message_bytes),
            require_ws_identity: value
                .require_ws_identity
                .unwrap_or(defaults.require_ws_identity),
            catalog_seed_path: value.catalog_seed_path,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
