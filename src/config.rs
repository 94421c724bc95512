//! Application-level configuration loading, including the capacity and protocol policy.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/relay.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PADDLE_RELAY_CONFIG_PATH";
/// Placeholder replied to `url`/`groupname` queries when nothing is configured.
const DEFAULT_VALUE: &str = "DefaultValue";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_EVENT_LOG_PATH: &str = "data/events.jsonl";

/// Message types the router understands, in the order they are registered.
pub const ALL_ROUTES: [&str; 5] = [
    "url",
    "groupname",
    "clientConfirmation",
    "paddleMove",
    "init_positions",
];

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Value replied to `url` queries.
    pub server_url: String,
    /// Value replied to `groupname` queries.
    pub group_name: String,
    /// TCP port the listener binds to.
    pub port: u16,
    /// Maximum number of concurrently registered connections.
    pub max_connections: usize,
    /// Whether confirmations beyond the two player slots become spectators.
    pub allow_spectators: bool,
    /// Whether clients must send `clientConfirmation` before being assigned a role.
    pub require_confirmation: bool,
    /// Simulation rate of the tick scheduler.
    pub tick_rate_hz: u32,
    /// Upper bound on ticks run in a single wake-up when the scheduler falls behind.
    pub max_catch_up_ticks: u32,
    /// Number announced in the `countdown` message.
    pub countdown: u32,
    /// Delay between the countdown broadcast and the match start.
    pub pre_match_delay: Duration,
    /// JSON-lines event log location; `None` keeps events in the tracing output only.
    pub event_log_path: Option<PathBuf>,
    /// Message types enabled on the router.
    pub routes: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        max_connections = config.max_connections,
                        spectators = config.allow_spectators,
                        "loaded relay config"
                    );
                    config
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
        };

        if let Some(port) = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
        {
            config.port = port;
        }

        config
    }

    /// Parse a configuration document, filling missing fields with defaults.
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Duration of one simulation frame.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_VALUE.into(),
            group_name: DEFAULT_VALUE.into(),
            port: DEFAULT_PORT,
            max_connections: 3,
            allow_spectators: true,
            require_confirmation: true,
            tick_rate_hz: 60,
            max_catch_up_ticks: 5,
            countdown: 3,
            pre_match_delay: Duration::from_secs(3),
            event_log_path: Some(PathBuf::from(DEFAULT_EVENT_LOG_PATH)),
            routes: ALL_ROUTES.iter().map(|route| route.to_string()).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    server_url: Option<String>,
    group_name: Option<String>,
    port: Option<u16>,
    max_connections: Option<usize>,
    allow_spectators: Option<bool>,
    require_confirmation: Option<bool>,
    tick_rate_hz: Option<u32>,
    max_catch_up_ticks: Option<u32>,
    countdown: Option<u32>,
    pre_match_delay_ms: Option<u64>,
    // `Some(None)` is an explicit `null`, which disables the file sink.
    #[serde(deserialize_with = "explicit_null")]
    event_log_path: Option<Option<PathBuf>>,
    protocol: Option<RawProtocol>,
}

#[derive(Debug, Deserialize)]
/// Protocol section of the configuration file.
struct RawProtocol {
    routes: Vec<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            server_url: value.server_url.unwrap_or(defaults.server_url),
            group_name: value.group_name.unwrap_or(defaults.group_name),
            port: value.port.unwrap_or(defaults.port),
            max_connections: value.max_connections.unwrap_or(defaults.max_connections),
            allow_spectators: value.allow_spectators.unwrap_or(defaults.allow_spectators),
            require_confirmation: value
                .require_confirmation
                .unwrap_or(defaults.require_confirmation),
            tick_rate_hz: value.tick_rate_hz.unwrap_or(defaults.tick_rate_hz),
            max_catch_up_ticks: value
                .max_catch_up_ticks
                .unwrap_or(defaults.max_catch_up_ticks),
            countdown: value.countdown.unwrap_or(defaults.countdown),
            pre_match_delay: value
                .pre_match_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.pre_match_delay),
            event_log_path: value.event_log_path.unwrap_or(defaults.event_log_path),
            routes: value
                .protocol
                .map(|protocol| protocol.routes)
                .unwrap_or(defaults.routes),
        }
    }
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<PathBuf>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<PathBuf>::deserialize(deserializer).map(Some)
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
