use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::location::SpeedUnit;
use crate::playback::MissingPreviewPolicy;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    4870
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), password: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_clean_log")]
    pub clean_log_on_start: bool,
}
fn default_clean_log() -> bool {
    true
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self { clean_log_on_start: default_clean_log() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_ms: u64,
}
fn default_poll_interval() -> u64 {
    10_000
}
fn default_fetch_timeout() -> u64 {
    10_000
}
impl Default for PlaylistConfig {
    fn default() -> Self {
        Self { endpoint: None, poll_interval_ms: default_poll_interval(), timeout_ms: default_fetch_timeout() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
    #[serde(default)]
    pub unit: SpeedUnit,
}
fn default_sample_interval() -> u64 {
    30_000
}
impl Default for LocationConfig {
    fn default() -> Self {
        Self { sample_interval_ms: default_sample_interval(), unit: SpeedUnit::default() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub on_missing_preview: MissingPreviewPolicy,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub clean_log_on_start: bool,
    pub endpoint: Option<String>,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub sample_interval: Duration,
    pub speed_unit: SpeedUnit,
    pub missing_preview: MissingPreviewPolicy,
    pub allow_patterns: Vec<Regex>,
    pub block_patterns: Vec<Regex>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        resolve(RawConfig::default(), |_| None)
    }
}

pub const CONFIG_FILES: [&str; 2] = ["speedtune.toml", "Speedtune.toml"];

pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Speedtune Node Configuration

[server]
# Host/IP to bind. Default: 0.0.0.0
host = "0.0.0.0"
# Port to bind. Default: 4870
port = 4870
# Optional password required in the Authorization header for all requests. Default: unset (no auth)
# password = "supersecret"

[logging]
# Truncate .logs/latest.log on startup. Default: true
clean_log_on_start = true

[playlist]
# Base URL of the playlist service. The current speed is appended as a path segment:
#   GET {endpoint}/{speed}
# Can also be set with SPEEDTUNE_ENDPOINT (or API_ENDPOINT). Default: unset (poller disabled)
# endpoint = "https://example.com/playlist"
# How often to refetch the playlist in milliseconds. Default: 10000
poll_interval_ms = 10000
# Request timeout in milliseconds. Default: 10000
timeout_ms = 10000

[location]
# How often the latest location fix is sampled in milliseconds. Default: 30000
sample_interval_ms = 30000
# Unit of the speed sent to the playlist service: "mph", "kmh" or "mps". Default: "mph"
unit = "mph"

[playback]
# What to do when a track has no preview: "halt" surfaces an error, "skip" moves on
# to the next playable track. Default: "halt"
on_missing_preview = "halt"

[sources]
# Regex patterns for preview URIs that are allowed. If empty, all are allowed unless blocked.
# Match is tested against both the full URI and the hostname.
allowed = []

# Regex patterns that are blocked. These take priority over allowed.
blocked = []"#;

pub fn load_config() -> EffectiveConfig {
    let _ = dotenvy::dotenv();

    let config_exists = CONFIG_FILES.iter().any(|path| std::path::Path::new(path).exists());
    if !config_exists {
        if let Err(e) = std::fs::write(CONFIG_FILES[0], DEFAULT_CONFIG_TEMPLATE) {
            tracing::warn!(?e, "Failed to create default config file");
        } else {
            tracing::info!("Created default config file at {}", CONFIG_FILES[0]);
        }
    }

    let mut raw = RawConfig::default();
    if let Ok(contents) =
        std::fs::read_to_string(CONFIG_FILES[0]).or_else(|_| std::fs::read_to_string(CONFIG_FILES[1]))
    {
        match parse_config(&contents) {
            Ok(parsed) => raw = parsed,
            Err(e) => tracing::warn!(?e, "Failed to parse speedtune config; using defaults"),
        }
    }

    resolve(raw, |key| std::env::var(key).ok())
}

pub fn parse_config(contents: &str) -> Result<RawConfig, toml::de::Error> {
    toml::from_str::<RawConfig>(contents)
}

/// Merge file values with environment overrides looked up through `env`.
pub fn resolve(raw: RawConfig, env: impl Fn(&str) -> Option<String>) -> EffectiveConfig {
    let env_u64 = |key: &str| env(key).and_then(|s| s.trim().parse::<u64>().ok());

    let compile = |patterns: &[String]| -> Vec<Regex> {
        patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = %p, %e, "Ignoring invalid source pattern");
                    None
                }
            })
            .collect()
    };

    let endpoint = env("SPEEDTUNE_ENDPOINT")
        .or_else(|| env("API_ENDPOINT"))
        .or(raw.playlist.endpoint)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    EffectiveConfig {
        host: env("SPEEDTUNE_HOST").unwrap_or(raw.server.host),
        port: env("SPEEDTUNE_PORT").and_then(|s| s.parse().ok()).unwrap_or(raw.server.port),
        password: env("SPEEDTUNE_PASSWORD").or(raw.server.password),
        clean_log_on_start: raw.logging.clean_log_on_start,
        endpoint,
        poll_interval: interval(env_u64("PLAYLIST_POLL_MS").unwrap_or(raw.playlist.poll_interval_ms)),
        fetch_timeout: interval(raw.playlist.timeout_ms),
        sample_interval: interval(env_u64("LOCATION_SAMPLE_MS").unwrap_or(raw.location.sample_interval_ms)),
        speed_unit: raw.location.unit,
        missing_preview: raw.playback.on_missing_preview,
        allow_patterns: compile(&raw.sources.allowed),
        block_patterns: compile(&raw.sources.blocked),
    }
}

fn interval(ms: u64) -> Duration {
    if ms == 0 {
        Duration::from_secs(1)
    } else {
        Duration::from_millis(ms)
    }
}
