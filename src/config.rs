use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on the live feed buffer
pub const MAX_FEED_CAPACITY: usize = 10;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub dev_mode: DevModeConfig,
    #[serde(default)]
    pub mobile: MobileConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Request timeout applied to every request that is not slow-mobile
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Largest request or response body buffered by the mobile adapter
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EventConfig {
    /// Broadcast capacity of the event bus
    #[serde(default = "default_event_bus_capacity")]
    pub bus_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeedConfig {
    /// Number of recent events retained by the live feed
    #[serde(default = "default_feed_capacity")]
    pub capacity: usize,

    /// Bounded queue between the push transport and the aggregator
    #[serde(default = "default_feed_queue_capacity")]
    pub queue_capacity: usize,

    /// Reconnect attempts after a transport failure
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Fixed delay between reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SnapshotConfig {
    /// Base URL of the API serving stats, events, health and recommendations
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Number of recent events requested at load time
    #[serde(default = "default_recent_events_limit")]
    pub recent_events_limit: usize,

    /// Per-fetch timeout
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DevModeConfig {
    /// Initial value when no persisted state exists
    #[serde(default)]
    pub enabled: bool,

    /// File that persists the toggle across restarts
    #[serde(default = "default_dev_mode_state_file")]
    pub state_file: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MobileConfig {
    /// Arrays longer than this are truncated on slow connections
    #[serde(default = "default_array_limit")]
    pub array_limit: usize,

    /// Page size injected when a mobile request omits `limit`
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Request timeout for slow mobile connections
    #[serde(default = "default_slow_timeout")]
    pub slow_timeout_seconds: u64,

    /// Fresh window of the mobile Cache-Control directive
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_seconds: u64,

    /// Stale-while-revalidate window of the mobile Cache-Control directive
    #[serde(default = "default_stale_while_revalidate")]
    pub stale_while_revalidate_seconds: u64,

    /// WebSocket ping interval for mobile clients
    #[serde(default = "default_mobile_ping")]
    pub mobile_ping_seconds: u64,

    /// WebSocket ping interval for desktop clients
    #[serde(default = "default_desktop_ping")]
    pub desktop_ping_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntegrationsConfig {
    /// Integrations tracked by the health map
    #[serde(default = "default_integration_names")]
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    Memory,
    File,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_credential_backend")]
    pub backend: CredentialBackend,

    /// JSON file used by the file backend
    #[serde(default = "default_credential_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ShutdownConfig {
    /// Forced exit after this many seconds of graceful shutdown
    #[serde(default = "default_force_timeout")]
    pub force_timeout_seconds: u64,

    /// Fault codes that are logged and ignored instead of shutting down
    #[serde(default = "default_ignored_fault_codes")]
    pub ignored_fault_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub file_dir: Option<String>,
}

impl DashboardConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("cia-dashboard.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port() as i64)?
            .set_default(
                "server.request_timeout_seconds",
                default_request_timeout() as i64,
            )?
            .set_default("feed.capacity", default_feed_capacity() as i64)?
            .set_default(
                "feed.reconnect_attempts",
                default_reconnect_attempts() as i64,
            )?
            .set_default(
                "feed.reconnect_delay_ms",
                default_reconnect_delay_ms() as i64,
            )?
            .set_default("snapshot.api_base_url", default_api_base_url())?
            .set_default(
                "snapshot.recent_events_limit",
                default_recent_events_limit() as i64,
            )?
            .set_default("integrations.names", default_integration_names())?
            .set_default("credentials.backend", "memory")?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with CIA_ prefix, e.g. CIA_SERVER__PORT
            .add_source(Environment::with_prefix("CIA").separator("__"))
            .build()?;

        let config: DashboardConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.events.bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Server request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.feed.capacity == 0 || self.feed.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Feed capacity and queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.feed.capacity > MAX_FEED_CAPACITY {
            return Err(ConfigError::Message(format!(
                "Feed capacity must be at most {}",
                MAX_FEED_CAPACITY
            )));
        }

        if self.snapshot.recent_events_limit == 0 {
            return Err(ConfigError::Message(
                "Snapshot recent_events_limit must be greater than 0".to_string(),
            ));
        }

        if self.mobile.array_limit == 0 || self.mobile.default_page_size == 0 {
            return Err(ConfigError::Message(
                "Mobile array_limit and default_page_size must be greater than 0".to_string(),
            ));
        }

        if self.mobile.mobile_ping_seconds == 0 || self.mobile.desktop_ping_seconds == 0 {
            return Err(ConfigError::Message(
                "Mobile and desktop ping intervals must be greater than 0".to_string(),
            ));
        }

        self.validate_api_base_url()?;

        if self.integrations.names.is_empty() {
            return Err(ConfigError::Message(
                "At least one integration must be configured".to_string(),
            ));
        }

        Ok(())
    }

    /// The snapshot backend must be a separate service, not this one
    fn validate_api_base_url(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.snapshot.api_base_url).map_err(|e| {
            ConfigError::Message(format!(
                "Invalid snapshot api_base_url '{}': {}",
                self.snapshot.api_base_url, e
            ))
        })?;

        let host = url.host_str().unwrap_or_default().trim_matches(&['[', ']'][..]);
        let loopback = matches!(host, "localhost" | "127.0.0.1" | "::1");
        let wildcard = matches!(self.server.ip.as_str(), "0.0.0.0" | "::");
        let same_host =
            host == self.server.ip || (loopback && (wildcard || self.server.ip == "127.0.0.1"));

        if same_host && url.port_or_known_default() == Some(self.server.port) {
            return Err(ConfigError::Message(format!(
                "Snapshot api_base_url {} points at this server's own bind address {}",
                self.snapshot.api_base_url,
                self.bind_address()
            )));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.ip, self.server.port)
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl SnapshotConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

impl DevModeConfig {
    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(&self.state_file)
    }
}

impl MobileConfig {
    pub fn slow_timeout(&self) -> Duration {
        Duration::from_secs(self.slow_timeout_seconds)
    }

    /// Cache-Control value applied to mobile responses
    pub fn cache_control(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.cache_max_age_seconds, self.stale_while_revalidate_seconds
        )
    }

    pub fn ping_interval(&self, is_mobile: bool) -> Duration {
        if is_mobile {
            Duration::from_secs(self.mobile_ping_seconds)
        } else {
            Duration::from_secs(self.desktop_ping_seconds)
        }
    }
}

impl ShutdownConfig {
    pub fn force_timeout(&self) -> Duration {
        Duration::from_secs(self.force_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_server_port(),
            request_timeout_seconds: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: default_feed_capacity(),
            queue_capacity: default_feed_queue_capacity(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            recent_events_limit: default_recent_events_limit(),
            fetch_timeout_seconds: default_fetch_timeout(),
        }
    }
}

impl Default for DevModeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            state_file: default_dev_mode_state_file(),
        }
    }
}

impl Default for MobileConfig {
    fn default() -> Self {
        Self {
            array_limit: default_array_limit(),
            default_page_size: default_page_size(),
            slow_timeout_seconds: default_slow_timeout(),
            cache_max_age_seconds: default_cache_max_age(),
            stale_while_revalidate_seconds: default_stale_while_revalidate(),
            mobile_ping_seconds: default_mobile_ping(),
            desktop_ping_seconds: default_desktop_ping(),
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            names: default_integration_names(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            backend: default_credential_backend(),
            path: default_credential_path(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            force_timeout_seconds: default_force_timeout(),
            ignored_fault_codes: default_ignored_fault_codes(),
        }
    }
}

// Default value functions
fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_event_bus_capacity() -> usize {
    100
}

fn default_feed_capacity() -> usize {
    10
}
fn default_feed_queue_capacity() -> usize {
    64
}
fn default_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_api_base_url() -> String {
    "http://localhost:5000".to_string()
}
fn default_recent_events_limit() -> usize {
    10
}
fn default_fetch_timeout() -> u64 {
    10
}

fn default_dev_mode_state_file() -> String {
    ".cia-dashboard/dev_mode.json".to_string()
}

fn default_array_limit() -> usize {
    10
}
fn default_page_size() -> usize {
    20
}
fn default_slow_timeout() -> u64 {
    60
}
fn default_cache_max_age() -> u64 {
    300
}
fn default_stale_while_revalidate() -> u64 {
    600
}
fn default_mobile_ping() -> u64 {
    30
}
fn default_desktop_ping() -> u64 {
    10
}

fn default_integration_names() -> Vec<String> {
    ["accelo", "fireflies", "google_analytics", "slack"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn default_credential_backend() -> CredentialBackend {
    CredentialBackend::Memory
}
fn default_credential_path() -> String {
    "credentials.json".to_string()
}

fn default_force_timeout() -> u64 {
    30
}
fn default_ignored_fault_codes() -> Vec<String> {
    vec!["slack_webapi_platform_error".to_string()]
}
