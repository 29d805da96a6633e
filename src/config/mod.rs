//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::notify::DeliveryPolicy;
use crate::cache::{CacheBackend, CacheConfig};

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, MigrateArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "dishdash";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_NOTIFY_MAX_ATTEMPTS: u64 = 3;
const DEFAULT_NOTIFY_RETRY_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub detail_ttl: Duration,
    pub list_ttl: Duration,
    pub stats_ttl: Duration,
    pub memory_capacity: NonZeroUsize,
    pub scan_batch: NonZeroUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationBackend {
    /// Log notices instead of sending them.
    Log,
    /// POST notices to an HTTP relay.
    Webhook,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub backend: NotificationBackend,
    pub webhook_url: Option<Url>,
    pub webhook_token: Option<String>,
    pub timeout: Duration,
    pub max_attempts: NonZeroU32,
    pub retry_backoff: Duration,
}

impl NotificationSettings {
    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            timeout: self.timeout,
            max_attempts: self.max_attempts,
            backoff: self.retry_backoff,
        }
    }
}

impl CacheSettings {
    pub fn to_config(&self) -> CacheConfig {
        CacheConfig::from(self)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("DISHDASH").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    notifications: RawNotificationSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(backend) = overrides.notifications_backend.as_ref() {
            self.notifications.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.notifications_webhook_url.as_ref() {
            self.notifications.webhook_url = Some(url.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            notifications,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            notifications: build_notification_settings(notifications)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;
    let acquire_secs = database
        .acquire_timeout_seconds
        .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS);
    if acquire_secs == 0 {
        return Err(LoadError::invalid(
            "database.acquire_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout: Duration::from_secs(acquire_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("") => defaults.backend,
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "memory" => CacheBackend::Memory,
            "redis" => CacheBackend::Redis,
            other => {
                return Err(LoadError::invalid(
                    "cache.backend",
                    format!("unknown backend `{other}` (expected memory|redis)"),
                ));
            }
        },
    };

    let enabled = cache.enabled.unwrap_or(defaults.enabled);
    let redis_url = non_blank(cache.redis_url);
    if enabled && backend == CacheBackend::Redis && redis_url.is_none() {
        return Err(LoadError::invalid(
            "cache.redis_url",
            "required when cache.backend is redis",
        ));
    }

    let key_prefix = non_blank(cache.key_prefix).unwrap_or(defaults.key_prefix);
    if !key_prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(LoadError::invalid(
            "cache.key_prefix",
            "may only contain ASCII letters, digits, `_`, `-` and `.`",
        ));
    }

    Ok(CacheSettings {
        enabled,
        backend,
        redis_url,
        key_prefix,
        detail_ttl: ttl(cache.detail_ttl_secs, defaults.detail_ttl_secs, "cache.detail_ttl_secs")?,
        list_ttl: ttl(cache.list_ttl_secs, defaults.list_ttl_secs, "cache.list_ttl_secs")?,
        stats_ttl: ttl(cache.stats_ttl_secs, defaults.stats_ttl_secs, "cache.stats_ttl_secs")?,
        memory_capacity: non_zero_usize(
            cache.memory_capacity.unwrap_or(defaults.memory_capacity as u64),
            "cache.memory_capacity",
        )?,
        scan_batch: non_zero_usize(
            cache.scan_batch.unwrap_or(defaults.scan_batch as u64),
            "cache.scan_batch",
        )?,
    })
}

fn build_notification_settings(
    notifications: RawNotificationSettings,
) -> Result<NotificationSettings, LoadError> {
    let backend = match notifications.backend.as_deref().map(str::trim) {
        None | Some("") => NotificationBackend::Log,
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "log" => NotificationBackend::Log,
            "webhook" => NotificationBackend::Webhook,
            other => {
                return Err(LoadError::invalid(
                    "notifications.backend",
                    format!("unknown backend `{other}` (expected log|webhook)"),
                ));
            }
        },
    };

    let webhook_url = non_blank(notifications.webhook_url)
        .map(|raw| {
            Url::parse(&raw).map_err(|err| {
                LoadError::invalid("notifications.webhook_url", format!("invalid URL: {err}"))
            })
        })
        .transpose()?;
    if backend == NotificationBackend::Webhook && webhook_url.is_none() {
        return Err(LoadError::invalid(
            "notifications.webhook_url",
            "required when notifications.backend is webhook",
        ));
    }

    let timeout_ms = notifications.timeout_ms.unwrap_or(DEFAULT_NOTIFY_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "notifications.timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(NotificationSettings {
        backend,
        webhook_url,
        webhook_token: non_blank(notifications.webhook_token),
        timeout: Duration::from_millis(timeout_ms),
        max_attempts: non_zero_u32(
            notifications
                .max_attempts
                .unwrap_or(DEFAULT_NOTIFY_MAX_ATTEMPTS),
            "notifications.max_attempts",
        )?,
        retry_backoff: Duration::from_millis(
            notifications
                .retry_backoff_ms
                .unwrap_or(DEFAULT_NOTIFY_RETRY_BACKOFF_MS),
        ),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<String>,
    redis_url: Option<String>,
    key_prefix: Option<String>,
    detail_ttl_secs: Option<u64>,
    list_ttl_secs: Option<u64>,
    stats_ttl_secs: Option<u64>,
    memory_capacity: Option<u64>,
    scan_batch: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNotificationSettings {
    backend: Option<String>,
    webhook_url: Option<String>,
    webhook_token: Option<String>,
    timeout_ms: Option<u64>,
    max_attempts: Option<u64>,
    retry_backoff_ms: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn ttl(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
