//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scorta";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CONTENT_DIR: &str = "content";
const DEFAULT_ITEM_TTL_SECS: u64 = 60 * 60;
const DEFAULT_LIST_TTL_SECS: u64 = 4 * 60 * 60;
const DEFAULT_SEO_TTL_SECS: u64 = 4 * 60 * 60;
const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 2;
const DEFAULT_WARM_TOP_N: usize = 20;
const DEFAULT_WARM_REFRESH_SECS: u64 = 30 * 60;
const DEFAULT_LOCK_TTL_SECS: u64 = 10 * 60;

/// Command-line arguments for the scorta binary.
#[derive(Debug, Parser)]
#[command(name = "scorta", version, about = "Content delivery cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SCORTA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Run one warming cycle and exit; for external schedulers.
    Warm(WarmArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct WarmArgs {
    #[command(flatten)]
    pub overrides: StackOverrides,
}

/// Overrides shared by every subcommand: the store, the origin, and logging.
#[derive(Debug, Args, Default, Clone)]
pub struct StackOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle the cache store; disabled means origin-only reads.
    #[arg(
        long = "store-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub store_enabled: Option<bool>,

    /// Override the cache store connection URL.
    #[arg(long = "store-url", value_name = "URL")]
    pub store_url: Option<String>,

    /// Override the origin backend (postgres|content-dir).
    #[arg(long = "origin-backend", value_name = "BACKEND")]
    pub origin_backend: Option<OriginBackend>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the content directory root.
    #[arg(long = "content-dir", value_name = "PATH")]
    pub content_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub stack: StackOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub graceful_shutdown_seconds: Option<u64>,

    /// Override the in-process warming interval; 0 disables it.
    #[arg(long = "warming-interval-seconds", value_name = "SECONDS")]
    pub warming_interval_seconds: Option<u64>,

    /// Override the bearer token guarding the warming trigger endpoint.
    #[arg(long = "warming-token", env = "SCORTA_WARMING_TOKEN", value_name = "TOKEN")]
    pub warming_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OriginBackend {
    Postgres,
    ContentDir,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub origin: OriginSettings,
    pub cache: CacheSettings,
    pub warming: WarmingSettings,
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
pub struct StoreSettings {
    pub enabled: bool,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct OriginSettings {
    pub backend: OriginBackend,
    pub database_url: Option<String>,
    pub max_connections: NonZeroU32,
    pub content_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub item_ttl: Duration,
    pub list_ttl: Duration,
    pub seo_ttl: Duration,
    pub origin_timeout: Duration,
    pub store_timeout: Duration,
    pub warm_top_n: usize,
    pub warm_refresh: Duration,
    pub lock_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct WarmingSettings {
    /// In-process scheduled warming cadence; `None` means endpoint/CLI only.
    pub interval: Option<Duration>,
    /// Bearer token for the trigger endpoint; `None` disables it.
    pub token: Option<String>,
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SCORTA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Warm(args)) => raw.apply_stack_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    store: RawStoreSettings,
    origin: RawOriginSettings,
    cache: RawCacheSettings,
    warming: RawWarmingSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_stack_overrides(&overrides.stack);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.warming_interval_seconds {
            self.warming.interval_seconds = Some(seconds);
        }
        if let Some(token) = overrides.warming_token.as_ref() {
            self.warming.token = Some(token.clone());
        }
    }

    fn apply_stack_overrides(&mut self, overrides: &StackOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.store_enabled {
            self.store.enabled = Some(enabled);
        }
        if let Some(url) = overrides.store_url.as_ref() {
            self.store.url = Some(url.clone());
        }
        if let Some(backend) = overrides.origin_backend {
            self.origin.backend = Some(backend);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.origin.database_url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.origin.max_connections = Some(max);
        }
        if let Some(dir) = overrides.content_dir.as_ref() {
            self.origin.content_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            store,
            origin,
            cache,
            warming,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            store: build_store_settings(store)?,
            origin: build_origin_settings(origin)?,
            cache: build_cache_settings(cache)?,
            warming: build_warming_settings(warming),
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

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let enabled = store.enabled.unwrap_or(true);
    let url = store
        .url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_STORE_URL.to_string());

    Ok(StoreSettings { enabled, url })
}

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let backend = origin.backend.unwrap_or(OriginBackend::ContentDir);

    let database_url = origin.database_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    if backend == OriginBackend::Postgres && database_url.is_none() {
        return Err(LoadError::invalid(
            "origin.database_url",
            "required when origin.backend is `postgres`",
        ));
    }

    let max_connections = non_zero_u32(
        origin
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "origin.max_connections",
    )?;

    let content_dir = origin
        .content_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_DIR));
    if content_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "origin.content_dir",
            "path must not be empty",
        ));
    }

    Ok(OriginSettings {
        backend,
        database_url,
        max_connections,
        content_dir,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let secs = |value: Option<u64>, default: u64, key: &'static str| {
        let value = value.unwrap_or(default);
        if value == 0 {
            Err(LoadError::invalid(key, "must be greater than zero"))
        } else {
            Ok(Duration::from_secs(value))
        }
    };

    let warm_top_n = cache.warm_top_n.unwrap_or(DEFAULT_WARM_TOP_N);
    if warm_top_n == 0 {
        return Err(LoadError::invalid(
            "cache.warm_top_n",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        item_ttl: secs(cache.item_ttl_seconds, DEFAULT_ITEM_TTL_SECS, "cache.item_ttl_seconds")?,
        list_ttl: secs(cache.list_ttl_seconds, DEFAULT_LIST_TTL_SECS, "cache.list_ttl_seconds")?,
        seo_ttl: secs(cache.seo_ttl_seconds, DEFAULT_SEO_TTL_SECS, "cache.seo_ttl_seconds")?,
        origin_timeout: secs(
            cache.origin_timeout_seconds,
            DEFAULT_ORIGIN_TIMEOUT_SECS,
            "cache.origin_timeout_seconds",
        )?,
        store_timeout: secs(
            cache.store_timeout_seconds,
            DEFAULT_STORE_TIMEOUT_SECS,
            "cache.store_timeout_seconds",
        )?,
        warm_top_n,
        warm_refresh: secs(
            cache.warm_refresh_seconds,
            DEFAULT_WARM_REFRESH_SECS,
            "cache.warm_refresh_seconds",
        )?,
        lock_ttl: secs(cache.lock_ttl_seconds, DEFAULT_LOCK_TTL_SECS, "cache.lock_ttl_seconds")?,
    })
}

fn build_warming_settings(warming: RawWarmingSettings) -> WarmingSettings {
    let interval = warming
        .interval_seconds
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs);
    let token = warming
        .token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    WarmingSettings { interval, token }
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
struct RawStoreSettings {
    enabled: Option<bool>,
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    backend: Option<OriginBackend>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    content_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    item_ttl_seconds: Option<u64>,
    list_ttl_seconds: Option<u64>,
    seo_ttl_seconds: Option<u64>,
    origin_timeout_seconds: Option<u64>,
    store_timeout_seconds: Option<u64>,
    warm_top_n: Option<usize>,
    warm_refresh_seconds: Option<u64>,
    lock_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWarmingSettings {
    interval_seconds: Option<u64>,
    token: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
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
