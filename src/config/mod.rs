//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
#[cfg(test)]
mod tests;

pub use cli::{
    CliArgs, Command, LoggingOverrides, OptimizeImagesArgs, ServeArgs, ServeOverrides,
    StorageOverrides,
};

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "teebox";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_AQI_BASE_URL: &str = "https://airquality.googleapis.com/";
const DEFAULT_AQI_LANGUAGE: &str = "en";
/// Venue location the reading is taken for.
pub const DEFAULT_AQI_LATITUDE: f64 = 40.7128;
pub const DEFAULT_AQI_LONGITUDE: f64 = -74.0060;
const DEFAULT_AQI_TTL_SECS: u64 = 45 * 60;
const DEFAULT_AQI_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_AQI_RETRY_ATTEMPTS: u32 = 2;
const DEFAULT_AQI_RETRY_BACKOFF_MS: u64 = 250;
const DEFAULT_AQI_LOCAL_INDEX: &str = "usa_epa";
const DEFAULT_STORAGE_DIR: &str = "uploads";
const DEFAULT_STORAGE_BUCKET: &str = "site-images";
const DEFAULT_OPTIMIZE_MIN_BYTES: u64 = 200 * 1024;
const DEFAULT_OPTIMIZE_MAX_DIMENSION: u32 = 1920;
const DEFAULT_OPTIMIZE_JPEG_QUALITY: u8 = 82;
const DEFAULT_OPTIMIZE_MIN_SAVINGS_PERCENT: u8 = 10;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub air_quality: AirQualitySettings,
    pub storage: StorageSettings,
    pub optimize: ImageOptimizationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
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
}

#[derive(Debug, Clone)]
pub struct AirQualitySettings {
    /// Without a key every upstream call fails and the endpoint answers 502.
    pub api_key: Option<String>,
    pub base_url: Url,
    pub latitude: f64,
    pub longitude: f64,
    pub language_code: String,
    pub ttl: Duration,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub local_index_code: String,
}

#[derive(Debug, Clone)]
pub enum StorageSettings {
    Filesystem {
        directory: PathBuf,
    },
    /// Supabase-style storage REST API.
    Http {
        base_url: Url,
        bucket: String,
        service_key: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ImageOptimizationSettings {
    pub min_bytes: u64,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub min_savings_percent: u8,
    pub protected_prefixes: Vec<String>,
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

    builder = builder.add_source(
        Environment::with_prefix("TEEBOX")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("optimize.protected_prefixes")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_command_overrides(cli.command.as_ref());

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
    database: RawDatabaseSettings,
    air_quality: RawAirQualitySettings,
    storage: RawStorageSettings,
    optimize: RawOptimizeSettings,
}

impl RawSettings {
    fn apply_command_overrides(&mut self, command: Option<&Command>) {
        match command {
            Some(Command::Serve(args)) => self.apply_serve_overrides(&args.overrides),
            Some(Command::OptimizeImages(args)) => self.apply_optimize_overrides(args),
            None => self.apply_serve_overrides(&ServeOverrides::default()),
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_logging_overrides(&overrides.logging);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(ttl) = overrides.air_quality_ttl_seconds {
            self.air_quality.ttl_seconds = Some(ttl);
        }
    }

    fn apply_optimize_overrides(&mut self, args: &OptimizeImagesArgs) {
        self.apply_logging_overrides(&args.logging);
        self.apply_storage_overrides(&args.storage);
        if let Some(min_bytes) = args.min_bytes {
            self.optimize.min_bytes = Some(min_bytes);
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_storage_overrides(&mut self, overrides: &StorageOverrides) {
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.backend = Some("fs".to_string());
            self.storage.directory = Some(directory.clone());
        }
        if let Some(url) = overrides.storage_url.as_ref() {
            self.storage.backend = Some("http".to_string());
            self.storage.url = Some(url.clone());
        }
        if let Some(bucket) = overrides.storage_bucket.as_ref() {
            self.storage.bucket = Some(bucket.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            air_quality,
            storage,
            optimize,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            air_quality: build_air_quality_settings(air_quality)?,
            storage: build_storage_settings(storage)?,
            optimize: build_optimize_settings(optimize)?,
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

    let public_addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;

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
        public_addr,
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

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_air_quality_settings(
    air_quality: RawAirQualitySettings,
) -> Result<AirQualitySettings, LoadError> {
    let base_url = parse_base_url(
        air_quality.base_url.as_deref().unwrap_or(DEFAULT_AQI_BASE_URL),
        "air_quality.base_url",
    )?;

    let latitude = air_quality.latitude.unwrap_or(DEFAULT_AQI_LATITUDE);
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(LoadError::invalid(
            "air_quality.latitude",
            "must be between -90 and 90",
        ));
    }
    let longitude = air_quality.longitude.unwrap_or(DEFAULT_AQI_LONGITUDE);
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(LoadError::invalid(
            "air_quality.longitude",
            "must be between -180 and 180",
        ));
    }

    let ttl_seconds = air_quality.ttl_seconds.unwrap_or(DEFAULT_AQI_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "air_quality.ttl_seconds",
            "must be greater than zero",
        ));
    }

    let timeout_ms = air_quality.timeout_ms.unwrap_or(DEFAULT_AQI_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "air_quality.timeout_ms",
            "must be greater than zero",
        ));
    }

    let local_index_code = non_blank(air_quality.local_index_code)
        .unwrap_or_else(|| DEFAULT_AQI_LOCAL_INDEX.to_string());
    let language_code = non_blank(air_quality.language_code)
        .unwrap_or_else(|| DEFAULT_AQI_LANGUAGE.to_string());

    Ok(AirQualitySettings {
        api_key: non_blank(air_quality.api_key),
        base_url,
        latitude,
        longitude,
        language_code,
        ttl: Duration::from_secs(ttl_seconds),
        timeout: Duration::from_millis(timeout_ms),
        retry_attempts: air_quality
            .retry_attempts
            .unwrap_or(DEFAULT_AQI_RETRY_ATTEMPTS),
        retry_backoff: Duration::from_millis(
            air_quality
                .retry_backoff_ms
                .unwrap_or(DEFAULT_AQI_RETRY_BACKOFF_MS),
        ),
        local_index_code,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let backend = non_blank(storage.backend).unwrap_or_else(|| "fs".to_string());

    match backend.to_ascii_lowercase().as_str() {
        "fs" | "filesystem" => {
            let directory = storage
                .directory
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
            if directory.as_os_str().is_empty() {
                return Err(LoadError::invalid(
                    "storage.directory",
                    "path must not be empty",
                ));
            }
            Ok(StorageSettings::Filesystem { directory })
        }
        "http" | "supabase" => {
            let url = non_blank(storage.url)
                .ok_or_else(|| LoadError::invalid("storage.url", "required for http storage"))?;
            let base_url = parse_base_url(&url, "storage.url")?;
            let bucket = non_blank(storage.bucket)
                .unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string());
            if bucket.contains('/') {
                return Err(LoadError::invalid(
                    "storage.bucket",
                    "bucket name must not contain `/`",
                ));
            }
            Ok(StorageSettings::Http {
                base_url,
                bucket,
                service_key: non_blank(storage.service_key),
            })
        }
        other => Err(LoadError::invalid(
            "storage.backend",
            format!("unknown backend `{other}` (expected `fs` or `http`)"),
        )),
    }
}

fn build_optimize_settings(
    optimize: RawOptimizeSettings,
) -> Result<ImageOptimizationSettings, LoadError> {
    let max_dimension = non_zero_u32(
        optimize
            .max_dimension
            .unwrap_or(DEFAULT_OPTIMIZE_MAX_DIMENSION)
            .into(),
        "optimize.max_dimension",
    )?;

    let jpeg_quality = optimize
        .jpeg_quality
        .unwrap_or(DEFAULT_OPTIMIZE_JPEG_QUALITY);
    if !(1..=100).contains(&jpeg_quality) {
        return Err(LoadError::invalid(
            "optimize.jpeg_quality",
            "must be between 1 and 100",
        ));
    }

    let min_savings_percent = optimize
        .min_savings_percent
        .unwrap_or(DEFAULT_OPTIMIZE_MIN_SAVINGS_PERCENT);
    if min_savings_percent >= 100 {
        return Err(LoadError::invalid(
            "optimize.min_savings_percent",
            "must be below 100",
        ));
    }

    let protected_prefixes = optimize
        .protected_prefixes
        .into_iter()
        .map(|prefix| prefix.trim().to_string())
        .filter(|prefix| !prefix.is_empty())
        .collect();

    Ok(ImageOptimizationSettings {
        min_bytes: optimize.min_bytes.unwrap_or(DEFAULT_OPTIMIZE_MIN_BYTES),
        max_dimension: max_dimension.get(),
        jpeg_quality,
        min_savings_percent,
        protected_prefixes,
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
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAirQualitySettings {
    api_key: Option<String>,
    base_url: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    language_code: Option<String>,
    ttl_seconds: Option<u64>,
    timeout_ms: Option<u64>,
    retry_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
    local_index_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<String>,
    directory: Option<PathBuf>,
    url: Option<String>,
    bucket: Option<String>,
    service_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOptimizeSettings {
    min_bytes: Option<u64>,
    max_dimension: Option<u32>,
    jpeg_quality: Option<u8>,
    min_savings_percent: Option<u8>,
    protected_prefixes: Vec<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Parse a base URL, forcing a trailing slash so relative joins keep its path.
fn parse_base_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let trimmed = value.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized)
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{trimmed}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "URL must use http or https"));
    }
    Ok(url)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
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
