use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the teebox binary.
#[derive(Debug, Parser)]
#[command(name = "teebox", version, about = "Indoor golf venue site backend")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TEEBOX_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public HTTP API.
    Serve(Box<ServeArgs>),
    /// Downscale and recompress large images in object storage.
    #[command(name = "optimize-images")]
    OptimizeImages(OptimizeImagesArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
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
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override how long an air-quality reading stays fresh.
    #[arg(long = "air-quality-ttl-seconds", value_name = "SECONDS")]
    pub air_quality_ttl_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StorageOverrides {
    /// Use the filesystem store rooted at this directory.
    #[arg(long = "storage-directory", value_name = "PATH", conflicts_with = "storage_url")]
    pub storage_directory: Option<PathBuf>,

    /// Use the storage REST API at this base URL.
    #[arg(long = "storage-url", value_name = "URL")]
    pub storage_url: Option<String>,

    /// Override the storage bucket name.
    #[arg(long = "storage-bucket", value_name = "NAME")]
    pub storage_bucket: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct OptimizeImagesArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub storage: StorageOverrides,

    /// Write optimized images back to storage; without it the run only reports.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub apply: bool,

    /// Only consider objects under this path prefix.
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Override the size threshold above which images are optimized.
    #[arg(long = "min-bytes", value_name = "BYTES")]
    pub min_bytes: Option<u64>,
}
