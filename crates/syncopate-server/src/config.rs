use std::path::PathBuf;

use clap::Parser;

/// Command-line and environment configuration for the server binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "syncopatedb",
    version,
    about = "Schema-aware document store over HTTP/JSON"
)]
pub struct ServerArgs {
    /// Address to bind.
    #[arg(long, env = "SYNCOPATE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "SYNCOPATE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Write-ahead log path. Durability is off when absent.
    #[arg(long, env = "SYNCOPATE_WAL", value_name = "PATH")]
    pub wal: Option<PathBuf>,

    /// Gzip-compress WAL record bodies.
    #[arg(long, env = "SYNCOPATE_WAL_COMPRESS")]
    pub compress_wal: bool,

    /// Include store-managed underscore fields in responses.
    #[arg(long, env = "SYNCOPATE_DEBUG")]
    pub debug: bool,
}

/// Resolved runtime settings shared with the handlers.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Deployment label from APP_ENV / ENV.
    pub environment: String,
    /// Debug mode: expose internal underscore fields.
    pub debug: bool,
}

impl Settings {
    pub fn from_args(args: &ServerArgs) -> Self {
        Self {
            environment: deployment_environment(),
            debug: args.debug,
        }
    }
}

/// APP_ENV wins over ENV; neither set means `development`.
pub fn deployment_environment() -> String {
    std::env::var("APP_ENV")
        .or_else(|_| std::env::var("ENV"))
        .unwrap_or_else(|_| "development".to_string())
}
