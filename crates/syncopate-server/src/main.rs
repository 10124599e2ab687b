use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use syncopate_engine::{Database, DatabaseConfig};
use syncopate_server::config::{ServerArgs, Settings};
use syncopate_server::routes;
use syncopate_server::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = ServerArgs::parse();
    if let Err(e) = run(args).await {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
}

async fn run(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_args(&args);
    let db = Database::open(DatabaseConfig {
        wal_path: args.wal.clone(),
        compress_wal: args.compress_wal,
    })?;

    let addr = format!("{}:{}", args.host, args.port);
    info!(
        %addr,
        environment = %settings.environment,
        wal = args.wal.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "disabled".into()),
        debug = settings.debug,
        "SyncopateDB listening"
    );

    let state = AppState::new(db, settings);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, routes::router(state)).await?;
    Ok(())
}
