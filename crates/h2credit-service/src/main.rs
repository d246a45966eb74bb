use clap::{Parser, ValueEnum};
use h2credit_core::EngineConfig;
use h2credit_service::{build_router, IdSourceKind, ServiceConfig, ServiceState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IdSource {
    Sequential,
    Uuid,
}

#[derive(Debug, Parser)]
#[command(
    name = "h2creditd",
    version,
    about = "Hydrogen production verification and credit issuance service"
)]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8095
    #[arg(long, default_value = "127.0.0.1:8095", env = "H2CREDIT_LISTEN")]
    listen: SocketAddr,
    /// TOML file with verification, issuance and pipeline settings. Defaults apply when unset.
    #[arg(long, env = "H2CREDIT_CONFIG")]
    config: Option<PathBuf>,
    /// Credit and request identifier scheme.
    #[arg(long, value_enum, default_value_t = IdSource::Sequential, env = "H2CREDIT_ID_SOURCE")]
    id_source: IdSource,
    /// Base URL of the verification store. Submissions stay in memory when unset.
    #[arg(long, env = "H2CREDIT_PERSISTENCE_URL")]
    persistence_url: Option<String>,
    /// Base URL of the credit marketplace. Listings stay in memory when unset.
    #[arg(long, env = "H2CREDIT_MARKETPLACE_URL")]
    marketplace_url: Option<String>,
    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("h2credit_service=info,h2credit_core=info,info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let engine = EngineConfig::load(cli.config.as_deref())?;
    let config = ServiceConfig {
        engine,
        id_source: match cli.id_source {
            IdSource::Sequential => IdSourceKind::Sequential,
            IdSource::Uuid => IdSourceKind::Uuid,
        },
        persistence_url: cli.persistence_url,
        marketplace_url: cli.marketplace_url,
    };
    let state = ServiceState::bootstrap(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("h2credit-service REST listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
