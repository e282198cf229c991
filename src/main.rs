use anyhow::{Context, Result};
use clap::Parser;
use recite_coach::{create_router, AppState, Aligner, Config, SessionContext};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "recite-coach", version, about = "Live recitation feedback server")]
struct Args {
    /// Configuration file, with or without extension
    #[arg(short, long, default_value = "config/recite-coach")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.service.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Speech recognition: {} (model {})", cfg.asr.provider, cfg.asr.model);
    info!("Alignment policy: {:?}", cfg.alignment);

    let asr = cfg.asr.build_client()?;
    let context = SessionContext::new(asr, Arc::new(Aligner::new(cfg.alignment.clone())))
        .with_stream_options(cfg.asr.stream_options())
        .with_config(cfg.session.clone());

    let app = create_router(AppState::new(context));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
