//! Serve command - run the HTTP service

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally_core::api::build_router;

use super::{context_from, load_config, seed};

const DEFAULT_LOG_FILTER: &str = "tally_core=info,tally_cli=info";

pub fn run(listen: Option<String>, seed_first: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let mut config = load_config()?;
    if let Some(addr) = listen {
        config.listen_addr = addr;
    }
    let ctx = context_from(config)?;

    if seed_first {
        seed::seed_accounts(&ctx)?;
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&ctx.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", ctx.config.listen_addr))?;
        info!("tally listening on {}", listener.local_addr()?);

        axum::serve(listener, build_router(ctx.service_state()))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")
    })?;

    info!("tally stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
