use anyhow::Context;
use clap::Parser;
use hubd::config::Config;
use hubd::server::Server;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(hub = ?config.hub, listen = %config.listen_addr(), "starting hubd");

    let hub = hubd::build_hub(config.hub).context("failed to register hub methods")?;
    let addr = config.listen_addr();
    let server = Server::bind(addr, hub, config.settings())
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("ctrl-c received, shutting down");
        trigger.cancel();
    });

    server.run(shutdown).await?;
    Ok(())
}
