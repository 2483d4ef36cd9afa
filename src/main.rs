use quay::Config;
use quay::server::{Server, listener};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    listener::ignore_sigpipe();

    let server = Server::bind(&cfg)?;
    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        shutdown.shutdown();
    })?;

    server.run()?;
    Ok(())
}
