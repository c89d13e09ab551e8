use color_eyre::eyre::{Result, WrapErr};
use http_logger::config::{self, Startup, USAGE};
use http_logger::{HttpLoggerServer, RequestHandler, TracingLog};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("http_logger=info")),
        )
        .init();

    let config = match config::resolve(std::env::args_os()) {
        Ok(Startup::Run(config)) => config,
        Ok(Startup::Help) => {
            eprint!("{USAGE}");
            std::process::exit(0);
        }
        Err(err) => err.exit(),
    };

    info!(
        address = %config.bind_addr(),
        mirror = config.mirror,
        "HTTP logger starting on http://localhost:{} (mirror mode: {})",
        config.port,
        config.mirror
    );

    let handler = RequestHandler::new(config, Arc::new(TracingLog));
    let server = match HttpLoggerServer::bind(config.bind_addr(), handler).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Server failed");
            return Err(e).wrap_err("Failed to start HTTP logger");
        }
    };

    server.run().await.wrap_err("Failed to run HTTP logger")?;

    Ok(())
}
