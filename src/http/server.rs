use super::connection::serve_connection;
use crate::handler::RequestHandler;
use crate::{LoggerError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, Instrument};

/// HTTP server that hands every request on every connection to one
/// [`RequestHandler`]
///
/// # Examples
///
/// ```no_run
/// use http_logger::{HttpLoggerServer, RequestHandler, RuntimeConfig, TracingLog};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = RuntimeConfig { port: 8080, mirror: true };
///     let handler = RequestHandler::new(config, Arc::new(TracingLog));
///
///     let server = HttpLoggerServer::bind(config.bind_addr(), handler).await?;
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct HttpLoggerServer {
    listener: TcpListener,
    handler: Arc<RequestHandler>,
    shutdown_signal: Arc<broadcast::Sender<()>>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl HttpLoggerServer {
    /// Binds the listener; failure here is fatal for the process
    pub async fn bind(addr: SocketAddr, handler: RequestHandler) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| LoggerError::Bind { addr, source })?;
        let (shutdown_signal, shutdown_rx) = broadcast::channel(1);

        Ok(Self {
            listener,
            handler: Arc::new(handler),
            shutdown_signal: Arc::new(shutdown_signal),
            shutdown_rx,
        })
    }

    /// Address the listener is bound to, with the actual port when 0 was requested
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns a sender that stops [`run`](Self::run) when signalled
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }

    /// Accepts connections until Ctrl-C or the shutdown signal
    ///
    /// Every connection is served on its own task, so a slow client never
    /// holds up another.
    pub async fn run(self) -> Result<()> {
        let Self {
            listener,
            handler,
            shutdown_signal: _shutdown_signal,
            mut shutdown_rx,
        } = self;

        info!(address = %listener.local_addr()?, "HTTP logger listening");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            debug!(%addr, "Accepted connection");
                            let handler = handler.clone();
                            let span = tracing::info_span!("connection", %addr);

                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, &handler).instrument(span).await {
                                    debug!(%addr, error = %e, "Connection ended with an error");
                                }
                                debug!(%addr, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                Ok(()) = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("HTTP logger stopped");
        Ok(())
    }
}
