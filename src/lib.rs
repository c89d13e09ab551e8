use std::net::SocketAddr;
use thiserror::Error;

/// Error types for the http-logger library
#[derive(Error, Debug)]
pub enum LoggerError {
    /// The listener could not be bound (port in use, permission denied)
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Socket-level errors outside of request handling
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the http-logger library
pub type Result<T> = std::result::Result<T, LoggerError>;

pub mod config;
pub mod handler;
pub mod http;
pub mod logging;
pub mod mirror;

// Re-export main types for convenience
pub use config::{RuntimeConfig, Startup};
pub use handler::RequestHandler;
pub use crate::http::{HttpLoggerServer, RequestBody, RequestParts, Response};
pub use logging::{CapturedLog, LogLine, RequestLog, TracingLog};
pub use mirror::EchoResponse;
