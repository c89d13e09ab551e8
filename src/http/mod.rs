//! Minimal HTTP/1.x server
//!
//! Parses request heads with `httparse`, frames bodies by `Content-Length`
//! or chunked transfer coding, keeps connections alive per HTTP/1.0 and
//! HTTP/1.1 rules and passes every request to the [`RequestHandler`].
//!
//! [`RequestHandler`]: crate::RequestHandler

pub mod body;
mod connection;
pub mod request;
pub mod response;
pub mod server;

#[cfg(test)]
mod tests;

pub use body::{BodyError, RequestBody};
pub use request::{RequestError, RequestParts};
pub use response::Response;
pub use server::HttpLoggerServer;
