//! The catch-all request handler
//!
//! Logs what arrived and answers either `ok` or, in mirror mode, a JSON
//! echo of the request.

use crate::config::RuntimeConfig;
use crate::http::{RequestBody, RequestParts, Response};
use crate::logging::{LogLine, RequestLog};
use crate::mirror::{EchoResponse, headers_blob, params_blob};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};

/// Handles every request the server receives
///
/// Holds only the immutable configuration and the request log, so one
/// instance is shared by all connections.
pub struct RequestHandler {
    config: RuntimeConfig,
    log: Arc<dyn RequestLog>,
}

impl RequestHandler {
    pub fn new(config: RuntimeConfig, log: Arc<dyn RequestLog>) -> Self {
        Self { config, log }
    }

    /// Logs the request and builds its response
    ///
    /// The body is read in full before anything but the request line is
    /// logged. If it cannot be read the request ends with a 400 and nothing
    /// else is logged.
    pub async fn handle<B: RequestBody>(&self, parts: &RequestParts, body: &mut B) -> Response {
        let method = parts.method.as_str();
        let path = parts.path();
        self.log.log(LogLine::Request { method, path: &path });

        let body = match body.read_to_end().await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!(error = %e, "Failed to read request body");
                return Response::plain_text(StatusCode::BAD_REQUEST, "Error reading body");
            }
        };

        // JSON content type even for the plain "ok" answer.
        let response = Response::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let headers = headers_blob(&parts.headers);
        let params = params_blob(parts.query());

        self.log.log(LogLine::Headers(&headers));
        self.log.log(LogLine::QueryParams(&params));
        self.log.log(LogLine::Body(&body));

        if !self.config.mirror {
            return response.with_body("ok");
        }
        if parts.method == Method::HEAD {
            return response;
        }

        let echo = EchoResponse {
            method: method.to_string(),
            path: path.to_string(),
            body,
            headers,
            params,
        };
        match echo.to_json_line() {
            Ok(json) => response.with_body(json),
            Err(e) => {
                error!(error = %e, "Failed to encode mirror response");
                response
            }
        }
    }
}
