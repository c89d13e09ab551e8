//! Request observation log
//!
//! The handler never talks to a global logger directly. It reports each
//! observation as a [`LogLine`] to an injected [`RequestLog`], so servers log
//! through `tracing` while tests capture the lines in memory.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::info;

/// One observation made while handling a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLine<'a> {
    /// Method and path, logged before the body is read
    Request { method: &'a str, path: &'a str },
    /// The full headers blob
    Headers(&'a str),
    /// The full query parameters blob
    QueryParams(&'a str),
    /// The request body as text
    Body(&'a str),
}

impl fmt::Display for LogLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLine::Request { method, path } => write!(f, "{method} request on path: {path}"),
            LogLine::Headers(headers) => write!(f, "Headers:\n{headers}"),
            LogLine::QueryParams(params) => write!(f, "Query Parameters: {params}"),
            LogLine::Body(body) => write!(f, "Body: {body}"),
        }
    }
}

/// Sink for request observations
///
/// Implementations are shared by every connection task and must accept
/// concurrent calls without splitting a line.
pub trait RequestLog: Send + Sync {
    fn log(&self, line: LogLine<'_>);
}

impl<T: RequestLog + ?Sized> RequestLog for Arc<T> {
    fn log(&self, line: LogLine<'_>) {
        (**self).log(line)
    }
}

/// Emits every observation as a `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl RequestLog for TracingLog {
    fn log(&self, line: LogLine<'_>) {
        match line {
            LogLine::Request { method, path } => info!(%method, %path, "{line}"),
            _ => info!("{line}"),
        }
    }
}

/// Keeps rendered observations in memory
///
/// # Examples
///
/// ```
/// use http_logger::{CapturedLog, LogLine, RequestLog};
///
/// let log = CapturedLog::default();
/// log.log(LogLine::Body("hello"));
/// assert_eq!(log.lines(), vec!["Body: hello".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct CapturedLog {
    lines: Mutex<Vec<String>>,
}

impl CapturedLog {
    /// Returns a copy of every line logged so far, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl RequestLog for CapturedLog {
    fn log(&self, line: LogLine<'_>) {
        let rendered = line.to_string();
        match self.lines.lock() {
            Ok(mut lines) => lines.push(rendered),
            Err(poisoned) => poisoned.into_inner().push(rendered),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_rendering() {
        let request = LogLine::Request {
            method: "GET",
            path: "/foo",
        };
        assert_eq!(request.to_string(), "GET request on path: /foo");
        assert_eq!(
            LogLine::Headers("Accept: */*\nX-Test: v1").to_string(),
            "Headers:\nAccept: */*\nX-Test: v1"
        );
        assert_eq!(LogLine::QueryParams("a=1,2").to_string(), "Query Parameters: a=1,2");
        assert_eq!(LogLine::Body("").to_string(), "Body: ");
    }

    #[test]
    fn test_captured_log_through_shared_handle() {
        let log = Arc::new(CapturedLog::default());
        let shared: Arc<dyn RequestLog> = log.clone();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    let body = format!("body {i}");
                    shared.log(LogLine::Body(&body));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut lines = log.lines();
        lines.sort();
        assert_eq!(lines, vec!["Body: body 0", "Body: body 1", "Body: body 2", "Body: body 3"]);
    }
}
