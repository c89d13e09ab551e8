use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Version};

/// A response produced by the handler or by the HTTP layer itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Sets a header, replacing any previous value
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Plain-text error response; `message` is sent followed by a newline
    pub fn plain_text(status: StatusCode, message: &str) -> Self {
        Self::new(status)
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .with_header(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"))
            .with_body(format!("{message}\n"))
    }

    /// Header value as a string, for tests and logging
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Serializes the response for the wire
    ///
    /// The body is left out when `head_only` is set (responses to HEAD). A
    /// HEAD response only announces a `Content-Length` if there was a body to
    /// describe.
    pub(crate) fn encode(&self, version: Version, head_only: bool, close: bool) -> BytesMut {
        let mut out = BytesMut::with_capacity(256 + self.body.len());
        let proto = if version == Version::HTTP_10 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        };
        out.put_slice(
            format!(
                "{proto} {} {}\r\n",
                self.status.as_str(),
                self.status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );

        for (name, value) in &self.headers {
            if *name == CONTENT_LENGTH || *name == CONNECTION {
                continue;
            }
            put_header(&mut out, name.as_str().as_bytes(), value.as_bytes());
        }
        if !(head_only && self.body.is_empty()) {
            put_header(
                &mut out,
                b"content-length",
                self.body.len().to_string().as_bytes(),
            );
        }
        if close {
            put_header(&mut out, b"connection", b"close");
        } else if version == Version::HTTP_10 {
            put_header(&mut out, b"connection", b"keep-alive");
        }
        out.put_slice(b"\r\n");

        if !head_only {
            out.put_slice(&self.body);
        }
        out
    }
}

fn put_header(out: &mut BytesMut, name: &[u8], value: &[u8]) {
    out.put_slice(name);
    out.put_slice(b": ");
    out.put_slice(value);
    out.put_slice(b"\r\n");
}
