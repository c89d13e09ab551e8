use http::header::{CONNECTION, CONTENT_LENGTH, EXPECT, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::io;

/// Largest request head (request line plus headers) accepted, in bytes
pub const MAX_HEAD_BYTES: usize = 1 << 20;
/// Largest number of header fields accepted in one request
pub const MAX_HEADERS: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Request head too large")]
    HeadTooLarge,
    #[error("Incomplete request")]
    IncompleteRequest,
}

/// Everything about a request except its body
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    /// Request target exactly as sent on the request line
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestParts {
    /// Builds parts for an HTTP/1.1 request without headers
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }

    /// Path component of the request target, still percent-encoded
    ///
    /// For absolute-form targets (`http://host/path`) this is the part after
    /// the authority, empty when there is none.
    pub fn raw_path(&self) -> &str {
        let before_query = match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        };
        match before_query.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() && !scheme.contains('/') => {
                rest.find('/').map_or("", |slash| &rest[slash..])
            }
            _ => before_query,
        }
    }

    /// Percent-decoded path; invalid escapes are kept as written and
    /// invalid UTF-8 is replaced with U+FFFD
    pub fn path(&self) -> Cow<'_, str> {
        percent_decode_str(self.raw_path()).decode_utf8_lossy()
    }

    /// Raw query string, if the request target has one
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }
}

/// How the request body is delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
}

/// A parsed request head plus the connection-level facts derived from it
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub parts: RequestParts,
    pub framing: BodyFraming,
    pub keep_alive: bool,
    pub expect_continue: bool,
}

/// Tries to parse a request head from the start of `buf`
///
/// Returns `Ok(None)` when more bytes are needed, or the head and the number
/// of bytes it occupied.
pub(crate) fn parse_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, RequestError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            if buf.len() > MAX_HEAD_BYTES {
                return Err(RequestError::HeadTooLarge);
            }
            return Ok(None);
        }
        Err(httparse::Error::TooManyHeaders) => return Err(RequestError::HeadTooLarge),
        Err(e) => {
            return Err(RequestError::HttpParse(format!("Failed to parse headers: {e}")));
        }
    };
    if head_len > MAX_HEAD_BYTES {
        return Err(RequestError::HeadTooLarge);
    }

    let method = req
        .method
        .ok_or_else(|| RequestError::HttpParse("missing method".to_string()))?;
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|e| RequestError::InvalidRequest(format!("bad method {method:?}: {e}")))?;

    let target = req
        .path
        .ok_or_else(|| RequestError::HttpParse("missing request target".to_string()))?;
    if target.is_empty() {
        return Err(RequestError::InvalidRequest("empty request target".to_string()));
    }

    let version = match req.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        other => {
            return Err(RequestError::InvalidRequest(format!(
                "unsupported HTTP version {other:?}"
            )));
        }
    };

    let mut header_map = HeaderMap::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| {
            RequestError::InvalidRequest(format!("bad header name {:?}: {e}", header.name))
        })?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| RequestError::InvalidRequest(format!("bad value for {name}: {e}")))?;
        header_map.append(name, value);
    }

    let framing = body_framing(&header_map)?;
    if framing == BodyFraming::Chunked {
        // Chunked framing overrides any Content-Length sent alongside it.
        header_map.remove(CONTENT_LENGTH);
    }
    let keep_alive = keep_alive(version, &header_map);
    let expect_continue = version == Version::HTTP_11
        && header_map
            .get(EXPECT)
            .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"100-continue"));

    let head = RequestHead {
        parts: RequestParts {
            method,
            target: target.to_string(),
            version,
            headers: header_map,
        },
        framing,
        keep_alive,
        expect_continue,
    };
    Ok(Some((head, head_len)))
}

/// Splits every value of `name` on commas into trimmed, non-empty tokens
fn header_tokens<'a>(
    headers: &'a HeaderMap,
    name: &HeaderName,
) -> Result<Vec<&'a str>, RequestError> {
    let mut tokens = Vec::new();
    for value in headers.get_all(name) {
        let value = value
            .to_str()
            .map_err(|_| RequestError::InvalidRequest(format!("non-ASCII {name} header")))?;
        tokens.extend(value.split(',').map(str::trim).filter(|t| !t.is_empty()));
    }
    Ok(tokens)
}

pub(crate) fn body_framing(headers: &HeaderMap) -> Result<BodyFraming, RequestError> {
    if headers.contains_key(TRANSFER_ENCODING) {
        let codings = header_tokens(headers, &TRANSFER_ENCODING)?;
        return match codings.last() {
            Some(last) if last.eq_ignore_ascii_case("chunked") => Ok(BodyFraming::Chunked),
            _ => Err(RequestError::InvalidRequest(format!(
                "unsupported transfer encoding {codings:?}"
            ))),
        };
    }

    let lengths = header_tokens(headers, &CONTENT_LENGTH)?;
    let Some(first) = lengths.first() else {
        return Ok(BodyFraming::Empty);
    };
    if lengths.iter().any(|len| len != first) {
        return Err(RequestError::InvalidRequest(format!(
            "conflicting Content-Length values {lengths:?}"
        )));
    }
    if !first.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RequestError::InvalidRequest(format!("bad Content-Length {first:?}")));
    }
    let len = first
        .parse::<usize>()
        .map_err(|e| RequestError::InvalidRequest(format!("bad Content-Length {first:?}: {e}")))?;

    Ok(if len == 0 {
        BodyFraming::Empty
    } else {
        BodyFraming::Length(len)
    })
}

pub(crate) fn keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let tokens = header_tokens(headers, &CONNECTION).unwrap_or_default();
    let has = |wanted: &str| tokens.iter().any(|t| t.eq_ignore_ascii_case(wanted));

    if version == Version::HTTP_10 {
        has("keep-alive")
    } else {
        !has("close")
    }
}
