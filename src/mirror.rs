//! Mirror mode: text blobs and the JSON echo document
//!
//! Header lines and query segments are grouped per distinct name with their
//! values comma-joined. Line and segment order follows the request but is
//! not part of the contract; compare parsed content, not raw strings.

use http::HeaderMap;
use http::header::{HOST, TRANSFER_ENCODING};
use serde::{Deserialize, Serialize};

/// The JSON document returned in mirror mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub method: String,
    pub path: String,
    pub body: String,
    pub headers: String,
    pub params: String,
}

impl EchoResponse {
    /// Serializes the document followed by a single newline
    pub fn to_json_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = serde_json::to_vec(self)?;
        out.push(b'\n');
        Ok(out)
    }
}

/// Converts a header name to its canonical form: the first letter and every
/// letter following a hyphen are upper case, the rest lower case.
///
/// ```
/// use http_logger::mirror::canonical_header_key;
///
/// assert_eq!(canonical_header_key("x-forwarded-for"), "X-Forwarded-For");
/// assert_eq!(canonical_header_key("ETAG"), "Etag");
/// ```
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

/// Builds the headers blob: one `Name: v1,v2` line per distinct header name,
/// lines joined with `\n`.
///
/// `Host` and `Transfer-Encoding` are consumed by the HTTP layer and are not
/// listed.
pub fn headers_blob(headers: &HeaderMap) -> String {
    headers
        .keys()
        .filter(|name| **name != HOST && **name != TRANSFER_ENCODING)
        .map(|name| {
            let values: Vec<_> = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()))
                .collect();
            format!("{}: {}", canonical_header_key(name.as_str()), values.join(","))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// True when every `%` in `segment` starts a two-digit hex escape
fn valid_escapes(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3);
            if !hex.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Decodes a query string into `(name, values)` pairs, grouped by name in
/// order of first appearance
///
/// Segments containing `;` or a malformed `%` escape are dropped; the rest
/// of the query is still decoded.
pub fn query_params(query: Option<&str>) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    let Some(query) = query else {
        return grouped;
    };

    let pairs = query
        .split('&')
        .filter(|segment| !segment.is_empty() && !segment.contains(';'))
        .filter(|segment| valid_escapes(segment))
        .flat_map(|segment| url::form_urlencoded::parse(segment.as_bytes()));
    for (name, value) in pairs {
        match grouped.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, values)) => values.push(value.into_owned()),
            None => grouped.push((name.into_owned(), vec![value.into_owned()])),
        }
    }
    grouped
}

/// Builds the params blob: one `name=v1,v2` segment per distinct parameter
/// name, segments joined with `&`. Names and values are form-decoded.
pub fn params_blob(query: Option<&str>) -> String {
    query_params(query)
        .into_iter()
        .map(|(name, values)| format!("{}={}", name, values.join(",")))
        .collect::<Vec<_>>()
        .join("&")
}
