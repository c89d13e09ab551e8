use super::body::{BodyReader, read_more};
use super::request::{RequestError, RequestHead, parse_head};
use super::response::Response;
use crate::handler::RequestHandler;
use bytes::{Buf, BytesMut};
use http::{Method, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const INITIAL_BUFFER: usize = 8192;

/// Serves HTTP/1.x requests on one connection until either side closes it
///
/// Returns an error for requests the handler never saw (malformed or
/// oversized heads, truncated heads). Those get a 400 or 431 response first
/// where one makes sense.
pub(crate) async fn serve_connection<S>(
    mut stream: S,
    handler: &RequestHandler,
) -> Result<(), RequestError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUFFER);

    loop {
        let head = match read_head(&mut stream, &mut buf).await {
            Ok(Some(head)) => head,
            Ok(None) => return Ok(()),
            Err(err) => {
                if let Some(response) = rejection(&err) {
                    let wire = response.encode(Version::HTTP_11, false, true);
                    if stream.write_all(&wire).await.is_ok() {
                        let _ = stream.shutdown().await;
                    }
                }
                return Err(err);
            }
        };

        let RequestHead {
            parts,
            framing,
            keep_alive,
            expect_continue,
        } = head;

        let mut body = BodyReader::new(&mut stream, &mut buf, framing, expect_continue);
        let response = handler.handle(&parts, &mut body).await;
        let close = !keep_alive || !body.is_complete();

        let wire = response.encode(parts.version, parts.method == Method::HEAD, close);
        if let Err(e) = stream.write_all(&wire).await {
            debug!(error = %e, "Failed to write response");
            return Ok(());
        }
        if let Err(e) = stream.flush().await {
            debug!(error = %e, "Failed to flush response");
            return Ok(());
        }

        if close {
            let _ = stream.shutdown().await;
            return Ok(());
        }
    }
}

/// Reads until a complete request head is buffered
///
/// `Ok(None)` means the peer closed the connection cleanly between requests.
async fn read_head<S>(stream: &mut S, buf: &mut BytesMut) -> Result<Option<RequestHead>, RequestError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            if let Some((head, len)) = parse_head(&buf[..])? {
                buf.advance(len);
                return Ok(Some(head));
            }
        }

        if read_more(stream, buf).await? == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(RequestError::IncompleteRequest)
            };
        }
    }
}

/// Response sent for a request that never reached the handler
fn rejection(err: &RequestError) -> Option<Response> {
    let status = match err {
        RequestError::HttpParse(_) | RequestError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RequestError::HeadTooLarge => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
        RequestError::Io(_) | RequestError::IncompleteRequest => return None,
    };
    let message = format!(
        "{} {}",
        status.as_str(),
        status.canonical_reason().unwrap_or_default()
    );
    Some(Response::plain_text(status, &message))
}
