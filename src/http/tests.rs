use super::connection::serve_connection;
use super::request::{BodyFraming, RequestError, parse_head};
use crate::config::RuntimeConfig;
use crate::handler::RequestHandler;
use crate::logging::CapturedLog;
use crate::mirror::EchoResponse;
use http::header::CONTENT_LENGTH;
use http::{Method, Version};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::task::JoinHandle;

fn handler(mirror: bool) -> (Arc<RequestHandler>, Arc<CapturedLog>) {
    let log = Arc::new(CapturedLog::default());
    let config = RuntimeConfig { port: 0, mirror };
    (Arc::new(RequestHandler::new(config, log.clone())), log)
}

/// Serves one in-memory connection, returning the client half
fn connect(handler: Arc<RequestHandler>) -> (DuplexStream, JoinHandle<Result<(), RequestError>>) {
    let (client, server) = duplex(64 * 1024);
    let task = tokio::spawn(async move { serve_connection(server, &handler).await });
    (client, task)
}

/// Sends `request`, closes the write side and collects everything sent back
async fn exchange(mirror: bool, request: &[u8]) -> (String, Arc<CapturedLog>) {
    let (handler, log) = handler(mirror);
    let (mut client, task) = connect(handler);

    client.write_all(request).await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    let _ = task.await.unwrap();

    (String::from_utf8(response).unwrap(), log)
}

fn body_of(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

#[test]
fn test_parse_head_complete() {
    let raw = b"POST /submit?x=1 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (head, len) = parse_head(raw).unwrap().unwrap();

    assert_eq!(len, raw.len() - 5);
    assert_eq!(head.parts.method, Method::POST);
    assert_eq!(head.parts.path(), "/submit");
    assert_eq!(head.parts.query(), Some("x=1"));
    assert_eq!(head.parts.version, Version::HTTP_11);
    assert_eq!(head.framing, BodyFraming::Length(5));
    assert!(head.keep_alive);
    assert!(!head.expect_continue);
}

#[test]
fn test_parse_head_keeps_raw_target() {
    let (head, _) = parse_head(b"GET /search?q={\"a\":1} HTTP/1.1\r\n\r\n")
        .unwrap()
        .unwrap();
    assert_eq!(head.parts.target, "/search?q={\"a\":1}");
    assert_eq!(head.parts.path(), "/search");
    assert_eq!(head.parts.query(), Some("q={\"a\":1}"));

    let (head, _) = parse_head(b"GET /a%20b/c%2Fd HTTP/1.1\r\n\r\n").unwrap().unwrap();
    assert_eq!(head.parts.raw_path(), "/a%20b/c%2Fd");
    assert_eq!(head.parts.path(), "/a b/c/d");

    let (head, _) = parse_head(b"GET http://example.com/abs?x=1 HTTP/1.1\r\n\r\n")
        .unwrap()
        .unwrap();
    assert_eq!(head.parts.path(), "/abs");
    assert_eq!(head.parts.query(), Some("x=1"));
}

#[test]
fn test_parse_head_chunked_drops_content_length() {
    let (head, _) = parse_head(
        b"POST / HTTP/1.1\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n",
    )
    .unwrap()
    .unwrap();
    assert_eq!(head.framing, BodyFraming::Chunked);
    assert!(!head.parts.headers.contains_key(CONTENT_LENGTH));
}

#[test]
fn test_parse_head_partial() {
    assert!(parse_head(b"GET / HTTP/1.1\r\nHost: loc").unwrap().is_none());
}

#[test]
fn test_parse_head_framing_and_connection_rules() {
    let (head, _) = parse_head(b"PUT / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
        .unwrap()
        .unwrap();
    assert_eq!(head.framing, BodyFraming::Chunked);

    let (head, _) = parse_head(b"GET / HTTP/1.0\r\n\r\n").unwrap().unwrap();
    assert_eq!(head.framing, BodyFraming::Empty);
    assert!(!head.keep_alive);

    let (head, _) = parse_head(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n")
        .unwrap()
        .unwrap();
    assert!(head.keep_alive);

    let (head, _) = parse_head(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
        .unwrap()
        .unwrap();
    assert!(!head.keep_alive);

    let (head, _) = parse_head(b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 1\r\n\r\n")
        .unwrap()
        .unwrap();
    assert!(head.expect_continue);
}

#[test]
fn test_parse_head_rejects_bad_framing() {
    let conflicting = b"POST / HTTP/1.1\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\n";
    assert!(matches!(
        parse_head(conflicting),
        Err(RequestError::InvalidRequest(_))
    ));

    let signed = b"POST / HTTP/1.1\r\nContent-Length: +5\r\n\r\n";
    assert!(matches!(parse_head(signed), Err(RequestError::InvalidRequest(_))));

    let gzip = b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n";
    assert!(matches!(parse_head(gzip), Err(RequestError::InvalidRequest(_))));
}

#[test]
fn test_parse_head_rejects_garbage() {
    assert!(matches!(
        parse_head(b"NOT AN HTTP REQUEST\r\n\r\n"),
        Err(RequestError::HttpParse(_))
    ));
}

#[tokio::test]
async fn test_plain_response_on_the_wire() {
    let (response, _) = exchange(
        false,
        b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("content-type: application/json\r\n"));
    assert!(response.contains("content-length: 2\r\n"));
    assert_eq!(body_of(&response), "ok");
}

#[tokio::test]
async fn test_chunked_body_is_mirrored() {
    let (response, log) = exchange(
        true,
        b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
          5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: t\r\n\r\n",
    )
    .await;

    let echo: EchoResponse = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(echo.body, "hello world");
    assert_eq!(echo.path, "/upload");
    assert!(!echo.headers.contains("Transfer-Encoding"));
    assert!(log.lines().contains(&"Body: hello world".to_string()));
}

#[tokio::test]
async fn test_truncated_body_is_bad_request() {
    for mirror in [false, true] {
        let (response, log) = exchange(
            mirror,
            b"POST /foo HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("connection: close\r\n"));
        assert_eq!(body_of(&response), "Error reading body\n");
        assert_eq!(log.lines(), vec!["POST request on path: /foo"]);
    }
}

#[tokio::test]
async fn test_malformed_chunk_is_bad_request() {
    let (response, log) = exchange(
        true,
        b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nhello\r\n0\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert_eq!(body_of(&response), "Error reading body\n");
    assert_eq!(log.lines().len(), 1);
}

#[tokio::test]
async fn test_head_in_mirror_mode_sends_no_body() {
    let (response, _) = exchange(true, b"HEAD /foo HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("content-type: application/json\r\n"));
    assert!(!response.contains("content-length"));
    assert_eq!(body_of(&response), "");
}

#[tokio::test]
async fn test_unusual_targets_reach_the_handler() {
    let long_path = format!("/{}", "a".repeat(70_000));
    let targets = [
        "/search?q={\"a\":1}".to_string(),
        "/weird`path|x".to_string(),
        long_path.clone(),
    ];
    for target in targets {
        let request = format!("GET {target} HTTP/1.1\r\nConnection: close\r\n\r\n");
        let (response, log) = exchange(false, request.as_bytes()).await;

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{target:.40}");
        assert_eq!(body_of(&response), "ok");
        let path = target.split_once('?').map_or(target.as_str(), |(path, _)| path);
        assert_eq!(log.lines()[0], format!("GET request on path: {path}"));
    }
}

#[tokio::test]
async fn test_chunked_request_hides_content_length_from_mirror() {
    let (response, _) = exchange(
        true,
        b"POST /up HTTP/1.1\r\nContent-Length: 99\r\nTransfer-Encoding: chunked\r\n\
          Connection: close\r\nX-Test: v1\r\n\r\n3\r\nabc\r\n0\r\n\r\n",
    )
    .await;

    let echo: EchoResponse = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(echo.body, "abc");
    assert_eq!(echo.headers, "X-Test: v1");
}

#[tokio::test]
async fn test_head_in_plain_mode_sends_no_body() {
    let (response, _) = exchange(false, b"HEAD / HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    assert!(response.contains("content-length: 2\r\n"));
    assert_eq!(body_of(&response), "");
}

#[tokio::test]
async fn test_keep_alive_serves_pipelined_requests() {
    let (response, log) = exchange(
        false,
        b"POST /one HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc\
          GET /two HTTP/1.1\r\n\r\n\
          GET /three HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert_eq!(response.matches("HTTP/1.1 200 OK\r\n").count(), 3);
    let requests: Vec<_> = log
        .lines()
        .into_iter()
        .filter(|line| line.contains("request on path"))
        .collect();
    assert_eq!(
        requests,
        vec![
            "POST request on path: /one",
            "GET request on path: /two",
            "GET request on path: /three",
        ]
    );
}

#[tokio::test]
async fn test_http10_closes_after_response() {
    let (response, log) = exchange(
        false,
        b"GET /a HTTP/1.0\r\n\r\nGET /b HTTP/1.0\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert_eq!(response.matches("HTTP/1.0 200 OK").count(), 1);
    assert_eq!(log.lines()[0], "GET request on path: /a");
}

#[tokio::test]
async fn test_expect_continue_sends_interim_response() {
    let (handler, _) = handler(true);
    let (mut client, task) = connect(handler);

    client
        .write_all(b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 4\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut interim = [0u8; 25];
    client.read_exact(&mut interim).await.unwrap();
    assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

    client.write_all(b"ping").await.unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    task.await.unwrap().unwrap();

    let response = String::from_utf8(response).unwrap();
    let echo: EchoResponse = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(echo.body, "ping");
}

#[tokio::test]
async fn test_malformed_head_is_rejected_before_the_handler() {
    let (handler, log) = handler(true);
    let (mut client, task) = connect(handler);

    client.write_all(b"GARBAGE\r\n\r\n").await.unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();

    assert!(task.await.unwrap().is_err());
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(log.lines().is_empty());
}

#[tokio::test]
async fn test_clean_close_between_requests() {
    let (handler, log) = handler(false);
    let (mut client, task) = connect(handler);

    client.shutdown().await.unwrap();
    assert!(task.await.unwrap().is_ok());
    assert!(log.lines().is_empty());
}
