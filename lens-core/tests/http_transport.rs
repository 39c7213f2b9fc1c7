//! `ReqwestTransport` against a real socket.
//!
//! A throwaway tokio listener plays the upstream so status mapping and
//! timeouts go through reqwest exactly as they do in production.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use lens_core::error::ErrorKind;
use lens_core::http::{HttpRequest, HttpTransport, ReqwestTransport};

/// Serve one canned HTTP response per connection after `delay`.
async fn serve(status_line: &'static str, headers: &'static str, body: &'static str, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0_u8; 4096];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n{headers}connection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}/api")
}

#[tokio::test]
async fn server_error_maps_to_network() {
    let url = serve("500 Internal Server Error", "", r#"{"error":"boom"}"#, Duration::ZERO).await;
    let err = ReqwestTransport::new()
        .execute(HttpRequest::get(url, Duration::from_secs(5)))
        .await
        .expect_err("500");
    assert_eq!(err.kind, ErrorKind::Network);
    assert!(err.detail.contains("500"), "detail: {}", err.detail);
}

#[tokio::test]
async fn rate_limit_keeps_retry_after() {
    let url = serve("429 Too Many Requests", "retry-after: 30\r\n", "{}", Duration::ZERO).await;
    let transport = ReqwestTransport::new();

    let raw = transport
        .send_raw(HttpRequest::get(url.clone(), Duration::from_secs(5)))
        .await
        .expect("exchange completes");
    assert_eq!(raw.status, 429);
    assert_eq!(raw.retry_after.as_deref(), Some("30"));

    let err = transport
        .execute(HttpRequest::get(url, Duration::from_secs(5)))
        .await
        .expect_err("429");
    assert_eq!(err.kind, ErrorKind::Network);
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let url = serve("200 OK", "", "{}", Duration::from_secs(2)).await;
    let err = ReqwestTransport::new()
        .execute(HttpRequest::get(url, Duration::from_millis(100)))
        .await
        .expect_err("timeout");
    assert_eq!(err.kind, ErrorKind::Network);
    assert!(err.detail.contains("timeout"), "detail: {}", err.detail);
}

#[tokio::test]
async fn success_body_is_parsed() {
    let url = serve("200 OK", "", r#"{"results":[]}"#, Duration::ZERO).await;
    let response = ReqwestTransport::new()
        .execute(HttpRequest::get(url, Duration::from_secs(5)).with_query("q", "salem"))
        .await
        .expect("200");
    assert_eq!(response.json().expect("json")["results"], serde_json::json!([]));
}

#[tokio::test]
async fn refused_connection_is_network() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = ReqwestTransport::new()
        .execute(HttpRequest::get(format!("http://{addr}/"), Duration::from_secs(2)))
        .await
        .expect_err("refused");
    assert_eq!(err.kind, ErrorKind::Network);
}
