// ABOUTME: HTTP health probe for freshly started containers.
// ABOUTME: Speaks HTTP/1.1 over a plain TCP connection to the published host port.

use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Issue one `GET` against `127.0.0.1:<port><path>`.
///
/// Any 2xx or 3xx answer counts as healthy. Connection failures and other
/// statuses count as unhealthy.
pub async fn probe_once(port: u16, path: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, request(port, path)).await {
        Ok(Ok(status)) => status.is_success() || status.is_redirection(),
        Ok(Err(e)) => {
            tracing::debug!(port, error = %e, "health probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(port, "health probe timed out");
            false
        }
    }
}

/// Probe every `interval` until healthy or `budget` has elapsed.
pub async fn wait_until_healthy(port: u16, path: &str, interval: Duration, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if probe_once(port, path, interval.max(Duration::from_secs(1))).await {
            tracing::debug!(port, attempt, "container healthy");
            return true;
        }

        if Instant::now() + interval > deadline {
            tracing::warn!(port, attempt, "container did not become healthy");
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

async fn request(port: u16, path: &str) -> Result<hyper::StatusCode, String> {
    let stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .map_err(|e| format!("connect failed: {e}"))?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| format!("HTTP handshake failed: {e}"))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("health probe connection error: {}", e);
        }
    });

    let req = hyper::Request::builder()
        .method("GET")
        .uri(path)
        .header("Host", format!("127.0.0.1:{port}"))
        .body(Empty::<bytes::Bytes>::new())
        .map_err(|e| format!("failed to build request: {e}"))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    Ok(resp.status())
}
