//! Minimal HTTP/1.1 JSON surface for the scan engine. One POST body in, one
//! report out; OPTIONS preflight answered empty; permissive CORS on every
//! response.

use anyhow::Result;
use host_scan::ProbeTimeouts;
use log::{info, warn};
use orchestrate::ScanRequest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\n\
    Access-Control-Allow-Headers: authorization, x-client-info, apikey, content-type\r\n";

const MAX_HEAD_BYTES: usize = 8 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Accept loop. Runs until the token is cancelled.
pub async fn serve(bind: &str, timeouts: ProbeTimeouts, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, timeouts, cancel).await {
                        warn!("connection from {peer}: {e}");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    timeouts: ProbeTimeouts,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let (method, body) = match read_request(&mut stream).await? {
        Some(parts) => parts,
        None => return Ok(()), // peer went away or sent garbage framing
    };

    let response = if method.eq_ignore_ascii_case("OPTIONS") {
        render_response(200, "OK", None)
    } else {
        match scan_from_body(&body, timeouts, &cancel).await {
            Ok(json) => render_response(200, "OK", Some(&json)),
            Err(msg) => {
                let err = serde_json::json!({ "error": msg });
                render_response(500, "Internal Server Error", Some(&err.to_string()))
            }
        }
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Parse the request body, run the scan, and serialize the report. Any
/// surfaced failure becomes the error message of the 500 body.
async fn scan_from_body(
    body: &[u8],
    timeouts: ProbeTimeouts,
    cancel: &CancellationToken,
) -> Result<String, String> {
    let request: ScanRequest =
        serde_json::from_slice(body).map_err(|e| format!("invalid request body: {e}"))?;
    let report = orchestrate::handle_scan(&request, timeouts, cancel)
        .await
        .map_err(|e| e.to_string())?;
    serde_json::to_string(&report).map_err(|e| e.to_string())
}

/// Read one request: head until the blank line, then `Content-Length` bytes
/// of body. Returns `None` when the peer closes early or the head cannot be
/// framed.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<(String, Vec<u8>)>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(None);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let (method, content_length) = match parse_head(&head) {
        Some(parts) => parts,
        None => return Ok(None),
    };
    if content_length > MAX_BODY_BYTES {
        return Ok(None);
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    Ok(Some((method, body)))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Extract the method and Content-Length from a request head. The path is
/// irrelevant; there is exactly one endpoint.
fn parse_head(head: &str) -> Option<(String, usize)> {
    let mut lines = head.lines();
    let method = lines.next()?.split_whitespace().next()?.to_string();
    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok()?;
            }
        }
    }
    Some((method, content_length))
}

fn render_response(status: u16, reason: &str, body: Option<&str>) -> String {
    let body = body.unwrap_or("");
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         {CORS_HEADERS}\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}
