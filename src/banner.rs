//! Shallow protocol probes: SSH identification banner and HTTP page title.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_native_tls::TlsConnector;

use crate::config::{EngineConfig, TlsPolicy};
use crate::error::ScanError;
use crate::html;
use crate::types::StageOutcome;

/// Cap on the response header block read before the body window starts.
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Read the identification line an SSH-like service sends on connect.
///
/// Reads at most `window` bytes, decodes lossily and trims. Any connect or
/// read failure, or an empty read, is `Absent`.
pub async fn grab_ssh_banner(
    addr: SocketAddr,
    timeout: Duration,
    window: usize,
) -> StageOutcome<String> {
    let mut stream = match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => s,
        _ => return StageOutcome::Absent,
    };
    let mut buf = vec![0u8; window.max(1)];
    match time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            let text = String::from_utf8_lossy(&buf[..n]).trim().to_string();
            if text.is_empty() {
                StageOutcome::Absent
            } else {
                StageOutcome::Found(text)
            }
        }
        _ => StageOutcome::Absent,
    }
}

/// Issues one `GET /` against a web port and extracts the page title.
///
/// The TLS connector is built once here and reused by every host task.
/// Under [`TlsPolicy::Relaxed`] certificate and hostname checks are off,
/// since discovery targets usually present self-signed certificates.
#[derive(Clone)]
pub struct TitleCollector {
    tls: TlsConnector,
    policy: TlsPolicy,
    body_window: usize,
    user_agent: String,
}

impl TitleCollector {
    pub fn new(cfg: &EngineConfig) -> Result<Self, ScanError> {
        let mut builder = native_tls::TlsConnector::builder();
        if cfg.tls == TlsPolicy::Relaxed {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        let connector = builder.build().map_err(|e| ScanError::Tls(e.to_string()))?;
        Ok(Self {
            tls: TlsConnector::from(connector),
            policy: cfg.tls,
            body_window: cfg.body_window,
            user_agent: cfg.user_agent.clone(),
        })
    }

    pub fn policy(&self) -> TlsPolicy {
        self.policy
    }

    /// Fetch `/` from `addr` (over TLS when `secure`) and return its `<title>`.
    ///
    /// Connect, the TLS handshake plus request write, and the response read
    /// are each bounded by `timeout`. The read stops once the declared
    /// `Content-Length` has arrived, `</title>` has been seen, or the body
    /// window is full, so a server that keeps the connection open still
    /// yields a title. A read that runs out of time keeps what it buffered.
    /// Transport failures, non-HTTP replies and non-2xx statuses are `Absent`.
    pub async fn fetch_title(
        &self,
        addr: SocketAddr,
        secure: bool,
        timeout: Duration,
    ) -> StageOutcome<String> {
        let stream = match time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(s)) => s,
            _ => return StageOutcome::Absent,
        };

        let raw = if secure {
            let domain = addr.ip().to_string();
            let mut tls = match time::timeout(timeout, self.tls.connect(&domain, stream)).await {
                Ok(Ok(tls)) => tls,
                Ok(Err(e)) => {
                    tracing::trace!(addr = %addr, error = %e, "tls handshake failed");
                    return StageOutcome::Absent;
                }
                Err(_) => return StageOutcome::Absent,
            };
            self.exchange(&mut tls, addr, timeout).await
        } else {
            let mut plain = stream;
            self.exchange(&mut plain, addr, timeout).await
        };

        match raw {
            Ok(raw) => parse_title_response(&raw, self.body_window).into(),
            Err(e) => {
                tracing::trace!(addr = %addr, error = %e, "title probe failed");
                StageOutcome::Absent
            }
        }
    }

    async fn exchange<S>(
        &self,
        stream: &mut S,
        addr: SocketAddr,
        timeout: Duration,
    ) -> io::Result<Vec<u8>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = format!(
            "GET / HTTP/1.1\r\nHost: {addr}\r\nUser-Agent: {}\r\nAccept: text/html,*/*\r\nConnection: close\r\n\r\n",
            self.user_agent
        );
        let send = async {
            stream.write_all(request.as_bytes()).await?;
            stream.flush().await?;
            Ok::<_, io::Error>(())
        };
        time::timeout(timeout, send)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request write timed out"))??;
        read_response(stream, self.body_window, timeout).await
    }
}

/// Read until the response is complete enough to pull a title from, EOF, or
/// the header block plus `body_window` bytes. A read error or the `timeout`
/// deadline after some data keeps what was received.
async fn read_response<S>(stream: &mut S, body_window: usize, timeout: Duration) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + timeout;
    let limit = MAX_HEADER_BYTES + body_window;
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 2048];
    loop {
        let n = match time::timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(_)) | Err(_) if !buf.is_empty() => break,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(io::Error::new(io::ErrorKind::TimedOut, "no response")),
        };
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() >= limit || response_complete(&buf, body_window) {
            break;
        }
    }
    Ok(buf)
}

/// True once nothing more is needed: a non-2xx status line, a full body
/// window, the whole declared `Content-Length`, or a closing `</title>`.
fn response_complete(buf: &[u8], body_window: usize) -> bool {
    let Some(body_start) = header_end(buf) else {
        return false;
    };
    let head = String::from_utf8_lossy(&buf[..body_start]);
    if !status_code(&head).is_some_and(|c| (200..300).contains(&c)) {
        return true;
    }
    let body = &buf[body_start..];
    if body.len() >= body_window {
        return true;
    }
    if content_length(&head).is_some_and(|len| body.len() >= len) {
        return true;
    }
    body.windows(7).any(|w| w.eq_ignore_ascii_case(b"</title"))
}

fn content_length(head: &str) -> Option<usize> {
    head.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Offset of the first body byte, if the header block is complete.
fn header_end(buf: &[u8]) -> Option<usize> {
    if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(i + 4);
    }
    buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2)
}

/// Parse the HTTP status code from a status line like `HTTP/1.1 200 OK`.
fn status_code(head: &str) -> Option<u16> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Title from a raw HTTP response, limited to the first `body_window` body
/// bytes. `None` unless the status is 2xx.
pub fn parse_title_response(raw: &[u8], body_window: usize) -> Option<String> {
    let body_start = header_end(raw)?;
    let head = String::from_utf8_lossy(&raw[..body_start]);
    let code = status_code(&head)?;
    if !(200..300).contains(&code) {
        return None;
    }
    let end = raw.len().min(body_start + body_window);
    let body = String::from_utf8_lossy(&raw[body_start..end]);
    html::extract_title(&body)
}
