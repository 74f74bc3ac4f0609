//! Shared helpers for socket-level tests: a server on an ephemeral port and
//! a client that can pause or half-close mid-request.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use faultline::{Config, Server, ServerHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

/// Upper bound for any single exchange in these tests.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);

pub fn start_server() -> ServerHandle {
    let cfg = Config {
        listen_addr: "127.0.0.1:0".to_string(),
        ..Config::default()
    };

    Server::bind(&cfg).unwrap().spawn().unwrap()
}

/// How the client misbehaves while sending.
#[derive(Debug, Default, Clone)]
pub struct ClientPlan {
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Pause after the request line and Host header
    pub sleep_headers: Option<Duration>,
    /// Half-close instead of finishing the headers
    pub close_headers: bool,
    /// Pause between the two halves of the body
    pub sleep_body: Option<Duration>,
    /// Half-close after the first half of the body
    pub close_body: bool,
}

/// Everything the server sent back, with arrival times.
#[derive(Debug, Default)]
pub struct Reply {
    pub raw: Vec<u8>,
    pub chunks: Vec<(Instant, usize)>,
    pub started: Option<Instant>,
}

impl Reply {
    fn split(&self) -> Option<(&[u8], &[u8])> {
        let end = self.raw.windows(4).position(|w| w == b"\r\n\r\n")?;
        Some((&self.raw[..end], &self.raw[end + 4..]))
    }

    /// `true` when the blank line ending the header block arrived.
    pub fn has_complete_head(&self) -> bool {
        self.split().is_some()
    }

    pub fn status_line(&self) -> Option<String> {
        let end = self.raw.windows(2).position(|w| w == b"\r\n")?;
        Some(String::from_utf8_lossy(&self.raw[..end]).into_owned())
    }

    pub fn code(&self) -> Option<u16> {
        self.status_line()?.split(' ').nth(1)?.parse().ok()
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<String> {
        let text = String::from_utf8_lossy(&self.raw).into_owned();
        text.split("\r\n")
            .skip(1)
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(": "))
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.to_string())
    }

    pub fn body(&self) -> &[u8] {
        self.split().map(|(_, body)| body).unwrap_or(&[])
    }

    /// Time from the first response byte to the last.
    pub fn spread(&self) -> Duration {
        match (self.chunks.first(), self.chunks.last()) {
            (Some((first, _)), Some((last, _))) => last.duration_since(*first),
            _ => Duration::ZERO,
        }
    }

    /// Time from sending the request to the first response byte.
    pub fn latency(&self) -> Option<Duration> {
        let (first, _) = self.chunks.first()?;
        Some(first.duration_since(self.started?))
    }
}

/// Sends one request, pausing or half-closing as planned, and reads the
/// response until the server closes.
pub async fn request(addr: SocketAddr, method: &str, target: &str, opts: ClientPlan) -> Reply {
    timeout(EXCHANGE_TIMEOUT, exchange(addr, method, target, opts))
        .await
        .expect("exchange timed out")
}

async fn exchange(addr: SocketAddr, method: &str, target: &str, opts: ClientPlan) -> Reply {
    let mut sock = TcpStream::connect(addr).await.unwrap();
    let started = Instant::now();

    // Write failures mean the server already hung up; the reply says what happened.
    let _ = send_request(&mut sock, method, target, &opts).await;

    let mut reply = read_until_close(&mut sock).await;
    reply.started = Some(started);
    reply
}

async fn send_request(
    sock: &mut TcpStream,
    method: &str,
    target: &str,
    opts: &ClientPlan,
) -> std::io::Result<()> {
    sock.write_all(format!("{} {} HTTP/1.1\r\n", method, target).as_bytes()).await?;
    sock.write_all(b"Host: 127.0.0.1\r\n").await?;

    if let Some(d) = opts.sleep_headers {
        sleep(d).await;
    }
    if opts.close_headers {
        return sock.shutdown().await;
    }

    for (k, v) in &opts.headers {
        sock.write_all(format!("{}: {}\r\n", k, v).as_bytes()).await?;
    }

    let body_len = opts.body.as_ref().map_or(0, Vec::len);
    sock.write_all(format!("Content-Length: {}\r\n", body_len).as_bytes()).await?;
    sock.write_all(b"Connection: close\r\n\r\n").await?;

    if let Some(body) = &opts.body {
        let half = body.len() / 2;
        sock.write_all(&body[..half]).await?;

        if let Some(d) = opts.sleep_body {
            sleep(d).await;
        }
        if opts.close_body {
            return sock.shutdown().await;
        }

        sock.write_all(&body[half..]).await?;
    }

    Ok(())
}

pub async fn read_until_close(sock: &mut TcpStream) -> Reply {
    let mut reply = Reply::default();
    let mut buf = [0u8; 1024];

    loop {
        match sock.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                reply.raw.extend_from_slice(&buf[..n]);
                reply.chunks.push((Instant::now(), n));
            }
        }
    }

    reply
}

pub async fn get(addr: SocketAddr, target: &str) -> Reply {
    request(addr, "GET", target, ClientPlan::default()).await
}
