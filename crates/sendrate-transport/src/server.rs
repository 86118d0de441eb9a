use sendrate_core::{LocationConfig, SendRateError, ServerConfig, WriteSite};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::relay::{relay_buffered, relay_unbuffered, tunnel, DEFAULT_CHUNK_SIZE};
use crate::stream::TrackedStream;
use crate::timeout::TimeoutGuard;
use crate::writer::GuardedWriter;

const MAX_REQUEST_HEAD: usize = 8 * 1024;
const PROXY_BUFFER_SIZE: usize = 64 * 1024;

/// Minimal request head: just enough to route a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub upgrade: bool,
    /// The head exactly as received, forwarded verbatim to upstreams.
    pub raw: Vec<u8>,
}

impl RequestHead {
    pub fn parse(raw: Vec<u8>) -> Result<Self, SendRateError> {
        let (method, path, upgrade) = {
            let text = String::from_utf8_lossy(&raw);
            let mut lines = text.split("\r\n");
            let request_line = lines.next().unwrap_or_default();
            let mut parts = request_line.split_whitespace();
            let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
                return Err(bad_request("malformed request line"));
            };

            let upgrade = method.eq_ignore_ascii_case("CONNECT")
                || lines.any(|line| {
                    line.split_once(':')
                        .map(|(name, _)| name.trim().eq_ignore_ascii_case("upgrade"))
                        .unwrap_or(false)
                });
            (method.to_string(), path.to_string(), upgrade)
        };

        Ok(Self {
            method,
            path,
            upgrade,
            raw,
        })
    }
}

fn bad_request(msg: &str) -> SendRateError {
    SendRateError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string()))
}

/// Reads until the blank line that ends an HTTP request head.
pub async fn read_request_head(stream: &mut TcpStream) -> Result<RequestHead, SendRateError> {
    let mut head = Vec::with_capacity(1024);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_REQUEST_HEAD {
            return Err(bad_request("request head too large"));
        }
        if stream.read(&mut byte).await? == 0 {
            return Err(SendRateError::Closed);
        }
        head.push(byte[0]);
    }

    RequestHead::parse(head)
}

/// A demo HTTP front end whose write paths all use the slow-connection check.
///
/// Locations without an `upstream` get a generated body of `body_size`
/// bytes; locations with one are proxied (buffered or not) or tunnelled
/// when the request asks for an upgrade.
pub struct SendRateServer {
    config: Arc<ServerConfig>,
    guard: TimeoutGuard,
}

impl SendRateServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            guard: TimeoutGuard::platform(),
        }
    }

    /// Binds the configured address with `SO_REUSEADDR`.
    pub fn bind(&self) -> Result<TcpListener, SendRateError> {
        let addr: SocketAddr = self
            .config
            .bind_addr()
            .parse()
            .map_err(|e| SendRateError::Config(format!("invalid listen address: {}", e)))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        Ok(TcpListener::from_std(std::net::TcpListener::from(socket))?)
    }

    pub async fn start(self) -> Result<(), SendRateError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<(), SendRateError> {
        tracing::info!("sendrate server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            let config = self.config.clone();
            let guard = self.guard.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(&config, guard, stream).await {
                    tracing::warn!("{}: connection closed: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(config: &ServerConfig, guard: TimeoutGuard, stream: TcpStream) -> Result<(), SendRateError> {
    let mut conn = TrackedStream::new(stream);
    let request = read_request_head(conn.get_mut()).await?;
    let limits = config.limits_for(&request.path);
    let writer = GuardedWriter::new(guard, limits);

    tracing::debug!(
        "{} {}: send_timeout={:?} minimum_send_rate={}",
        request.method,
        request.path,
        limits.send_timeout,
        limits.minimum_send_rate
    );

    match config.location_for(&request.path) {
        Some(location) if location.upstream.is_some() => proxy(&writer, location, &request, &mut conn).await,
        _ => respond(&writer, &mut conn, config.body_size).await,
    }
}

async fn respond(writer: &GuardedWriter, conn: &mut TrackedStream<TcpStream>, body_size: usize) -> Result<(), SendRateError> {
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body_size
    );
    writer.write_all(WriteSite::Response, conn, head.as_bytes()).await?;

    let chunk = vec![b'x'; DEFAULT_CHUNK_SIZE];
    let mut remaining = body_size;
    while remaining > 0 {
        let n = remaining.min(chunk.len());
        writer.write_all(WriteSite::Response, conn, &chunk[..n]).await?;
        remaining -= n;
    }

    conn.get_mut().shutdown().await?;
    Ok(())
}

async fn proxy(
    writer: &GuardedWriter,
    location: &LocationConfig,
    request: &RequestHead,
    conn: &mut TrackedStream<TcpStream>,
) -> Result<(), SendRateError> {
    let Some(upstream_addr) = location.upstream.as_deref() else {
        return Err(SendRateError::Config(format!("location {:?} has no upstream", location.prefix)));
    };

    let mut upstream = TrackedStream::new(TcpStream::connect(upstream_addr).await?);
    upstream.get_mut().write_all(&request.raw).await?;

    if request.upgrade {
        let stats = tunnel(writer, conn, &mut upstream).await?;
        tracing::debug!(
            "tunnel to {} closed: {} bytes up, {} bytes down",
            upstream_addr,
            stats.client_to_upstream,
            stats.upstream_to_client
        );
        return Ok(());
    }

    let relayed = if location.proxy_buffering() {
        relay_buffered(writer, upstream.get_mut(), conn, PROXY_BUFFER_SIZE).await?
    } else {
        relay_unbuffered(writer, upstream.get_mut(), conn, DEFAULT_CHUNK_SIZE).await?
    };
    tracing::debug!("relayed {} bytes from {}", relayed, upstream_addr);

    conn.get_mut().shutdown().await?;
    Ok(())
}
