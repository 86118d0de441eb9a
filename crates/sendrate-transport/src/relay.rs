//! Pass-through paths: upstream-to-downstream proxy copies and the
//! bidirectional tunnel. All downstream writes go through `GuardedWriter`.

use bytes::BytesMut;
use sendrate_core::{BacklogProbe, Clock, SendRateError, WriteSite};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::stream::TrackedStream;
use crate::writer::GuardedWriter;

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Forwards each upstream read downstream as soon as it arrives.
/// Returns the number of bytes relayed.
pub async fn relay_unbuffered<R, S, P, C>(
    writer: &GuardedWriter<P, C>,
    upstream: &mut R,
    downstream: &mut TrackedStream<S>,
    chunk_size: usize,
) -> Result<u64, SendRateError>
where
    R: AsyncRead + Unpin,
    S: AsyncWrite + Unpin,
    P: BacklogProbe<S>,
    C: Clock,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = upstream.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(WriteSite::ProxyUnbuffered, downstream, &buf[..n]).await?;
        total += n as u64;
    }
}

/// Accumulates up to `capacity` bytes from upstream before each downstream write.
pub async fn relay_buffered<R, S, P, C>(
    writer: &GuardedWriter<P, C>,
    upstream: &mut R,
    downstream: &mut TrackedStream<S>,
    capacity: usize,
) -> Result<u64, SendRateError>
where
    R: AsyncRead + Unpin,
    S: AsyncWrite + Unpin,
    P: BacklogProbe<S>,
    C: Clock,
{
    let capacity = capacity.max(1);
    let mut buf = BytesMut::with_capacity(capacity);
    let mut total = 0u64;

    loop {
        let mut eof = false;
        while buf.len() < capacity {
            let mut limited = (&mut *upstream).take((capacity - buf.len()) as u64);
            if limited.read_buf(&mut buf).await? == 0 {
                eof = true;
                break;
            }
        }

        if !buf.is_empty() {
            writer.write_all(WriteSite::ProxyBuffered, downstream, &buf).await?;
            total += buf.len() as u64;
            buf.clear();
        }

        if eof {
            return Ok(total);
        }
    }
}

/// Bytes carried in each direction by a finished tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

enum TunnelEvent {
    FromClient(std::io::Result<usize>),
    FromUpstream(std::io::Result<usize>),
}

/// Copies both directions until both peers have closed their sending side.
///
/// When one side reaches EOF its counterpart's write half is shut down and
/// the other direction keeps flowing.
pub async fn tunnel<A, B, P, C>(
    writer: &GuardedWriter<P, C>,
    client: &mut TrackedStream<A>,
    upstream: &mut TrackedStream<B>,
) -> Result<TunnelStats, SendRateError>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
    P: BacklogProbe<A> + BacklogProbe<B>,
    C: Clock,
{
    let mut from_client = vec![0u8; DEFAULT_CHUNK_SIZE];
    let mut from_upstream = vec![0u8; DEFAULT_CHUNK_SIZE];
    let mut client_open = true;
    let mut upstream_open = true;
    let mut stats = TunnelStats::default();

    while client_open || upstream_open {
        let event = tokio::select! {
            r = client.get_mut().read(&mut from_client), if client_open => TunnelEvent::FromClient(r),
            r = upstream.get_mut().read(&mut from_upstream), if upstream_open => TunnelEvent::FromUpstream(r),
        };

        match event {
            TunnelEvent::FromClient(r) => match r? {
                0 => {
                    client_open = false;
                    upstream.get_mut().shutdown().await?;
                }
                n => {
                    writer.write_all(WriteSite::Tunnel, upstream, &from_client[..n]).await?;
                    stats.client_to_upstream += n as u64;
                }
            },
            TunnelEvent::FromUpstream(r) => match r? {
                0 => {
                    upstream_open = false;
                    client.get_mut().shutdown().await?;
                }
                n => {
                    writer.write_all(WriteSite::Tunnel, client, &from_upstream[..n]).await?;
                    stats.upstream_to_client += n as u64;
                }
            },
        }
    }

    Ok(stats)
}
