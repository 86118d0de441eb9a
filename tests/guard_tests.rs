//! # Write Timeout Guard Tests
//!
//! Runs on paused tokio time with in-memory duplex pipes: a full duplex
//! buffer is a peer that stopped reading, and the scripted probe stands in
//! for the kernel's outbound queue.

use sendrate_core::{BacklogProbe, SendRateError, WriteLimits, WriteSite};
use sendrate_transport::{GuardedWriter, TimeoutAction, TimeoutGuard, TokioClock, TrackedStream};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::time::Instant;

#[derive(Clone, Default)]
struct SharedProbe {
    backlog: Arc<AtomicU64>,
    queries: Arc<AtomicUsize>,
}

impl SharedProbe {
    fn reporting(backlog: u64) -> Self {
        let probe = Self::default();
        probe.set(backlog);
        probe
    }

    fn set(&self, backlog: u64) {
        self.backlog.store(backlog, Ordering::SeqCst);
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl BacklogProbe<DuplexStream> for SharedProbe {
    fn unacknowledged_bytes(&self, _socket: &DuplexStream) -> u64 {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.backlog.load(Ordering::SeqCst)
    }
}

fn limits(timeout_ms: u64, rate: u64) -> WriteLimits {
    WriteLimits {
        send_timeout: Duration::from_millis(timeout_ms),
        minimum_send_rate: rate,
    }
}

fn writer(probe: &SharedProbe, limits: WriteLimits) -> GuardedWriter<SharedProbe, TokioClock> {
    GuardedWriter::new(TimeoutGuard::new(probe.clone(), TokioClock::new()), limits)
}

#[tokio::test(start_paused = true)]
async fn test_guard_follows_drain_rate() {
    let probe = SharedProbe::reporting(5_000);
    let guard = TimeoutGuard::new(probe.clone(), TokioClock::new());
    let (pipe, _peer) = tokio::io::duplex(64);
    let mut conn = TrackedStream::new(pipe);
    let limits = limits(1_000, 1_000);

    // Inside the first window: rearm without asking the kernel.
    assert_eq!(
        guard.on_write_timeout(WriteSite::ProxyBuffered, &mut conn, &limits),
        TimeoutAction::Rearm(Duration::from_millis(1_000))
    );
    assert_eq!(probe.queries(), 0);
    assert!(!conn.is_timed_out());

    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert!(matches!(
        guard.on_write_timeout(WriteSite::ProxyBuffered, &mut conn, &limits),
        TimeoutAction::Rearm(_)
    ));

    tokio::time::advance(Duration::from_millis(1_200)).await;
    probe.set(3_000);
    assert!(matches!(
        guard.on_write_timeout(WriteSite::ProxyBuffered, &mut conn, &limits),
        TimeoutAction::Rearm(_)
    ));

    tokio::time::advance(Duration::from_millis(1_000)).await;
    probe.set(2_900);
    assert_eq!(
        guard.on_write_timeout(WriteSite::ProxyBuffered, &mut conn, &limits),
        TimeoutAction::Expire
    );
    assert!(conn.is_timed_out());
    assert_eq!(probe.queries(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_write_skips_rate_check() {
    let probe = SharedProbe::reporting(1_000_000);
    let (pipe, _peer) = tokio::io::duplex(64);
    let mut conn = TrackedStream::new(pipe);
    conn.set_delayed(true);

    let err = writer(&probe, limits(2_000, 1))
        .write_all(WriteSite::Response, &mut conn, &[0u8; 256])
        .await
        .unwrap_err();

    assert!(matches!(err, SendRateError::TimedOut { site: WriteSite::Response, .. }));
    assert_eq!(probe.queries(), 0);
    assert!(conn.is_timed_out());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_rate_times_out_on_first_expiry() {
    let probe = SharedProbe::reporting(64);
    let (pipe, _peer) = tokio::io::duplex(64);
    let mut conn = TrackedStream::new(pipe);
    let start = Instant::now();

    let err = writer(&probe, limits(2_000, 0))
        .write_all(WriteSite::ProxyUnbuffered, &mut conn, &[0u8; 256])
        .await
        .unwrap_err();

    match err {
        SendRateError::TimedOut { site, waited } => {
            assert_eq!(site, WriteSite::ProxyUnbuffered);
            assert!(waited >= Duration::from_millis(2_000) && waited < Duration::from_millis(2_100));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(start.elapsed() < Duration::from_millis(4_000), "no rearm expected");
    assert_eq!(probe.queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_peer_times_out_after_one_rearm() {
    let probe = SharedProbe::reporting(64);
    let (pipe, _peer) = tokio::io::duplex(64);
    let mut conn = TrackedStream::new(pipe);
    let start = Instant::now();

    let err = writer(&probe, limits(2_000, 100))
        .write_all(WriteSite::Response, &mut conn, &[0u8; 1024])
        .await
        .unwrap_err();

    // First expiry sees the backlog appear (baseline), the second sees no drain.
    assert!(matches!(err, SendRateError::TimedOut { .. }));
    assert!(start.elapsed() >= Duration::from_millis(4_000) && start.elapsed() < Duration::from_millis(6_000));
    assert_eq!(probe.queries(), 2);
    assert_eq!(conn.send_rate().last_backlog(), 64);
}

#[tokio::test(start_paused = true)]
async fn test_slow_reader_is_not_cut_off() {
    let probe = SharedProbe::reporting(64);
    let (pipe, mut peer) = tokio::io::duplex(64);
    let mut conn = TrackedStream::new(pipe);

    let reader = tokio::spawn(async move {
        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            tokio::time::sleep(Duration::from_millis(3_000)).await;
            let n = peer.read(&mut buf).await.unwrap();
            if n == 0 {
                return received;
            }
            received.extend_from_slice(&buf[..n]);
        }
    });

    let payload: Vec<u8> = (0..=255u8).collect();
    let start = Instant::now();
    writer(&probe, limits(2_000, 100))
        .write_all(WriteSite::Tunnel, &mut conn, &payload)
        .await
        .unwrap();

    assert!(start.elapsed() > Duration::from_millis(2_000), "writes should have outlived one send timeout");
    assert!(!conn.is_timed_out());
    assert!(probe.queries() >= 1);

    drop(conn);
    assert_eq!(reader.await.unwrap(), payload);
}

#[tokio::test(start_paused = true)]
async fn test_progress_resets_backlog() {
    let probe = SharedProbe::reporting(64);
    let (pipe, mut peer) = tokio::io::duplex(64);
    let mut conn = TrackedStream::new(pipe);

    // The peer reads only after the first expiry has stored a 64-byte sample.
    let reader = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3_000)).await;
        let mut buf = [0u8; 128];
        peer.read_exact(&mut buf).await.unwrap();
        buf
    });

    writer(&probe, limits(2_000, 100))
        .write_all(WriteSite::Response, &mut conn, &[7u8; 128])
        .await
        .unwrap();

    assert_eq!(probe.queries(), 1);
    assert_eq!(conn.send_rate().last_backlog(), 0);
    assert_eq!(conn.send_rate().last_sample_ms(), 2_000);
    assert!(!conn.is_timed_out());
    assert_eq!(reader.await.unwrap(), [7u8; 128]);
}

#[tokio::test]
async fn test_closed_peer_is_reported() {
    let probe = SharedProbe::reporting(0);
    let (pipe, peer) = tokio::io::duplex(64);
    drop(peer);
    let mut conn = TrackedStream::new(pipe);

    let err = writer(&probe, limits(1_000, 100))
        .write_all(WriteSite::Response, &mut conn, b"data")
        .await
        .unwrap_err();
    assert!(matches!(err, SendRateError::Transport(_) | SendRateError::Closed));
}
