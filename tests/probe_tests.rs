//! # Kernel Backlog Probe Tests
//!
//! Uses real loopback TCP pairs. The stalled-peer case fills the sender's
//! buffers against a receiver that never reads.

use sendrate_core::BacklogProbe;
use sendrate_transport::PlatformProbe;
use std::io::{ErrorKind, Write};
use std::net::{TcpListener, TcpStream};

fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

#[test]
fn test_unsupported_variant_reports_zero() {
    let (client, _server) = loopback_pair();
    assert_eq!(PlatformProbe::Unsupported.unacknowledged_bytes(&client), 0);
    assert!(!PlatformProbe::Unsupported.is_native());
}

#[test]
fn test_idle_socket_has_no_backlog() {
    let (client, _server) = loopback_pair();
    let probe = PlatformProbe::detect();
    assert_eq!(probe.unacknowledged_bytes(&client), 0);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[test]
fn test_native_detected_on_linux() {
    assert_eq!(PlatformProbe::detect(), PlatformProbe::Native);
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios"))]
#[test]
fn test_stalled_peer_leaves_backlog() {
    let (mut client, server) = loopback_pair();
    socket2::SockRef::from(&client).set_send_buffer_size(16 * 1024).unwrap();
    socket2::SockRef::from(&server).set_recv_buffer_size(16 * 1024).unwrap();
    client.set_nonblocking(true).unwrap();

    let chunk = [0x5Au8; 4096];
    let mut written = 0usize;
    loop {
        match client.write(&chunk) {
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => panic!("unexpected write error: {}", e),
        }
        assert!(written < 64 * 1024 * 1024, "send buffer never filled");
    }

    let backlog = PlatformProbe::detect().unacknowledged_bytes(&client);
    assert!(backlog > 0, "expected queued bytes after writing {} bytes", written);
    assert!(backlog as usize <= written);

    drop(server);
}

#[test]
fn test_probe_is_usable_through_tokio_streams() {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    rt.block_on(async {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = tokio::net::TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let _server = listener.accept().await.unwrap();

        assert_eq!(PlatformProbe::detect().unacknowledged_bytes(&client), 0);
    });
}
