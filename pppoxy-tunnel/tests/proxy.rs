//! End-to-end proxy tests over real localhost connections
//!
//! The capture layer is replaced with recording sinks and hand-fed frame
//! queues; everything else (admission, fan-out, reconnect, keepalive) runs
//! against actual TCP sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use pppoxy_core::FrameSink;
use pppoxy_tunnel::codec::{encode_frame, read_frame, TunnelFrame, INITIAL_BUFFER_LEN};
use pppoxy_tunnel::{Proxy, ProxyConfig};

const WAIT: Duration = Duration::from_secs(5);

/// Sink that forwards injected frames into a channel the test can await
struct RecordingSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl RecordingSink {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl FrameSink for RecordingSink {
    fn inject(&self, frame: &[u8]) {
        let _ = self.tx.send(frame.to_vec());
    }
}

struct NullSink;

impl FrameSink for NullSink {
    fn inject(&self, _frame: &[u8]) {}
}

struct ServerHarness {
    proxy: Proxy,
    addr: SocketAddr,
    discovery_frames: mpsc::Sender<Vec<u8>>,
    #[allow(dead_code)]
    session_frames: mpsc::Sender<Vec<u8>>,
    discovery_injected: mpsc::UnboundedReceiver<Vec<u8>>,
    session_injected: mpsc::UnboundedReceiver<Vec<u8>>,
}

async fn start_server(allowed_ip: &str) -> ServerHarness {
    let (discovery_sink, discovery_injected) = RecordingSink::new();
    let (session_sink, session_injected) = RecordingSink::new();
    let (discovery_frames, discovery_rx) = mpsc::channel(16);
    let (session_frames, session_rx) = mpsc::channel(16);

    let proxy = Proxy::new(
        ProxyConfig::server("127.0.0.1:0", allowed_ip),
        discovery_sink,
        session_sink,
    );
    proxy.run(discovery_rx, session_rx).await.unwrap();
    let addr = proxy.local_addr().unwrap();

    ServerHarness {
        proxy,
        addr,
        discovery_frames,
        session_frames,
        discovery_injected,
        session_injected,
    }
}

async fn wait_for_clients(proxy: &Proxy, count: usize) {
    timeout(WAIT, async {
        while proxy.client_count() != count {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("expected client count was never reached");
}

#[tokio::test]
async fn admitted_client_gets_pong_for_ping() {
    let harness = start_server("127.0.0.1").await;

    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    stream
        .write_all(&encode_frame(&TunnelFrame::Ping))
        .await
        .unwrap();

    let mut buffer = vec![0u8; INITIAL_BUFFER_LEN];
    let frame = timeout(WAIT, read_frame(&mut stream, &mut buffer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, Some(TunnelFrame::Pong));

    harness.proxy.close().await;
}

#[tokio::test]
async fn unauthorized_client_is_closed_without_response() {
    let harness = start_server("203.0.113.5").await;

    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    let mut buffer = vec![0u8; INITIAL_BUFFER_LEN];

    // The server closes without reading or writing anything
    let frame = timeout(WAIT, read_frame(&mut stream, &mut buffer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, None);
    assert_eq!(harness.proxy.client_count(), 0);

    harness.proxy.close().await;
}

#[tokio::test]
async fn captured_frame_fans_out_to_every_client() {
    let harness = start_server("127.0.0.1").await;

    let mut first = TcpStream::connect(harness.addr).await.unwrap();
    let doomed = TcpStream::connect(harness.addr).await.unwrap();
    let mut third = TcpStream::connect(harness.addr).await.unwrap();
    wait_for_clients(&harness.proxy, 3).await;

    // One link dying must not stop delivery to the rest
    drop(doomed);

    let payload = b"\xff\xff\xff\xff\xff\xff\x02\x00\x00\x00\x00\x01\x88\x63\x11\x09".to_vec();
    harness
        .discovery_frames
        .send(payload.clone())
        .await
        .unwrap();

    let mut buffer = vec![0u8; INITIAL_BUFFER_LEN];
    for stream in [&mut first, &mut third] {
        let frame = timeout(WAIT, read_frame(stream, &mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, Some(TunnelFrame::Discovery(payload.clone())));
    }

    harness.proxy.close().await;
}

#[tokio::test]
async fn inbound_frames_reach_matching_sink() {
    let mut harness = start_server("127.0.0.1").await;

    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    stream
        .write_all(&encode_frame(&TunnelFrame::Discovery(b"disco".to_vec())))
        .await
        .unwrap();
    stream
        .write_all(&encode_frame(&TunnelFrame::Session(b"sess".to_vec())))
        .await
        .unwrap();

    let injected = timeout(WAIT, harness.discovery_injected.recv())
        .await
        .unwrap();
    assert_eq!(injected, Some(b"disco".to_vec()));

    let injected = timeout(WAIT, harness.session_injected.recv())
        .await
        .unwrap();
    assert_eq!(injected, Some(b"sess".to_vec()));

    harness.proxy.close().await;
}

#[tokio::test]
async fn client_forwards_captured_frames_upstream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (discovery_frames, discovery_rx) = mpsc::channel(16);
    let (_session_frames, session_rx) = mpsc::channel::<Vec<u8>>(16);

    let proxy = Proxy::new(
        ProxyConfig::client(addr.to_string()),
        Arc::new(NullSink),
        Arc::new(NullSink),
    );
    proxy.run(discovery_rx, session_rx).await.unwrap();

    let (mut stream, _) = listener.accept().await.unwrap();

    let payload = b"captured-discovery-frame".to_vec();
    discovery_frames.send(payload.clone()).await.unwrap();

    let mut buffer = vec![0u8; INITIAL_BUFFER_LEN];
    let frame = timeout(WAIT, read_frame(&mut stream, &mut buffer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, Some(TunnelFrame::Discovery(payload)));

    proxy.close().await;
}

#[tokio::test]
async fn client_reconnects_on_fixed_cadence_until_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (accept_tx, mut accept_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let _ = accept_tx.send(Instant::now());
                    // Close immediately to force the client back into
                    // its reconnect schedule
                    drop(stream);
                }
                Err(_) => break,
            }
        }
    });

    let delay = Duration::from_millis(100);
    let mut config = ProxyConfig::client(addr.to_string());
    config.reconnect_delay = delay;

    let (_discovery_frames, discovery_rx) = mpsc::channel::<Vec<u8>>(16);
    let (_session_frames, session_rx) = mpsc::channel::<Vec<u8>>(16);
    let proxy = Proxy::new(config, Arc::new(NullSink), Arc::new(NullSink));
    proxy.run(discovery_rx, session_rx).await.unwrap();

    let first = timeout(WAIT, accept_rx.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, accept_rx.recv()).await.unwrap().unwrap();
    let third = timeout(WAIT, accept_rx.recv()).await.unwrap().unwrap();

    // Attempts come no sooner than the configured delay apart
    assert!(second - first >= delay, "reconnected too early");
    assert!(third - second >= delay, "reconnected too early");

    proxy.close().await;

    // Let any in-flight attempt land, then expect silence
    sleep(delay * 3).await;
    while accept_rx.try_recv().is_ok() {}
    sleep(delay * 3).await;
    assert!(
        accept_rx.try_recv().is_err(),
        "client kept reconnecting after shutdown"
    );
}

#[tokio::test]
async fn idle_client_sends_keepalive_and_answers_ping() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ProxyConfig::client(addr.to_string());
    config.keepalive_interval = Duration::from_millis(100);

    let (_discovery_frames, discovery_rx) = mpsc::channel::<Vec<u8>>(16);
    let (_session_frames, session_rx) = mpsc::channel::<Vec<u8>>(16);
    let proxy = Proxy::new(config, Arc::new(NullSink), Arc::new(NullSink));
    proxy.run(discovery_rx, session_rx).await.unwrap();

    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buffer = vec![0u8; INITIAL_BUFFER_LEN];

    // The idle connection produces a ping on the keepalive interval
    let frame = timeout(WAIT, read_frame(&mut stream, &mut buffer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, Some(TunnelFrame::Ping));

    // A ping from our side is answered with a pong; more keepalive pings
    // may arrive in between
    stream
        .write_all(&encode_frame(&TunnelFrame::Ping))
        .await
        .unwrap();

    timeout(WAIT, async {
        loop {
            match read_frame(&mut stream, &mut buffer).await.unwrap() {
                Some(TunnelFrame::Pong) => break,
                Some(TunnelFrame::Ping) => continue,
                other => panic!("unexpected frame {:?}", other),
            }
        }
    })
    .await
    .expect("no pong received");

    proxy.close().await;
}
