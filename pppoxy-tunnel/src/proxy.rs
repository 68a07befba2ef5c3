//! Connection registry and link manager
//!
//! The [`Proxy`] is the orchestrator between the capture endpoints and the
//! tunnel links. In server mode it accepts and authorizes TCP connections
//! and fans captured frames out to every registered link; in client mode it
//! owns a single upstream link, reconnects it on failure and drives the
//! periodic keepalive.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use pppoxy_core::{Error, FrameSink, Mode, Result};

use crate::codec::{encode_frame, read_frame, TunnelFrame, INITIAL_BUFFER_LEN};
use crate::config::ProxyConfig;
use crate::link::Link;

/// Which capture endpoint a locally produced frame came from
#[derive(Debug, Clone, Copy)]
enum FrameChannel {
    Discovery,
    Session,
}

struct Inner {
    config: ProxyConfig,
    discovery: Arc<dyn FrameSink>,
    session: Arc<dyn FrameSink>,
    /// Server mode: registered links keyed by remote address
    clients: RwLock<HashMap<String, Arc<Link>>>,
    /// Client mode: the single upstream link, if connected
    upstream: Mutex<Option<Arc<Link>>>,
    /// Server mode: the bound listen address once running
    listen_addr: Mutex<Option<SocketAddr>>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// The tunnel side of the proxy.
///
/// Cheap to clone; every task spawned by the proxy holds a clone of the
/// shared state.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<Inner>,
}

impl Proxy {
    /// Create a proxy wired to the two capture endpoints.
    ///
    /// `discovery` and `session` receive the payload of inbound tunnel
    /// frames of the matching type.
    pub fn new(
        config: ProxyConfig,
        discovery: Arc<dyn FrameSink>,
        session: Arc<dyn FrameSink>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                discovery,
                session,
                clients: RwLock::new(HashMap::new()),
                upstream: Mutex::new(None),
                listen_addr: Mutex::new(None),
                closed: AtomicBool::new(false),
                shutdown_tx,
                shutdown_rx,
            }),
        }
    }

    /// Start the proxy.
    ///
    /// `discovery_frames` and `session_frames` are the produced-frame
    /// queues of the two capture endpoints. Server mode binds its listener
    /// here and a bind failure is fatal; a failed initial client connection
    /// only schedules a reconnect.
    pub async fn run(
        &self,
        discovery_frames: mpsc::Receiver<Vec<u8>>,
        session_frames: mpsc::Receiver<Vec<u8>>,
    ) -> Result<()> {
        self.spawn_frame_consumer(discovery_frames, FrameChannel::Discovery);
        self.spawn_frame_consumer(session_frames, FrameChannel::Session);

        match self.inner.config.mode {
            Mode::Server => {
                let listener = TcpListener::bind(&self.inner.config.address)
                    .await
                    .map_err(|e| {
                        Error::Connection(format!(
                            "failed to start server on {}: {}",
                            self.inner.config.address, e
                        ))
                    })?;
                let local = listener.local_addr()?;
                *self.inner.listen_addr.lock() = Some(local);
                info!("Server listening on {}", local);

                let proxy = self.clone();
                tokio::spawn(async move { proxy.accept_loop(listener).await });
            }
            Mode::Client => {
                let proxy = self.clone();
                tokio::spawn(async move { proxy.keepalive_loop().await });

                if let Err(e) = self.connect_upstream().await {
                    warn!("Initial connection failed: {}", e);
                    self.schedule_reconnect();
                }
            }
        }

        Ok(())
    }

    /// Shut the proxy down: broadcast the shutdown signal once, then close
    /// every link. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.shutdown_tx.send(true);

        let links: Vec<Arc<Link>> = self
            .inner
            .clients
            .write()
            .drain()
            .map(|(_, link)| link)
            .collect();
        for link in links {
            link.close().await;
        }

        let upstream = { self.inner.upstream.lock().take() };
        if let Some(link) = upstream {
            link.close().await;
        }

        info!("Proxy closed");
    }

    /// The bound listen address, once a server proxy is running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.listen_addr.lock()
    }

    /// Number of currently registered client links
    pub fn client_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// Has the upstream link been established?
    pub fn has_upstream(&self) -> bool {
        self.inner.upstream.lock().is_some()
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    /// Consume one capture endpoint's produced frames for the lifetime of
    /// the proxy
    fn spawn_frame_consumer(&self, mut frames: mpsc::Receiver<Vec<u8>>, channel: FrameChannel) {
        let proxy = self.clone();
        let mut shutdown = self.inner.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    next = frames.recv() => match next {
                        Some(frame) => {
                            let frame = match channel {
                                FrameChannel::Discovery => TunnelFrame::Discovery(frame),
                                FrameChannel::Session => TunnelFrame::Session(frame),
                            };
                            proxy.forward_frame(frame).await;
                        }
                        None => break,
                    },
                }
            }
        });
    }

    /// Send a locally captured frame through the tunnel.
    ///
    /// Server mode encodes once and writes to every registered link; a
    /// failure on one link is logged and does not stop delivery to the
    /// rest. Client mode writes to the upstream link or, when there is
    /// none, drops the frame. PPPoE retries above us.
    async fn forward_frame(&self, frame: TunnelFrame) {
        if self.is_closed() {
            return;
        }
        let label = frame.label();
        let encoded = encode_frame(&frame);

        if self.inner.config.mode.is_server() {
            let links: Vec<Arc<Link>> = self.inner.clients.read().values().cloned().collect();
            for link in links {
                if let Err(e) = link.send_encoded(&encoded).await {
                    warn!(
                        "Error sending {} frame to client {}: {}",
                        label,
                        link.remote_addr(),
                        e
                    );
                }
            }
        } else {
            let upstream = { self.inner.upstream.lock().clone() };
            let Some(link) = upstream else {
                return;
            };
            if let Err(e) = link.send_encoded(&encoded).await {
                warn!("Error sending {} frame to server: {}", label, e);
            }
        }
    }

    async fn accept_loop(self, listener: TcpListener) {
        let mut shutdown = self.inner.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit_client(stream, peer),
                    Err(e) => {
                        if self.is_closed() {
                            break;
                        }
                        error!("Error accepting connection: {}", e);
                    }
                },
            }
        }
        debug!("Accept loop stopped");
    }

    /// Authorize and register one accepted connection
    fn admit_client(&self, stream: TcpStream, peer: SocketAddr) {
        let peer_ip = peer.ip().to_string();
        if !self.is_peer_allowed(&peer_ip) {
            info!("Rejected connection from unauthorized client: {}", peer_ip);
            // Dropping the stream closes it; nothing is read or written
            drop(stream);
            return;
        }

        let (link, reader) = match Link::split(stream) {
            Ok(split) => split,
            Err(e) => {
                error!("Failed to set up link for {}: {}", peer, e);
                return;
            }
        };

        info!("Accepted connection from {}", link.remote_addr());
        self.inner
            .clients
            .write()
            .insert(link.remote_addr().to_string(), Arc::clone(&link));

        let proxy = self.clone();
        tokio::spawn(async move { proxy.client_loop(link, reader).await });
    }

    /// The peer's source IP must equal the configured address; the port is
    /// not part of the comparison.
    fn is_peer_allowed(&self, peer_ip: &str) -> bool {
        match self.inner.config.allowed_ip.as_deref() {
            Some(allowed) => peer_ip == allowed,
            None => false,
        }
    }

    /// Server-side per-client decode loop; deregisters the link when it ends
    async fn client_loop(self, link: Arc<Link>, reader: OwnedReadHalf) {
        self.decode_loop(&link, reader).await;

        self.inner.clients.write().remove(link.remote_addr());
        link.close().await;
        info!("Client {} disconnected", link.remote_addr());
    }

    /// Client-side upstream decode loop; schedules a reconnect when the
    /// link it owns is still the current one
    async fn upstream_loop(self, link: Arc<Link>, reader: OwnedReadHalf) {
        self.decode_loop(&link, reader).await;

        // A reconnect may already have replaced us; only the loop that
        // still owns the current link clears the slot and reconnects
        let was_current = {
            let mut upstream = self.inner.upstream.lock();
            let current = upstream
                .as_ref()
                .map_or(false, |current| Arc::ptr_eq(current, &link));
            if current {
                *upstream = None;
            }
            current
        };

        link.close().await;
        info!("Disconnected from server");

        if was_current && !self.is_closed() {
            self.schedule_reconnect();
        }
    }

    /// Read frames off one link until error, clean close or shutdown
    async fn decode_loop(&self, link: &Arc<Link>, mut reader: OwnedReadHalf) {
        let mut shutdown = self.inner.shutdown_rx.clone();
        let mut buffer = vec![0u8; INITIAL_BUFFER_LEN];

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                result = read_frame(&mut reader, &mut buffer) => match result {
                    Ok(Some(frame)) => {
                        if !self.dispatch(link, frame).await {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        if !self.is_closed() {
                            warn!("Error reading from {}: {}", link.remote_addr(), e);
                        }
                        return;
                    }
                },
            }
        }
    }

    /// Handle one inbound tunnel frame.
    ///
    /// Returns false when the link must be torn down.
    async fn dispatch(&self, link: &Arc<Link>, frame: TunnelFrame) -> bool {
        match frame {
            TunnelFrame::Ping => {
                if let Err(e) = link.send(&TunnelFrame::Pong).await {
                    warn!("Error sending pong to {}: {}", link.remote_addr(), e);
                    return false;
                }
                debug!("Received ping from {}, sent pong", link.remote_addr());
            }
            TunnelFrame::Pong => {
                // Receipt is logged only; missed pongs are not tracked
                debug!("Received pong from {}", link.remote_addr());
            }
            TunnelFrame::Discovery(payload) => self.inner.discovery.inject(&payload),
            TunnelFrame::Session(payload) => self.inner.session.inject(&payload),
        }
        true
    }

    /// Dial the server and install the new upstream link
    async fn connect_upstream(&self) -> Result<()> {
        let stream = TcpStream::connect(&self.inner.config.address)
            .await
            .map_err(|e| {
                Error::Connection(format!(
                    "failed to connect to {}: {}",
                    self.inner.config.address, e
                ))
            })?;
        let (link, reader) = Link::split(stream)?;

        let previous = { self.inner.upstream.lock().replace(Arc::clone(&link)) };
        if let Some(old) = previous {
            old.close().await;
        }

        info!("Connected to server at {}", self.inner.config.address);

        let proxy = self.clone();
        tokio::spawn(async move { proxy.upstream_loop(link, reader).await });
        Ok(())
    }

    /// Schedule one reconnect attempt after the fixed delay.
    ///
    /// Each failed attempt schedules the next; the cadence never grows.
    fn schedule_reconnect(&self) {
        if self.is_closed() {
            return;
        }
        let proxy = self.clone();
        let mut shutdown = self.inner.shutdown_rx.clone();
        let delay = self.inner.config.reconnect_delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if proxy.is_closed() {
                return;
            }
            info!("Attempting to reconnect to server...");
            match proxy.connect_upstream().await {
                Ok(()) => info!("Successfully reconnected to server"),
                Err(e) => {
                    warn!("Reconnection failed: {}", e);
                    proxy.schedule_reconnect();
                }
            }
        });
    }

    /// Periodic keepalive for the client side.
    ///
    /// Pong receipt is logged in [`Self::dispatch`] and never tracked, so a
    /// half-open upstream is not detected here.
    async fn keepalive_loop(self) {
        let mut shutdown = self.inner.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(self.inner.config.keepalive_interval);
        // The first tick completes immediately; skip it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => self.send_ping().await,
            }
        }
    }

    async fn send_ping(&self) {
        if self.is_closed() {
            return;
        }
        let upstream = { self.inner.upstream.lock().clone() };
        let Some(link) = upstream else {
            return;
        };
        if let Err(e) = link.send(&TunnelFrame::Ping).await {
            warn!("Error sending ping: {}", e);
            return;
        }
        debug!("Sent ping to server");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl FrameSink for NullSink {
        fn inject(&self, _frame: &[u8]) {}
    }

    fn server_proxy(allowed_ip: &str) -> Proxy {
        Proxy::new(
            ProxyConfig::server("127.0.0.1:0", allowed_ip),
            Arc::new(NullSink),
            Arc::new(NullSink),
        )
    }

    #[test]
    fn test_is_peer_allowed_exact_match() {
        let proxy = server_proxy("203.0.113.5");
        assert!(proxy.is_peer_allowed("203.0.113.5"));
        assert!(!proxy.is_peer_allowed("203.0.113.6"));
        assert!(!proxy.is_peer_allowed("203.0.113.50"));
        assert!(!proxy.is_peer_allowed(""));
    }

    #[test]
    fn test_client_mode_has_no_allowed_ip() {
        let proxy = Proxy::new(
            ProxyConfig::client("127.0.0.1:1"),
            Arc::new(NullSink),
            Arc::new(NullSink),
        );
        assert!(!proxy.is_peer_allowed("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let proxy = server_proxy("127.0.0.1");
        proxy.close().await;
        proxy.close().await;
        assert!(proxy.is_closed());
    }
}
