//! Capture/injection endpoint over an `AF_PACKET` raw socket

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use pppoxy_core::{Endianness, Error, FrameSink, Interface, Mode, Result};
use pppoxy_packet::pppoe::{self, PppoeCode, SessionEvent};

use crate::stats::{EndpointStats, StatsCounters};

/// Receive buffer for one frame; PPPoE payloads never exceed the MTU
const RECV_BUFFER_LEN: usize = 2048;

/// Depth of the produced-frame queue between the receive thread and the
/// tunnel consumer
const FRAME_QUEUE_DEPTH: usize = 1024;

/// Queue side handed to the tunnel; carries validated raw frames
pub type FrameReceiver = mpsc::Receiver<Vec<u8>>;

/// Which PPPoE stage an endpoint captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// PADI/PADO/PADR/PADS/PADT traffic, EtherType 0x8863
    Discovery,
    /// Established-session PPP traffic, EtherType 0x8864
    Session,
}

impl EndpointKind {
    /// EtherType this endpoint binds to
    pub fn ethertype(self) -> u16 {
        match self {
            EndpointKind::Discovery => pppoe::ETHERTYPE_PPPOE_DISCOVERY,
            EndpointKind::Session => pppoe::ETHERTYPE_PPPOE_SESSION,
        }
    }

    /// Short name used in logs and thread names
    pub fn label(self) -> &'static str {
        match self {
            EndpointKind::Discovery => "discovery",
            EndpointKind::Session => "session",
        }
    }
}

/// State shared between the endpoint handle and its receive thread
struct Shared {
    kind: EndpointKind,
    mode: Mode,
    interface: Interface,
    fd: i32,
    protocol_be: u16,
    closed: AtomicBool,
    stats: StatsCounters,
}

/// One raw link-layer socket bound to a named interface and a single PPPoE
/// EtherType.
///
/// Opening an endpoint starts its receive loop on a dedicated thread;
/// captured frames that pass validation come out of the returned
/// [`FrameReceiver`]. Frames decoded from the tunnel go back onto the wire
/// through [`FrameSink::inject`].
pub struct CaptureEndpoint {
    shared: Arc<Shared>,
}

impl CaptureEndpoint {
    /// Open a raw socket for `kind` on the named interface and start the
    /// receive loop.
    ///
    /// `endian` supplies the host/network conversion for the sockaddr
    /// protocol field. `mode` decides whether PADI frames get their
    /// Host-Uniq tag rewritten before forwarding.
    pub fn open(
        interface_name: &str,
        kind: EndpointKind,
        endian: Endianness,
        mode: Mode,
    ) -> Result<(Self, FrameReceiver)> {
        let interface = Interface::by_name(interface_name)?;
        let protocol_be = endian.htons(kind.ethertype());

        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, i32::from(protocol_be)) };
        if fd < 0 {
            return Err(Error::socket(format!(
                "failed to create {} socket: {}",
                kind.label(),
                io::Error::last_os_error()
            )));
        }

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = protocol_be;
        addr.sll_ifindex = interface.index as i32;

        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::bind(format!(
                "failed to bind {} socket to {}: {}",
                kind.label(),
                interface.name,
                err
            )));
        }

        let shared = Arc::new(Shared {
            kind,
            mode,
            interface,
            fd,
            protocol_be,
            closed: AtomicBool::new(false),
            stats: StatsCounters::default(),
        });

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("pppoxy-{}-rx", kind.label()))
            .spawn(move || receive_loop(worker, tx))?;

        info!(
            "Opened {} endpoint on {} (EtherType 0x{:04x})",
            kind.label(),
            shared.interface,
            kind.ethertype()
        );

        Ok((Self { shared }, rx))
    }

    /// Which stage this endpoint captures
    pub fn kind(&self) -> EndpointKind {
        self.shared.kind
    }

    /// The interface this endpoint is bound to
    pub fn interface(&self) -> &Interface {
        &self.shared.interface
    }

    /// Snapshot of the endpoint's counters
    pub fn stats(&self) -> EndpointStats {
        self.shared.stats.snapshot()
    }

    /// Close the socket and end the receive loop.
    ///
    /// Idempotent; the receive thread notices the closed flag when its
    /// blocking receive fails and exits quietly.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        unsafe { libc::close(self.shared.fd) };

        let stats = self.shared.stats.snapshot();
        info!(
            "Closed {} endpoint on {} ({} frames forwarded, {} injected, {} dropped)",
            self.shared.kind.label(),
            self.shared.interface.name,
            stats.frames_forwarded,
            stats.frames_injected,
            stats.frames_dropped
        );
    }
}

impl FrameSink for CaptureEndpoint {
    fn inject(&self, frame: &[u8]) {
        let label = self.shared.kind.label();

        if frame.len() < pppoe::ETH_HEADER_LEN {
            warn!("Frame too short to inject: {} bytes", frame.len());
            self.shared.stats.record_inject_error();
            return;
        }

        if self.shared.kind == EndpointKind::Session {
            match pppoe::session_event(frame) {
                Some(SessionEvent::EstablishRequest { session_id }) => {
                    info!(
                        "Injecting PPPoE session establishment request, id 0x{:04x}",
                        session_id
                    );
                }
                Some(SessionEvent::TerminateRequest { session_id }) => {
                    info!(
                        "Injecting PPPoE session termination request, id 0x{:04x}",
                        session_id
                    );
                }
                _ => {}
            }
        }

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = self.shared.protocol_be;
        addr.sll_ifindex = self.shared.interface.index as i32;

        let rc = unsafe {
            libc::sendto(
                self.shared.fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            error!(
                "Error injecting {} frame: {}",
                label,
                io::Error::last_os_error()
            );
            self.shared.stats.record_inject_error();
        } else {
            debug!("Injected {} byte {} frame", frame.len(), label);
            self.shared.stats.record_injected(frame.len() as u64);
        }
    }
}

impl Drop for CaptureEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

/// Blocking receive loop; one per endpoint, on its own thread.
///
/// `EINTR` is retried; any other receive error is terminal for the endpoint.
/// There is no supervisory restart for a dead endpoint.
fn receive_loop(shared: Arc<Shared>, tx: mpsc::Sender<Vec<u8>>) {
    let label = shared.kind.label();
    let mut buf = [0u8; RECV_BUFFER_LEN];

    loop {
        let n = unsafe {
            libc::recvfrom(
                shared.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            if shared.closed.load(Ordering::Relaxed) {
                debug!("{} receive loop stopped", label);
            } else {
                error!("Error receiving {} frame: {}", label, err);
            }
            return;
        }

        let n = n as usize;
        shared.stats.record_received(n as u64);

        // Link-layer capture sees noise; drop anything that is not PPPoE
        if !pppoe::is_pppoe(&buf[..n]) {
            shared.stats.record_dropped();
            continue;
        }

        let mut frame = buf[..n].to_vec();

        match shared.kind {
            EndpointKind::Discovery => {
                if shared.mode.is_server() && pppoe::code(&frame) == Some(PppoeCode::PADI) {
                    pppoe::scramble_host_uniq(&mut frame);
                }
            }
            EndpointKind::Session => {
                if let Some(event) = pppoe::session_event(&frame) {
                    log_session_event(event);
                }
            }
        }

        debug!("Forwarding {} byte {} frame", frame.len(), label);
        shared.stats.record_forwarded();

        if tx.blocking_send(frame).is_err() {
            debug!("{} frame consumer gone, stopping receive loop", label);
            return;
        }
    }
}

fn log_session_event(event: SessionEvent) {
    match event {
        SessionEvent::EstablishRequest { session_id } => {
            info!(
                "PPPoE session establishment request, id 0x{:04x}",
                session_id
            );
        }
        SessionEvent::TerminateRequest { session_id } => {
            info!("PPPoE session termination request, id 0x{:04x}", session_id);
        }
        SessionEvent::Control {
            session_id,
            protocol,
        } => {
            debug!(
                "PPPoE session control frame, id 0x{:04x}, protocol 0x{:04x}",
                session_id, protocol
            );
        }
    }
}
