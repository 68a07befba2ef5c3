//! Raw packet capture and injection for pppoxy
//!
//! This crate owns the link-layer boundary of the proxy. Each
//! [`CaptureEndpoint`] wraps one `AF_PACKET` socket bound to a named
//! interface and filtered to a single PPPoE EtherType, runs a blocking
//! receive loop on its own thread and hands validated frames to the tunnel
//! through a bounded queue. The same socket is used to inject frames coming
//! back out of the tunnel onto the wire.

pub mod endpoint;
pub mod stats;

// Re-export main types
pub use endpoint::{CaptureEndpoint, EndpointKind, FrameReceiver};
pub use stats::EndpointStats;
