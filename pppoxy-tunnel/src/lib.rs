//! Tunnel transport for pppoxy
//!
//! Everything that moves PPPoE frames between the two proxy halves lives
//! here: the length-prefixed wire codec, the [`Link`] wrapper that gives a
//! TCP connection an exclusive-write discipline, and the [`Proxy`] that owns
//! the connection lifecycle on both sides of the tunnel.

pub mod codec;
pub mod config;
pub mod link;
pub mod proxy;

// Re-export main types
pub use codec::{encode_frame, read_frame, TunnelFrame};
pub use config::ProxyConfig;
pub use link::Link;
pub use proxy::Proxy;
