//! Frame injection seam
//!
//! The trait decouples the link manager from the concrete capture layer so
//! the manager can be exercised against recording sinks in tests.

/// A consumer of raw Ethernet frames decoded from the tunnel.
pub trait FrameSink: Send + Sync {
    /// Hand a complete Ethernet frame to the underlying device.
    ///
    /// Implementations must not fail loudly; a frame that cannot be
    /// delivered is logged and dropped.
    fn inject(&self, frame: &[u8]);
}
