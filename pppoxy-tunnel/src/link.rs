//! Tunnel link: one TCP connection with an exclusive-write discipline

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use pppoxy_core::Result;

use crate::codec::{encode_frame, TunnelFrame};

/// One tunnel connection.
///
/// The write half sits behind a lock so that a frame written by one task is
/// never interleaved with a frame written by another; the read half is
/// handed to the single decode loop that owns it.
pub struct Link {
    remote_addr: String,
    writer: Mutex<OwnedWriteHalf>,
}

impl Link {
    /// Wrap an established connection.
    ///
    /// Returns the shared link handle plus the read half for the caller's
    /// decode loop.
    pub fn split(stream: TcpStream) -> Result<(Arc<Self>, OwnedReadHalf)> {
        let remote_addr = stream.peer_addr()?.to_string();
        let (reader, writer) = stream.into_split();
        let link = Arc::new(Self {
            remote_addr,
            writer: Mutex::new(writer),
        });
        Ok((link, reader))
    }

    /// Remote address of the peer, used as the registry key
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Encode and write one frame atomically with respect to other senders
    pub async fn send(&self, frame: &TunnelFrame) -> Result<()> {
        self.send_encoded(&encode_frame(frame)).await
    }

    /// Write an already-encoded frame.
    ///
    /// Fan-out encodes a frame once and calls this per link.
    pub async fn send_encoded(&self, bytes: &Bytes) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        Ok(())
    }

    /// Shut the write side down.
    ///
    /// The peer observes end-of-stream; whatever decode loop owns our read
    /// half ends on its next read.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
