//! Tunnel wire codec
//!
//! Every tunnel frame on the wire is `[u16 type, big endian][unsigned varint
//! length][length payload bytes]`. The varint is LEB128-style: seven data
//! bits per byte, high bit set on continuation bytes.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use pppoxy_core::{Error, Result};

/// Keepalive probe, empty payload
pub const TYPE_PING: u16 = 0;
/// Keepalive answer, empty payload
pub const TYPE_PONG: u16 = 1;
/// Payload is a raw PPPoE Discovery Ethernet frame
pub const TYPE_DISCOVERY: u16 = 2;
/// Payload is a raw PPPoE Session Ethernet frame
pub const TYPE_SESSION: u16 = 3;

/// Largest accepted Discovery/Session payload
pub const MAX_FRAME_PAYLOAD: usize = 65536;

/// Largest payload of an unrecognized frame type that will be discarded
/// instead of killing the connection
const MAX_SKIP_PAYLOAD: u64 = 1_048_576;

/// Starting size for a decode buffer; grows on demand up to
/// [`MAX_FRAME_PAYLOAD`]
pub const INITIAL_BUFFER_LEN: usize = 4096;

/// A varint may shift in at most this many bits; continuation beyond it is
/// an encoding error
const MAX_VARINT_SHIFT: u32 = 63;

/// One frame of the tunnel protocol.
///
/// The enum is closed on purpose; adding a wire type means adding a variant
/// and the compiler will point at every match that needs to learn about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelFrame {
    /// Keepalive probe
    Ping,
    /// Keepalive answer
    Pong,
    /// A captured PPPoE Discovery frame
    Discovery(Vec<u8>),
    /// A captured PPPoE Session frame
    Session(Vec<u8>),
}

impl TunnelFrame {
    /// Wire value of this frame's type field
    pub fn wire_type(&self) -> u16 {
        match self {
            TunnelFrame::Ping => TYPE_PING,
            TunnelFrame::Pong => TYPE_PONG,
            TunnelFrame::Discovery(_) => TYPE_DISCOVERY,
            TunnelFrame::Session(_) => TYPE_SESSION,
        }
    }

    /// Payload bytes; empty for ping and pong
    pub fn payload(&self) -> &[u8] {
        match self {
            TunnelFrame::Ping | TunnelFrame::Pong => &[],
            TunnelFrame::Discovery(payload) | TunnelFrame::Session(payload) => payload,
        }
    }

    /// Short name used in logs
    pub fn label(&self) -> &'static str {
        match self {
            TunnelFrame::Ping => "ping",
            TunnelFrame::Pong => "pong",
            TunnelFrame::Discovery(_) => "discovery",
            TunnelFrame::Session(_) => "session",
        }
    }
}

/// Encode a frame into a single buffer.
///
/// The whole frame is materialized up front so a link can put it on the
/// stream with one locked write and concurrent senders can never interleave.
pub fn encode_frame(frame: &TunnelFrame) -> Bytes {
    let payload = frame.payload();
    let mut buf = BytesMut::with_capacity(2 + 10 + payload.len());
    buf.put_u16(frame.wire_type());
    put_varint(&mut buf, payload.len() as u64);
    buf.put_slice(payload);
    buf.freeze()
}

/// Append `value` as an unsigned LEB128 varint
pub fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Read an unsigned LEB128 varint one byte at a time.
///
/// A value that keeps its continuation bit set past ten bytes is rejected;
/// that is an encoding error, not something to resynchronize from.
pub async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).await?;
        let b = byte[0];

        value |= u64::from(b & 0x7f) << shift;
        shift += 7;

        if b & 0x80 == 0 {
            return Ok(value);
        }
        if shift > MAX_VARINT_SHIFT {
            return Err(Error::frame("varint length too large"));
        }
    }
}

/// Read the next tunnel frame from `reader`.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before a new
/// frame began; end-of-stream anywhere else is an error. `buffer` is the
/// caller's receive scratch space and grows on demand up to
/// [`MAX_FRAME_PAYLOAD`]; a declared length beyond that terminates the
/// connection. Frames of unrecognized type have their payload discarded
/// (up to [`MAX_SKIP_PAYLOAD`]) and reading continues with the next frame.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
) -> Result<Option<TunnelFrame>> {
    loop {
        let mut type_buf = [0u8; 2];
        match reader.read_exact(&mut type_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let packet_type = u16::from_be_bytes(type_buf);
        let length = read_varint(reader).await?;

        match packet_type {
            TYPE_PING => return Ok(Some(TunnelFrame::Ping)),
            TYPE_PONG => return Ok(Some(TunnelFrame::Pong)),
            TYPE_DISCOVERY | TYPE_SESSION => {
                if length > MAX_FRAME_PAYLOAD as u64 {
                    return Err(Error::frame(format!("payload too large: {} bytes", length)));
                }
                let len = length as usize;
                if len > buffer.len() {
                    buffer.resize(len, 0);
                }
                if len > 0 {
                    reader.read_exact(&mut buffer[..len]).await?;
                }
                let payload = buffer[..len].to_vec();
                return Ok(Some(if packet_type == TYPE_DISCOVERY {
                    TunnelFrame::Discovery(payload)
                } else {
                    TunnelFrame::Session(payload)
                }));
            }
            other => {
                if length > MAX_SKIP_PAYLOAD {
                    return Err(Error::frame(format!(
                        "unknown frame type {} too large to skip: {} bytes",
                        other, length
                    )));
                }
                warn!("Unknown tunnel frame type {}, skipping {} bytes", other, length);
                discard(reader, length).await?;
            }
        }
    }
}

/// Read and drop `remaining` bytes
async fn discard<R: AsyncRead + Unpin>(reader: &mut R, mut remaining: u64) -> Result<()> {
    let mut scratch = [0u8; 1024];
    while remaining > 0 {
        let chunk = remaining.min(scratch.len() as u64) as usize;
        reader.read_exact(&mut scratch[..chunk]).await?;
        remaining -= chunk as u64;
    }
    Ok(())
}
