//! Ethernet and PPPoE frame handling for pppoxy
//!
//! This crate provides the byte-level view of the frames the proxy moves
//! around: EtherType constants, the minimal PPPoE header checks applied to
//! every captured frame, Discovery TLV tag scanning and the Host-Uniq
//! rewrite applied to forwarded PADI frames.
//!
//! Frames are treated as opaque byte slices throughout; nothing here
//! re-frames or copies a packet.

pub mod pppoe;

pub use pppoe::{
    is_pppoe, scramble_host_uniq, session_event, PppoeCode, SessionEvent,
    ETHERTYPE_PPPOE_DISCOVERY, ETHERTYPE_PPPOE_SESSION, ETH_HEADER_LEN, MIN_PPPOE_FRAME_LEN,
};
