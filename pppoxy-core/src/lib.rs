//! Pppoxy Core Library
//!
//! This crate provides the fundamental types, error handling and byte-order
//! helpers shared by the pppoxy PPPoE tunneling proxy crates.

pub mod endian;
pub mod error;
pub mod interface;
pub mod sink;
pub mod types;

// Re-export commonly used types
pub use endian::Endianness;
pub use error::{Error, Result};
pub use interface::Interface;
pub use sink::FrameSink;
pub use types::{MacAddr, Mode};
