//! Common types used throughout pppoxy

use std::fmt;
use std::str::FromStr;

/// MAC Address (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Create a new MAC address
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Zero MAC address (00:00:00:00:00:00)
    pub const fn zero() -> Self {
        Self([0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
    }

    /// Get bytes as slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to array
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Operating mode of the proxy
///
/// The server side binds the interface that faces the ISP; the client side
/// binds the interface that faces the local PPP client and dials the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Accept tunnel connections and face the real PPPoE segment
    Server,
    /// Dial the server and forward local PPPoE traffic through it
    Client,
}

impl Mode {
    /// Is this the server side?
    pub fn is_server(self) -> bool {
        self == Mode::Server
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Server => write!(f, "server"),
            Mode::Client => write!(f, "client"),
        }
    }
}

impl FromStr for Mode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Mode::Server),
            "client" => Ok(Mode::Client),
            other => Err(crate::Error::invalid_parameter(
                "mode".to_string(),
                format!("'{}' is not 'client' or 'server'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_addr_display() {
        let mac = MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(format!("{}", mac), "00:11:22:33:44:55");
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("server".parse::<Mode>().unwrap(), Mode::Server);
        assert_eq!("client".parse::<Mode>().unwrap(), Mode::Client);
        assert!("bridge".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_is_server() {
        assert!(Mode::Server.is_server());
        assert!(!Mode::Client.is_server());
    }
}
