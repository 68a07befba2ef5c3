//! Network interface lookup

use crate::{Error, MacAddr};
use std::fmt;

/// Network interface
#[derive(Debug, Clone)]
pub struct Interface {
    /// Interface name (e.g., "eth0", "en0")
    pub name: String,
    /// Interface index
    pub index: u32,
    /// MAC address
    pub mac_address: MacAddr,
    /// Is interface up?
    pub is_up: bool,
}

impl Interface {
    /// Get interface by name
    pub fn by_name(name: &str) -> Result<Self, Error> {
        let interfaces = pnet_datalink::interfaces();
        let iface = interfaces
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))?;

        let mac_bytes = if let Some(mac) = iface.mac {
            [mac.0, mac.1, mac.2, mac.3, mac.4, mac.5]
        } else {
            [0, 0, 0, 0, 0, 0]
        };

        Ok(Self {
            name: iface.name.clone(),
            index: iface.index,
            mac_address: MacAddr::new(mac_bytes),
            is_up: iface.is_up(),
        })
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.mac_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_interface() {
        let result = Interface::by_name("does-not-exist0");
        assert!(matches!(result, Err(Error::InterfaceNotFound(_))));
    }

    #[test]
    fn test_loopback_lookup() {
        // Loopback naming differs across systems; tolerate absence
        let result = Interface::by_name("lo").or_else(|_| Interface::by_name("lo0"));
        if let Ok(iface) = result {
            assert!(!iface.name.is_empty());
            assert!(iface.index > 0);
        }
    }
}
