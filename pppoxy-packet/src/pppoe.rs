//! PPPoE frame structures and byte-level helpers
//!
//! Captured frames keep their Ethernet header, so all offsets below are
//! relative to the start of the frame: [0, 14) Ethernet header, [14, 20)
//! PPPoE header, tags or PPP payload from 20 on.

/// PPPoE Discovery stage EtherType
pub const ETHERTYPE_PPPOE_DISCOVERY: u16 = 0x8863;
/// PPPoE Session stage EtherType
pub const ETHERTYPE_PPPOE_SESSION: u16 = 0x8864;

/// Ethernet header size (dst + src + type)
pub const ETH_HEADER_LEN: usize = 14;
/// Minimum PPPoE header size (ver/type, code, session id, length)
pub const PPPOE_HEADER_LEN: usize = 6;
/// Smallest frame worth looking at: Ethernet header plus PPPoE header
pub const MIN_PPPOE_FRAME_LEN: usize = ETH_HEADER_LEN + PPPOE_HEADER_LEN;

/// Combined version/type byte for PPPoE version 1, type 1
pub const PPPOE_VER_TYPE: u8 = 0x11;

/// Discovery tags start right after the PPPoE header
const TAG_OFFSET: usize = MIN_PPPOE_FRAME_LEN;

/// Byte XORed over Host-Uniq tag values when a PADI crosses the tunnel.
///
/// A fixed mask, so this only decorrelates the forwarded PADI from the
/// original; it is not a cryptographic transform.
pub const HOST_UNIQ_MASK: u8 = 0x42;

/// PPPoE Discovery tag types
pub mod tags {
    pub const END_OF_LIST: u16 = 0x0000;
    pub const SERVICE_NAME: u16 = 0x0101;
    pub const AC_NAME: u16 = 0x0102;
    pub const HOST_UNIQ: u16 = 0x0103;
    pub const AC_COOKIE: u16 = 0x0104;
}

/// PPP protocol numbers carried in session frames
pub mod ppp {
    /// Link Control Protocol
    pub const LCP: u16 = 0xc021;
    /// IPv4 in PPP
    pub const IPV4: u16 = 0x0021;

    /// LCP Configure-Request code
    pub const LCP_CONFIGURE_REQUEST: u8 = 1;
    /// LCP Terminate-Request code
    pub const LCP_TERMINATE_REQUEST: u8 = 5;
    /// LCP Echo-Request code (keepalive)
    pub const LCP_ECHO_REQUEST: u8 = 9;
}

/// PPPoE Discovery/Session Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PppoeCode {
    /// PADI - PPPoE Active Discovery Initiation (client broadcast)
    PADI = 0x09,
    /// PADO - PPPoE Active Discovery Offer (server unicast)
    PADO = 0x07,
    /// PADR - PPPoE Active Discovery Request (client unicast)
    PADR = 0x19,
    /// PADS - PPPoE Active Discovery Session-confirmation (server unicast)
    PADS = 0x65,
    /// PADT - PPPoE Active Discovery Terminate (either party)
    PADT = 0xA7,
    /// Session data packet
    SessionData = 0x00,
}

impl PppoeCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x09 => Some(Self::PADI),
            0x07 => Some(Self::PADO),
            0x19 => Some(Self::PADR),
            0x65 => Some(Self::PADS),
            0xA7 => Some(Self::PADT),
            0x00 => Some(Self::SessionData),
            _ => None,
        }
    }
}

/// Check whether a captured frame is long enough to carry PPPoE and has the
/// version 1 / type 1 marker. Anything else is broadcast noise and dropped.
pub fn is_pppoe(frame: &[u8]) -> bool {
    frame.len() >= MIN_PPPOE_FRAME_LEN && frame[ETH_HEADER_LEN] == PPPOE_VER_TYPE
}

/// PPPoE code byte of a frame that already passed [`is_pppoe`]
pub fn code(frame: &[u8]) -> Option<PppoeCode> {
    PppoeCode::from_u8(frame[ETH_HEADER_LEN + 1])
}

/// Session id of a frame that already passed [`is_pppoe`]
pub fn session_id(frame: &[u8]) -> u16 {
    u16::from_be_bytes([frame[ETH_HEADER_LEN + 2], frame[ETH_HEADER_LEN + 3]])
}

/// Rewrite the Host-Uniq tag of a PADI frame in place.
///
/// Scans the Discovery TLVs from offset 20. On the first Host-Uniq tag every
/// value byte is XORed with [`HOST_UNIQ_MASK`] and the scan stops. A tag
/// whose declared length runs past the frame end aborts the scan; a frame
/// without a Host-Uniq tag is left unchanged.
pub fn scramble_host_uniq(frame: &mut [u8]) {
    let mut offset = TAG_OFFSET;

    while offset + 4 <= frame.len() {
        let tag_type = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
        let tag_len = u16::from_be_bytes([frame[offset + 2], frame[offset + 3]]) as usize;

        if tag_type == tags::HOST_UNIQ && offset + 4 + tag_len <= frame.len() {
            for byte in &mut frame[offset + 4..offset + 4 + tag_len] {
                *byte ^= HOST_UNIQ_MASK;
            }
            return;
        }

        offset += 4 + tag_len;

        if tag_type == tags::END_OF_LIST {
            break;
        }
    }
}

/// Noteworthy event extracted from a session frame, used for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// LCP Configure-Request: a session is being established
    EstablishRequest { session_id: u16 },
    /// LCP Terminate-Request: a session is going away
    TerminateRequest { session_id: u16 },
    /// Any other non-data PPP protocol (authentication, NCP negotiation)
    Control { session_id: u16, protocol: u16 },
}

/// Classify a session frame for logging.
///
/// Returns `None` for plain data traffic, LCP echo keepalives and padding,
/// which are far too frequent to log.
pub fn session_event(frame: &[u8]) -> Option<SessionEvent> {
    if frame.len() < MIN_PPPOE_FRAME_LEN + 2 {
        return None;
    }

    let session_id = session_id(frame);
    let protocol = u16::from_be_bytes([
        frame[MIN_PPPOE_FRAME_LEN],
        frame[MIN_PPPOE_FRAME_LEN + 1],
    ]);

    match protocol {
        ppp::LCP => {
            let lcp_code = *frame.get(MIN_PPPOE_FRAME_LEN + 2)?;
            match lcp_code {
                ppp::LCP_CONFIGURE_REQUEST => Some(SessionEvent::EstablishRequest { session_id }),
                ppp::LCP_TERMINATE_REQUEST => Some(SessionEvent::TerminateRequest { session_id }),
                _ => None,
            }
        }
        ppp::IPV4 => None,
        0 => None,
        other => Some(SessionEvent::Control {
            session_id,
            protocol: other,
        }),
    }
}
