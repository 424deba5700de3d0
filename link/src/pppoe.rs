// PPPoE session framing for Ethernet-class media
//
// Once the discovery stage has established a session, every IPv4 packet
// leaves inside a PPPoE session frame addressed to the access
// concentrator instead of a plain Ethernet II frame.

use crate::codec::{Formatted, ETH_HDR_LEN};
use crate::proto::{Protocol, ETH_P_PPPOE_SESS};
use crate::types::LinkAddress;

/// PPPoE header: version/type, code, session id, length.
pub const PPPOE_HDR_LEN: usize = 6;
/// Payload offset in a session frame: Ethernet header, PPPoE header and
/// the 2-byte PPP protocol field.
pub const PPPOE_PAYLOAD_OFS: usize = ETH_HDR_LEN + PPPOE_HDR_LEN + 2;

const PPPOE_VER_TYPE: u8 = 0x11;
const PPPOE_CODE_SESSION: u8 = 0x00;
/// PPP protocol number for IPv4.
const PPP_P_IPV4: u16 = 0x0021;

/// An established PPPoE session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PppoeSession {
    session_id: u16,
    ac_addr: [u8; 6],
}

impl PppoeSession {
    /// # Arguments
    /// * `session_id` - Session id assigned by the access concentrator
    /// * `ac_addr` - MAC address of the access concentrator
    pub fn new(session_id: u16, ac_addr: [u8; 6]) -> Self {
        Self {
            session_id,
            ac_addr,
        }
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn ac_addr(&self) -> [u8; 6] {
        self.ac_addr
    }

    /// Patch the PPPoE length field once the payload size is known.
    /// The length covers the PPP protocol field plus the IP packet.
    pub(crate) fn patch_length(frame: &mut [u8], payload_len: usize) {
        let len = (payload_len + 2) as u16;
        frame[ETH_HDR_LEN + 4..ETH_HDR_LEN + 6].copy_from_slice(&len.to_be_bytes());
    }
}

/// Build a session frame header towards the access concentrator.
/// The length field stays 0 until `send` knows the payload size.
pub(crate) fn format_session(
    buf: &mut [u8],
    local: &LinkAddress,
    session: &PppoeSession,
) -> Formatted {
    buf[0..6].copy_from_slice(&session.ac_addr);
    let src = local.as_bytes();
    let n = src.len().min(6);
    buf[6..6 + n].copy_from_slice(&src[..n]);
    buf[12..14].copy_from_slice(&ETH_P_PPPOE_SESS.to_be_bytes());

    buf[ETH_HDR_LEN] = PPPOE_VER_TYPE;
    buf[ETH_HDR_LEN + 1] = PPPOE_CODE_SESSION;
    buf[ETH_HDR_LEN + 2..ETH_HDR_LEN + 4].copy_from_slice(&session.session_id.to_be_bytes());
    buf[ETH_HDR_LEN + 4..ETH_HDR_LEN + 6].fill(0);
    buf[ETH_HDR_LEN + 6..ETH_HDR_LEN + 8].copy_from_slice(&PPP_P_IPV4.to_be_bytes());

    Formatted {
        payload_offset: PPPOE_PAYLOAD_OFS,
        protocol: Protocol::PppoeSession,
    }
}
