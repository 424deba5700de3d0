// Per-medium frame formatting and classification
//
// The TCP code above this layer uses Ethernet constants for protocol
// numbers and an all-ones pattern for broadcast on every non-serial
// medium. Each codec translates between that uniform view and the real
// frame layout of its medium, so new media plug in at this level without
// the upper layers noticing.

use crate::error::LinkError;
use crate::pppoe::{self, PppoeSession};
use crate::proto::Protocol;
use crate::types::{LinkAddress, MediumClass};

/// Ethernet II header: destination, source, 16-bit type.
pub const ETH_HDR_LEN: usize = 14;
pub const ETH_MIN: usize = 60;
pub const ETH_MAX: usize = 1514;

/// Token-Ring LLC/SNAP header: AC, FC, destination, source, DSAP, SSAP,
/// control, 3-byte org, 16-bit type.
pub const TOK_HDR_LEN: usize = 22;
pub const TOK_MAX: usize = 4472;

/// FDDI LLC/SNAP header: FC, destination, source, DSAP, SSAP, control,
/// 3-byte org, 16-bit type.
pub const FDDI_HDR_LEN: usize = 21;
pub const FDDI_MIN: usize = 28;
pub const FDDI_MAX: usize = 4500;

/// ARCNET client-data header: source, destination, protocol id, split
/// flag, 16-bit sequence.
pub const ARC_HDR_LEN: usize = 6;
pub const ARC_MAX: usize = 508;

/// Size of an IPv4 header, cleared by the header-less formatters.
pub const IP_HDR_LEN: usize = 20;

/// Transmit buffers are sized for the largest frame any codec emits.
pub const TX_BUF_LEN: usize = FDDI_MAX;

// Fixed LLC/SNAP bytes shared by the Token-Ring and FDDI headers.
const TOK_AC: u8 = 0x10;
const TOK_FC: u8 = 0x40;
const FDDI_FC: u8 = 0x57;
const LLC_DSAP: u8 = 0xAA;
const LLC_SSAP: u8 = 0xAA;
const LLC_CTRL: u8 = 0x03;
const SNAP_ORG: u8 = 0x00;

// Token-Ring routing information field bits.
const TOK_RII: u8 = 0x80;
const TOK_RIF_LEN_MASK: u8 = 0x1F;

/// Result of formatting a header into a transmit buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Formatted {
    /// Offset of the network-layer payload behind the link header.
    pub payload_offset: usize,
    /// Protocol actually placed in the header. May differ from the one
    /// requested (PPPoE session rewrite, ARCNET identifier mapping).
    pub protocol: Protocol,
}

/// Result of classifying a raw received frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classified {
    /// Offset of the (possibly normalised) link header in the raw bytes.
    /// Non-zero only after Token-Ring RIF stripping.
    pub header_offset: usize,
    /// Offset of the network-layer payload in the raw bytes.
    pub payload_offset: usize,
    pub protocol: Protocol,
    pub is_broadcast: bool,
}

/// The framing rules of one medium class.
///
/// The medium set is fixed and known at initialisation, so this is a
/// closed enum rather than dynamic dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameCodec {
    Ethernet,
    TokenRing,
    Fddi,
    Arcnet,
    /// SLIP/PPP/AX.25: no link header, the frame is the IP packet.
    Serial,
    /// Fallback when no back-end is available. Formats like a serial
    /// link; transmission silently succeeds without touching hardware.
    Null,
}

impl FrameCodec {
    pub fn for_medium(medium: MediumClass) -> Self {
        match medium {
            MediumClass::Ethernet => FrameCodec::Ethernet,
            MediumClass::TokenRing | MediumClass::TokenRingRif => FrameCodec::TokenRing,
            MediumClass::Fddi => FrameCodec::Fddi,
            MediumClass::Arcnet => FrameCodec::Arcnet,
            MediumClass::Slip | MediumClass::Ppp | MediumClass::Ax25 => FrameCodec::Serial,
        }
    }

    /// Standard link header size for this medium.
    pub fn header_len(&self) -> usize {
        match self {
            FrameCodec::Ethernet => ETH_HDR_LEN,
            FrameCodec::TokenRing => TOK_HDR_LEN,
            FrameCodec::Fddi => FDDI_HDR_LEN,
            FrameCodec::Arcnet => ARC_HDR_LEN,
            FrameCodec::Serial | FrameCodec::Null => 0,
        }
    }

    /// Frames below this length are padded up before transmission.
    pub fn min_frame_len(&self) -> usize {
        match self {
            FrameCodec::Ethernet => ETH_MIN,
            FrameCodec::Fddi => FDDI_MIN,
            // Token-Ring, ARCNET and serial links have no minimum.
            _ => 0,
        }
    }

    /// Frames above this length are truncated before transmission.
    pub fn max_frame_len(&self, mtu: usize) -> usize {
        match self {
            FrameCodec::Ethernet => ETH_MAX,
            FrameCodec::TokenRing => TOK_MAX,
            FrameCodec::Fddi => FDDI_MAX,
            FrameCodec::Arcnet => ARC_MAX,
            FrameCodec::Serial => mtu,
            FrameCodec::Null => usize::MAX,
        }
    }

    /// Clamp a link-layer frame length to the medium's limits.
    /// Padding bytes were already zeroed by `format`.
    pub fn clamp_frame_len(&self, len: usize, mtu: usize) -> usize {
        len.max(self.min_frame_len()).min(self.max_frame_len(mtu))
    }

    /// The codecs without a link header carry bare IP packets.
    pub fn is_headerless(&self) -> bool {
        matches!(self, FrameCodec::Serial | FrameCodec::Null)
    }

    /// Build the link header for `protocol` towards `dest` into `buf`.
    ///
    /// `buf` must be at least `min_frame_len()` + `header_len()` bytes;
    /// the transmit buffer manager guarantees this. A `dest` of `None`
    /// leaves the destination field untouched.
    ///
    /// # Returns
    /// The payload offset and the protocol recorded in the header.
    pub fn format(
        &self,
        buf: &mut [u8],
        local: &LinkAddress,
        dest: Option<&LinkAddress>,
        protocol: Protocol,
        pppoe: Option<&PppoeSession>,
    ) -> Formatted {
        match self {
            FrameCodec::Ethernet => {
                // Clear any remains of an old small packet.
                buf[ETH_HDR_LEN..ETH_MIN].fill(0);

                if protocol == Protocol::Ipv4 {
                    if let Some(session) = pppoe {
                        return pppoe::format_session(buf, local, session);
                    }
                }

                if let Some(d) = dest {
                    put_addr(&mut buf[0..6], d);
                }
                put_addr(&mut buf[6..12], local);
                buf[12..14].copy_from_slice(&protocol.ether_type().to_be_bytes());
                Formatted {
                    payload_offset: ETH_HDR_LEN,
                    protocol,
                }
            }
            FrameCodec::TokenRing => {
                // No need to clear data behind the header.
                buf[0] = TOK_AC;
                buf[1] = TOK_FC;
                if let Some(d) = dest {
                    put_addr(&mut buf[2..8], d);
                }
                put_addr(&mut buf[8..14], local);
                buf[14] = LLC_DSAP;
                buf[15] = LLC_SSAP;
                buf[16] = LLC_CTRL;
                buf[17..20].fill(SNAP_ORG);
                buf[20..22].copy_from_slice(&protocol.ether_type().to_be_bytes());
                Formatted {
                    payload_offset: TOK_HDR_LEN,
                    protocol,
                }
            }
            FrameCodec::Fddi => {
                buf[FDDI_HDR_LEN..FDDI_MIN].fill(0);
                buf[0] = FDDI_FC;
                if let Some(d) = dest {
                    put_addr(&mut buf[1..7], d);
                }
                put_addr(&mut buf[7..13], local);
                buf[13] = LLC_DSAP;
                buf[14] = LLC_SSAP;
                buf[15] = LLC_CTRL;
                buf[16..19].fill(SNAP_ORG);
                buf[19..21].copy_from_slice(&protocol.ether_type().to_be_bytes());
                Formatted {
                    payload_offset: FDDI_HDR_LEN,
                    protocol,
                }
            }
            FrameCodec::Arcnet => {
                // Broadcast is the literal station number 0 on this medium.
                let dest_byte = match dest {
                    None => 0x00,
                    Some(d) if is_all_ones(d) => 0x00,
                    Some(d) => d.first_byte(),
                };
                buf[0] = local.first_byte();
                buf[1] = dest_byte;
                buf[2] = protocol.to_arcnet();
                buf[3] = 0; // split flag
                buf[4..6].fill(0); // sequence
                Formatted {
                    payload_offset: ARC_HDR_LEN,
                    protocol,
                }
            }
            FrameCodec::Serial | FrameCodec::Null => {
                // Nothing to format; clear where the IP header will go so
                // a failed fill never transmits stale bytes.
                buf[..IP_HDR_LEN].fill(0);
                let protocol = if protocol == Protocol::Ipv6 {
                    Protocol::Ipv6
                } else {
                    Protocol::Ipv4
                };
                Formatted {
                    payload_offset: 0,
                    protocol,
                }
            }
        }
    }

    /// Classify a raw inbound frame and normalise its header in place.
    ///
    /// # Errors
    /// [`LinkError::FrameRejected`] for truncated frames, ARCNET exception
    /// frames and ARCNET protocols other than IPv4/ARP.
    pub fn classify(&self, frame: &mut [u8]) -> Result<Classified, LinkError> {
        match self {
            FrameCodec::Ethernet => {
                if frame.len() < ETH_HDR_LEN {
                    return Err(LinkError::FrameRejected);
                }
                let protocol = Protocol::from_ether_type(read_be16(&frame[12..14]));
                Ok(Classified {
                    header_offset: 0,
                    payload_offset: ETH_HDR_LEN,
                    protocol,
                    is_broadcast: is_all_ones_raw(&frame[0..6]),
                })
            }
            FrameCodec::TokenRing => {
                log::trace!("tok raw: {:02x?}", &frame[..frame.len().min(50)]);
                if frame.len() < TOK_HDR_LEN {
                    return Err(LinkError::FrameRejected);
                }

                let mut base = 0;
                let mut rif_broadcast = false;
                if frame[8] & TOK_RII != 0 {
                    // Source routed: the routing control field sits where
                    // the DSAP otherwise starts.
                    let rcf0 = frame[14];
                    let rif_len = (rcf0 & TOK_RIF_LEN_MASK) as usize;
                    rif_broadcast = (rcf0 >> 5) >= 4;
                    if frame.len() < TOK_HDR_LEN + rif_len {
                        return Err(LinkError::FrameRejected);
                    }

                    frame[8] &= !TOK_RII;
                    if rif_broadcast {
                        // Keep downstream broadcast testing uniform.
                        frame[2] |= 0x01;
                    }

                    // Drop the RIF by moving the MAC bytes up against the
                    // LLC part of the header.
                    frame.copy_within(0..14, rif_len);
                    base = rif_len;
                }

                let protocol =
                    Protocol::from_ether_type(read_be16(&frame[base + 20..base + 22]));
                let is_broadcast = rif_broadcast || is_all_ones_raw(&frame[base + 2..base + 8]);
                Ok(Classified {
                    header_offset: base,
                    payload_offset: base + TOK_HDR_LEN,
                    protocol,
                    is_broadcast,
                })
            }
            FrameCodec::Fddi => {
                if frame.len() < FDDI_HDR_LEN {
                    return Err(LinkError::FrameRejected);
                }
                let protocol = Protocol::from_ether_type(read_be16(&frame[19..21]));
                Ok(Classified {
                    header_offset: 0,
                    payload_offset: FDDI_HDR_LEN,
                    protocol,
                    is_broadcast: is_all_ones_raw(&frame[1..7]),
                })
            }
            FrameCodec::Arcnet => {
                log::trace!("arc raw: {:02x?}", &frame[..frame.len().min(50)]);
                if frame.len() < ARC_HDR_LEN {
                    return Err(LinkError::FrameRejected);
                }
                let protocol = Protocol::from_arcnet(frame[2]);
                let exception = frame[3] == 0xFF;
                if exception || !matches!(protocol, Protocol::Ipv4 | Protocol::Arp) {
                    return Err(LinkError::FrameRejected);
                }
                Ok(Classified {
                    header_offset: 0,
                    payload_offset: ARC_HDR_LEN,
                    protocol,
                    is_broadcast: frame[1] == 0,
                })
            }
            FrameCodec::Serial | FrameCodec::Null => {
                if frame.is_empty() {
                    return Err(LinkError::FrameRejected);
                }
                // No MAC header: the IP version nibble is all we have.
                // Point-to-point links have no broadcast concept.
                let protocol = if frame[0] >> 4 == 4 {
                    Protocol::Ipv4
                } else {
                    Protocol::Ipv6
                };
                Ok(Classified {
                    header_offset: 0,
                    payload_offset: 0,
                    protocol,
                    is_broadcast: false,
                })
            }
        }
    }

    /// Whether the destination field of an already-normalised frame is the
    /// medium broadcast. Used for frames supplied by a receive hook, which
    /// bypass `classify`.
    pub fn wire_broadcast(&self, frame: &[u8]) -> bool {
        match self {
            FrameCodec::Ethernet => frame.len() >= 6 && is_all_ones_raw(&frame[0..6]),
            FrameCodec::TokenRing => frame.len() >= 8 && is_all_ones_raw(&frame[2..8]),
            FrameCodec::Fddi => frame.len() >= 7 && is_all_ones_raw(&frame[1..7]),
            FrameCodec::Arcnet => frame.len() >= 2 && frame[1] == 0,
            FrameCodec::Serial | FrameCodec::Null => false,
        }
    }

    /// Overwrite the source address field of a formatted frame.
    /// The loopback shim uses this to stamp its pseudo device address.
    pub(crate) fn set_source(&self, frame: &mut [u8], source: &LinkAddress) {
        match self {
            FrameCodec::Ethernet => put_addr(&mut frame[6..12], source),
            FrameCodec::TokenRing => put_addr(&mut frame[8..14], source),
            FrameCodec::Fddi => put_addr(&mut frame[7..13], source),
            FrameCodec::Arcnet => frame[0] = source.first_byte(),
            FrameCodec::Serial | FrameCodec::Null => {}
        }
    }
}

/// Copy an address into a fixed header field, zero-filling the tail when
/// the address is shorter than the field.
fn put_addr(field: &mut [u8], addr: &LinkAddress) {
    let bytes = addr.as_bytes();
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
    field[n..].fill(0);
}

fn read_be16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn is_all_ones_raw(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0xFF)
}

fn is_all_ones(addr: &LinkAddress) -> bool {
    !addr.is_empty() && is_all_ones_raw(addr.as_bytes())
}
