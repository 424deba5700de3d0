// Link-level addresses and medium classes

use core::fmt;

/// Largest link-level address carried by any supported medium.
/// Ethernet/Token-Ring/FDDI use 6 bytes, ARCNET 1 byte, AX.25 7 bytes.
pub const MAX_ADDR_LEN: usize = 8;

/// A link-layer address of medium-dependent length.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkAddress {
    len: u8,
    bytes: [u8; MAX_ADDR_LEN],
}

impl LinkAddress {
    /// The empty address, used by header-less serial media.
    pub const EMPTY: LinkAddress = LinkAddress {
        len: 0,
        bytes: [0; MAX_ADDR_LEN],
    };

    /// Create an address from raw bytes.
    ///
    /// Panics if `bytes` is longer than [`MAX_ADDR_LEN`].
    pub fn new(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= MAX_ADDR_LEN, "link address too long");
        let mut addr = LinkAddress {
            len: bytes.len() as u8,
            bytes: [0; MAX_ADDR_LEN],
        };
        addr.bytes[..bytes.len()].copy_from_slice(bytes);
        addr
    }

    /// An address of `len` bytes all set to `pattern`.
    pub fn filled(pattern: u8, len: usize) -> Self {
        assert!(len <= MAX_ADDR_LEN, "link address too long");
        let mut addr = LinkAddress {
            len: len as u8,
            bytes: [0; MAX_ADDR_LEN],
        };
        addr.bytes[..len].fill(pattern);
        addr
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First byte of the address, or 0 for the empty address.
    /// ARCNET back-ends address stations by this single byte.
    pub fn first_byte(&self) -> u8 {
        if self.len == 0 {
            0
        } else {
            self.bytes[0]
        }
    }
}

impl fmt::Debug for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<none>");
        }
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Hardware address type/length pair as used in ARP and BOOTP/DHCP frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HwAddr {
    pub hw_type: u8,
    pub hw_len: u8,
}

/// The link-layer technology the driver was initialised for.
///
/// Selected once by the back-end at initialisation and immutable for the
/// lifetime of the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediumClass {
    Ethernet,
    TokenRing,
    /// Token-Ring with source routing (RIF) enabled on the segment.
    TokenRingRif,
    Fddi,
    Arcnet,
    Slip,
    Ppp,
    Ax25,
}

impl MediumClass {
    /// Serial point-to-point media carry no link header at all.
    pub fn is_serial(self) -> bool {
        matches!(self, MediumClass::Slip | MediumClass::Ppp | MediumClass::Ax25)
    }

    /// Length of a station address on this medium.
    pub fn addr_len(self) -> usize {
        match self {
            MediumClass::Ethernet
            | MediumClass::TokenRing
            | MediumClass::TokenRingRif
            | MediumClass::Fddi => 6,
            MediumClass::Arcnet => 1,
            MediumClass::Ax25 => 7,
            MediumClass::Slip | MediumClass::Ppp => 0,
        }
    }

    /// The broadcast pattern upper layers compare against.
    ///
    /// Callers use Ethernet-style all-ones addresses for every non-serial
    /// medium; the ARCNET codec maps this to the wire value 0 on its own.
    pub fn broadcast(self) -> LinkAddress {
        if self.is_serial() {
            LinkAddress::EMPTY
        } else {
            LinkAddress::filled(0xFF, 6)
        }
    }

    /// Hardware address type/length for ARP and BOOTP framing.
    /// Serial media have no hardware addressing.
    pub fn hw_addr(self) -> Option<HwAddr> {
        match self {
            MediumClass::Ethernet | MediumClass::Fddi => Some(HwAddr {
                hw_type: 1,
                hw_len: 6,
            }),
            MediumClass::TokenRing | MediumClass::TokenRingRif => Some(HwAddr {
                hw_type: 6,
                hw_len: 6,
            }),
            MediumClass::Arcnet => Some(HwAddr {
                hw_type: 7,
                hw_len: 1,
            }),
            MediumClass::Ax25 => Some(HwAddr {
                hw_type: 3,
                hw_len: 7,
            }),
            MediumClass::Slip | MediumClass::Ppp => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_patterns() {
        assert_eq!(
            MediumClass::Ethernet.broadcast().as_bytes(),
            &[0xFF; 6][..]
        );
        assert_eq!(MediumClass::Arcnet.broadcast().as_bytes(), &[0xFF; 6][..]);
        assert!(MediumClass::Ppp.broadcast().is_empty());
    }

    #[test]
    fn address_display() {
        use alloc::format;

        let addr = LinkAddress::new(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(format!("{}", addr), "aa:bb:cc:dd:ee:ff");
        assert_eq!(addr.first_byte(), 0xAA);
    }
}
