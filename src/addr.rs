//! SCION addressing primitives.
//!
//! An endpoint is identified by an ISD-AD tuple: a 12-bit isolation domain
//! and a 20-bit autonomous domain, packed into one 32-bit word on the wire.

use crate::{SciondError, SciondResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Bits occupied by the AD part of a packed ISD-AD word.
const AD_BITS: u32 = 20;
const AD_MASK: u32 = (1 << AD_BITS) - 1;
const ISD_MASK: u16 = 0xFFF;

/// ISD-AD identifier: 12-bit isolation domain, 20-bit autonomous domain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct IsdAd {
    isd: u16,
    ad: u32,
}

impl IsdAd {
    /// Length of the packed wire form in bytes.
    pub const LEN: usize = 4;

    /// Create a new identifier. Out-of-range bits are masked off.
    pub fn new(isd: u16, ad: u32) -> Self {
        Self {
            isd: isd & ISD_MASK,
            ad: ad & AD_MASK,
        }
    }

    pub fn isd(&self) -> u16 {
        self.isd
    }

    pub fn ad(&self) -> u32 {
        self.ad
    }

    /// Pack into the single 32-bit wire word `(isd << 20) | ad`.
    pub fn to_u32(self) -> u32 {
        ((self.isd as u32) << AD_BITS) | self.ad
    }

    pub fn from_u32(bits: u32) -> Self {
        Self {
            isd: (bits >> AD_BITS) as u16,
            ad: bits & AD_MASK,
        }
    }

    /// Little-endian raw form used on the local API.
    pub fn to_raw(self) -> [u8; Self::LEN] {
        self.to_u32().to_le_bytes()
    }

    pub fn from_raw(raw: &[u8]) -> SciondResult<Self> {
        let bytes: [u8; Self::LEN] = raw.try_into().map_err(|_| {
            SciondError::Codec(format!(
                "ISD-AD raw form needs {} bytes, got {}",
                Self::LEN,
                raw.len()
            ))
        })?;
        Ok(Self::from_u32(u32::from_le_bytes(bytes)))
    }
}

impl fmt::Display for IsdAd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.isd, self.ad)
    }
}

/// Endhost address. Only IPv4 is representable on the local API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddr(pub Ipv4Addr);

impl HostAddr {
    /// Length of the packed form in bytes.
    pub const LEN: usize = 4;

    /// Dummy address used as the forwarding hop of the empty path.
    pub fn unspecified() -> Self {
        Self(Ipv4Addr::UNSPECIFIED)
    }

    pub fn pack(&self) -> [u8; Self::LEN] {
        self.0.octets()
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.0
    }
}

impl From<Ipv4Addr> for HostAddr {
    fn from(ip: Ipv4Addr) -> Self {
        Self(ip)
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let addr = IsdAd::new(1, 10);
        assert_eq!(addr.to_u32(), (1 << 20) | 10);

        let addr = IsdAd::new(0xFFF, 0xFFFFF);
        assert_eq!(addr.to_u32(), u32::MAX);
    }

    #[test]
    fn test_out_of_range_bits_masked() {
        let addr = IsdAd::new(0xF123, 0x12F_FFFF);
        assert_eq!(addr.isd(), 0x123);
        assert_eq!(addr.ad(), 0xF_FFFF);
    }

    #[test]
    fn test_raw_round_trip() {
        let addr = IsdAd::new(7, 42);
        let raw = addr.to_raw();
        assert_eq!(IsdAd::from_raw(&raw).unwrap(), addr);
        // little-endian: low byte first
        assert_eq!(raw[0], 42);
    }

    #[test]
    fn test_from_raw_rejects_short_input() {
        assert!(IsdAd::from_raw(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(IsdAd::new(1, 10).to_string(), "1-10");
    }

    #[test]
    fn test_host_addr_pack() {
        let host = HostAddr(Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(host.pack(), [127, 0, 0, 1]);
        assert_eq!(HostAddr::unspecified().pack(), [0, 0, 0, 0]);
    }
}
