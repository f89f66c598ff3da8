//! Path segments (PCBs) and their classification.
//!
//! A segment records the ordered AS hops of one beacon, core end first.
//! The daemon treats segments as opaque apart from their endpoints, their
//! interface tokens and their identity hash.

use crate::addr::IsdAd;
use crate::{SciondError, SciondResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a per-hop interface token in bytes.
pub const IF_TOKEN_LEN: usize = 32;

/// Per-hop cryptographic commitment used by revocations.
pub type IfToken = [u8; IF_TOKEN_LEN];

/// Segment identity: SHA-256 over the ordered hop list.
pub type HopsHash = [u8; 32];

/// Classes of path segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SegmentType {
    /// Ends at the local AD.
    Up = 0,
    /// Ends at a non-local destination.
    Down = 1,
    /// Connects two core ADs, possibly across ISDs.
    Core = 2,
    /// Compound reply class; split into one UP and one DOWN classification.
    UpDown = 3,
}

impl TryFrom<u8> for SegmentType {
    type Error = SciondError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SegmentType::Up),
            1 => Ok(SegmentType::Down),
            2 => Ok(SegmentType::Core),
            3 => Ok(SegmentType::UpDown),
            other => Err(SciondError::MalformedSegmentClass(other)),
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentType::Up => "UP",
            SegmentType::Down => "DOWN",
            SegmentType::Core => "CORE",
            SegmentType::UpDown => "UP_DOWN",
        };
        write!(f, "{}", name)
    }
}

/// One AS hop of a path segment.
///
/// `in_if` faces the previous (core-ward) hop and is 0 on the first hop;
/// `out_if` faces the next (leaf-ward) hop and is 0 on the last hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsHop {
    pub isd_ad: IsdAd,
    pub in_if: u16,
    pub out_if: u16,
    pub if_token: IfToken,
}

impl AsHop {
    pub fn new(isd_ad: IsdAd, in_if: u16, out_if: u16, if_token: IfToken) -> Self {
        Self {
            isd_ad,
            in_if,
            out_if,
            if_token,
        }
    }
}

/// A path segment: the ordered hops of one beacon.
///
/// Holds at least one hop; [`PathSegment::new`] and [`PathSegment::unpack`]
/// enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    hops: Vec<AsHop>,
}

impl PathSegment {
    pub fn new(hops: Vec<AsHop>) -> SciondResult<Self> {
        if hops.is_empty() {
            return Err(SciondError::MalformedSegment(
                "segment carries no hops".to_string(),
            ));
        }
        Ok(Self { hops })
    }

    pub fn hops(&self) -> &[AsHop] {
        &self.hops
    }

    /// Core-side endpoint.
    pub fn first_hop(&self) -> IsdAd {
        self.hops[0].isd_ad
    }

    /// Leaf-side endpoint.
    pub fn last_hop(&self) -> IsdAd {
        self.hops[self.hops.len() - 1].isd_ad
    }

    /// The ordered per-hop interface tokens.
    pub fn interface_tokens(&self) -> impl Iterator<Item = &IfToken> {
        self.hops.iter().map(|hop| &hop.if_token)
    }

    /// Identity of the segment within a store.
    pub fn hops_hash(&self) -> HopsHash {
        let mut hasher = Sha256::new();
        for hop in &self.hops {
            hasher.update(hop.isd_ad.to_u32().to_le_bytes());
            hasher.update(hop.in_if.to_le_bytes());
            hasher.update(hop.out_if.to_le_bytes());
            hasher.update(hop.if_token);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    /// Transport form.
    pub fn pack(&self) -> SciondResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SciondError::Codec(e.to_string()))
    }

    pub fn unpack(raw: &[u8]) -> SciondResult<Self> {
        let segment: PathSegment =
            bincode::deserialize(raw).map_err(|e| SciondError::Codec(e.to_string()))?;
        if segment.hops.is_empty() {
            return Err(SciondError::MalformedSegment(
                "segment carries no hops".to_string(),
            ));
        }
        Ok(segment)
    }

    /// Compact rendering for logs, e.g. `1-11 > 1-14 > 1-17`.
    pub fn short_desc(&self) -> String {
        self.hops
            .iter()
            .map(|hop| hop.isd_ad.to_string())
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_desc())
    }
}
