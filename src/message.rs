//! Control-plane messages exchanged with the path server.
//!
//! Every message rides the SCION UDP socket as one bincode-encoded
//! [`CtrlMessage`] datagram; a single dispatch point in the daemon routes
//! decoded messages to their handlers.

use crate::addr::IsdAd;
use crate::segment::{IfToken, PathSegment, SegmentType};
use crate::{SciondError, SciondResult};
use serde::{Deserialize, Serialize};

/// Identifies one segment request or reply: class plus source and
/// destination endpoints.
///
/// The class travels as a raw byte so that an out-of-range value can be
/// reported instead of poisoning the whole datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegmentInfo {
    pub seg_type: u8,
    pub src: IsdAd,
    pub dst: IsdAd,
}

impl PathSegmentInfo {
    pub fn new(seg_type: SegmentType, src: IsdAd, dst: IsdAd) -> Self {
        Self {
            seg_type: seg_type as u8,
            src,
            dst,
        }
    }

    /// Decoded segment class; fails on out-of-range wire values.
    pub fn class(&self) -> SciondResult<SegmentType> {
        SegmentType::try_from(self.seg_type)
    }

    /// Compact rendering for logs, e.g. `UP_DOWN 1-10 -> 2-20`.
    pub fn short_desc(&self) -> String {
        match self.class() {
            Ok(class) => format!("{} {} -> {}", class, self.src, self.dst),
            Err(_) => format!("class {} {} -> {}", self.seg_type, self.src, self.dst),
        }
    }
}

/// Path reply carrying zero or more PCBs for one request info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathReply {
    pub info: PathSegmentInfo,
    pub pcbs: Vec<PathSegment>,
}

/// Revocation of a single interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationInfo {
    /// Published chain element invalidating the interface.
    pub rev_token: IfToken,
    /// Ownership proof: hashes forward to `rev_token`.
    pub proof: IfToken,
}

/// Tagged sum of every control-plane message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CtrlMessage {
    PathRequest(PathSegmentInfo),
    PathReply(PathReply),
    Revocation(RevocationInfo),
}

impl CtrlMessage {
    pub fn encode(&self) -> SciondResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SciondError::Codec(e.to_string()))
    }

    pub fn decode(raw: &[u8]) -> SciondResult<Self> {
        bincode::deserialize(raw).map_err(|e| SciondError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_class_decoding() {
        let info = PathSegmentInfo::new(SegmentType::UpDown, IsdAd::new(1, 10), IsdAd::new(2, 20));
        assert_eq!(info.class().unwrap(), SegmentType::UpDown);
        assert_eq!(info.short_desc(), "UP_DOWN 1-10 -> 2-20");

        let bad = PathSegmentInfo {
            seg_type: 9,
            ..info
        };
        assert!(bad.class().is_err());
        assert_eq!(bad.short_desc(), "class 9 1-10 -> 2-20");
    }

    #[test]
    fn test_request_encoding_round_trip() {
        let msg = CtrlMessage::PathRequest(PathSegmentInfo::new(
            SegmentType::Core,
            IsdAd::new(1, 11),
            IsdAd::new(2, 21),
        ));
        let raw = msg.encode().unwrap();
        match CtrlMessage::decode(&raw).unwrap() {
            CtrlMessage::PathRequest(info) => {
                assert_eq!(info.class().unwrap(), SegmentType::Core);
                assert_eq!(info.dst, IsdAd::new(2, 21));
            }
            other => panic!("decoded wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(CtrlMessage::decode(&[0xFF; 16]).is_err());
    }
}
