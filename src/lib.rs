//! SCION endhost path daemon.
//!
//! Long-lived local process that resolves end-to-end forwarding paths for a
//! single SCION endhost. The daemon maintains TTL-bounded caches of up-,
//! down- and core-segments learned from the path server, coalesces
//! concurrent resolution requests per destination, combines cached segments
//! into full paths (shortcut and core composition) and evicts segments whose
//! interface tokens are invalidated by hash-chain revocations.
//!
//! Co-located client processes talk to the daemon over a small binary UDP
//! API; the path server is reached through the topology's service registry.

pub mod addr;
pub mod api;
pub mod combinator;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod hash_chain;
pub mod message;
pub mod metrics;
pub mod segment;
pub mod store;
pub mod topology;

pub use addr::{HostAddr, IsdAd};
pub use combinator::FullPath;
pub use config::SciondConfig;
pub use daemon::Daemon;
pub use message::{CtrlMessage, PathReply, PathSegmentInfo, RevocationInfo};
pub use segment::{AsHop, PathSegment, SegmentType};
pub use store::{SegmentFilter, SegmentStore};
pub use topology::{ServiceKind, Topology};

use thiserror::Error;

/// Error types for the path daemon
#[derive(Debug, Error)]
pub enum SciondError {
    #[error("Service lookup failed: {0}")]
    ServiceLookup(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed segment class: {0}")]
    MalformedSegmentClass(u8),

    #[error("Malformed segment: {0}")]
    MalformedSegment(String),

    #[error("Unsupported API request type: {0}")]
    UnknownApiDiscriminator(u8),

    #[error("Revocation proof does not verify")]
    RevocationVerification,

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Path exceeds API limits: {0}")]
    PathTooLong(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for path daemon operations
pub type SciondResult<T> = Result<T, SciondError>;
