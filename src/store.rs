//! TTL-bounded path segment stores.
//!
//! Each store maps a segment's hops hash to the segment plus its endpoint
//! metadata and insertion time. Expiry is lazy: queries and iterations drop
//! expired entries before serving, which bounds memory by the live working
//! set rather than historical volume.

use crate::addr::IsdAd;
use crate::segment::{HopsHash, PathSegment};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default lifetime of a cached segment.
pub const DEFAULT_SEGMENT_TTL: Duration = Duration::from_secs(300);

/// Endpoint filter for store queries. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentFilter {
    pub first_isd: Option<u16>,
    pub first_ad: Option<u32>,
    pub last_isd: Option<u16>,
    pub last_ad: Option<u32>,
}

impl SegmentFilter {
    /// Matches every segment.
    pub fn any() -> Self {
        Self::default()
    }

    /// Constrain the core-side endpoint.
    pub fn with_first(mut self, first: IsdAd) -> Self {
        self.first_isd = Some(first.isd());
        self.first_ad = Some(first.ad());
        self
    }

    /// Constrain the leaf-side endpoint.
    pub fn with_last(mut self, last: IsdAd) -> Self {
        self.last_isd = Some(last.isd());
        self.last_ad = Some(last.ad());
        self
    }

    fn matches(&self, first: IsdAd, last: IsdAd) -> bool {
        self.first_isd.map_or(true, |isd| isd == first.isd())
            && self.first_ad.map_or(true, |ad| ad == first.ad())
            && self.last_isd.map_or(true, |isd| isd == last.isd())
            && self.last_ad.map_or(true, |ad| ad == last.ad())
    }
}

struct StoredSegment {
    segment: PathSegment,
    first: IsdAd,
    last: IsdAd,
    inserted_at: Instant,
}

/// One TTL-indexed segment cache.
///
/// Readers and writers serialise on a single internal lock, so revocation
/// scans and insertions never interleave within a store.
pub struct SegmentStore {
    entries: Mutex<HashMap<HopsHash, StoredSegment>>,
    ttl: Duration,
}

impl SegmentStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Insert or refresh a segment keyed by its hops hash. Re-inserting the
    /// same identity replaces the metadata and resets the insertion time.
    pub fn update(&self, segment: PathSegment, first: IsdAd, last: IsdAd) {
        let hash = segment.hops_hash();
        let mut entries = self.entries.lock();
        entries.insert(
            hash,
            StoredSegment {
                segment,
                first,
                last,
                inserted_at: Instant::now(),
            },
        );
    }

    /// All non-expired segments matching every supplied filter field.
    /// Order is unspecified but stable within a single call.
    pub fn query(&self, filter: SegmentFilter) -> Vec<PathSegment> {
        let mut entries = self.entries.lock();
        Self::prune(&mut entries, self.ttl);
        entries
            .values()
            .filter(|entry| filter.matches(entry.first, entry.last))
            .map(|entry| entry.segment.clone())
            .collect()
    }

    /// Every non-expired segment.
    pub fn iterate(&self) -> Vec<PathSegment> {
        self.query(SegmentFilter::any())
    }

    /// Remove entries by identity; returns how many were present.
    pub fn delete_all(&self, hashes: &[HopsHash]) -> usize {
        let mut entries = self.entries.lock();
        Self::prune(&mut entries, self.ttl);
        hashes
            .iter()
            .filter(|hash| entries.remove(*hash).is_some())
            .count()
    }

    /// Remove every non-expired segment matching `predicate`, returning the
    /// number of deletions. Scan and removal happen under one lock: a
    /// concurrent insertion either precedes the scan (and the segment goes)
    /// or follows the removal (and the segment lives).
    pub fn delete_matching(&self, predicate: impl Fn(&PathSegment) -> bool) -> usize {
        let mut entries = self.entries.lock();
        Self::prune(&mut entries, self.ttl);
        let before = entries.len();
        entries.retain(|_, entry| !predicate(&entry.segment));
        before - entries.len()
    }

    /// Number of non-expired segments.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        Self::prune(&mut entries, self.ttl);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(entries: &mut HashMap<HopsHash, StoredSegment>, ttl: Duration) {
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) <= ttl);
    }
}
