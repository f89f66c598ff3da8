//! Combination of cached segments into full forwarding paths.
//!
//! Pure functions over immutable inputs: shortcut joins at a shared
//! non-core AS, and core compositions of one up segment, zero or more core
//! segments and one down segment. No I/O, deterministic for fixed inputs.

use crate::addr::IsdAd;
use crate::segment::PathSegment;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// One AS crossed by a full path, in travel direction: `ingress` is the
/// interface the packet enters through (0 at the source AS), `egress` the
/// one it leaves through (0 at the destination AS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathHop {
    pub isd_ad: IsdAd,
    pub ingress: u16,
    pub egress: u16,
}

/// A fully resolved end-to-end path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullPath {
    hops: Vec<PathHop>,
}

impl FullPath {
    /// The empty path: intra-AD delivery, nothing on the wire.
    pub fn empty() -> Self {
        Self { hops: Vec::new() }
    }

    pub fn new(hops: Vec<PathHop>) -> Self {
        Self { hops }
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn hops(&self) -> &[PathHop] {
        &self.hops
    }

    /// First on-wire interface; selects the next-hop border router.
    /// `None` for the empty path.
    pub fn fwd_if(&self) -> Option<u16> {
        self.hops
            .first()
            .map(|hop| hop.egress)
            .filter(|&egress| egress != 0)
    }

    /// Ordered (ISD-AD, interface) pairs crossed by the path.
    pub fn interfaces(&self) -> Vec<(IsdAd, u16)> {
        let mut interfaces = Vec::new();
        for hop in &self.hops {
            if hop.ingress != 0 {
                interfaces.push((hop.isd_ad, hop.ingress));
            }
            if hop.egress != 0 {
                interfaces.push((hop.isd_ad, hop.egress));
            }
        }
        interfaces
    }

    /// Wire form: one 8-byte record per hop,
    /// `isd_ad_bits(4B LE) | ingress(2B LE) | egress(2B LE)`.
    pub fn pack(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.hops.len() * 8);
        for hop in &self.hops {
            raw.extend_from_slice(&hop.isd_ad.to_u32().to_le_bytes());
            raw.extend_from_slice(&hop.ingress.to_le_bytes());
            raw.extend_from_slice(&hop.egress.to_le_bytes());
        }
        raw
    }

    /// Identity of the composed path, used for deduplication.
    pub fn hops_hash(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(self.pack()));
        out
    }
}

/// Run the full combination for the given caches: shortcut joins plus core
/// compositions for every up/down pair, deduplicated by path identity.
pub fn build_paths(
    ups: &[PathSegment],
    downs: &[PathSegment],
    cores: &[PathSegment],
) -> Vec<FullPath> {
    let mut paths = build_shortcut_paths(ups, downs);
    for up in ups {
        for down in downs {
            paths.extend(build_core_paths(up, down, cores));
        }
    }
    let mut seen = HashSet::new();
    paths.retain(|path| seen.insert(path.hops_hash()));
    paths
}

/// Every shortcut path joining `ups` and `downs` at a shared non-core AS.
pub fn build_shortcut_paths(ups: &[PathSegment], downs: &[PathSegment]) -> Vec<FullPath> {
    let mut paths = Vec::new();
    for up in ups {
        for down in downs {
            paths.extend(shortcut_path(up, down));
        }
    }
    paths
}

/// The core compositions of one up/down pair: a direct join when both
/// segments reach the same core AS, otherwise one path per connecting core
/// segment.
pub fn build_core_paths(
    up: &PathSegment,
    down: &PathSegment,
    cores: &[PathSegment],
) -> Vec<FullPath> {
    if up.first_hop() == down.first_hop() {
        return vec![join_at_core(up, None, down)];
    }
    cores
        .iter()
        .filter(|core| core.last_hop() == up.first_hop() && core.first_hop() == down.first_hop())
        .map(|core| join_at_core(up, Some(core), down))
        .collect()
}

/// Pick the crossover AS shared by `up` and `down` that lies closest to the
/// two endpoints and join the segments there. The core ASes at index 0 do
/// not qualify; those joins are core paths.
fn shortcut_path(up: &PathSegment, down: &PathSegment) -> Option<FullPath> {
    let up_hops = up.hops();
    let down_hops = down.hops();
    let mut best: Option<(usize, usize)> = None;
    for (i, up_hop) in up_hops.iter().enumerate().skip(1) {
        for (j, down_hop) in down_hops.iter().enumerate().skip(1) {
            if up_hop.isd_ad == down_hop.isd_ad
                && best.map_or(true, |(bi, bj)| i + j > bi + bj)
            {
                best = Some((i, j));
            }
        }
    }
    let (i, j) = best?;

    let mut hops = Vec::new();
    // climb the up segment from the local AS to the crossover
    for k in (i + 1..up_hops.len()).rev() {
        hops.push(PathHop {
            isd_ad: up_hops[k].isd_ad,
            ingress: up_hops[k].out_if,
            egress: up_hops[k].in_if,
        });
    }
    // crossover: enter from the up side, leave toward the down side
    hops.push(PathHop {
        isd_ad: up_hops[i].isd_ad,
        ingress: up_hops[i].out_if,
        egress: down_hops[j].out_if,
    });
    // descend the down segment to the destination
    for k in j + 1..down_hops.len() {
        hops.push(PathHop {
            isd_ad: down_hops[k].isd_ad,
            ingress: down_hops[k].in_if,
            egress: down_hops[k].out_if,
        });
    }
    Some(FullPath::new(hops))
}

/// Join `up` and `down` across the core, through `core` if the two
/// segments end at different core ASes.
fn join_at_core(up: &PathSegment, core: Option<&PathSegment>, down: &PathSegment) -> FullPath {
    let up_hops = up.hops();
    let down_hops = down.hops();
    let mut hops = Vec::new();

    // climb to the local-side core AS
    for k in (1..up_hops.len()).rev() {
        hops.push(PathHop {
            isd_ad: up_hops[k].isd_ad,
            ingress: up_hops[k].out_if,
            egress: up_hops[k].in_if,
        });
    }
    match core {
        None => {
            // shared core AS joins the two segments directly
            hops.push(PathHop {
                isd_ad: up_hops[0].isd_ad,
                ingress: up_hops[0].out_if,
                egress: down_hops[0].out_if,
            });
        }
        Some(core) => {
            // core segments run from the destination-side core AS to the
            // local-side one, so they are traversed in reverse
            let core_hops = core.hops();
            hops.push(PathHop {
                isd_ad: up_hops[0].isd_ad,
                ingress: up_hops[0].out_if,
                egress: core_hops[core_hops.len() - 1].in_if,
            });
            for k in (1..core_hops.len().saturating_sub(1)).rev() {
                hops.push(PathHop {
                    isd_ad: core_hops[k].isd_ad,
                    ingress: core_hops[k].out_if,
                    egress: core_hops[k].in_if,
                });
            }
            hops.push(PathHop {
                isd_ad: core_hops[0].isd_ad,
                ingress: core_hops[0].out_if,
                egress: down_hops[0].out_if,
            });
        }
    }
    // descend to the destination
    for k in 1..down_hops.len() {
        hops.push(PathHop {
            isd_ad: down_hops[k].isd_ad,
            ingress: down_hops[k].in_if,
            egress: down_hops[k].out_if,
        });
    }
    FullPath::new(hops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::AsHop;

    fn hop(isd: u16, ad: u32, in_if: u16, out_if: u16) -> AsHop {
        AsHop::new(IsdAd::new(isd, ad), in_if, out_if, [ad as u8; 32])
    }

    fn seg(hops: Vec<AsHop>) -> PathSegment {
        PathSegment::new(hops).unwrap()
    }

    fn path_ads(path: &FullPath) -> Vec<IsdAd> {
        path.hops().iter().map(|h| h.isd_ad).collect()
    }

    #[test]
    fn test_core_path_with_shared_core_as() {
        // local (1,10) under core (1,1); destination (2,20) hangs off the
        // same core AS
        let up = seg(vec![hop(1, 1, 0, 11), hop(1, 10, 21, 0)]);
        let down = seg(vec![hop(1, 1, 0, 12), hop(2, 20, 22, 0)]);

        let paths = build_core_paths(&up, &down, &[]);
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert_eq!(
            path_ads(path),
            vec![IsdAd::new(1, 10), IsdAd::new(1, 1), IsdAd::new(2, 20)]
        );
        assert_eq!(path.fwd_if(), Some(21));
        assert_eq!(
            path.interfaces(),
            vec![
                (IsdAd::new(1, 10), 21),
                (IsdAd::new(1, 1), 11),
                (IsdAd::new(1, 1), 12),
                (IsdAd::new(2, 20), 22),
            ]
        );
    }

    #[test]
    fn test_core_path_through_core_segment() {
        let up = seg(vec![hop(1, 1, 0, 11), hop(1, 10, 21, 0)]);
        let down = seg(vec![hop(2, 2, 0, 12), hop(2, 20, 22, 0)]);
        // from the destination-side core (2,2) back to the local-side (1,1)
        let core = seg(vec![hop(2, 2, 0, 31), hop(1, 1, 41, 0)]);

        let paths = build_core_paths(&up, &down, &[core]);
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert_eq!(
            path_ads(path),
            vec![
                IsdAd::new(1, 10),
                IsdAd::new(1, 1),
                IsdAd::new(2, 2),
                IsdAd::new(2, 20),
            ]
        );
        assert_eq!(
            path.interfaces(),
            vec![
                (IsdAd::new(1, 10), 21),
                (IsdAd::new(1, 1), 11),
                (IsdAd::new(1, 1), 41),
                (IsdAd::new(2, 2), 31),
                (IsdAd::new(2, 2), 12),
                (IsdAd::new(2, 20), 22),
            ]
        );
    }

    #[test]
    fn test_unconnected_core_segment_ignored() {
        let up = seg(vec![hop(1, 1, 0, 11), hop(1, 10, 21, 0)]);
        let down = seg(vec![hop(2, 2, 0, 12), hop(2, 20, 22, 0)]);
        // touches neither endpoint pair
        let stray = seg(vec![hop(3, 3, 0, 31), hop(1, 1, 41, 0)]);

        assert!(build_core_paths(&up, &down, &[stray]).is_empty());
    }

    #[test]
    fn test_shortcut_at_shared_non_core_as() {
        let up = seg(vec![hop(1, 1, 0, 11), hop(1, 5, 13, 15), hop(1, 10, 17, 0)]);
        let down = seg(vec![hop(1, 1, 0, 12), hop(1, 5, 14, 16), hop(1, 20, 18, 0)]);

        let paths = build_shortcut_paths(&[up], &[down]);
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert_eq!(
            path_ads(path),
            vec![IsdAd::new(1, 10), IsdAd::new(1, 5), IsdAd::new(1, 20)]
        );
        // crossover enters from the up side, leaves toward the down side
        assert_eq!(path.hops()[1].ingress, 15);
        assert_eq!(path.hops()[1].egress, 16);
    }

    #[test]
    fn test_no_shortcut_through_core_only_overlap() {
        let up = seg(vec![hop(1, 1, 0, 11), hop(1, 10, 21, 0)]);
        let down = seg(vec![hop(1, 1, 0, 12), hop(1, 20, 22, 0)]);
        // (1,1) is shared, but only at the core position
        assert!(build_shortcut_paths(&[up], &[down]).is_empty());
    }

    #[test]
    fn test_build_paths_deduplicates() {
        let up = seg(vec![hop(1, 1, 0, 11), hop(1, 10, 21, 0)]);
        let down = seg(vec![hop(1, 1, 0, 12), hop(2, 20, 22, 0)]);
        let ups = vec![up.clone(), up];
        let downs = vec![down];

        // the same up segment twice must not yield the same path twice
        let paths = build_paths(&ups, &downs, &[]);
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_combination_is_pure() {
        let up = seg(vec![hop(1, 1, 0, 11), hop(1, 5, 13, 15), hop(1, 10, 17, 0)]);
        let down = seg(vec![hop(1, 1, 0, 12), hop(1, 5, 14, 16), hop(1, 20, 18, 0)]);
        let ups = vec![up];
        let downs = vec![down];

        let first = build_paths(&ups, &downs, &[]);
        let second = build_paths(&ups, &downs, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_path_packs_to_nothing() {
        let path = FullPath::empty();
        assert!(path.is_empty());
        assert!(path.pack().is_empty());
        assert_eq!(path.fwd_if(), None);
        assert!(path.interfaces().is_empty());
    }

    #[test]
    fn test_pack_is_eight_byte_records() {
        let up = seg(vec![hop(1, 1, 0, 11), hop(1, 10, 21, 0)]);
        let down = seg(vec![hop(1, 1, 0, 12), hop(2, 20, 22, 0)]);
        let path = &build_core_paths(&up, &down, &[])[0];

        let raw = path.pack();
        assert_eq!(raw.len(), path.hops().len() * 8);
        // first record: (1,10), ingress 0, egress 21
        assert_eq!(raw[..4], IsdAd::new(1, 10).to_u32().to_le_bytes());
        assert_eq!(raw[4..6], 0u16.to_le_bytes());
        assert_eq!(raw[6..8], 21u16.to_le_bytes());
    }
}
