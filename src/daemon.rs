//! The path daemon core.
//!
//! Owns the three segment stores and the request coordinator, deposits
//! inbound path replies, applies revocations and resolves full paths for
//! local clients. Outbound path requests go to the topology-resolved path
//! server; reply and revocation handling never block on the network.

use crate::addr::{HostAddr, IsdAd};
use crate::api::LocalApi;
use crate::combinator::{self, FullPath};
use crate::config::SciondConfig;
use crate::coordinator::{RequestCoordinator, RequestDriver, RequestKey, WakeReceiver};
use crate::hash_chain;
use crate::message::{CtrlMessage, PathReply, PathSegmentInfo, RevocationInfo};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::segment::{PathSegment, SegmentType};
use crate::store::{SegmentFilter, SegmentStore};
use crate::topology::{ServiceKind, Topology};
use crate::{SciondError, SciondResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Largest control-plane datagram the daemon accepts.
const MAX_CTRL_DATAGRAM: usize = 65535;

/// The three segment caches.
struct Stores {
    up: SegmentStore,
    down: SegmentStore,
    core: SegmentStore,
}

/// Issues outbound path requests for the coordinator and answers its
/// satisfiability checks from the caches.
///
/// Split from [`Daemon`] so the coordinator can drive fetches without
/// owning the daemon itself.
struct PathFetcher {
    stores: Arc<Stores>,
    topology: Arc<Topology>,
    sock: Arc<UdpSocket>,
    metrics: Arc<MetricsCollector>,
}

#[async_trait]
impl RequestDriver for PathFetcher {
    fn check(&self, key: &RequestKey) -> bool {
        let stores = &self.stores;
        match key.class {
            SegmentType::Up => !stores.up.is_empty(),
            SegmentType::Down => !stores
                .down
                .query(SegmentFilter::any().with_last(key.dst))
                .is_empty(),
            // core segments run from the destination-side core AS back to
            // the local-side one
            SegmentType::Core => !stores
                .core
                .query(SegmentFilter::any().with_first(key.dst).with_last(key.src))
                .is_empty(),
            SegmentType::UpDown => {
                !stores.up.is_empty()
                    && !stores
                        .down
                        .query(SegmentFilter::any().with_last(key.dst))
                        .is_empty()
            }
        }
    }

    async fn fetch(&self, key: &RequestKey) {
        let path_server = match self.topology.resolve(ServiceKind::Path) {
            Ok(addr) => addr,
            Err(e) => {
                // the pending entry times out naturally
                error!("Error querying path service: {}", e);
                return;
            }
        };
        let info = PathSegmentInfo::new(key.class, key.src, key.dst);
        debug!("Sending path request: {}", info.short_desc());
        let raw = match CtrlMessage::PathRequest(info).encode() {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to encode path request: {}", e);
                return;
            }
        };
        match self.sock.send_to(&raw, path_server).await {
            Ok(_) => self.metrics.record_request_sent(),
            Err(e) => error!("Failed to send path request to {}: {}", path_server, e),
        }
    }
}

struct DaemonInner {
    local: IsdAd,
    host: HostAddr,
    config: SciondConfig,
    stores: Arc<Stores>,
    requests: Arc<RequestCoordinator>,
    ifid2addr: HashMap<u16, HostAddr>,
    sock: Arc<UdpSocket>,
    scion_addr: SocketAddr,
    api_addr: Option<SocketAddr>,
    metrics: Arc<MetricsCollector>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to a running path daemon. Cheap to clone; all clones share one
/// instance.
#[derive(Clone)]
pub struct Daemon {
    inner: Arc<DaemonInner>,
}

impl Daemon {
    /// Bind the sockets, start the listeners and return a running daemon.
    pub async fn start(config: SciondConfig, topology: Topology) -> SciondResult<Self> {
        let topology = Arc::new(topology);
        let sock = Arc::new(UdpSocket::bind((topology.host, topology.scion_port)).await?);
        let scion_addr = sock.local_addr()?;

        let api_sock = if config.run_local_api {
            let bind = (config.local_api_address.as_str(), config.local_api_port);
            Some(Arc::new(UdpSocket::bind(bind).await?))
        } else {
            None
        };
        let api_addr = match &api_sock {
            Some(sock) => Some(sock.local_addr()?),
            None => None,
        };

        let segment_ttl = Duration::from_secs(config.segment_ttl);
        let stores = Arc::new(Stores {
            up: SegmentStore::new(segment_ttl),
            down: SegmentStore::new(segment_ttl),
            core: SegmentStore::new(segment_ttl),
        });
        let metrics = Arc::new(MetricsCollector::new());
        let fetcher = Arc::new(PathFetcher {
            stores: Arc::clone(&stores),
            topology: Arc::clone(&topology),
            sock: Arc::clone(&sock),
            metrics: Arc::clone(&metrics),
        });
        let requests = RequestCoordinator::start(fetcher, Duration::from_secs(config.timeout));

        let daemon = Daemon {
            inner: Arc::new(DaemonInner {
                local: topology.local,
                host: topology.host_addr(),
                config,
                stores,
                requests,
                ifid2addr: topology.ifid_map(),
                sock,
                scion_addr,
                api_addr,
                metrics,
                tasks: Mutex::new(Vec::new()),
            }),
        };

        let mut tasks = vec![tokio::spawn(scion_listener(daemon.clone()))];
        if let Some(api_sock) = api_sock {
            tasks.push(tokio::spawn(LocalApi::new(api_sock, daemon.clone()).run()));
        }
        *daemon.inner.tasks.lock() = tasks;

        info!(
            "Path daemon started for {} on {}",
            daemon.inner.local, scion_addr
        );
        Ok(daemon)
    }

    /// Stop the daemon: abort the listener tasks. In-flight API workers
    /// finish their current datagram.
    pub fn stop(&self) {
        info!("Stopping path daemon");
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Local (ISD, AD) identity.
    pub fn local_isd_ad(&self) -> IsdAd {
        self.inner.local
    }

    /// Local host address.
    pub fn host_addr(&self) -> HostAddr {
        self.inner.host
    }

    /// Bound SCION socket address.
    pub fn scion_addr(&self) -> SocketAddr {
        self.inner.scion_addr
    }

    /// SCION UDP port announced as the forwarding-hop port on the API.
    pub fn scion_port(&self) -> u16 {
        self.inner.scion_addr.port()
    }

    /// Bound local API address, if the API is enabled.
    pub fn api_addr(&self) -> Option<SocketAddr> {
        self.inner.api_addr
    }

    /// Interface-id to next-hop resolution table.
    pub fn ifid2addr(&self) -> &HashMap<u16, HostAddr> {
        &self.inner.ifid2addr
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub(crate) fn record_api_request(&self) {
        self.inner.metrics.record_api_request();
    }

    /// Deposit the PCBs of a path reply into the caches, then wake the
    /// waiters for the reply's key.
    pub fn handle_path_reply(&self, reply: PathReply) {
        let info = reply.info;
        for pcb in &reply.pcbs {
            if pcb.hops().is_empty() {
                warn!("Dropping hopless PCB. Info: {}", info.short_desc());
                continue;
            }
            match info.class() {
                Ok(SegmentType::UpDown) => {
                    self.handle_up_seg(pcb);
                    self.handle_down_seg(pcb);
                }
                Ok(SegmentType::Up) => self.handle_up_seg(pcb),
                Ok(SegmentType::Down) => self.handle_down_seg(pcb),
                Ok(SegmentType::Core) => self.handle_core_seg(pcb),
                Err(_) => {
                    warn!(
                        "Incorrect path in path record. Info: {} PCB: {}",
                        info.short_desc(),
                        pcb.short_desc()
                    );
                }
            }
        }
        self.inner.metrics.record_reply_handled();
        if let Ok(class) = info.class() {
            self.inner.requests.fulfil(&RequestKey {
                class,
                src: info.src,
                dst: info.dst,
            });
        }
    }

    fn handle_up_seg(&self, pcb: &PathSegment) {
        if pcb.last_hop() != self.inner.local {
            return;
        }
        self.inner
            .stores
            .up
            .update(pcb.clone(), pcb.first_hop(), pcb.last_hop());
        debug!("Up path added: {}", pcb.short_desc());
    }

    fn handle_down_seg(&self, pcb: &PathSegment) {
        if pcb.last_hop() == self.inner.local {
            return;
        }
        self.inner
            .stores
            .down
            .update(pcb.clone(), pcb.first_hop(), pcb.last_hop());
        debug!("Down path added: {}", pcb.short_desc());
    }

    fn handle_core_seg(&self, pcb: &PathSegment) {
        self.inner
            .stores
            .core
            .update(pcb.clone(), pcb.first_hop(), pcb.last_hop());
        debug!("Core path added: {}", pcb.short_desc());
    }

    /// Drop every cached segment carrying an interface token invalidated by
    /// `rev`. Returns the number of deleted segments.
    ///
    /// The revocation's own proof is verified first; an unverifiable
    /// revocation fails without touching the caches.
    pub fn handle_revocation(&self, rev: &RevocationInfo) -> SciondResult<usize> {
        info!("Received revocation for token {}", hex::encode(rev.rev_token));
        let depth = self.inner.config.n_tokens_check;
        if !hash_chain::verify(&rev.proof, &rev.rev_token, depth) {
            return Err(SciondError::RevocationVerification);
        }
        self.inner.metrics.record_revocation_handled();
        let stores = &self.inner.stores;
        let mut deletions = self.remove_revoked_pcbs(&stores.up, &rev.rev_token, depth);
        deletions += self.remove_revoked_pcbs(&stores.core, &rev.rev_token, depth);
        deletions += self.remove_revoked_pcbs(&stores.down, &rev.rev_token, depth);
        self.inner.metrics.record_segments_revoked(deletions as u64);
        info!("Removed {} segments due to revocation.", deletions);
        Ok(deletions)
    }

    /// Removes all segments from `store` that contain an interface token
    /// for which `rev_token` is a preimage within `depth` chain steps. One
    /// store-level operation, so a matching segment inserted concurrently
    /// cannot slip between the scan and the removal.
    fn remove_revoked_pcbs(&self, store: &SegmentStore, rev_token: &[u8], depth: usize) -> usize {
        store.delete_matching(|segment| {
            segment
                .interface_tokens()
                .any(|token| hash_chain::verify(rev_token, token, depth))
        })
    }

    /// Resolve full forwarding paths to `dst`.
    ///
    /// Returns the empty path for the local AD, and an empty list when the
    /// lookup times out or nothing can be combined; protocol failures never
    /// surface as errors here.
    pub async fn get_paths(&self, dst: IsdAd) -> Vec<FullPath> {
        let inner = &self.inner;
        inner.metrics.record_path_lookup();
        debug!("Paths requested for {} -> {}", inner.local, dst);
        if inner.local == dst {
            return vec![FullPath::empty()];
        }

        let deadline = Instant::now() + Duration::from_secs(inner.config.timeout);
        let wake = inner.requests.subscribe(RequestKey {
            class: SegmentType::UpDown,
            src: inner.local,
            dst,
        });
        if wait_for_wakes(vec![wake], deadline).await == 0 {
            // surfaced as an empty result, never as an error
            error!(
                "{}",
                SciondError::Timeout(format!("{} -> {}", inner.local, dst))
            );
            inner.metrics.record_lookup_timeout();
            return Vec::new();
        }

        let up_segs = inner.stores.up.query(SegmentFilter::any());
        let down_segs = inner.stores.down.query(SegmentFilter::any().with_last(dst));
        let (mut core_segs, missing) = self.calc_core_segs(&up_segs, &down_segs);
        if !missing.is_empty() {
            debug!(
                "Missing {} core segments for {} -> {}",
                missing.len(),
                inner.local,
                dst
            );
            core_segs.extend(self.get_core_segs(&missing, deadline).await);
        }

        let full_paths = combinator::build_paths(&up_segs, &down_segs, &core_segs);
        debug!(
            "Found {} full paths for {} -> {}",
            full_paths.len(),
            inner.local,
            dst
        );
        full_paths
    }

    /// All cached core segments joining the given up and down segments,
    /// plus the core AS pairs no cached segment covers.
    fn calc_core_segs(
        &self,
        up_segs: &[PathSegment],
        down_segs: &[PathSegment],
    ) -> (Vec<PathSegment>, Vec<(IsdAd, IsdAd)>) {
        let src_cores: BTreeSet<IsdAd> = up_segs.iter().map(|seg| seg.first_hop()).collect();
        let dst_cores: BTreeSet<IsdAd> = down_segs.iter().map(|seg| seg.first_hop()).collect();
        let mut pairs = Vec::new();
        for src in &src_cores {
            for dst in &dst_cores {
                pairs.push((*src, *dst));
            }
        }
        self.find_core_segs(&pairs)
    }

    /// Cached core segments for the given core AS pairs, and the pairs
    /// still missing. A pair of one shared AS needs no core segment.
    fn find_core_segs(
        &self,
        pairs: &[(IsdAd, IsdAd)],
    ) -> (Vec<PathSegment>, Vec<(IsdAd, IsdAd)>) {
        let mut core_segs = Vec::new();
        let mut missing = Vec::new();
        for &(src, dst) in pairs {
            if src == dst {
                continue;
            }
            let segs = self
                .inner
                .stores
                .core
                .query(SegmentFilter::any().with_first(dst).with_last(src));
            if segs.is_empty() {
                missing.push((src, dst));
            } else {
                core_segs.extend(segs);
            }
        }
        (core_segs, missing)
    }

    /// Request the missing core segments and return whatever arrives
    /// before the deadline.
    async fn get_core_segs(
        &self,
        pairs: &[(IsdAd, IsdAd)],
        deadline: Instant,
    ) -> Vec<PathSegment> {
        let mut wakes = Vec::new();
        for &(src, dst) in pairs {
            wakes.push(self.inner.requests.subscribe(RequestKey {
                class: SegmentType::Core,
                src,
                dst,
            }));
        }
        wait_for_wakes(wakes, deadline).await;
        let (core_segs, missing) = self.find_core_segs(pairs);
        if !missing.is_empty() {
            let failed: Vec<String> = missing
                .iter()
                .map(|(src, dst)| format!("{} -> {}", src, dst))
                .collect();
            error!("Failed to get core segments for:\n  {}", failed.join("\n  "));
        }
        core_segs
    }
}

/// Wait on wake receivers until `deadline`; returns how many fired.
async fn wait_for_wakes(wakes: Vec<WakeReceiver>, deadline: Instant) -> usize {
    let mut fired = 0;
    for wake in wakes {
        match tokio::time::timeout_at(deadline, wake).await {
            Ok(Ok(())) => fired += 1,
            Ok(Err(_)) | Err(_) => {}
        }
    }
    fired
}

/// Receive loop of the SCION socket: the single dispatch point for
/// control-plane messages.
async fn scion_listener(daemon: Daemon) {
    let sock = Arc::clone(&daemon.inner.sock);
    let mut buf = vec![0u8; MAX_CTRL_DATAGRAM];
    loop {
        let (len, sender) = match sock.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                error!("SCION socket receive failed: {}", e);
                continue;
            }
        };
        match CtrlMessage::decode(&buf[..len]) {
            Ok(CtrlMessage::PathReply(reply)) => daemon.handle_path_reply(reply),
            Ok(CtrlMessage::Revocation(rev)) => {
                if let Err(e) = daemon.handle_revocation(&rev) {
                    info!("Ignoring revocation: {}", e);
                }
            }
            Ok(CtrlMessage::PathRequest(info)) => {
                warn!(
                    "Unexpected path request from {}: {}",
                    sender,
                    info.short_desc()
                );
            }
            Err(e) => warn!("Undecodable control message from {}: {}", sender, e),
        }
    }
}
