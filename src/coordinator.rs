//! Deduplicating, deadline-bounded request coordination.
//!
//! Concurrent resolutions of the same key share one pending entry and at
//! most one outstanding fetch; fulfilment wakes every waiter, expiry
//! releases them empty-handed.

use crate::addr::IsdAd;
use crate::segment::SegmentType;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Default lifetime of a pending request entry.
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(5);

/// Interval at which expired pending entries are swept.
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// Identifies one outstanding segment resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub class: SegmentType,
    pub src: IsdAd,
    pub dst: IsdAd,
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.class, self.src, self.dst)
    }
}

/// Wake handle held by a waiter. Fires with `Ok(())` on fulfilment; the
/// channel closes without a value when the pending entry expires.
pub type WakeReceiver = oneshot::Receiver<()>;

/// Supplies the coordinator's check / fetch / reply hooks.
#[async_trait]
pub trait RequestDriver: Send + Sync + 'static {
    /// True if the key is already satisfiable from local state.
    fn check(&self, key: &RequestKey) -> bool;

    /// Issue the single outbound request for the key.
    async fn fetch(&self, key: &RequestKey);

    /// Release one waiter after fulfilment.
    fn reply(&self, _key: &RequestKey, waiter: oneshot::Sender<()>) {
        let _ = waiter.send(());
    }
}

struct PendingEntry {
    waiters: Vec<oneshot::Sender<()>>,
    expires_at: Instant,
}

/// Deduplicating request multiplexer over (key -> pending waiters).
pub struct RequestCoordinator {
    pending: Mutex<HashMap<RequestKey, PendingEntry>>,
    driver: Arc<dyn RequestDriver>,
    ttl: Duration,
}

impl RequestCoordinator {
    /// Create a coordinator and start its expiry sweeper. The sweeper runs
    /// for as long as the coordinator is referenced.
    pub fn start(driver: Arc<dyn RequestDriver>, ttl: Duration) -> Arc<Self> {
        let coordinator = Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
            driver,
            ttl,
        });
        let handle = Arc::downgrade(&coordinator);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                match handle.upgrade() {
                    Some(coordinator) => coordinator.evict_expired(),
                    None => break,
                }
            }
        });
        coordinator
    }

    /// Attach a waiter to `key`, creating the pending entry (and triggering
    /// the fetch) if none exists. If the key is already satisfiable the
    /// waiter is fulfilled immediately and no network work happens.
    pub fn subscribe(&self, key: RequestKey) -> WakeReceiver {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            // an expired entry still waiting for the sweeper counts as absent
            let expired = pending
                .get(&key)
                .map_or(false, |entry| entry.expires_at <= Instant::now());
            if expired {
                debug!(%key, "pending request expired");
                pending.remove(&key);
            }
            if let Some(entry) = pending.get_mut(&key) {
                entry.waiters.push(tx);
                return rx;
            }
            if self.driver.check(&key) {
                self.driver.reply(&key, tx);
                return rx;
            }
            pending.insert(
                key,
                PendingEntry {
                    waiters: vec![tx],
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        let driver = Arc::clone(&self.driver);
        tokio::spawn(async move {
            driver.fetch(&key).await;
        });
        rx
    }

    /// Fulfil `key`: wake every attached waiter exactly once, in arrival
    /// order, and drop the entry. A key with no pending entry is a no-op.
    pub fn fulfil(&self, key: &RequestKey) {
        let entry = self.pending.lock().remove(key);
        if let Some(entry) = entry {
            debug!(%key, waiters = entry.waiters.len(), "request fulfilled");
            for waiter in entry.waiters {
                self.driver.reply(key, waiter);
            }
        }
    }

    /// Number of pending entries, expired-but-unswept ones included.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    fn evict_expired(&self) {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        // dropping an entry closes its waiters' channels: they observe the
        // expiry as a timeout, not as a fulfilment
        pending.retain(|key, entry| {
            let live = entry.expires_at > now;
            if !live {
                debug!(%key, waiters = entry.waiters.len(), "pending request expired");
            }
            live
        });
    }
}
