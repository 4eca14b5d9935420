//! Masternode liveness tracking
//!
//! Keeps the most recent heartbeat of every masternode and classifies
//! masternodes as recent, stale or outdated by the time since they were
//! last heard from.

use crate::traits::{ChainView, MasternodeInfo, MasternodeRegistry};
use dpos_core::{Hash, HeartbeatMessage, MasternodeId, SigningKey, Timestamp};
use dpos_network::{DposMessage, InvKind, Inventory, PeerNetwork, RelayCache};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lower bound of the heartbeat period in seconds
pub const MIN_HEARTBEAT_PERIOD_SECS: u64 = 30;

/// Outdated threshold as a multiple of the minimal period
pub const MAX_PERIOD_FACTOR: u32 = 20;

/// Age class of a masternode
#[derive(Debug, Clone, Copy, PartialEq, Eq, std::hash::Hash)]
pub enum AgeFilter {
    /// Heard from within the minimal period
    Recent,
    /// Neither recent nor outdated
    Stale,
    /// Silent for longer than the maximal period
    Outdated,
}

/// Stored heartbeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatEntry {
    pub masternode: MasternodeId,
    pub hash: Hash,
    pub message: HeartbeatMessage,
}

#[derive(Debug, Default)]
struct TrackerState {
    /// Arrival sequence -> entry; the highest sequence is the most recent
    entries: BTreeMap<u64, HeartbeatEntry>,
    by_masternode: HashMap<MasternodeId, u64>,
    by_hash: HashMap<Hash, u64>,
    next_seq: u64,
}

impl TrackerState {
    fn latest_of(&self, masternode: &MasternodeId) -> Option<&HeartbeatEntry> {
        self.by_masternode
            .get(masternode)
            .and_then(|seq| self.entries.get(seq))
    }

    fn insert(&mut self, entry: HeartbeatEntry) {
        if let Some(old_seq) = self.by_masternode.remove(&entry.masternode) {
            if let Some(old) = self.entries.remove(&old_seq) {
                self.by_hash.remove(&old.hash);
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_masternode.insert(entry.masternode, seq);
        self.by_hash.insert(entry.hash, seq);
        self.entries.insert(seq, entry);
    }
}

/// Heartbeat tracker
pub struct HeartbeatTracker {
    state: Mutex<TrackerState>,
    registry: Arc<dyn MasternodeRegistry>,
    chain: Arc<dyn ChainView>,
    network: Arc<dyn PeerNetwork>,
    relay: Arc<RelayCache>,
    /// When this node started (ms)
    startup_time: Timestamp,
    /// Allowed clock skew of incoming timestamps (ms)
    max_future_ms: i64,
}

impl HeartbeatTracker {
    pub fn new(
        registry: Arc<dyn MasternodeRegistry>,
        chain: Arc<dyn ChainView>,
        network: Arc<dyn PeerNetwork>,
        relay: Arc<RelayCache>,
        startup_time: Timestamp,
        max_future_ms: i64,
    ) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            registry,
            chain,
            network,
            relay,
            startup_time,
            max_future_ms,
        }
    }

    /// Current wall-clock time in milliseconds
    pub fn now_ms() -> Timestamp {
        chrono::Utc::now().timestamp_millis()
    }

    /// Minimal spacing between heartbeats of one masternode
    pub fn min_period(&self) -> Duration {
        let count = self.registry.masternodes().len() as u64;
        Duration::from_secs(count.max(MIN_HEARTBEAT_PERIOD_SECS))
    }

    /// Silence after which a masternode is outdated
    pub fn max_period(&self) -> Duration {
        self.min_period() * MAX_PERIOD_FACTOR
    }

    /// Validate and store a heartbeat
    pub fn receive(&self, message: &HeartbeatMessage) -> bool {
        self.receive_at(message, Self::now_ms())
    }

    pub fn receive_at(&self, message: &HeartbeatMessage, now: Timestamp) -> bool {
        if message.is_null() {
            return false;
        }

        let signer = match message.signer() {
            Ok(signer) => signer,
            Err(e) => {
                debug!("Heartbeat with unrecoverable signature: {}", e);
                return false;
            }
        };
        let Some(masternode) = self.registry.find_by_operator(&signer) else {
            debug!("Heartbeat from unknown operator {}", signer);
            return false;
        };

        if message.timestamp >= now.saturating_add(self.max_future_ms) {
            debug!("Heartbeat from {} too far in the future", masternode);
            return false;
        }

        let hash = match message.hash() {
            Ok(hash) => hash,
            Err(e) => {
                debug!("Failed to hash heartbeat: {}", e);
                return false;
            }
        };

        let min_period_ms = self.min_period().as_millis() as i64;
        let mut state = self.state.lock();
        if let Some(previous) = state.latest_of(&masternode) {
            if message.timestamp <= previous.message.timestamp {
                debug!("Heartbeat from {} is not newer than the stored one", masternode);
                return false;
            }
            if message.timestamp - previous.message.timestamp < min_period_ms {
                debug!("Heartbeat from {} arrived within the minimal period", masternode);
                return false;
            }
        }

        state.insert(HeartbeatEntry {
            masternode,
            hash,
            message: message.clone(),
        });
        debug!("Heartbeat from {} at {}", masternode, message.timestamp);
        true
    }

    /// Receive, then cache and announce the heartbeat
    pub fn relay_message(&self, message: &HeartbeatMessage) -> bool {
        self.relay_message_at(message, Self::now_ms())
    }

    pub fn relay_message_at(&self, message: &HeartbeatMessage, now: Timestamp) -> bool {
        if !self.receive_at(message, now) {
            return false;
        }

        let hash = match message.hash() {
            Ok(hash) => hash,
            Err(_) => return false,
        };
        let inventory = Inventory::new(InvKind::Heartbeat, hash);
        if let Err(e) = self.relay.insert(inventory, &DposMessage::Heartbeat(message.clone())) {
            warn!("Failed to cache heartbeat {}: {}", hash, e);
            return true;
        }
        if let Err(e) = self.network.broadcast_inventory(inventory) {
            warn!("Failed to announce heartbeat {}: {}", hash, e);
        }
        true
    }

    /// Sign and relay a heartbeat of our own
    pub fn post_message(&self, key: &SigningKey, timestamp: Option<Timestamp>) -> bool {
        let now = Self::now_ms();
        let mut message = HeartbeatMessage::new(timestamp.unwrap_or(now));
        if let Err(e) = message.sign(key) {
            warn!("Failed to sign heartbeat: {}", e);
            return false;
        }
        self.relay_message_at(&message, now)
    }

    pub fn find_by_hash(&self, hash: &Hash) -> Option<HeartbeatEntry> {
        let state = self.state.lock();
        state
            .by_hash
            .get(hash)
            .and_then(|seq| state.entries.get(seq))
            .cloned()
    }

    /// Every stored heartbeat, most recent first
    pub fn list_all(&self) -> Vec<HeartbeatEntry> {
        self.state.lock().entries.values().rev().cloned().collect()
    }

    /// Latest heartbeat timestamp of `masternode`
    pub fn last_heartbeat(&self, masternode: &MasternodeId) -> Option<Timestamp> {
        self.state
            .lock()
            .latest_of(masternode)
            .map(|entry| entry.message.timestamp)
    }

    /// Age class of `member` at `now`
    pub fn age_of(&self, member: &MasternodeInfo, now: Timestamp) -> AgeFilter {
        let last_seen = self.last_heartbeat(&member.id).unwrap_or(self.startup_time);
        let activated = self.chain.block_time_at(member.activation_height).unwrap_or(0);
        let elapsed = now.saturating_sub(last_seen.max(activated));

        if elapsed < self.min_period().as_millis() as i64 {
            AgeFilter::Recent
        } else if elapsed > self.max_period().as_millis() as i64 {
            AgeFilter::Outdated
        } else {
            AgeFilter::Stale
        }
    }

    pub fn classify(&self, member: &MasternodeInfo, filter: AgeFilter, now: Timestamp) -> bool {
        self.age_of(member, now) == filter
    }

    /// Masternodes other than this node matching `filter`
    pub fn filter_masternodes(&self, filter: AgeFilter) -> Vec<MasternodeId> {
        self.filter_masternodes_at(filter, Self::now_ms())
    }

    pub fn filter_masternodes_at(&self, filter: AgeFilter, now: Timestamp) -> Vec<MasternodeId> {
        let local = self.registry.local_operator();
        self.registry
            .masternodes()
            .iter()
            .filter(|member| Some(member.operator) != local)
            .filter(|member| self.classify(member, filter, now))
            .map(|member| member.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryChain, MemoryRegistry, RecordingNetwork};

    const MIN_MS: i64 = 30_000;
    const START: Timestamp = 1_700_000_000_000;

    struct Fixture {
        registry: Arc<MemoryRegistry>,
        network: Arc<RecordingNetwork>,
        relay: Arc<RelayCache>,
        tracker: HeartbeatTracker,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(MemoryRegistry::new());
        let chain = Arc::new(MemoryChain::with_blocks(1));
        let network = Arc::new(RecordingNetwork::new());
        let relay = Arc::new(RelayCache::default());
        let tracker = HeartbeatTracker::new(
            registry.clone(),
            chain,
            network.clone(),
            relay.clone(),
            START,
            5 * 60 * 1000,
        );
        Fixture {
            registry,
            network,
            relay,
            tracker,
        }
    }

    fn key(byte: u8) -> SigningKey {
        SigningKey::from_bytes(&[byte; 32]).unwrap()
    }

    fn mn(byte: u8) -> MasternodeId {
        MasternodeId::new(Hash::new([byte; 32]))
    }

    fn signed(key: &SigningKey, timestamp: Timestamp) -> HeartbeatMessage {
        let mut message = HeartbeatMessage::new(timestamp);
        message.sign(key).unwrap();
        message
    }

    fn register(f: &Fixture, byte: u8) -> SigningKey {
        let key = key(byte);
        f.registry.register(mn(byte), key.key_id(), 0);
        key
    }

    #[test]
    fn test_periods() {
        let f = fixture();
        assert_eq!(f.tracker.min_period(), Duration::from_secs(30));
        assert_eq!(f.tracker.max_period(), Duration::from_secs(600));

        for byte in 1..=40 {
            register(&f, byte);
        }
        assert_eq!(f.tracker.min_period(), Duration::from_secs(40));
    }

    #[test]
    fn test_receive_rejects_null_and_unknown() {
        let f = fixture();
        assert!(!f.tracker.receive_at(&HeartbeatMessage::default(), START));
        assert!(!f.tracker.receive_at(&signed(&key(1), START), START));
        assert!(f.tracker.list_all().is_empty());
    }

    #[test]
    fn test_receive_rejects_far_future() {
        let f = fixture();
        let key = register(&f, 1);
        let skew = 5 * 60 * 1000;

        assert!(!f.tracker.receive_at(&signed(&key, START + skew), START));
        assert!(f.tracker.list_all().is_empty());

        assert!(f.tracker.receive_at(&signed(&key, START + skew - 1), START));
        assert_eq!(f.tracker.list_all().len(), 1);
    }

    #[test]
    fn test_heartbeats_monotonic_and_rate_limited() {
        let f = fixture();
        let key = register(&f, 1);

        assert!(f.tracker.receive_at(&signed(&key, START), START));
        // Not newer
        assert!(!f.tracker.receive_at(&signed(&key, START), START));
        assert!(!f.tracker.receive_at(&signed(&key, START - 1), START));
        // Newer but inside the minimal period
        assert!(!f.tracker.receive_at(&signed(&key, START + MIN_MS - 1), START + MIN_MS));
        // Far enough apart
        assert!(f.tracker.receive_at(&signed(&key, START + MIN_MS), START + MIN_MS));

        let all = f.tracker.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message.timestamp, START + MIN_MS);
        assert_eq!(f.tracker.last_heartbeat(&mn(1)), Some(START + MIN_MS));
    }

    #[test]
    fn test_replaced_entry_leaves_hash_index() {
        let f = fixture();
        let key = register(&f, 1);
        let first = signed(&key, START);
        let second = signed(&key, START + MIN_MS);

        f.tracker.receive_at(&first, START);
        assert!(f.tracker.find_by_hash(&first.hash().unwrap()).is_some());

        f.tracker.receive_at(&second, START + MIN_MS);
        assert!(f.tracker.find_by_hash(&first.hash().unwrap()).is_none());
        assert_eq!(
            f.tracker.find_by_hash(&second.hash().unwrap()).unwrap().masternode,
            mn(1)
        );
    }

    #[test]
    fn test_list_most_recent_first() {
        let f = fixture();
        let a = register(&f, 1);
        let b = register(&f, 2);

        f.tracker.receive_at(&signed(&a, START), START);
        f.tracker.receive_at(&signed(&b, START + 1), START + 1);

        let order: Vec<MasternodeId> = f.tracker.list_all().iter().map(|e| e.masternode).collect();
        assert_eq!(order, vec![mn(2), mn(1)]);
    }

    #[test]
    fn test_relay_caches_and_announces_only_accepted() {
        let f = fixture();
        let key = register(&f, 1);
        let message = signed(&key, START);

        assert!(f.tracker.relay_message_at(&message, START));
        let inventory = Inventory::new(InvKind::Heartbeat, message.hash().unwrap());
        assert_eq!(f.network.announced(), vec![inventory]);
        assert!(f.relay.contains(&inventory));

        assert!(!f.tracker.relay_message_at(&message, START));
        assert_eq!(f.network.announced().len(), 1);
    }

    #[test]
    fn test_post_message() {
        let f = fixture();
        let key = register(&f, 1);

        assert!(f.tracker.post_message(&key, None));
        assert_eq!(f.network.announced().len(), 1);

        // Unregistered key is not accepted, so nothing is announced
        assert!(!f.tracker.post_message(&self::key(9), None));
        assert_eq!(f.network.announced().len(), 1);
    }

    #[test]
    fn test_classification_thresholds() {
        let f = fixture();
        let key = register(&f, 1);
        let member = f.registry.masternodes()[0].clone();
        let max_ms = 20 * MIN_MS;

        // No heartbeat: measured from startup
        assert_eq!(f.tracker.age_of(&member, START), AgeFilter::Recent);
        assert_eq!(f.tracker.age_of(&member, START + MIN_MS), AgeFilter::Stale);
        assert_eq!(f.tracker.age_of(&member, START + max_ms), AgeFilter::Stale);
        assert_eq!(f.tracker.age_of(&member, START + max_ms + 1), AgeFilter::Outdated);

        let later = START + max_ms * 2;
        f.tracker.receive_at(&signed(&key, later), later);
        assert_eq!(f.tracker.age_of(&member, later + MIN_MS - 1), AgeFilter::Recent);
    }

    #[test]
    fn test_classification_partitions_members() {
        let f = fixture();
        for byte in 1..=3 {
            register(&f, byte);
        }
        let now = START + 45_000;

        let recent = f.tracker.filter_masternodes_at(AgeFilter::Recent, now);
        let stale = f.tracker.filter_masternodes_at(AgeFilter::Stale, now);
        let outdated = f.tracker.filter_masternodes_at(AgeFilter::Outdated, now);
        assert_eq!(recent.len() + stale.len() + outdated.len(), 3);
        assert_eq!(stale.len(), 3);
    }

    #[test]
    fn test_filter_skips_self() {
        let f = fixture();
        let own = register(&f, 1);
        register(&f, 2);
        f.registry.set_local_operator(Some(own.key_id()));

        let recent = f.tracker.filter_masternodes_at(AgeFilter::Recent, START);
        assert_eq!(recent, vec![mn(2)]);
    }
}
