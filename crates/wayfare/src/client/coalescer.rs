use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What a caller became when joining a key
pub enum Role<V: Clone> {
    /// Run the request and settle the slot
    Leader(InflightGuard<V>),
    /// Wait for the leader's result
    Follower(broadcast::Receiver<V>),
}

/// Per-key in-flight slots
///
/// The first caller for a key becomes the leader, later callers subscribe
/// to its broadcast until it settles.
pub struct Coalescer<V: Clone> {
    inflight: Arc<DashMap<String, broadcast::Sender<V>>>,
}

impl<V: Clone> Clone for Coalescer<V> {
    fn clone(&self) -> Self {
        Self {
            inflight: self.inflight.clone(),
        }
    }
}

impl<V: Clone> Default for Coalescer<V> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }
}

impl<V: Clone> Coalescer<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the slot for `key`, becoming leader if it is empty
    pub fn join(&self, key: &str) -> Role<V> {
        // Entry guard is dropped at the end of the match
        match self.inflight.entry(key.to_string()) {
            Entry::Occupied(o) => Role::Follower(o.get().subscribe()),
            Entry::Vacant(v) => {
                let (tx, _rx) = broadcast::channel(1);
                v.insert(tx.clone());
                Role::Leader(InflightGuard {
                    inflight: self.inflight.clone(),
                    key: key.to_string(),
                    tx,
                })
            }
        }
    }

    /// Whether a request for `key` is running
    pub fn is_inflight(&self, key: &str) -> bool {
        self.inflight.contains_key(key)
    }

    /// Number of keys with a running request
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

/// Leader's hold on an in-flight slot
///
/// Dropping it without settling (a cancelled leader) frees the slot and
/// closes the channel, so followers can take over.
pub struct InflightGuard<V: Clone> {
    inflight: Arc<DashMap<String, broadcast::Sender<V>>>,
    key: String,
    tx: broadcast::Sender<V>,
}

impl<V: Clone> InflightGuard<V> {
    /// Free the slot and hand `value` to every follower
    pub fn settle(self, value: V) {
        self.release();
        if self.tx.receiver_count() > 0 {
            let _ = self.tx.send(value);
        }
    }

    fn release(&self) {
        // Only remove our own channel, never a newer leader's
        self.inflight
            .remove_if(&self.key, |_, tx| tx.same_channel(&self.tx));
    }
}

impl<V: Clone> Drop for InflightGuard<V> {
    fn drop(&mut self) {
        self.release();
    }
}
