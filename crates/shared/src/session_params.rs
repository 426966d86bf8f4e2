use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::params::ParamMap;

/// Per-session parameter accumulator shared by all chat turns.
///
/// Every operation runs inside one critical section, so concurrent merges for
/// the same session never lose updates. Sessions idle for longer than the
/// configured TTL are dropped by [`SessionParamStore::spawn_pruner`].
#[derive(Clone)]
pub struct SessionParamStore {
    entries: Arc<Mutex<HashMap<String, SessionEntry>>>,
    idle_ttl: Duration,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    params: ParamMap,
    last_touched: Instant,
}

impl SessionParamStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            idle_ttl,
        }
    }

    /// Overlays `params` onto the session's accumulator, last write wins per
    /// key. Unseen sessions start from an empty accumulator.
    pub fn merge(&self, session_id: &str, params: ParamMap) {
        self.merge_at(session_id, params, Instant::now());
    }

    fn merge_at(&self, session_id: &str, params: ParamMap, now: Instant) {
        let mut entries = self.lock_entries();
        let entry = entries
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                params: ParamMap::new(),
                last_touched: now,
            });
        entry.params.extend(params);
        entry.last_touched = now;
    }

    /// Removes the session and returns everything accumulated for it. Unknown
    /// sessions yield an empty map.
    pub fn consume_and_clear(&self, session_id: &str) -> ParamMap {
        self.lock_entries()
            .remove(session_id)
            .map(|entry| entry.params)
            .unwrap_or_default()
    }

    pub fn snapshot(&self, session_id: &str) -> Option<ParamMap> {
        self.lock_entries()
            .get(session_id)
            .map(|entry| entry.params.clone())
    }

    pub fn snapshot_all(&self) -> BTreeMap<String, ParamMap> {
        self.lock_entries()
            .iter()
            .map(|(session_id, entry)| (session_id.clone(), entry.params.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spawn_pruner(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = store.prune_at(Instant::now());
                if evicted > 0 {
                    debug!(evicted, "evicted idle conversation sessions");
                }
            }
        })
    }

    fn prune_at(&self, now: Instant) -> usize {
        let cutoff = now.checked_sub(self.idle_ttl).unwrap_or(now);
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.last_touched > cutoff);
        before - entries.len()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
