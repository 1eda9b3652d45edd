//! In-process window store used when the shared store is unavailable.
//!
//! Records live only in this instance; separate instances count separately.
//! Elapsed windows are evicted lazily on every check instead of by a
//! background sweep.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{advance_window, RateDecision, WindowLimit, WindowRecord};

#[derive(Debug, Default)]
pub struct LocalWindowStore {
    entries: DashMap<String, WindowRecord>,
}

impl LocalWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request against `key`, evicting every elapsed window first.
    pub fn check(&self, key: &str, limit: WindowLimit, now: u64) -> RateDecision {
        self.entries.retain(|_, record| record.reset_at > now);

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let (record, decision) = advance_window(Some(*occupied.get()), limit, now);
                occupied.insert(record);
                decision
            }
            Entry::Vacant(vacant) => {
                let (record, decision) = advance_window(None, limit, now);
                vacant.insert(record);
                decision
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
