//! Rule id allocation
//!
//! Ids are `PREFIX` followed by a zero-padded counter, e.g.
//! `SYSTEMRULE0000000042`. Each prefix has its own lock; allocation under
//! one prefix never waits on another. A counter is seeded from the store the
//! first time its prefix is used and only moves forward afterwards. A value
//! that needs more digits than the configured width is refused rather than
//! widening the id.

use super::store::RuleStore;
use crate::error::{AccessError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct RuleIdAllocator {
    width: usize,
    // first value that no longer fits; None when every u64 fits
    limit: Option<u64>,
    counters: RwLock<HashMap<String, Arc<Mutex<Option<u64>>>>>,
}

impl RuleIdAllocator {
    pub fn new(width: usize) -> Self {
        RuleIdAllocator {
            width,
            limit: u32::try_from(width).ok().and_then(|w| 10u64.checked_pow(w)),
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate the next id under `prefix`
    pub fn next_id(&self, prefix: &str, store: &dyn RuleStore) -> Result<String> {
        let counter = self.counter(prefix);
        let mut next = counter.lock();

        let value = match *next {
            Some(value) => value,
            None => store.next_free_rule_id(prefix)?,
        };
        if self.limit.is_some_and(|limit| value >= limit) {
            return Err(AccessError::InvalidConfig(format!(
                "rule ids under '{}' exhausted {} digits",
                prefix, self.width
            )));
        }
        *next = Some(value + 1);

        let id = self.format(prefix, value);
        debug!("Allocated rule id {}", id);
        Ok(id)
    }

    pub fn format(&self, prefix: &str, value: u64) -> String {
        format!("{}{:0width$}", prefix, value, width = self.width)
    }

    fn counter(&self, prefix: &str) -> Arc<Mutex<Option<u64>>> {
        if let Some(counter) = self.counters.read().get(prefix) {
            return Arc::clone(counter);
        }
        Arc::clone(
            self.counters
                .write()
                .entry(prefix.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }
}
