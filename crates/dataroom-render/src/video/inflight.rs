// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Keyed in-flight registry: concurrent callers for the same key share one
// execution of the work and all receive its result.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;

type Slots<K, V> = HashMap<K, Arc<OnceCell<V>>>;

/// At most one execution per key is in flight at a time. The slot is
/// cleared once the work completes, so a later call (for example after a
/// failure) runs the work again.
///
/// If the leading caller is cancelled, a waiting caller takes over and
/// runs its own copy of the work.
#[derive(Debug)]
pub struct InflightRegistry<K, V> {
    slots: Mutex<Slots<K, V>>,
}

impl<K, V> Default for InflightRegistry<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> InflightRegistry<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots<K, V>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `work` for `key`, or wait for the run already in progress.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = self
            .slots()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let value = cell.get_or_init(work).await.clone();

        let mut slots = self.slots();
        if slots.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            slots.remove(&key);
        }
        value
    }

    /// Keys with work currently in flight.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
