// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// TTL keyed store
//
// Process-wide key/value maps with per-key last-access stamps and a
// periodic sweep. Two instances exist at runtime: conversation ids
// (sliding expiry) and the shared upstream token (absolute expiry).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Time source for expiry decisions.
///
/// Injected so eviction can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += step;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// TtlStore
// ---------------------------------------------------------------------------

/// Which operations stamp an entry's last-access time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// `set` and `get` both extend the entry's life (inactivity window).
    OnAccess,
    /// Only `set` stamps; the entry expires a fixed time after it was written.
    OnWrite,
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    touched: DateTime<Utc>,
}

/// Concurrent key/value store with age-based eviction.
///
/// Backed by `DashMap`; no lock is held beyond a single call, so callers may
/// use it freely between `.await` points.
pub struct TtlStore<V> {
    entries: DashMap<String, Entry<V>>,
    max_age: Duration,
    refresh: Refresh,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlStore<V> {
    pub fn new(max_age: Duration, refresh: Refresh, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
            refresh,
            clock,
        }
    }

    /// Store or overwrite `key`, stamping it with the current time.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let touched = self.clock.now();
        self.entries.insert(key.into(), Entry { value, touched });
    }

    /// Look up `key`. Entries past `max_age` are removed and reported absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entry = self.entries.get_mut(key)?;

        if self.is_expired(entry.touched, now) {
            drop(entry); // release the shard lock before removing
            // A writer may have replaced the entry since the guard was dropped.
            self.entries
                .remove_if(key, |_, current| self.is_expired(current.touched, now));
            return None;
        }

        if self.refresh == Refresh::OnAccess {
            entry.touched = now;
        }
        Some(entry.value.clone())
    }

    /// Remove `key` immediately. Returns the removed value, if any.
    pub fn delete(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Remove every entry older than `max_age`. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !self.is_expired(entry.touched, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn is_expired(&self, touched: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age = now
            .signed_duration_since(touched)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age > self.max_age
    }
}

/// Run `store.sweep()` every `every`, independent of request traffic.
///
/// The returned handle can be aborted on shutdown; dropping it detaches the task.
pub fn spawn_sweeper<V>(name: &'static str, store: Arc<TtlStore<V>>, every: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep();
            if removed > 0 {
                tracing::debug!(store = name, removed, remaining = store.len(), "ttl sweep");
            }
        }
    })
}
