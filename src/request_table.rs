// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Concurrent subscription table: stream-id pattern -> bitmap of subscribed
// applications. A single spinlock (ported from `spin_lock::SpinLock`, the
// same primitive this codebase already uses to guard shared free-list and
// registry structures) serializes writers; the router thread reads a
// published immutable snapshot with no locking at all.
//
// Open question (a) in the design notes is resolved here as copy-on-write:
// every subscribe/unsubscribe publishes a fresh `Arc<HashMap<..>>` via
// `ArcSwap` rather than mutating bitmaps in place. The router always sees a
// self-consistent snapshot; the previous one is freed once the last reader
// holding it drops its `Arc`, which stands in for the epoch reclamation
// this table's C counterpart performs explicitly with Concurrency Kit.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::bitmap::BitmapSet;
use crate::error::{Result, RouterError};
use crate::spin_lock::SpinLock;
use crate::stream_id::{StreamId, StreamIdBuildHasher};

type Snapshot = HashMap<StreamId, BitmapSet, StreamIdBuildHasher>;

pub struct RequestTable {
    snapshot: ArcSwap<Snapshot>,
    write_lock: SpinLock,
}

impl RequestTable {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::default()),
            write_lock: SpinLock::new(),
        }
    }

    /// Insert-or-update: set bit `app_id` in the subscribers bitmap for
    /// `pattern`. Idempotent.
    pub fn subscribe(&self, app_id: usize, pattern: StreamId) -> Result<()> {
        if app_id >= crate::bitmap::MAX_APPS {
            return Err(RouterError::InvalidArgument { reason: format!("app_id {app_id} out of range") });
        }

        self.write_lock.lock();
        let current = self.snapshot.load();
        let mut next: Snapshot = (**current).clone();
        next.entry(pattern).or_insert_with(BitmapSet::new).set(app_id);
        self.snapshot.store(Arc::new(next));
        self.write_lock.unlock();

        log::debug!("subscribed app {app_id} to pattern {pattern:?}");
        Ok(())
    }

    /// Clear bit `app_id` for `pattern`; remove the record entirely if the
    /// bitmap becomes empty.
    pub fn unsubscribe(&self, app_id: usize, pattern: StreamId) -> Result<()> {
        self.write_lock.lock();
        let current = self.snapshot.load();
        if !current.contains_key(&pattern) {
            self.write_lock.unlock();
            return Err(RouterError::NotFound);
        }
        let mut next: Snapshot = (**current).clone();
        if let Some(bitmap) = next.get_mut(&pattern) {
            bitmap.clear(app_id);
            if bitmap.is_empty() {
                next.remove(&pattern);
            }
        }
        self.snapshot.store(Arc::new(next));
        self.write_lock.unlock();

        log::debug!("unsubscribed app {app_id} from pattern {pattern:?}");
        Ok(())
    }

    /// Remove every subscription belonging to `app_id`, across all
    /// patterns. Used during application unload.
    pub fn unsubscribe_all(&self, app_id: usize) {
        self.write_lock.lock();
        let current = self.snapshot.load();
        let mut next: Snapshot = (**current).clone();
        next.retain(|_, bitmap| {
            bitmap.clear(app_id);
            !bitmap.is_empty()
        });
        self.snapshot.store(Arc::new(next));
        self.write_lock.unlock();
    }

    /// Whether any record currently exists for exactly `pattern`. Test/
    /// inspection helper, not used on the hot path.
    pub fn contains(&self, pattern: StreamId) -> bool {
        self.snapshot.load().contains_key(&pattern)
    }

    /// Perform the router's 16 masked probes against `sid` and union the
    /// matching subscriber bitmaps. Lock-free: reads one `Arc` snapshot.
    pub fn lookup_union(&self, sid: StreamId) -> BitmapSet {
        let snapshot = self.snapshot.load();
        let mut result = BitmapSet::new();
        for probe in sid.probes() {
            if let Some(bitmap) = snapshot.get(&probe) {
                result.union(*bitmap);
            }
        }
        result
    }
}

impl Default for RequestTable {
    fn default() -> Self {
        Self::new()
    }
}
