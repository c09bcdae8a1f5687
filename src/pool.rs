// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-capacity free-list element pool. Ported from the chunk-storage
// free-list header (spinlock-protected cursor + next[] array) used
// elsewhere in this codebase for shared-memory chunk allocation, adapted
// here to a process-local, generically-typed pool of `DataEntry` records.
//
// Allocation and deallocation only ever touch the free-list structure under
// the spinlock; the payload slot itself is written by the allocating thread
// before its index is ever handed to another thread (via a ring enqueue),
// and is only read by the thread that later frees it — so no lock is needed
// on the payload itself.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::spin_lock::SpinLock;

const NIL: usize = usize::MAX;

/// A fixed-capacity pool of `T` slots with wait-free-under-contention
/// allocation, safe to allocate from and free to across threads.
pub struct MemPool<T> {
    capacity: usize,
    lock: SpinLock,
    free_head: UnsafeCell<usize>,
    next: Box<[UnsafeCell<usize>]>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    in_use: AtomicUsize,
}

// Safety: all mutable access to `free_head`/`next` happens under `lock`;
// each `slots[i]` is touched by exactly one thread at a time (the allocator
// until handoff, the freer after handoff), never concurrently.
unsafe impl<T: Send> Send for MemPool<T> {}
unsafe impl<T: Send> Sync for MemPool<T> {}

impl<T> MemPool<T> {
    /// Create a pool with room for `capacity` live entries.
    pub fn new(capacity: usize) -> Self {
        let next: Box<[UnsafeCell<usize>]> = (0..capacity)
            .map(|i| UnsafeCell::new(if i + 1 < capacity { i + 1 } else { NIL }))
            .collect();
        let slots: Box<[UnsafeCell<MaybeUninit<T>>]> =
            (0..capacity).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();

        Self {
            capacity,
            lock: SpinLock::new(),
            free_head: UnsafeCell::new(if capacity == 0 { NIL } else { 0 }),
            next,
            slots,
            in_use: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a slot and move `value` into it. Returns `None` if the pool
    /// is exhausted (the caller should treat this as a per-destination
    /// `Capacity` condition, not a hard failure).
    pub fn acquire(&self, value: T) -> Option<usize> {
        self.lock.lock();
        let head = unsafe { *self.free_head.get() };
        if head == NIL {
            self.lock.unlock();
            return None;
        }
        let new_head = unsafe { *self.next[head].get() };
        unsafe { *self.free_head.get() = new_head };
        self.lock.unlock();

        unsafe {
            (*self.slots[head].get()).write(value);
        }
        self.in_use.fetch_add(1, Ordering::Relaxed);
        Some(head)
    }

    /// Borrow the value at `id`. `id` must have come from [`acquire`] and
    /// not yet been passed to [`release`].
    ///
    /// # Safety
    /// Caller must guarantee `id` is a live slot and there is no concurrent
    /// mutable access.
    pub unsafe fn get(&self, id: usize) -> &T {
        (*self.slots[id].get()).assume_init_ref()
    }

    /// Return the slot at `id` to the free list, dropping its value.
    ///
    /// # Safety
    /// Caller must guarantee `id` is a live slot returned from [`acquire`]
    /// that has not already been released.
    pub unsafe fn release(&self, id: usize) {
        std::ptr::drop_in_place((*self.slots[id].get()).as_mut_ptr());

        self.lock.lock();
        let old_head = *self.free_head.get();
        *self.next[id].get() = old_head;
        *self.free_head.get() = id;
        self.lock.unlock();

        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_and_release_round_trip() {
        let pool: MemPool<u64> = MemPool::new(4);
        let id = pool.acquire(42).unwrap();
        assert_eq!(unsafe { *pool.get(id) }, 42);
        assert_eq!(pool.len(), 1);
        unsafe { pool.release(id) };
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn exhaustion_returns_none() {
        let pool: MemPool<u8> = MemPool::new(2);
        let a = pool.acquire(1).unwrap();
        let _b = pool.acquire(2).unwrap();
        assert!(pool.acquire(3).is_none());
        unsafe { pool.release(a) };
        assert!(pool.acquire(4).is_some());
    }

    #[test]
    fn concurrent_acquire_release_stays_bounded() {
        let pool = Arc::new(MemPool::<u64>::new(16));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for i in 0..500u64 {
                        if let Some(id) = pool.acquire(i) {
                            unsafe { pool.release(id) };
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.len(), 0);
    }
}
