// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A single application's ring, entry pool, and channel maps. Owned
// exclusively by the application once created; the registry holds only a
// weak reference by slot index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::channel::ChannelCtx;
use crate::config::SchedConfig;
use crate::io::BufHandle;
use crate::loader::PluginHandle;
use crate::pool::MemPool;
use crate::ring::RingBuffer;
use crate::stream_id::StreamId;

/// `Reserved -> Running -> Draining -> Released`. Terminal state releases
/// the slot back to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Reserved,
    Running,
    Draining,
    Released,
}

/// One entry produced by the router's fan-out for a specific application.
#[derive(Clone, Copy)]
pub struct DataEntry {
    pub stream_id: StreamId,
    pub buf: BufHandle,
}

/// Parameters for loading a new application, mirroring the control-plane
/// `load_app` request shape.
pub struct LoadConfig {
    pub name: String,
    pub queue_size: usize,
    pub sched: SchedConfig,
}

pub struct Application {
    pub id: usize,
    pub name: String,
    ring: RingBuffer<usize>,
    entry_pool: MemPool<DataEntry>,
    pub output_channels: Mutex<HashMap<StreamId, ChannelCtx>>,
    pub input_channels: Mutex<HashMap<StreamId, ChannelCtx>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    plugin_handle: Mutex<Option<PluginHandle>>,
    pub exit_flag: Arc<AtomicBool>,
    pub sched: SchedConfig,
    state: Mutex<AppState>,
}

impl Application {
    pub(crate) fn new(id: usize, cfg: &LoadConfig) -> Self {
        Self {
            id,
            name: cfg.name.clone(),
            ring: RingBuffer::new(cfg.queue_size),
            entry_pool: MemPool::new(cfg.queue_size),
            output_channels: Mutex::new(HashMap::new()),
            input_channels: Mutex::new(HashMap::new()),
            worker: Mutex::new(None),
            plugin_handle: Mutex::new(None),
            exit_flag: Arc::new(AtomicBool::new(false)),
            sched: cfg.sched.clone(),
            state: Mutex::new(AppState::Reserved),
        }
    }

    pub fn state(&self) -> AppState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: AppState) {
        *self.state.lock().unwrap() = state;
    }

    pub(crate) fn set_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock().unwrap() = Some(handle);
    }

    pub(crate) fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().unwrap().take()
    }

    pub(crate) fn set_plugin_handle(&self, handle: PluginHandle) {
        *self.plugin_handle.lock().unwrap() = Some(handle);
    }

    pub(crate) fn take_plugin_handle(&self) -> Option<PluginHandle> {
        self.plugin_handle.lock().unwrap().take()
    }

    /// Allocate an entry-pool slot for `entry` and enqueue it on this
    /// application's ring. Returns `false` (drop-newest, per §4.2) if
    /// either the pool is exhausted or the ring is full; the pool slot is
    /// freed again in the ring-full case.
    pub(crate) fn enqueue(&self, entry: DataEntry) -> bool {
        let Some(slot) = self.entry_pool.acquire(entry) else {
            return false;
        };
        if !self.ring.write(slot) {
            unsafe { self.entry_pool.release(slot) };
            return false;
        }
        true
    }

    /// Drain up to `batch_size` queued entries, in FIFO order, freeing
    /// their entry-pool slots as they're copied out. The caller is
    /// responsible for eventually calling `Io::release_buf` on each
    /// returned buffer.
    pub fn receive(&self, batch_size: usize) -> Vec<DataEntry> {
        let mut out = Vec::with_capacity(batch_size.min(self.ring.capacity()));
        let mut slot = 0usize;
        while out.len() < batch_size && self.ring.read(&mut slot) {
            let entry = unsafe { *self.entry_pool.get(slot) };
            unsafe { self.entry_pool.release(slot) };
            out.push(entry);
        }
        out
    }

    pub fn queue_len(&self) -> usize {
        self.ring.available()
    }
}
