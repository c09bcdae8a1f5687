// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The dispatch loop: drains IPC outbound buffers, performs the 16 masked
// lookups per message, and fans out to every matching application's ring.
// Single thread, cooperative cycle — never blocks on an application ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::app::{AppRegistry, DataEntry};
use crate::error::{Result, RouterError};
use crate::io::Io;
use crate::request_table::RequestTable;
use crate::scheduler::{SchedPolicy, Scheduler};

const DISPATCH_SLEEP: Duration = Duration::from_micros(5);

pub struct Router {
    io: Arc<dyn Io>,
    table: Arc<RequestTable>,
    registry: Arc<AppRegistry>,
    stop_flag: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    pub fn new(io: Arc<dyn Io>, table: Arc<RequestTable>, registry: Arc<AppRegistry>) -> Self {
        Self { io, table, registry, stop_flag: Arc::new(AtomicBool::new(false)), thread: Mutex::new(None) }
    }

    /// Spawn the dispatch thread, applying the requested affinity mask and
    /// scheduling policy. Warns (does not fail) if both are requested with
    /// `Deadline`, per §6.5.
    pub fn start(&self, affinity_mask: Option<u64>, sched: SchedPolicy) -> Result<()> {
        Scheduler::warn_if_conflict(sched, affinity_mask);

        let io = Arc::clone(&self.io);
        let table = Arc::clone(&self.table);
        let registry = Arc::clone(&self.registry);
        let stop_flag = Arc::clone(&self.stop_flag);

        let join = std::thread::Builder::new()
            .name("jrtc_router".into())
            .spawn(move || {
                if let Some(mask) = affinity_mask {
                    if let Err(e) = Scheduler::set_affinity(mask) {
                        log::warn!("failed to set router thread affinity: {e}");
                    }
                }
                if let Err(e) = Scheduler::apply(sched) {
                    log::warn!("failed to apply router scheduling policy: {e}");
                }
                while !stop_flag.load(Ordering::Relaxed) {
                    dispatch_once(&io, &table, &registry);
                    std::thread::sleep(DISPATCH_SLEEP);
                }
            })
            .map_err(|e| RouterError::Fatal { reason: format!("failed to spawn router thread: {e}") })?;

        *self.thread.lock().unwrap() = Some(join);
        Ok(())
    }

    /// Signal the dispatch loop to stop and join it.
    pub fn stop(&self) -> Result<()> {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            handle.join().map_err(|_| RouterError::Fatal { reason: "router thread panicked".into() })?;
        }
        Ok(())
    }
}

/// One dispatch pass: drain every buffer the IPC fabric has queued for
/// outbound delivery and fan each out to its matching subscribers. Exposed
/// standalone so tests can drive it synchronously without a background
/// thread.
pub fn dispatch_once(io: &Arc<dyn Io>, table: &RequestTable, registry: &AppRegistry) {
    let mut bufs = Vec::new();
    io.drain_out_bufs(&mut |buf| bufs.push(buf));

    for buf in bufs {
        let subscribers = table.lookup_union(buf.stream_id);
        let n_subscribers = subscribers.iter().count();
        if n_subscribers == 0 {
            io.release_buf(buf);
            continue;
        }

        // One share already exists from `reserve_buf`; add the rest up
        // front so every app below releases its own share independently
        // instead of racing to free the same slot.
        io.add_shares(buf, n_subscribers - 1);

        for app_id in subscribers {
            let Some(app) = registry.get(app_id) else {
                io.release_buf(buf);
                continue;
            };
            let delivered = app.enqueue(DataEntry { stream_id: buf.stream_id, buf });
            if !delivered {
                log::debug!("ring full or pool exhausted for app {app_id}, dropping message");
                io.release_buf(buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::LoadConfig;
    use crate::config::SchedConfig;
    use crate::io::DefaultIo;
    use crate::loader::PluginLoader;
    use crate::stream_id::StreamId;

    struct NoopLoader;
    impl PluginLoader for NoopLoader {
        fn load(&self, _name: &str, _image: &[u8]) -> Result<crate::loader::PluginHandle> {
            unreachable!("tests drive dispatch_once directly, never through AppRegistry::load")
        }
        fn resolve(&self, _h: &crate::loader::PluginHandle, _s: &str) -> Result<*const ()> {
            unreachable!()
        }
        fn close(&self, _h: crate::loader::PluginHandle) -> Result<()> {
            unreachable!()
        }
    }

    fn setup() -> (Arc<dyn Io>, Arc<RequestTable>, Arc<AppRegistry>) {
        let io: Arc<dyn Io> = Arc::new(DefaultIo::new(64));
        let table = Arc::new(RequestTable::new());
        let registry = Arc::new(AppRegistry::new(Arc::clone(&table), Arc::new(NoopLoader)));
        (io, table, registry)
    }

    #[test]
    fn no_match_releases_buffer_without_delivery() {
        let (io, table, registry) = setup();
        let sid = StreamId::generate(0x02, 0, Some("p"), Some("n")).unwrap();
        let buf = io.reserve_buf(sid, 4).unwrap();
        io.submit(buf).unwrap();
        dispatch_once(&io, &table, &registry);
        assert!(!table.contains(sid));
    }

    #[test]
    fn unmatched_buffer_share_is_actually_freed() {
        // A capacity-1 pool: if a no-match dispatch pass failed to release
        // its single share, the next reservation would fail with Capacity.
        let io: Arc<dyn Io> = Arc::new(DefaultIo::new(1));
        let table = Arc::new(RequestTable::new());
        let registry = Arc::new(AppRegistry::new(Arc::clone(&table), Arc::new(NoopLoader)));

        let sid = StreamId::generate(0x02, 0, Some("p"), Some("n")).unwrap();
        let buf = io.reserve_buf(sid, 4).unwrap();
        io.submit(buf).unwrap();
        dispatch_once(&io, &table, &registry);

        assert!(io.reserve_buf(sid, 4).is_ok());
    }
}
