// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bounded slot table of loaded applications. Grounded on this codebase's
// bounded, liveness-checked slot tables (the connection-bitmap pattern used
// for tracking live readers, and the rolling-cursor "find a free bit"
// search used for reserving a new slot).

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::app::lifecycle::{AppState, Application, LoadConfig};
use crate::bitmap::{BitmapSet, MAX_APPS};
use crate::error::{Result, RouterError};
use crate::loader::PluginLoader;
use crate::request_table::RequestTable;
use crate::scheduler::Scheduler;
use crate::stream_id::StreamId;

pub struct AppRegistry {
    slots: Vec<Mutex<Option<Arc<Application>>>>,
    occupied: Mutex<BitmapSet>,
    cursor: Mutex<usize>,
    table: Arc<RequestTable>,
    loader: Arc<dyn PluginLoader>,
}

impl AppRegistry {
    pub fn new(table: Arc<RequestTable>, loader: Arc<dyn PluginLoader>) -> Self {
        let slots = (0..MAX_APPS).map(|_| Mutex::new(None)).collect();
        Self { slots, occupied: Mutex::new(BitmapSet::new()), cursor: Mutex::new(0), table, loader }
    }

    pub fn get(&self, app_id: usize) -> Option<Arc<Application>> {
        self.slots.get(app_id)?.lock().unwrap().clone()
    }

    /// Reserve a slot, materialize the plugin image, allocate its ring and
    /// entry pool, spawn its worker thread under the requested scheduling
    /// policy, and register it. Per §4.4.
    pub fn load(&self, image: &[u8], cfg: LoadConfig) -> Result<usize> {
        let app_id = {
            let mut occupied = self.occupied.lock().unwrap();
            let mut cursor = self.cursor.lock().unwrap();
            let id = occupied.first_unset_from(*cursor).ok_or(RouterError::Capacity)?;
            occupied.set(id);
            *cursor = (id + 1) % MAX_APPS;
            id
        };

        let handle = match self.loader.load(&cfg.name, image) {
            Ok(h) => h,
            Err(e) => {
                self.release_slot(app_id);
                return Err(e);
            }
        };
        let entry_point = match self.loader.resolve(&handle, "start") {
            Ok(p) => p,
            Err(e) => {
                let _ = self.loader.close(handle);
                self.release_slot(app_id);
                return Err(e);
            }
        };

        let app = Arc::new(Application::new(app_id, &cfg));
        app.set_plugin_handle(handle);
        app.set_state(AppState::Running);

        let worker_name = cfg.name.clone();
        let sched = app.sched.clone();
        let exit_flag = Arc::clone(&app.exit_flag);
        // Safety: `entry_point` was resolved from a symbol named `start`
        // that the plugin contract requires to have this signature; the
        // pointer is used only inside the worker thread spawned below,
        // which owns the plugin's lifetime via `handle`/`Application`.
        let entry_point = entry_point as usize;
        let builder = std::thread::Builder::new().name(worker_name.clone());
        let join = builder
            .spawn(move || {
                if let Err(e) = Scheduler::apply(sched.to_policy()) {
                    log::warn!("failed to apply scheduling policy to app `{worker_name}`: {e}");
                }
                let entry: extern "C" fn(*const std::sync::atomic::AtomicBool) -> i32 =
                    unsafe { std::mem::transmute(entry_point) };
                let _ = entry(Arc::as_ptr(&exit_flag));
            })
            .map_err(|e| RouterError::Fatal { reason: format!("failed to spawn app worker: {e}") })?;
        app.set_worker(join);

        *self.slots[app_id].lock().unwrap() = Some(app);
        log::info!("loaded app `{}` into slot {app_id}", cfg.name);
        Ok(app_id)
    }

    /// Set `exit_flag`, join the worker within `timeout`, close the plugin
    /// handle, and release the slot. A join failure is `Fatal`.
    pub fn unload(&self, app_id: usize, timeout: Duration) -> Result<()> {
        let app = self.get(app_id).ok_or(RouterError::NotFound)?;
        app.set_state(AppState::Draining);
        app.exit_flag.store(true, Ordering::SeqCst);

        self.table.unsubscribe_all(app_id);

        if let Some(handle) = app.take_worker() {
            if !join_with_timeout(handle, timeout) {
                return Err(RouterError::Fatal { reason: format!("app `{}` worker failed to join", app.name) });
            }
        }

        if let Some(plugin) = app.take_plugin_handle() {
            self.loader.close(plugin)?;
        }

        app.output_channels.lock().unwrap().clear();
        app.input_channels.lock().unwrap().clear();
        app.set_state(AppState::Released);

        *self.slots[app_id].lock().unwrap() = None;
        self.occupied.lock().unwrap().clear(app_id);
        log::info!("unloaded app `{}` from slot {app_id}", app.name);
        Ok(())
    }

    pub fn subscribe(&self, app_id: usize, pattern: StreamId) -> Result<()> {
        if self.get(app_id).is_none() {
            return Err(RouterError::NotFound);
        }
        self.table.subscribe(app_id, pattern)
    }

    pub fn unsubscribe(&self, app_id: usize, pattern: StreamId) -> Result<()> {
        if self.get(app_id).is_none() {
            return Err(RouterError::NotFound);
        }
        self.table.unsubscribe(app_id, pattern)
    }

    fn release_slot(&self, app_id: usize) {
        self.occupied.lock().unwrap().clear(app_id);
    }

    /// Reserve a slot and register an already-constructed `Application`
    /// directly, bypassing the plugin loader. Used by integration tests to
    /// exercise the subscribe/dispatch/receive/unload path end-to-end
    /// without a real shared-object image.
    #[cfg(feature = "test-support")]
    pub fn insert_for_test(&self, cfg: LoadConfig) -> Result<usize> {
        let app_id = {
            let mut occupied = self.occupied.lock().unwrap();
            let mut cursor = self.cursor.lock().unwrap();
            let id = occupied.first_unset_from(*cursor).ok_or(RouterError::Capacity)?;
            occupied.set(id);
            *cursor = (id + 1) % MAX_APPS;
            id
        };
        let app = Arc::new(Application::new(app_id, &cfg));
        app.set_state(AppState::Running);
        *self.slots[app_id].lock().unwrap() = Some(app);
        Ok(app_id)
    }

    /// Counterpart to [`Self::insert_for_test`]: release the slot without
    /// requiring a plugin handle or worker thread to join.
    #[cfg(feature = "test-support")]
    pub fn remove_for_test(&self, app_id: usize) {
        self.table.unsubscribe_all(app_id);
        *self.slots[app_id].lock().unwrap() = None;
        self.occupied.lock().unwrap().clear(app_id);
    }
}

/// Join `handle`, polling so the wait is bounded instead of indefinite.
/// `JoinHandle` has no native timed join, so this spins a short sleep loop
/// checking `is_finished`, mirroring the bounded-wait requirement on
/// unload without needing a separate watchdog thread.
fn join_with_timeout(handle: std::thread::JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    handle.join().is_ok()
}
