// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The router context is a process-wide singleton; construction and
// teardown are explicit `init`/`stop` calls. `RouterHandle` is what an
// embedding binary (the CLI, or a REST control-plane this crate does not
// implement) holds and drives.

use std::sync::Arc;
use std::time::Duration;

use crate::app::{AppRegistry, LoadConfig};
use crate::config::RouterConfig;
use crate::error::Result;
use crate::io::Io;
use crate::loader::{DefaultLoader, PluginLoader};
use crate::request_table::RequestTable;
use crate::router::Router;
use crate::stream_id::StreamId;

pub struct RouterHandle {
    registry: Arc<AppRegistry>,
    table: Arc<RequestTable>,
    router: Router,
    unload_timeout: Duration,
}

impl RouterHandle {
    /// Construct the router context against a given `Io` fabric, using the
    /// default plugin loader.
    pub fn init(io: Arc<dyn Io>) -> Self {
        Self::init_with_loader(io, Arc::new(DefaultLoader))
    }

    pub fn init_with_loader(io: Arc<dyn Io>, loader: Arc<dyn PluginLoader>) -> Self {
        let table = Arc::new(RequestTable::new());
        let registry = Arc::new(AppRegistry::new(Arc::clone(&table), loader));
        let router = Router::new(io, Arc::clone(&table), Arc::clone(&registry));
        Self { registry, table, router, unload_timeout: Duration::from_millis(2000) }
    }

    /// Start the dispatch thread per `cfg`.
    pub fn start(&mut self, cfg: &RouterConfig) -> Result<()> {
        self.unload_timeout = Duration::from_millis(cfg.unload_timeout_ms);
        self.router.start(cfg.affinity_mask, cfg.sched.to_policy())
    }

    /// Stop the dispatch thread, then unload every remaining application.
    /// A `Fatal` unload error (a worker that won't join, or a plugin that
    /// won't `dlclose`) is routed through [`abort_on_fatal`](crate::error::abort_on_fatal)
    /// rather than swallowed, since the shared IPC region's state is no
    /// longer trustworthy once that happens.
    pub fn stop(&self) -> Result<()> {
        self.router.stop()?;
        for app_id in 0..crate::bitmap::MAX_APPS {
            if self.registry.get(app_id).is_some() {
                if let Err(e) = self.registry.unload(app_id, self.unload_timeout) {
                    let e = crate::error::abort_on_fatal(e);
                    log::warn!("failed to unload app {app_id} during shutdown: {e}");
                }
            }
        }
        Ok(())
    }

    pub fn load_app(&self, image: &[u8], cfg: LoadConfig) -> Result<usize> {
        self.registry.load(image, cfg)
    }

    pub fn unload_app(&self, app_id: usize) -> Result<()> {
        self.registry.unload(app_id, self.unload_timeout)
    }

    pub fn subscribe(&self, app_id: usize, pattern: StreamId) -> Result<()> {
        self.registry.subscribe(app_id, pattern)
    }

    pub fn unsubscribe(&self, app_id: usize, pattern: StreamId) -> Result<()> {
        self.registry.unsubscribe(app_id, pattern)
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    pub fn table(&self) -> &Arc<RequestTable> {
        &self.table
    }
}
