// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use thiserror::Error;

/// Error taxonomy for the router and its components.
///
/// `Fatal` is special: callers that receive it must abort the process rather
/// than attempt recovery, because continuing risks corrupting the shared IPC
/// region. See [`abort_on_fatal`].
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("capacity exhausted")]
    Capacity,

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("not found")]
    NotFound,

    #[error("plugin load failed: {reason}")]
    PluginLoad { reason: String },

    #[error("fatal: {reason}")]
    Fatal { reason: String },

    #[error("ipc unavailable")]
    IpcUnavailable,
}

impl From<std::io::Error> for RouterError {
    fn from(e: std::io::Error) -> Self {
        RouterError::PluginLoad { reason: e.to_string() }
    }
}

/// Log and abort on a `Fatal` error; otherwise return it unchanged.
///
/// Per the error-handling design, a worker-join failure or a plugin-close
/// failure must not be allowed to unwind past the caller — the process state
/// is no longer trustworthy.
pub fn abort_on_fatal(err: RouterError) -> RouterError {
    if let RouterError::Fatal { reason } = &err {
        log::error!("fatal router error, aborting process: {reason}");
        std::process::abort();
    }
    err
}

pub type Result<T> = std::result::Result<T, RouterError>;
