// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

mod lifecycle;
mod registry;

pub use lifecycle::{AppState, Application, DataEntry, LoadConfig};
pub use registry::AppRegistry;
