// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Typed configuration surface. This crate does not parse a config file —
// the file format and the loader that populates these structs are external
// collaborators — but the shape the loader must produce lives here, serde-
// derived like every other wire/config struct in this codebase.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchedPolicyKind {
    Normal,
    Fifo,
    Deadline,
}

impl Default for SchedPolicyKind {
    fn default() -> Self {
        SchedPolicyKind::Normal
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedConfig {
    #[serde(default)]
    pub policy: SchedPolicyKind,
    pub priority: Option<i32>,
    pub runtime_us: Option<u64>,
    pub period_us: Option<u64>,
    pub deadline_us: Option<u64>,
}

impl SchedConfig {
    /// Convert to the `Scheduler` policy enum, per §4.4: deadline_us > 0
    /// takes precedence over an explicit priority.
    pub fn to_policy(&self) -> crate::scheduler::SchedPolicy {
        use crate::scheduler::SchedPolicy;
        match self.deadline_us {
            Some(deadline_us) if deadline_us > 0 => SchedPolicy::Deadline {
                runtime_ns: self.runtime_us.unwrap_or(0) * 1000,
                deadline_ns: deadline_us * 1000,
                period_ns: self.period_us.unwrap_or(deadline_us) * 1000,
            },
            _ => match self.priority {
                Some(priority) => SchedPolicy::Fifo { priority },
                None => SchedPolicy::Normal,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpcConfig {
    pub name: Option<String>,
    pub path: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestConfig {
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub affinity_mask: Option<u64>,
    #[serde(default)]
    pub sched: SchedConfig,
    #[serde(default = "default_unload_timeout_ms")]
    pub unload_timeout_ms: u64,
}

fn default_unload_timeout_ms() -> u64 {
    2000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { affinity_mask: None, sched: SchedConfig::default(), unload_timeout_ms: default_unload_timeout_ms() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub rest: RestConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sched_config_prefers_deadline_over_priority() {
        let cfg = SchedConfig { policy: SchedPolicyKind::Deadline, priority: Some(10), deadline_us: Some(5000), runtime_us: Some(1000), period_us: Some(5000) };
        assert!(matches!(cfg.to_policy(), crate::scheduler::SchedPolicy::Deadline { .. }));
    }

    #[test]
    fn sched_config_defaults_to_normal() {
        let cfg = SchedConfig::default();
        assert!(matches!(cfg.to_policy(), crate::scheduler::SchedPolicy::Normal));
    }
}
