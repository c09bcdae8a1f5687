// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Real-time scheduling for the router and application worker threads.
//
// SCHED_FIFO is applied via `pthread_setschedparam`, the same technique this
// codebase's realtime-priority helper already uses for audio threads.
// SCHED_DEADLINE has no wrapper in the `libc` crate, so it is applied with
// the raw `sched_setattr` syscall and the per-architecture syscall numbers
// the router this is built on defines directly (x86_64, x86, arm).

use crate::error::{Result, RouterError};

/// Scheduling policy for a router or application worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    Normal,
    Fifo { priority: i32 },
    Deadline { runtime_ns: u64, deadline_ns: u64, period_ns: u64 },
}

pub struct Scheduler;

impl Scheduler {
    /// Apply `policy` to the calling thread.
    pub fn apply(policy: SchedPolicy) -> Result<()> {
        match policy {
            SchedPolicy::Normal => Ok(()),
            SchedPolicy::Fifo { priority } => apply_fifo(priority),
            SchedPolicy::Deadline { runtime_ns, deadline_ns, period_ns } => {
                apply_deadline(runtime_ns, deadline_ns, period_ns)
            }
        }
    }

    /// Pin the calling thread to the CPUs set in `mask` (bit `i` = CPU `i`).
    pub fn set_affinity(mask: u64) -> Result<()> {
        imp::set_affinity(mask)
    }

    /// Log a warning if `policy` is `Deadline` while an affinity mask is
    /// also requested; the two are mutually exclusive on Linux.
    pub fn warn_if_conflict(policy: SchedPolicy, affinity_mask: Option<u64>) {
        if matches!(policy, SchedPolicy::Deadline { .. }) && affinity_mask.is_some() {
            log::warn!("SCHED_DEADLINE policy cannot be used in conjunction with affinitized threads");
        }
    }
}

#[cfg(unix)]
fn apply_fifo(priority: i32) -> Result<()> {
    unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = priority;
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc != 0 {
            return Err(RouterError::InvalidArgument {
                reason: format!("pthread_setschedparam(SCHED_FIFO, {priority}) failed: errno {rc}"),
            });
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_fifo(_priority: i32) -> Result<()> {
    Err(RouterError::InvalidArgument { reason: "SCHED_FIFO unsupported on this platform".into() })
}

#[cfg(target_os = "linux")]
mod imp {
    use super::*;

    #[cfg(target_arch = "x86_64")]
    const SYS_SCHED_SETATTR: libc::c_long = 314;
    #[cfg(target_arch = "x86")]
    const SYS_SCHED_SETATTR: libc::c_long = 351;
    #[cfg(target_arch = "arm")]
    const SYS_SCHED_SETATTR: libc::c_long = 380;

    const SCHED_DEADLINE: u32 = 6;

    #[repr(C)]
    struct SchedAttr {
        size: u32,
        sched_policy: u32,
        sched_flags: u64,
        sched_nice: i32,
        sched_priority: u32,
        sched_runtime: u64,
        sched_deadline: u64,
        sched_period: u64,
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "x86", target_arch = "arm"))]
    pub(super) fn apply_deadline(runtime_ns: u64, deadline_ns: u64, period_ns: u64) -> Result<()> {
        let attr = SchedAttr {
            size: std::mem::size_of::<SchedAttr>() as u32,
            sched_policy: SCHED_DEADLINE,
            sched_flags: 0,
            sched_nice: 0,
            sched_priority: 0,
            sched_runtime: runtime_ns,
            sched_deadline: deadline_ns,
            sched_period: period_ns,
        };
        let rc = unsafe { libc::syscall(SYS_SCHED_SETATTR, 0i32, &attr as *const SchedAttr, 0u32) };
        if rc != 0 {
            return Err(RouterError::InvalidArgument {
                reason: format!("sched_setattr(SCHED_DEADLINE) failed: {}", std::io::Error::last_os_error()),
            });
        }
        Ok(())
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "arm")))]
    pub(super) fn apply_deadline(_runtime_ns: u64, _deadline_ns: u64, _period_ns: u64) -> Result<()> {
        Err(RouterError::InvalidArgument { reason: "SCHED_DEADLINE unsupported on this architecture".into() })
    }

    pub(super) fn set_affinity(mask: u64) -> Result<()> {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            for cpu in 0..64 {
                if (mask >> cpu) & 1 != 0 {
                    libc::CPU_SET(cpu as usize, &mut set);
                }
            }
            let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
            if rc != 0 {
                return Err(RouterError::InvalidArgument {
                    reason: format!("sched_setaffinity failed: {}", std::io::Error::last_os_error()),
                });
            }
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::*;

    pub(super) fn apply_deadline(_runtime_ns: u64, _deadline_ns: u64, _period_ns: u64) -> Result<()> {
        Err(RouterError::InvalidArgument { reason: "SCHED_DEADLINE requires Linux".into() })
    }

    pub(super) fn set_affinity(_mask: u64) -> Result<()> {
        Err(RouterError::InvalidArgument { reason: "CPU affinity requires Linux".into() })
    }
}

fn apply_deadline(runtime_ns: u64, deadline_ns: u64, period_ns: u64) -> Result<()> {
    imp::apply_deadline(runtime_ns, deadline_ns, period_ns)
}
