//! Controlled execution environment for the timed call.
//!
//! Entering the environment mutates process-wide scheduling state: the
//! process is pinned to its lowest-numbered allowed core, the process
//! scheduling class is raised, and the current thread is moved to the
//! time-critical real-time tier. Because the state is process-wide, two
//! measurements cannot run concurrently in one process; that is a design
//! constraint, not an oversight.
//!
//! Teardown is deliberately asymmetric. Dropping the guard restores the
//! thread scheduling policy and the process nice value to their defaults
//! (best-effort, errors logged and swallowed), but the single-core affinity
//! restriction stays in place for the remainder of the process's life. The
//! one-way pin keeps repeated manual runs on the same core.

use crate::error::{last_errno, HarnessError, Result};
use std::mem;
use tracing::{debug, info, warn};

/// Nice value used for the "high" process scheduling class.
const HIGH_TIER_NICE: libc::c_int = -10;

/// Scoped handle over the raised scheduling state.
///
/// Restores on drop: thread policy (back to `SCHED_OTHER`), process nice
/// value (back to 0). Does NOT restore: core affinity (one-way by contract).
pub struct EnvironmentGuard {
    pinned_core: usize,
    snapshot: EnvironmentSnapshot,
}

/// Scheduling state captured before mutation. Kept for inspection only: the
/// exit path restores known-good defaults rather than replaying the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentSnapshot {
    pub allowed_cores: usize,
    pub nice: libc::c_int,
}

impl EnvironmentGuard {
    /// Pins the process to one core and raises scheduling priority.
    ///
    /// Any failing step runs the exit path as cleanup before the error is
    /// returned. In both outcomes the thread yields once afterwards so the
    /// scheduler settles into the new configuration before timed work begins.
    pub fn enter() -> Result<Self> {
        let entered = Self::try_enter();
        if entered.is_err() {
            restore_defaults();
        }
        // Give up the slice once; the next dispatch runs under the final
        // scheduling configuration.
        unsafe {
            libc::sched_yield();
        }
        entered
    }

    fn try_enter() -> Result<Self> {
        let mask = query_allowed_cores()?;
        let allowed_cores = unsafe { libc::CPU_COUNT(&mask) } as usize;
        let core = lowest_allowed_core(&mask)
            .ok_or(HarnessError::AffinityQueryFailure { errno: None })?;
        let snapshot = EnvironmentSnapshot {
            allowed_cores,
            nice: current_nice(),
        };

        pin_process_to_core(core)?;
        raise_process_class()?;
        raise_thread_priority()?;

        info!(core, "entered controlled environment");
        Ok(EnvironmentGuard {
            pinned_core: core,
            snapshot,
        })
    }

    /// The core the process was restricted to.
    pub fn pinned_core(&self) -> usize {
        self.pinned_core
    }

    pub fn snapshot(&self) -> EnvironmentSnapshot {
        self.snapshot
    }
}

impl Drop for EnvironmentGuard {
    fn drop(&mut self) {
        restore_defaults();
        debug!(
            core = self.pinned_core,
            "left controlled environment; core pin remains in place"
        );
    }
}

fn query_allowed_cores() -> Result<libc::cpu_set_t> {
    unsafe {
        let mut mask: libc::cpu_set_t = mem::zeroed();
        let ret = libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut mask);
        if ret != 0 {
            return Err(HarnessError::AffinityQueryFailure {
                errno: Some(last_errno()),
            });
        }
        Ok(mask)
    }
}

/// Lowest-numbered core present in the allowed mask, `None` if the mask is
/// empty.
fn lowest_allowed_core(mask: &libc::cpu_set_t) -> Option<usize> {
    (0..libc::CPU_SETSIZE as usize).find(|&core| unsafe { libc::CPU_ISSET(core, mask) })
}

fn pin_process_to_core(core: usize) -> Result<()> {
    unsafe {
        let mut mask: libc::cpu_set_t = mem::zeroed();
        libc::CPU_SET(core, &mut mask);

        let ret = libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mask);
        if ret != 0 {
            return Err(HarnessError::AffinitySetFailure {
                core,
                errno: last_errno(),
            });
        }
    }
    Ok(())
}

fn raise_process_class() -> Result<()> {
    let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, 0, HIGH_TIER_NICE) };
    if ret != 0 {
        return Err(HarnessError::PriorityClassFailure {
            errno: last_errno(),
        });
    }
    Ok(())
}

/// Moves the calling thread to the maximum SCHED_FIFO priority, the closest
/// Linux analog of a time-critical thread tier.
fn raise_thread_priority() -> Result<()> {
    unsafe {
        let max = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if max < 0 {
            return Err(HarnessError::ThreadPriorityFailure {
                errno: last_errno(),
            });
        }
        let param = libc::sched_param {
            sched_priority: max,
        };
        if libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) != 0 {
            return Err(HarnessError::ThreadPriorityFailure {
                errno: last_errno(),
            });
        }
    }
    Ok(())
}

fn current_nice() -> libc::c_int {
    // -1 is both a valid nice value and the error return; callers only use
    // this for the snapshot, so the ambiguity is acceptable.
    unsafe { libc::getpriority(libc::PRIO_PROCESS as _, 0) }
}

/// Best-effort restoration of default scheduling state. Failures here must
/// never mask a primary error, so they are logged and swallowed.
fn restore_defaults() {
    unsafe {
        let param = libc::sched_param { sched_priority: 0 };
        if libc::sched_setscheduler(0, libc::SCHED_OTHER, &param) != 0 {
            warn!(
                errno = last_errno(),
                "failed to restore default thread scheduling policy"
            );
        }
        if libc::setpriority(libc::PRIO_PROCESS as _, 0, 0) != 0 {
            warn!(errno = last_errno(), "failed to restore default nice value");
        }
    }
    // The single-core affinity restriction is intentionally left in place.
}
