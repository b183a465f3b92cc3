//! Error types for the benchmark harness.
//!
//! Every failure here is fatal to the run: the harness performs exactly one
//! measurement attempt per invocation, so there is no retry or backoff policy
//! anywhere. Cleanup-path failures (restoring scheduling state) are swallowed
//! by their callers and never surface through this type.

use std::fmt;

/// Unified error type for harness operations.
///
/// Variants carry the platform errno reported by the failing call where one
/// exists, so the reporter can surface it next to the failing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// Mapping the executable region failed, or the requested size was invalid
    AllocationFailure { size: usize, errno: Option<i32> },
    /// Setting read/write/execute permissions on the region failed
    PermissionFailure { errno: i32 },
    /// Instruction cache synchronization is unavailable or failed
    CacheSyncFailure { errno: Option<i32> },
    /// Reading the allowed-core mask failed, or the mask was empty
    AffinityQueryFailure { errno: Option<i32> },
    /// Restricting the process to a single core failed
    AffinitySetFailure { core: usize, errno: i32 },
    /// Raising the process scheduling class failed
    PriorityClassFailure { errno: i32 },
    /// Raising the current thread to the time-critical tier failed
    ThreadPriorityFailure { errno: i32 },
    /// The monotonic counter or its tick frequency could not be obtained
    TimerFrequencyUnavailable { errno: Option<i32> },
}

impl HarnessError {
    /// The platform error code associated with this failure, if the failing
    /// call reported one.
    pub fn errno(&self) -> Option<i32> {
        match *self {
            HarnessError::AllocationFailure { errno, .. } => errno,
            HarnessError::PermissionFailure { errno } => Some(errno),
            HarnessError::CacheSyncFailure { errno } => errno,
            HarnessError::AffinityQueryFailure { errno } => errno,
            HarnessError::AffinitySetFailure { errno, .. } => Some(errno),
            HarnessError::PriorityClassFailure { errno } => Some(errno),
            HarnessError::ThreadPriorityFailure { errno } => Some(errno),
            HarnessError::TimerFrequencyUnavailable { errno } => errno,
        }
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HarnessError::AllocationFailure { size, .. } => {
                write!(f, "allocation failed: could not map {} executable bytes", size)
            }
            HarnessError::PermissionFailure { .. } => {
                write!(f, "allocation failed: could not set execute permissions")
            }
            HarnessError::CacheSyncFailure { .. } => {
                write!(f, "allocation failed: instruction cache synchronization failed")
            }
            HarnessError::AffinityQueryFailure { .. } => {
                write!(f, "environment setup failed: could not query allowed cores")
            }
            HarnessError::AffinitySetFailure { core, .. } => {
                write!(f, "environment setup failed: could not pin process to core {}", core)
            }
            HarnessError::PriorityClassFailure { .. } => {
                write!(f, "environment setup failed: could not raise process priority class")
            }
            HarnessError::ThreadPriorityFailure { .. } => {
                write!(f, "environment setup failed: could not raise thread priority")
            }
            HarnessError::TimerFrequencyUnavailable { .. } => {
                write!(f, "timer setup failed: monotonic counter frequency unavailable")
            }
        }?;
        if let Some(code) = self.errno() {
            write!(f, " (last error: {})", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for HarnessError {}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// The errno left behind by the most recent failing libc call.
pub(crate) fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_failing_step() {
        let err = HarnessError::AffinitySetFailure { core: 0, errno: 1 };
        let msg = err.to_string();
        assert!(msg.contains("environment setup failed"));
        assert!(msg.contains("core 0"));
        assert!(msg.contains("last error: 1"));
    }

    #[test]
    fn test_errno_accessor() {
        let err = HarnessError::AllocationFailure { size: 0, errno: None };
        assert_eq!(err.errno(), None);

        let err = HarnessError::TimerFrequencyUnavailable { errno: Some(22) };
        assert_eq!(err.errno(), Some(22));
    }
}
