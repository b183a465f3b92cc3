//! Executable memory region management.
//!
//! The region is mapped read+write+execute in a single step and keeps those
//! permissions for its entire lifetime; no W^X transition is modeled. The
//! mapping is exclusively owned by the run that acquired it and is returned
//! to the system on drop, including on partially-failed construction paths.

use crate::error::{last_errno, HarnessError, Result};
use std::ptr;
use tracing::debug;

/// A fixed-size block of read/write/execute memory.
pub struct ExecRegion {
    base: *mut u8,
    size: usize,
}

impl ExecRegion {
    /// Reserves and commits `size` bytes with execute+read+write permission.
    ///
    /// A zero-sized request is rejected up front with `AllocationFailure`
    /// rather than being passed to the kernel; mmap would refuse it anyway,
    /// but the harness treats it as a configuration error, not a platform one.
    pub fn acquire(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(HarnessError::AllocationFailure { size, errno: None });
        }

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(HarnessError::AllocationFailure {
                size,
                errno: Some(last_errno()),
            });
        }

        debug!(size, "mapped executable region");
        Ok(ExecRegion {
            base: base as *mut u8,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Copies `bytes` into the region starting at `offset`.
    ///
    /// Panics if the write would run past the end of the region. The
    /// generator's budget arithmetic guarantees this never happens for a
    /// valid template/region pairing, so an overrun here is a fatal internal
    /// invariant violation, not a recoverable condition.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= self.size,
            "write of {} bytes at offset {} overruns region of {} bytes",
            bytes.len(),
            offset,
            self.size
        );
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(offset), bytes.len());
        }
    }

    /// The region's contents as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        // The mapping is always readable for the region's lifetime.
        unsafe { std::slice::from_raw_parts(self.base, self.size) }
    }

    /// Makes the instruction cache coherent with data written into the
    /// region.
    ///
    /// Must run after the last write and before the first execution. On
    /// architectures with split instruction/data caches this is a correctness
    /// requirement, not an optimization: stale cache lines can execute old
    /// bytes.
    pub fn sync_instruction_cache(&self) -> Result<()> {
        self.flush_icache()
    }

    #[cfg(target_arch = "x86_64")]
    fn flush_icache(&self) -> Result<()> {
        // x86_64 keeps I/D caches coherent in hardware; mfence drains the
        // store buffer so the writes are globally visible before the call.
        unsafe {
            std::arch::asm!("mfence", options(nostack));
        }
        Ok(())
    }

    #[cfg(target_arch = "aarch64")]
    fn flush_icache(&self) -> Result<()> {
        // Clean D-cache to the point of unification, invalidate I-cache, then
        // flush the fetch pipeline. 64-byte stride is safe on current ARM64
        // cores.
        unsafe {
            let start = self.base as usize;
            let end = start + self.size;
            let stride = 64;

            let mut addr = start;
            while addr < end {
                std::arch::asm!("dc cvau, {0}", in(reg) addr);
                addr += stride;
            }
            std::arch::asm!("dsb ish");

            addr = start;
            while addr < end {
                std::arch::asm!("ic ivau, {0}", in(reg) addr);
                addr += stride;
            }
            std::arch::asm!("dsb ish");
            std::arch::asm!("isb");
        }
        Ok(())
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    fn flush_icache(&self) -> Result<()> {
        // No known flush sequence for this architecture; executing freshly
        // written code would be unsound.
        Err(HarnessError::CacheSyncFailure { errno: None })
    }

    /// Reinterprets the first byte of the region as the benchmark entry
    /// point.
    ///
    /// # Safety
    /// The caller must have filled the region with machine code valid for the
    /// current architecture that conforms to `extern "C" fn(i32) -> i32`, and
    /// must have called [`sync_instruction_cache`](Self::sync_instruction_cache)
    /// after the last write.
    pub unsafe fn entry_fn(&self) -> extern "C" fn(i32) -> i32 {
        std::mem::transmute::<*mut u8, extern "C" fn(i32) -> i32>(self.base)
    }
}

impl Drop for ExecRegion {
    fn drop(&mut self) {
        // Best-effort release; a failed munmap leaks address space but the
        // process is about to exit anyway in every caller of this type.
        unsafe {
            libc::munmap(self.base as *mut _, self.size);
        }
    }
}
