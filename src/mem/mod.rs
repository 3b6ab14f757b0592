//! Low-memory anonymous mappings
//!
//! Loaded images, emitted code and pivot stacks must all be addressable
//! with 32 bits, because 32-bit guest code can only hold 32-bit pointers.
//! This module is the one place the crate talks to the host's mapping
//! syscalls, and the one place a host pointer is narrowed to a 32-bit
//! address. The narrowing is sound only because the placement contract is
//! re-checked at construction; if the host cannot honor it, mapping fails
//! cleanly and no fallback exists.

use std::sync::OnceLock;

use crate::error::{Error, Result};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Host page protections
    pub struct Prot: i32 {
        /// Pages may be read
        const READ = libc::PROT_READ;
        /// Pages may be written
        const WRITE = libc::PROT_WRITE;
        /// Pages may be executed
        const EXEC = libc::PROT_EXEC;
    }
}

/// The host page size
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // _SC_PAGESIZE is always defined and positive
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    })
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// An owned anonymous mapping whose entire range lies below 2^32
///
/// The mapping is released when the region is dropped. Addresses derived
/// from the region are valid only while it lives.
#[derive(Debug)]
pub struct LowRegion {
    base: *mut u8,
    len: usize,
}

// The region exclusively owns its mapping; sharing a reference only allows
// reads of the base pointer and length.
unsafe impl Send for LowRegion {}
unsafe impl Sync for LowRegion {}

impl LowRegion {
    /// Map `len` bytes of anonymous memory below 2^32 with protection
    /// `prot`
    pub fn map(len: usize, prot: Prot) -> Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                prot.bits(),
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_32BIT,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::Allocation {
                operation: "mmap",
                errno: last_errno(),
            });
        }
        // Ownership is established before the placement check so a
        // violating mapping is unmapped on the error path
        let region = Self {
            base: ptr.cast(),
            len,
        };
        let addr = region.base as usize;
        let in_range = addr
            .checked_add(len)
            .map_or(false, |end| end <= 1usize << 32);
        if !in_range || addr % page_size() != 0 {
            return Err(Error::NotLowMemory { addr, size: len });
        }
        Ok(region)
    }

    /// The base of the mapping
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// The base of the mapping as a 32-bit address
    ///
    /// This narrowing is checked at construction and nowhere else.
    pub fn base_addr(&self) -> u32 {
        self.base as u32
    }

    /// The size of the mapping in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The host address of byte `offset`, failing if it escapes the
    /// mapping
    pub fn at(&self, offset: usize) -> Result<*mut u8> {
        if offset >= self.len {
            return Err(Error::OutOfRange {
                offset,
                size: 1,
                len: self.len,
            });
        }
        Ok(unsafe { self.base.add(offset) })
    }

    /// Change the protection of `[offset, offset + len)`, which must be
    /// page-granular
    pub fn protect(&self, offset: usize, len: usize, prot: Prot) -> Result<()> {
        let end = offset.checked_add(len).ok_or(Error::OutOfRange {
            offset,
            size: len,
            len: self.len,
        })?;
        if end > self.len {
            return Err(Error::OutOfRange {
                offset,
                size: len,
                len: self.len,
            });
        }
        let rc = unsafe { libc::mprotect(self.base.add(offset).cast(), len, prot.bits()) };
        if rc != 0 {
            return Err(Error::Allocation {
                operation: "mprotect",
                errno: last_errno(),
            });
        }
        Ok(())
    }
}

impl Drop for LowRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.cast(), self.len);
        }
    }
}
