//! Direct access to the memory of the current process.
//!
//! An instrumentation agent usually runs inside the process it inspects. In that setting
//! addresses reported by the runtime are plain pointers, and [`LocalMemory`] dereferences
//! them without any translation or validation beyond a null check.

use std::{
    alloc::{self, Layout},
    ptr::{self, NonNull},
    sync::Mutex,
};

use crate::{
    memory::{Address, ProcessMemory, ScratchRegion},
    Error, Result,
};

/// Scratch allocations are aligned for any primitive slot.
const SCRATCH_ALIGN: usize = 16;

/// Memory backend for an agent running inside the target process.
///
/// Scratch regions handed out by [`ProcessMemory::alloc`] are zeroed, 16-byte aligned and
/// owned by the backend; they are released when the backend is dropped. Regions from
/// [`ProcessMemory::alloc_scratch`] are owned by their guard instead and go back to the
/// allocator as soon as it is dropped.
///
/// # Example
///
/// ```rust
/// use il2scope::memory::{Address, LocalMemory, MemoryExt, ProcessMemory};
///
/// let value = 0x1234_u16;
///
/// // SAFETY: the only addresses used below are `value` and a backend allocation.
/// let memory = unsafe { LocalMemory::new() };
/// assert_eq!(memory.read_value::<u16>(Address::from_ptr(&value))?, 0x1234);
///
/// let scratch = memory.alloc(8)?;
/// memory.write_value(scratch, 7_u64)?;
/// assert_eq!(memory.read_value::<u64>(scratch)?, 7);
/// # Ok::<(), il2scope::Error>(())
/// ```
#[derive(Debug)]
pub struct LocalMemory {
    /// Live scratch allocations as `(address, layout)`.
    allocations: Mutex<Vec<(usize, Layout)>>,
}

impl LocalMemory {
    /// Creates a backend that dereferences addresses in the current process.
    ///
    /// # Safety
    ///
    /// Every address later passed to [`ProcessMemory::read_bytes`] or
    /// [`ProcessMemory::write_bytes`] must be valid for the accessed length. The backend only
    /// rejects null; any other invalid address is undefined behaviour and typically faults
    /// the process.
    #[must_use]
    pub unsafe fn new() -> Self {
        LocalMemory {
            allocations: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of live scratch allocations.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        lock!(self.allocations).len()
    }

    /// Allocates a zeroed, untracked region of at least one byte.
    fn allocate(&self, size: usize) -> Result<(usize, Layout)> {
        // One byte minimum so that every allocation has a unique address
        let layout = Layout::from_size_align(size.max(1), SCRATCH_ALIGN).map_err(|_| {
            Error::MemoryLimitExceeded {
                current: self.allocation_count(),
                limit: isize::MAX as usize,
            }
        })?;

        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(region) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        Ok((region.as_ptr() as usize, layout))
    }

    fn check(address: Address) -> Result<usize> {
        if address.is_null() {
            return Err(Error::InvalidPointer {
                address,
                reason: "null pointer dereference",
            });
        }

        usize::try_from(address.as_u64()).map_err(|_| Error::InvalidPointer {
            address,
            reason: "address exceeds the native pointer width",
        })
    }
}

impl ProcessMemory for LocalMemory {
    fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let source = Self::check(address)?;
        // SAFETY: validity of `address` for `buffer.len()` bytes is the contract of `new`.
        unsafe {
            ptr::copy_nonoverlapping(source as *const u8, buffer.as_mut_ptr(), buffer.len());
        }
        Ok(())
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let destination = Self::check(address)?;
        // SAFETY: validity of `address` for `data.len()` bytes is the contract of `new`.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), destination as *mut u8, data.len());
        }
        Ok(())
    }

    fn alloc(&self, size: usize) -> Result<Address> {
        let (address, layout) = self.allocate(size)?;
        lock!(self.allocations).push((address, layout));
        Ok(Address::new(address as u64))
    }

    fn alloc_scratch(&self, size: usize) -> Result<ScratchRegion> {
        let (address, layout) = self.allocate(size)?;

        Ok(ScratchRegion::new(
            Address::new(address as u64),
            size,
            move |_| {
                // SAFETY: `address` was produced by `alloc_zeroed` with this exact layout and
                // the guard releases it exactly once.
                unsafe { alloc::dealloc(address as *mut u8, layout) };
            },
        ))
    }
}

impl Drop for LocalMemory {
    fn drop(&mut self) {
        let allocations = match self.allocations.get_mut() {
            Ok(allocations) => allocations,
            Err(poisoned) => poisoned.into_inner(),
        };

        for (address, layout) in allocations.drain(..) {
            // SAFETY: each entry was produced by `alloc_zeroed` with this exact layout.
            unsafe { alloc::dealloc(address as *mut u8, layout) };
        }
    }
}
