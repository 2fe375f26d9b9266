//! Scratch regions owned by the values built inside them.

use std::fmt;

use crate::memory::Address;

type Release = Box<dyn FnOnce(Address) + Send + Sync>;

/// A scratch region that is handed back to its backend when dropped.
///
/// Value types returned by value from a native call are rebuilt in scratch memory. The
/// [`ValueTypeInstance`](crate::value::ValueTypeInstance) built over the region holds it
/// through an `Arc`, and every nested view read from that instance shares the same `Arc`,
/// so the region stays mapped until the last view is gone.
///
/// # Example
///
/// ```rust
/// use il2scope::memory::{ProcessMemory, SimulatedMemory};
///
/// let memory = SimulatedMemory::new(64);
///
/// let scratch = memory.alloc_scratch(48)?;
/// assert_eq!(memory.current_size(), 48);
///
/// drop(scratch);
/// assert_eq!(memory.current_size(), 0);
/// # Ok::<(), il2scope::Error>(())
/// ```
pub struct ScratchRegion {
    address: Address,
    size: usize,
    release: Option<Release>,
}

impl ScratchRegion {
    /// Wraps a region that `release` frees once the guard is dropped.
    pub fn new(
        address: Address,
        size: usize,
        release: impl FnOnce(Address) + Send + Sync + 'static,
    ) -> Self {
        ScratchRegion {
            address,
            size,
            release: Some(Box::new(release)),
        }
    }

    /// Wraps a region whose lifetime stays tied to the backend that allocated it.
    #[must_use]
    pub fn retained(address: Address, size: usize) -> Self {
        ScratchRegion {
            address,
            size,
            release: None,
        }
    }

    /// Returns the base address of the region.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the size of the region in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` if dropping the guard releases the region.
    #[must_use]
    pub fn is_released_on_drop(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for ScratchRegion {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.address);
        }
    }
}

impl fmt::Debug for ScratchRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchRegion")
            .field("address", &self.address)
            .field("size", &self.size)
            .field("released_on_drop", &self.is_released_on_drop())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    #[test]
    fn release_runs_once_on_drop() {
        let released = Arc::new(AtomicU64::new(0));
        let observer = released.clone();

        let region = ScratchRegion::new(Address::new(0x2000), 16, move |address| {
            observer.fetch_add(address.as_u64(), Ordering::SeqCst);
        });
        assert!(region.is_released_on_drop());
        assert_eq!(released.load(Ordering::SeqCst), 0);

        drop(region);
        assert_eq!(released.load(Ordering::SeqCst), 0x2000);
    }

    #[test]
    fn retained_regions() {
        let region = ScratchRegion::retained(Address::new(0x40), 8);
        assert!(!region.is_released_on_drop());
        assert_eq!(region.address(), Address::new(0x40));
        assert_eq!(region.size(), 8);
        assert!(format!("{region:?}").contains("released_on_drop: false"));
    }
}
