//! Simulated process memory for offline analysis and testing.
//!
//! [`SimulatedMemory`] tracks a sparse set of byte regions, each mapped at a fixed base
//! address. Regions are either allocated by the marshaler (scratch buffers for value types
//! reconstructed from call results, released when the last view of the value is dropped)
//! or mapped explicitly with [`SimulatedMemory::map`], for example to replay a dump of the
//! target's heap.
//!
//! # Address Space
//!
//! Allocations start at `0x7FFF_0000_0000` and are aligned to 16 bytes. Every allocation,
//! including zero-sized ones, receives a distinct base address.
//!
//! # Memory Limits
//!
//! The total size of all live regions is capped (default 16MB). Exceeding the cap returns
//! [`Error::MemoryLimitExceeded`].

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use crate::{
    memory::{Address, ProcessMemory, ScratchRegion},
    Error, Result,
};

const ALLOCATION_BASE: u64 = 0x7FFF_0000_0000;
const ALLOCATION_ALIGN: u64 = 16;

#[derive(Debug)]
struct Region {
    data: Vec<u8>,
}

#[derive(Debug)]
struct Inner {
    /// Live regions indexed by their base address.
    regions: BTreeMap<u64, Region>,
    next_address: u64,
    current_size: usize,
}

impl Inner {
    /// Finds the region containing `[address, address + len)` and the offset into it.
    fn locate(&self, address: u64, len: usize) -> Result<(u64, usize)> {
        let Some((&base, region)) = self.regions.range(..=address).next_back() else {
            return Err(Error::InvalidPointer {
                address: Address::new(address),
                reason: "address not in any mapped region",
            });
        };

        #[allow(clippy::cast_possible_truncation)] // Offset bounded by region size below
        let offset = (address - base) as usize;
        if offset > region.data.len() || (offset == region.data.len() && len > 0) {
            return Err(Error::InvalidPointer {
                address: Address::new(address),
                reason: "address not in any mapped region",
            });
        }

        if offset + len > region.data.len() {
            return Err(Error::InvalidPointer {
                address: Address::new(address),
                reason: "access would exceed region bounds",
            });
        }

        Ok((base, offset))
    }

    /// Removes the region starting at `base`, returning its size.
    fn release(&mut self, base: u64) -> Option<usize> {
        let region = self.regions.remove(&base)?;
        self.current_size = self.current_size.saturating_sub(region.data.len());
        Some(region.data.len())
    }
}

/// A sparse, bounds-checked stand-in for the address space of a target process.
///
/// # Example
///
/// ```rust
/// use il2scope::memory::{Address, MemoryExt, ProcessMemory, SimulatedMemory};
///
/// let memory = SimulatedMemory::new(1024);
///
/// // Map a captured object at the address it had in the target.
/// memory.map(Address::new(0x1000), &[0x2a, 0, 0, 0])?;
/// assert_eq!(memory.read_value::<i32>(Address::new(0x1000))?, 42);
///
/// // Accesses outside mapped regions are rejected.
/// assert!(memory.read_value::<i32>(Address::new(0x2000)).is_err());
/// # Ok::<(), il2scope::Error>(())
/// ```
#[derive(Debug)]
pub struct SimulatedMemory {
    inner: Arc<RwLock<Inner>>,
    max_size: usize,
}

impl SimulatedMemory {
    /// Creates an empty address space with the given size limit.
    ///
    /// # Arguments
    ///
    /// * `max_size` - Maximum total size of all live regions in bytes
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        SimulatedMemory {
            inner: Arc::new(RwLock::new(Inner {
                regions: BTreeMap::new(),
                next_address: ALLOCATION_BASE,
                current_size: 0,
            })),
            max_size,
        }
    }

    fn check_limit(&self, inner: &Inner, size: usize) -> Result<()> {
        if inner.current_size + size > self.max_size {
            return Err(Error::MemoryLimitExceeded {
                current: inner.current_size,
                limit: self.max_size,
            });
        }
        Ok(())
    }

    /// Maps `data` as a new region at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPointer`] if the range overlaps an existing region and
    /// [`Error::MemoryLimitExceeded`] if the limit would be exceeded.
    pub fn map(&self, address: Address, data: &[u8]) -> Result<()> {
        let mut inner = write_lock!(self.inner);
        self.check_limit(&inner, data.len())?;

        let start = address.as_u64();
        let end = start.saturating_add(data.len() as u64);
        let overlaps_previous = inner
            .regions
            .range(..=start)
            .next_back()
            .is_some_and(|(&base, region)| base + (region.data.len() as u64).max(1) > start);
        let overlaps_next = inner
            .regions
            .range(start..end.max(start + 1))
            .next()
            .is_some();
        let overlaps = overlaps_previous || overlaps_next;
        if overlaps {
            return Err(Error::InvalidPointer {
                address,
                reason: "address already mapped",
            });
        }

        inner.regions.insert(
            start,
            Region {
                data: data.to_vec(),
            },
        );
        inner.current_size += data.len();

        if end >= inner.next_address {
            inner.next_address = align_up(end + 1);
        }
        Ok(())
    }

    /// Releases the region starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPointer`] if no region starts at `address`.
    pub fn free(&self, address: Address) -> Result<()> {
        match write_lock!(self.inner).release(address.as_u64()) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidPointer {
                address,
                reason: "not a valid allocation or already freed",
            }),
        }
    }

    /// Fills `size` bytes at `address` with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPointer`] if the range is not fully mapped.
    pub fn memset(&self, address: Address, value: u8, size: usize) -> Result<()> {
        if size == 0 {
            return Ok(());
        }

        let mut inner = write_lock!(self.inner);
        let (base, offset) = inner.locate(address.as_u64(), size)?;
        if let Some(region) = inner.regions.get_mut(&base) {
            region.data[offset..offset + size].fill(value);
        }
        Ok(())
    }

    /// Returns `true` if `address` lies inside a mapped region.
    #[must_use]
    pub fn is_valid(&self, address: Address) -> bool {
        read_lock!(self.inner).locate(address.as_u64(), 1).is_ok()
    }

    /// Returns the total size of all live regions in bytes.
    #[must_use]
    pub fn current_size(&self) -> usize {
        read_lock!(self.inner).current_size
    }

    /// Returns the maximum allowed total size in bytes.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the number of live regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        read_lock!(self.inner).regions.len()
    }
}

impl ProcessMemory for SimulatedMemory {
    fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let inner = read_lock!(self.inner);
        let (base, offset) = inner.locate(address.as_u64(), buffer.len())?;
        if let Some(region) = inner.regions.get(&base) {
            buffer.copy_from_slice(&region.data[offset..offset + buffer.len()]);
        }
        Ok(())
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut inner = write_lock!(self.inner);
        let (base, offset) = inner.locate(address.as_u64(), data.len())?;
        if let Some(region) = inner.regions.get_mut(&base) {
            region.data[offset..offset + data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    fn alloc(&self, size: usize) -> Result<Address> {
        let mut inner = write_lock!(self.inner);
        self.check_limit(&inner, size)?;

        let address = inner.next_address;
        // Zero-sized regions still consume an address so bases stay unique
        inner.next_address = align_up(address + (size as u64).max(1));

        inner.regions.insert(
            address,
            Region {
                data: vec![0; size],
            },
        );
        inner.current_size += size;

        Ok(Address::new(address))
    }

    fn alloc_scratch(&self, size: usize) -> Result<ScratchRegion> {
        let address = self.alloc(size)?;
        let inner = Arc::downgrade(&self.inner);

        Ok(ScratchRegion::new(address, size, move |address| {
            // A dropped backend has taken the region with it
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Ok(mut inner) = inner.write() {
                inner.release(address.as_u64());
            };
        }))
    }
}

impl Default for SimulatedMemory {
    fn default() -> Self {
        // Default to 16MB, plenty for scratch value types
        Self::new(16 * 1024 * 1024)
    }
}

fn align_up(address: u64) -> u64 {
    (address + ALLOCATION_ALIGN - 1) & !(ALLOCATION_ALIGN - 1)
}
