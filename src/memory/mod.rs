//! Raw access to the memory of the target process.
//!
//! The marshaler never touches memory directly. Every read and write goes through the
//! [`ProcessMemory`] trait, which models the attached process as a flat, unsynchronized,
//! byte-addressable array. Two backends ship with the crate:
//!
//! - [`LocalMemory`] - the agent runs inside the target process and dereferences addresses
//!   directly
//! - [`SimulatedMemory`] - a sparse set of allocated regions, used for offline analysis of
//!   captured memory and for tests
//!
//! Typed access is layered on top by [`MemoryExt`], which is implemented for every backend
//! and reads or writes any [`NativeIO`] value, as well as pointer-width words whose size is
//! taken from a [`PointerWidth`].
//!
//! # Example
//!
//! ```rust
//! use il2scope::memory::{MemoryExt, ProcessMemory, SimulatedMemory};
//! use il2scope::PointerWidth;
//!
//! let memory = SimulatedMemory::default();
//! let slot = memory.alloc(16)?;
//!
//! memory.write_value(slot, -7_i32)?;
//! assert_eq!(memory.read_value::<i32>(slot)?, -7);
//!
//! memory.write_pointer(slot.add(8), slot, PointerWidth::Bits64)?;
//! assert_eq!(memory.read_pointer(slot.add(8), PointerWidth::Bits64)?, slot);
//! # Ok::<(), il2scope::Error>(())
//! ```

use std::fmt;

pub mod io;
mod local;
mod scratch;
mod simulated;

pub use io::NativeIO;
pub use local::LocalMemory;
pub use scratch::ScratchRegion;
pub use simulated::SimulatedMemory;

use crate::{config::PointerWidth, Result};

/// An absolute address inside the target process.
///
/// Addresses are always stored as 64-bit values, independent of the pointer width of the
/// target; narrowing to 32 bits only happens when an address is written into a slot of a
/// 32-bit target.
///
/// Addresses format as zero-padded hexadecimal with at least eight digits:
///
/// ```rust
/// use il2scope::memory::Address;
///
/// assert_eq!(Address::new(0xbeef).to_string(), "0x0000beef");
/// assert_eq!(Address::new(0x7fff_0000_0010).to_string(), "0x7fff00000010");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address {
    /// The null address.
    pub const NULL: Address = Address(0);

    /// Creates a new address from its raw value.
    #[must_use]
    pub const fn new(address: u64) -> Self {
        Address(address)
    }

    /// Creates an address pointing at a value in the current process.
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Address(ptr as usize as u64)
    }

    /// Returns the raw value of this address.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the null address.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the address `offset` bytes past this one.
    ///
    /// Wraps on overflow, like pointer arithmetic in the target process.
    #[must_use]
    pub const fn add(self, offset: u64) -> Self {
        Address(self.0.wrapping_add(offset))
    }

    /// Returns the address `offset` bytes before this one.
    #[must_use]
    pub const fn sub(self, offset: u64) -> Self {
        Address(self.0.wrapping_sub(offset))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for Address {
    fn from(address: u64) -> Self {
        Address(address)
    }
}

impl From<Address> for u64 {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Byte-level access to the memory of the target process.
///
/// Implementations decide how addresses map to memory. All methods take `&self`, so a
/// single backend can be shared between marshalers; backends that need to mutate internal
/// bookkeeping use interior mutability.
///
/// No method is atomic across more than the bytes of a single call. Callers writing several
/// fields observe partial writes if a later access fails.
pub trait ProcessMemory {
    /// Fills `buffer` with the bytes stored at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend can detect that the range is not readable.
    fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<()>;

    /// Stores `data` at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend can detect that the range is not writable.
    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<()>;

    /// Allocates a zeroed scratch region of `size` bytes.
    ///
    /// The region is owned by the backend and stays valid for as long as the backend
    /// lives (or until the backend explicitly frees it). A zero-sized request still
    /// returns a unique, non-null address.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot satisfy the allocation.
    fn alloc(&self, size: usize) -> Result<Address>;

    /// Allocates a zeroed scratch region that is released when the guard is dropped.
    ///
    /// Value type reconstruction allocates through this method, so that the instance it
    /// returns owns its storage. The default implementation cannot release anything and
    /// keeps the region alive for as long as the backend, like [`ProcessMemory::alloc`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot satisfy the allocation.
    fn alloc_scratch(&self, size: usize) -> Result<ScratchRegion> {
        Ok(ScratchRegion::retained(self.alloc(size)?, size))
    }
}

impl<M: ProcessMemory + ?Sized> ProcessMemory for &M {
    fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<()> {
        (**self).read_bytes(address, buffer)
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<()> {
        (**self).write_bytes(address, data)
    }

    fn alloc(&self, size: usize) -> Result<Address> {
        (**self).alloc(size)
    }

    fn alloc_scratch(&self, size: usize) -> Result<ScratchRegion> {
        (**self).alloc_scratch(size)
    }
}

/// Typed accessors available on every [`ProcessMemory`] backend.
pub trait MemoryExt: ProcessMemory {
    /// Reads a little-endian value of type `T` at `address`.
    ///
    /// # Errors
    ///
    /// Propagates errors from the backend.
    fn read_value<T: NativeIO>(&self, address: Address) -> Result<T> {
        let mut bytes = [0_u8; 8];
        let len = std::mem::size_of::<T>();
        self.read_bytes(address, &mut bytes[..len])?;
        io::read_le(&bytes[..len])
    }

    /// Writes a little-endian value of type `T` at `address`.
    ///
    /// # Errors
    ///
    /// Propagates errors from the backend.
    fn write_value<T: NativeIO>(&self, address: Address, value: T) -> Result<()> {
        self.write_bytes(address, value.to_le_bytes().as_ref())
    }

    /// Reads a pointer-width word at `address`.
    ///
    /// # Errors
    ///
    /// Propagates errors from the backend.
    fn read_pointer(&self, address: Address, width: PointerWidth) -> Result<Address> {
        match width {
            PointerWidth::Bits32 => Ok(Address::new(u64::from(self.read_value::<u32>(address)?))),
            PointerWidth::Bits64 => Ok(Address::new(self.read_value::<u64>(address)?)),
        }
    }

    /// Writes a pointer-width word at `address`.
    ///
    /// On 32-bit targets the upper half of `value` is discarded.
    ///
    /// # Errors
    ///
    /// Propagates errors from the backend.
    fn write_pointer(&self, address: Address, value: Address, width: PointerWidth) -> Result<()> {
        match width {
            #[allow(clippy::cast_possible_truncation)] // Narrowing to the target word is intended
            PointerWidth::Bits32 => self.write_value(address, value.as_u64() as u32),
            PointerWidth::Bits64 => self.write_value(address, value.as_u64()),
        }
    }
}

impl<M: ProcessMemory + ?Sized> MemoryExt for M {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_formatting() {
        assert_eq!(Address::NULL.to_string(), "0x00000000");
        assert_eq!(Address::new(0x1234).to_string(), "0x00001234");
        assert_eq!(format!("{:x}", Address::new(0xabc)), "abc");
    }

    #[test]
    fn address_arithmetic() {
        let base = Address::new(0x1000);
        assert_eq!(base.add(0x10), Address::new(0x1010));
        assert_eq!(base.sub(0x10), Address::new(0xff0));
        assert_eq!(Address::new(u64::MAX).add(1), Address::NULL);
        assert!(Address::NULL.is_null());
        assert!(!base.is_null());
    }

    #[test]
    fn pointer_width_narrowing() {
        let memory = SimulatedMemory::default();
        let slot = memory.alloc(8).unwrap();

        memory
            .write_pointer(slot, Address::new(0x1_2345_6789), PointerWidth::Bits32)
            .unwrap();
        assert_eq!(memory.read_value::<u32>(slot.add(4)).unwrap(), 0);
        assert_eq!(
            memory.read_pointer(slot, PointerWidth::Bits32).unwrap(),
            Address::new(0x2345_6789)
        );
    }

    #[test]
    fn backend_by_reference() {
        let memory = SimulatedMemory::default();
        let borrowed: &SimulatedMemory = &memory;

        let slot = borrowed.alloc(4).unwrap();
        borrowed.write_value(slot, 0xdead_beef_u32).unwrap();
        assert_eq!(memory.read_value::<u32>(slot).unwrap(), 0xdead_beef);

        let scratch = borrowed.alloc_scratch(12).unwrap();
        assert!(scratch.is_released_on_drop());
        drop(scratch);
        assert_eq!(memory.region_count(), 1);
    }

    struct AllocOnly(SimulatedMemory);

    impl ProcessMemory for AllocOnly {
        fn read_bytes(&self, address: Address, buffer: &mut [u8]) -> Result<()> {
            self.0.read_bytes(address, buffer)
        }

        fn write_bytes(&self, address: Address, data: &[u8]) -> Result<()> {
            self.0.write_bytes(address, data)
        }

        fn alloc(&self, size: usize) -> Result<Address> {
            self.0.alloc(size)
        }
    }

    #[test]
    fn default_scratch_is_retained() {
        let memory = AllocOnly(SimulatedMemory::default());

        let scratch = memory.alloc_scratch(8).unwrap();
        assert!(!scratch.is_released_on_drop());
        let address = scratch.address();
        drop(scratch);

        memory.write_value(address, 5_u64).unwrap();
        assert_eq!(memory.0.region_count(), 1);
    }
}
