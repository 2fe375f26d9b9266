//! Little-endian primitive codecs for target process memory.
//!
//! Every value the marshaler moves between a [`Value`](crate::Value) and foreign memory
//! passes through the [`NativeIO`] trait. The trait is implemented for all fixed-width
//! integer and floating point types the runtime can store inline; the supported targets are
//! all little-endian, so only little-endian conversions exist.
//!
//! # Usage Examples
//!
//! ```rust
//! use il2scope::memory::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 6];
//! let mut offset = 0;
//! write_le_at(&mut data, &mut offset, 1_u16)?;
//! write_le_at(&mut data, &mut offset, -2_i32)?;
//! assert_eq!(offset, 6);
//!
//! let mut offset = 0;
//! let first: u16 = read_le_at(&data, &mut offset)?;
//! let second: i32 = read_le_at(&data, &mut offset)?;
//! assert_eq!((first, second), (1, -2));
//! # Ok::<(), il2scope::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive values that can be stored inline in target memory.
///
/// The associated [`NativeIO::Bytes`] array has exactly `size_of::<Self>()` elements, so the
/// width of a slot is always derived from the Rust type that is read or written and never
/// from the bytes themselves.
pub trait NativeIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_native_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl NativeIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_native_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Safely reads a value of type `T` in little-endian byte order from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: NativeIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`.
///
/// The offset is advanced by the number of bytes read.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: NativeIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}

/// Safely writes a value of type `T` in little-endian byte order to the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn write_le<T: NativeIO>(data: &mut [u8], value: T) -> Result<()> {
    let mut offset = 0_usize;
    write_le_at(data, &mut offset, value)
}

/// Safely writes a value of type `T` in little-endian byte order at `offset`.
///
/// The offset is advanced by the number of bytes written.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn write_le_at<T: NativeIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let bytes = value.to_le_bytes();
    data[*offset..*offset + type_len].copy_from_slice(bytes.as_ref());
    *offset += type_len;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_le_u32() {
        let data = [0x01, 0x00, 0x00, 0x00];
        let value: u32 = read_le(&data).unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn read_le_at_advances() {
        let data = [0x01, 0x00, 0xFE, 0xFF];
        let mut offset = 0;

        let first: u16 = read_le_at(&data, &mut offset).unwrap();
        assert_eq!(first, 1);
        assert_eq!(offset, 2);

        let second: i16 = read_le_at(&data, &mut offset).unwrap();
        assert_eq!(second, -2);
        assert_eq!(offset, 4);
    }

    #[test]
    fn read_le_short_buffer() {
        let data = [0x01, 0x02, 0x03];
        assert!(matches!(read_le::<u32>(&data), Err(OutOfBounds)));

        let mut offset = 2;
        assert!(read_le_at::<u16>(&data, &mut offset).is_err());
        assert_eq!(offset, 2);
    }

    #[test]
    fn write_le_floats() {
        let mut data = [0u8; 12];
        let mut offset = 0;

        write_le_at(&mut data, &mut offset, 1.5_f32).unwrap();
        write_le_at(&mut data, &mut offset, -0.25_f64).unwrap();
        assert_eq!(offset, 12);

        let mut offset = 0;
        assert_eq!(read_le_at::<f32>(&data, &mut offset).unwrap(), 1.5);
        assert_eq!(read_le_at::<f64>(&data, &mut offset).unwrap(), -0.25);
    }

    #[test]
    fn write_le_short_buffer() {
        let mut data = [0u8; 4];
        assert!(write_le(&mut data, 0_u64).is_err());
        assert_eq!(data, [0; 4]);
    }
}
