use thiserror::Error;

use crate::memory::Address;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Marshaling failures are never retried internally. An [`Error::UnsupportedType`] means the
/// metadata layer handed over a kind the marshaler has no branch for, which is a gap in the
/// descriptor model rather than a data error; callers should treat it as fatal for the
/// in-flight operation.
///
/// # Error Categories
///
/// ## Type Dispatch Errors
/// - [`Error::UnsupportedType`] - The kind of a descriptor has no read/write path
/// - [`Error::MalformedValue`] - A value cannot be converted to the slot it is written into
/// - [`Error::Malformed`] - Inconsistent metadata (unknown type tags, missing payloads)
///
/// ## Memory Errors
/// - [`Error::InvalidPointer`] - The memory backend refused an access
/// - [`Error::MemoryLimitExceeded`] - A simulated allocation would exceed its limit
/// - [`Error::OutOfBounds`] - A byte buffer was too short for the requested value
///
/// ## Accessor Errors
/// - [`Error::FieldNotFound`] - A value type has no instance field of the requested name
/// - [`Error::IndexOutOfRange`] - A managed array was indexed past its length
///
/// # Examples
///
/// ```rust
/// use il2scope::{Error, metadata::{Type, TypeKind}, memory::{Address, SimulatedMemory}, Marshaler};
/// use std::sync::Arc;
///
/// let memory = SimulatedMemory::default();
/// let marshaler = Marshaler::new(&memory);
/// let void = Arc::new(Type::new("System.Void", TypeKind::Void));
///
/// match marshaler.read(Address::new(0x1000), &void) {
///     Err(Error::UnsupportedType { operation, .. }) => assert_eq!(operation, "read"),
///     other => panic!("unexpected result: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A type kind reached a read or write path that has no branch for it.
    ///
    /// Raised before any memory is touched. The kinds that trigger it are the ones the
    /// runtime can describe but that have no storage representation of their own
    /// (`void`, generic parameters, typed references, function pointers).
    #[error("{operation}: \"{name}\" ({kind}) has not been handled yet")]
    UnsupportedType {
        /// The operation that was attempted (`read`, `write`, `reconstruct`, ...)
        operation: &'static str,
        /// The name of the offending type
        name: String,
        /// The short kind name of the offending type
        kind: &'static str,
    },

    /// A value was supplied that has no conversion into the declared slot.
    ///
    /// The write path coerces freely between numeric representations; this error is only
    /// raised when no numeric or address interpretation exists at all, e.g. a value type
    /// instance written into a floating point slot.
    #[error("A \"{expected}\" is required, but a \"{found}\" was supplied")]
    MalformedValue {
        /// The name of the type the slot expects
        expected: String,
        /// The kind of value that was supplied
        found: &'static str,
    },

    /// The metadata handed to the marshaler is inconsistent.
    ///
    /// The error includes the source location where the inconsistency was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The memory backend refused an access.
    ///
    /// Only backends that can detect invalid accesses raise this (the simulated backend,
    /// or the local backend for null addresses). A fault on a live mapping is not
    /// recoverable and never surfaces as an error.
    #[error("Invalid pointer {address}: {reason}")]
    InvalidPointer {
        /// The rejected address
        address: Address,
        /// Why the access was rejected
        reason: &'static str,
    },

    /// A simulated allocation would exceed the configured memory limit.
    #[error("Memory limit exceeded - {current} of {limit} bytes in use")]
    MemoryLimitExceeded {
        /// Bytes allocated at the time of the request
        current: usize,
        /// The configured limit in bytes
        limit: usize,
    },

    /// An out of bound access was attempted on a byte buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A value type has no instance field with the requested name.
    #[error("Couldn't find field \"{field}\" in \"{class}\"")]
    FieldNotFound {
        /// The class that was searched
        class: String,
        /// The requested field name
        field: String,
    },

    /// A managed array was indexed past its length.
    #[error("Index {index} is out of range for an array of length {length}")]
    IndexOutOfRange {
        /// The requested index
        index: u64,
        /// The length of the array
        length: u64,
    },
}

impl Error {
    /// Builds an [`Error::UnsupportedType`] for the given operation and type.
    pub(crate) fn unsupported(operation: &'static str, ty: &crate::metadata::Type) -> Self {
        Error::UnsupportedType {
            operation,
            name: ty.name().to_string(),
            kind: ty.kind().short_name(),
        }
    }

    /// Builds an [`Error::MalformedValue`] for a value that doesn't fit a slot of `ty`.
    pub(crate) fn malformed_value(ty: &crate::metadata::Type, value: &crate::Value) -> Self {
        Error::MalformedValue {
            expected: ty.name().to_string(),
            found: value.variant_name(),
        }
    }

    /// Returns `true` if this error indicates a gap in the type model.
    ///
    /// These errors are never data dependent: retrying with other values will fail the
    /// same way.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedType { .. })
    }
}
