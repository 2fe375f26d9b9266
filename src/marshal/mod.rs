//! Type-directed marshaling between process memory and structured values.
//!
//! A [`Marshaler`] borrows a [`ProcessMemory`] backend and a [`MarshalConfig`], and converts
//! in three directions, all driven by a runtime [`Type`](crate::metadata::Type) descriptor:
//!
//! - **Scalar reads and writes** ([`Marshaler::read`], [`Marshaler::write`]) move one memory
//!   slot to or from a [`Value`].
//! - **Flattening** ([`expand_type`], [`Marshaler::reconstruct`]) maps a value type onto the
//!   ordered list of primitive slots the native call convention passes it as, and back.
//! - **Call-boundary conversion** ([`Marshaler::from_call_result`],
//!   [`Marshaler::to_call_argument`]) maps between [`Value`]s and the [`NativeValue`]s an
//!   invocation layer passes to and receives from native code.
//!
//! The marshaler holds no state besides its configuration; it is `Copy` and can be created
//! per call. Every operation dispatches on the closed [`TypeKind`](crate::metadata::TypeKind)
//! set and fails with [`Error::UnsupportedType`](crate::Error::UnsupportedType) before
//! touching memory when a kind has no storage representation.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use il2scope::{
//!     marshal::NativeValue,
//!     memory::{ProcessMemory, SimulatedMemory},
//!     metadata::{ClassBuilder, Type, TypeKind},
//!     Marshaler, Value,
//! };
//!
//! let memory = SimulatedMemory::default();
//! let marshaler = Marshaler::new(&memory);
//! let int32 = Arc::new(Type::new("System.Int32", TypeKind::I4));
//!
//! let slot = memory.alloc(4)?;
//! marshaler.write(slot, &Value::I4(-12), &int32)?;
//! assert_eq!(marshaler.read(slot, &int32)?, Value::I4(-12));
//!
//! // A value type returned by a native call arrives as its flattened fields
//! let point = ClassBuilder::new("Point")
//!     .field("x", int32.clone())
//!     .field("y", int32)
//!     .build_value_type(marshaler.layout());
//!
//! let raw = NativeValue::Struct(vec![NativeValue::Int(3), NativeValue::Int(4)]);
//! let Value::ValueType(instance) = marshaler.from_call_result(&raw, &point)? else {
//!     unreachable!()
//! };
//! assert_eq!(instance.field(&marshaler, "y")?, Value::I4(4));
//! # Ok::<(), il2scope::Error>(())
//! ```

mod codec;
mod flatten;
mod scalar;

use std::fmt;

pub use codec::{abi_type, NativeType, NativeValue};
pub use flatten::expand_type;

use crate::{
    config::{MarshalConfig, TargetLayout},
    memory::ProcessMemory,
};

/// Converts between process memory, runtime values and native call values.
///
/// See the [module documentation](self) for an overview.
pub struct Marshaler<'m, M: ProcessMemory + ?Sized> {
    memory: &'m M,
    config: MarshalConfig,
}

impl<'m, M: ProcessMemory + ?Sized> Marshaler<'m, M> {
    /// Creates a marshaler with the default configuration (64-bit layout).
    pub fn new(memory: &'m M) -> Self {
        Self::with_config(memory, MarshalConfig::default())
    }

    /// Creates a marshaler with a custom configuration.
    pub fn with_config(memory: &'m M, config: MarshalConfig) -> Self {
        Marshaler { memory, config }
    }

    /// Returns the memory backend.
    #[must_use]
    pub fn memory(&self) -> &'m M {
        self.memory
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    /// Returns the target layout.
    #[must_use]
    pub fn layout(&self) -> &TargetLayout {
        &self.config.layout
    }
}

impl<M: ProcessMemory + ?Sized> Clone for Marshaler<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: ProcessMemory + ?Sized> Copy for Marshaler<'_, M> {}

impl<M: ProcessMemory + ?Sized> fmt::Debug for Marshaler<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Marshaler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
