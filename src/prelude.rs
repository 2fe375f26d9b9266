//! # il2scope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the il2scope library. Import this module to get quick access to the essential
//! types for marshaling.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all il2scope operations
pub use crate::Error;

/// The result type used throughout il2scope
pub use crate::Result;

/// Marshaling configuration
pub use crate::{MarshalConfig, PointerWidth, TargetLayout, UnknownKindPolicy};

// ================================================================================================
// Marshaling
// ================================================================================================

/// The marshaler and the call-boundary representation
pub use crate::marshal::{expand_type, Marshaler, NativeType, NativeValue};

// ================================================================================================
// Memory
// ================================================================================================

/// Memory backends and typed access
pub use crate::memory::{
    Address, LocalMemory, MemoryExt, ProcessMemory, ScratchRegion, SimulatedMemory,
};

// ================================================================================================
// Metadata
// ================================================================================================

/// Type and class descriptors
pub use crate::metadata::{
    Class, ClassBuilder, ClassRc, Field, FieldAttributes, Type, TypeKind, TypeRc, TypeTag,
};

// ================================================================================================
// Values
// ================================================================================================

/// Runtime values and handles
pub use crate::value::{
    ArrayHandle, ObjectHandle, Reference, StringHandle, TypedPointer, Value, ValueTypeInstance,
};
