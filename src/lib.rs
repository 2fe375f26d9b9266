// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'memory/local.rs' dereferences raw addresses of the current process

//! # il2scope
//!
//! Type-directed memory marshaling for IL2CPP processes.
//!
//! `il2scope` is the layer an instrumentation agent uses to move values between the raw
//! memory of an IL2CPP (ahead-of-time compiled .NET) process and structured Rust values. It
//! has no compile-time knowledge of the managed types involved: every conversion is driven
//! by a runtime type descriptor, and reproduces the native layout rules of the runtime for
//! integer widths, reference versus value semantics, struct flattening, array strides and
//! object headers.
//!
//! ## Features
//!
//! - **Scalar reads and writes** - Every primitive kind at its declared width, pointer-width
//!   words for every reference-like kind, lazy views for value types
//! - **Call-boundary conversion** - Native call results and arguments, including value types
//!   passed by value as nested field lists
//! - **Value type flattening** - Expansion of a field tree into primitive slots and the
//!   reverse, placed at the field offsets of the class metadata
//! - **Pluggable memory** - In-process access or a simulated address space, behind one trait
//! - **32 and 64-bit targets** - Pointer width and header sizes come from the configuration,
//!   not from the host
//!
//! ## Architecture
//!
//! - [`metadata`] - Type and class descriptors, raw type tag decoding
//! - [`memory`] - The [`memory::ProcessMemory`] seam and its backends
//! - [`value`] - Runtime values and the handles to managed instances
//! - [`marshal`] - The [`Marshaler`] that converts between all of the above
//! - [`config`] - Target layout and marshaling policies
//!
//! ## Quick Start
//!
//! ```rust
//! use il2scope::prelude::*;
//! use std::sync::Arc;
//!
//! let memory = SimulatedMemory::default();
//! let marshaler = Marshaler::new(&memory);
//!
//! let boolean = Arc::new(Type::new("System.Boolean", TypeKind::Boolean));
//! let slot = memory.alloc(1)?;
//!
//! memory.write_value(slot, 0x80_u8)?;
//! assert_eq!(marshaler.read(slot, &boolean)?, Value::Bool(true));
//!
//! marshaler.write(slot, &Value::I4(0x200), &boolean)?;
//! assert_eq!(memory.read_value::<u8>(slot)?, 1);
//! # Ok::<(), il2scope::Error>(())
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade; no logger is installed
//! by the library. Per-slot traffic is logged at `trace`, mismatched value counts during
//! reconstruction at `debug`, and tolerated unknown kinds at `warn`.
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use il2scope::prelude::*;
///
/// let memory = SimulatedMemory::default();
/// let marshaler = Marshaler::with_config(&memory, MarshalConfig::new(TargetLayout::x86()));
/// assert_eq!(marshaler.layout().pointer_size(), 4);
/// ```
pub mod prelude;

/// Target layout and marshaling policies
pub mod config;

/// Marshaling between memory, runtime values and native call values
pub mod marshal;

/// Raw access to the memory of the target process
pub mod memory;

/// Runtime type descriptors
pub mod metadata;

/// Runtime values and handles
pub mod value;

/// `il2scope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. Used consistently throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `il2scope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

pub use config::{MarshalConfig, PointerWidth, TargetLayout, UnknownKindPolicy};
pub use marshal::Marshaler;
pub use value::Value;
