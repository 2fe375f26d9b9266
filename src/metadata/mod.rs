//! Runtime type descriptors.
//!
//! The marshaler is driven entirely by descriptors of the managed types it moves between
//! memory and the host. This module holds the reduced model of IL2CPP metadata those
//! descriptors are built from: a [`Type`] names a [`TypeKind`] plus a by-reference flag,
//! and value types carry the [`Class`] that describes their field layout.
//!
//! Descriptors are usually produced by a metadata layer reading `Il2CppType` and
//! `Il2CppClass` structures out of the target (see [`Type::from_raw`]). For offline work
//! and tests, [`ClassBuilder`] lays classes out the way the runtime does.
//!
//! # Key Components
//!
//! - [`Type`] / [`TypeRc`] - A type descriptor and its shared handle
//! - [`TypeKind`] - The closed set of kinds the marshaler dispatches on
//! - [`TypeTag`] - The raw element type codes of `Il2CppType::type`
//! - [`Class`] / [`Field`] - Field layout of value types
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use il2scope::{metadata::{ClassBuilder, Type, TypeKind}, TargetLayout};
//!
//! let layout = TargetLayout::x64();
//! let single = Arc::new(Type::new("System.Single", TypeKind::R4));
//!
//! let vector2 = ClassBuilder::new("Vector2")
//!     .namespace("UnityEngine")
//!     .field("x", single.clone())
//!     .field("y", single)
//!     .build_value_type(&layout);
//!
//! assert!(vector2.is_value_type());
//! assert_eq!(vector2.name(), "UnityEngine.Vector2");
//! assert_eq!(vector2.element_size(&layout), 8);
//! ```

mod class;
mod types;
mod typetag;

pub use class::{Class, ClassBuilder, ClassRc, Field, FieldAttributes};
pub use types::{Type, TypeKind, TypeRc};
pub use typetag::TypeTag;
