//! Marshaling configuration.
//!
//! The native layout rules the marshaler reproduces depend on the target process, not on
//! the machine the agent was compiled for. [`TargetLayout`] captures the few facts that
//! differ between targets (pointer width and the size of the managed object header), and
//! [`MarshalConfig`] bundles the layout with policy decisions.
//!
//! # Configuration Presets
//!
//! - [`TargetLayout::x64()`] - 64-bit targets (the default)
//! - [`TargetLayout::x86()`] - 32-bit targets
//! - [`TargetLayout::native()`] - the pointer width of the current process
//! - [`MarshalConfig::strict()`] - reject kinds that have no primitive write path while
//!   reconstructing value types instead of falling back to a pointer-width write
//!
//! # Example
//!
//! ```rust
//! use il2scope::{MarshalConfig, TargetLayout, UnknownKindPolicy};
//!
//! // Use a preset
//! let config = MarshalConfig::strict();
//! assert_eq!(config.unknown_kinds, UnknownKindPolicy::Reject);
//!
//! // Or customize
//! let config = MarshalConfig {
//!     layout: TargetLayout::x86(),
//!     ..Default::default()
//! };
//! assert_eq!(config.layout.pointer_size(), 4);
//! assert_eq!(config.layout.object_header_size, 8);
//! ```

/// Width of a native pointer in the target process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    /// 4-byte pointers (x86, armv7)
    Bits32,
    /// 8-byte pointers (x86-64, arm64)
    Bits64,
}

impl PointerWidth {
    /// Returns the pointer width of the current process.
    #[must_use]
    pub const fn native() -> Self {
        if std::mem::size_of::<usize>() == 4 {
            PointerWidth::Bits32
        } else {
            PointerWidth::Bits64
        }
    }

    /// Returns the width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }
}

/// Memory layout facts about the target runtime.
///
/// Managed objects start with a header of two pointers (class pointer and monitor). The
/// layouts of strings and arrays that the handle accessors rely on are derived from it:
///
/// | Object    | Layout after the header                                   |
/// |-----------|-----------------------------------------------------------|
/// | `String`  | `int32 length`, then UTF-16 code units                    |
/// | `Array`   | `bounds*`, `native uint max_length`, then the elements    |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetLayout {
    /// Pointer width of the target process.
    pub pointer_width: PointerWidth,

    /// Size of the managed object header in bytes.
    ///
    /// Value types stored inline have no header, so this is subtracted from
    /// `instance_size` and from field offsets when working with unboxed values.
    pub object_header_size: usize,
}

impl TargetLayout {
    /// Layout of a 64-bit target.
    #[must_use]
    pub const fn x64() -> Self {
        Self::for_width(PointerWidth::Bits64)
    }

    /// Layout of a 32-bit target.
    #[must_use]
    pub const fn x86() -> Self {
        Self::for_width(PointerWidth::Bits32)
    }

    /// Layout matching the pointer width of the current process.
    #[must_use]
    pub const fn native() -> Self {
        Self::for_width(PointerWidth::native())
    }

    /// Standard layout for the given pointer width.
    #[must_use]
    pub const fn for_width(pointer_width: PointerWidth) -> Self {
        TargetLayout {
            pointer_width,
            object_header_size: 2 * pointer_width.bytes(),
        }
    }

    /// Overrides the object header size.
    #[must_use]
    pub const fn with_object_header_size(mut self, size: usize) -> Self {
        self.object_header_size = size;
        self
    }

    /// Returns the pointer size in bytes.
    #[must_use]
    pub const fn pointer_size(&self) -> usize {
        self.pointer_width.bytes()
    }

    /// Offset of the `int32` length of a managed string.
    #[must_use]
    pub const fn string_length_offset(&self) -> usize {
        self.object_header_size
    }

    /// Offset of the first UTF-16 code unit of a managed string.
    #[must_use]
    pub const fn string_chars_offset(&self) -> usize {
        self.object_header_size + 4
    }

    /// Offset of the pointer-width `max_length` of a managed array.
    #[must_use]
    pub const fn array_length_offset(&self) -> usize {
        self.object_header_size + self.pointer_size()
    }

    /// Offset of the first element of a managed array.
    ///
    /// The element vector is 8-byte aligned.
    #[must_use]
    pub const fn array_data_offset(&self) -> usize {
        let end = self.array_length_offset() + self.pointer_size();
        (end + 7) & !7
    }
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self::x64()
    }
}

/// What value-type reconstruction does with a slot whose kind has no primitive write path.
///
/// Such slots only appear when the metadata layer describes a field with a kind the
/// marshaler cannot store (`void`, generic parameters, typed references, function pointers).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownKindPolicy {
    /// Log a warning and write the value as a pointer-width word.
    #[default]
    Tolerate,
    /// Fail with [`Error::UnsupportedType`](crate::Error::UnsupportedType).
    Reject,
}

/// Top-level marshaling configuration.
///
/// # Default Configuration
///
/// - 64-bit target layout with a 16-byte object header
/// - Tolerant reconstruction of unknown kinds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarshalConfig {
    /// Memory layout of the target runtime.
    pub layout: TargetLayout,

    /// Handling of unknown kinds during value-type reconstruction.
    pub unknown_kinds: UnknownKindPolicy,
}

impl MarshalConfig {
    /// Creates a configuration for the given layout with default policies.
    #[must_use]
    pub const fn new(layout: TargetLayout) -> Self {
        MarshalConfig {
            layout,
            unknown_kinds: UnknownKindPolicy::Tolerate,
        }
    }

    /// Configuration that turns every unknown kind into an error.
    #[must_use]
    pub fn strict() -> Self {
        MarshalConfig {
            unknown_kinds: UnknownKindPolicy::Reject,
            ..Default::default()
        }
    }

    /// Sets the target layout.
    #[must_use]
    pub const fn with_layout(mut self, layout: TargetLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the unknown kind policy.
    #[must_use]
    pub const fn with_unknown_kinds(mut self, policy: UnknownKindPolicy) -> Self {
        self.unknown_kinds = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x64_layout() {
        let layout = TargetLayout::x64();
        assert_eq!(layout.pointer_size(), 8);
        assert_eq!(layout.object_header_size, 16);
        assert_eq!(layout.string_length_offset(), 16);
        assert_eq!(layout.string_chars_offset(), 20);
        assert_eq!(layout.array_length_offset(), 24);
        assert_eq!(layout.array_data_offset(), 32);
    }

    #[test]
    fn x86_layout() {
        let layout = TargetLayout::x86();
        assert_eq!(layout.pointer_size(), 4);
        assert_eq!(layout.object_header_size, 8);
        assert_eq!(layout.string_chars_offset(), 12);
        assert_eq!(layout.array_length_offset(), 12);
        assert_eq!(layout.array_data_offset(), 16);
    }

    #[test]
    fn config_builders() {
        let config = MarshalConfig::new(TargetLayout::x86().with_object_header_size(12))
            .with_unknown_kinds(UnknownKindPolicy::Reject);
        assert_eq!(config.layout.object_header_size, 12);
        assert_eq!(config.unknown_kinds, UnknownKindPolicy::Reject);

        assert_eq!(MarshalConfig::default().unknown_kinds, UnknownKindPolicy::Tolerate);
        assert_eq!(MarshalConfig::default().layout, TargetLayout::x64());
    }
}
