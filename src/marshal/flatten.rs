//! Value type flattening.
//!
//! The native call convention passes a value type as the sequence of its primitive fields,
//! nested value types expanded in place. [`expand_type`] computes that sequence from the
//! class layout, and [`Marshaler::reconstruct`] does the reverse: it packs a flat list of
//! native values into freshly allocated memory laid out like the value type.
//!
//! Reconstruction walks the same field tree as the expansion. A leaf is written at the sum
//! of the unboxed field offsets along its path, so padding, nested tail padding and explicit
//! offsets all come from the class metadata, exactly as field reads see them.

use crate::{
    config::UnknownKindPolicy,
    marshal::{scalar::Slot, Marshaler, NativeValue},
    memory::{Address, MemoryExt, ProcessMemory},
    metadata::{Class, TypeKind, TypeRc},
    value::{Value, ValueTypeInstance},
    Error, Result,
};

/// Expands a type into the ordered list of primitive slot types it is passed as.
///
/// Anything that is not a value type expands to itself. A value type expands to the
/// concatenated expansions of its instance fields, in declaration order; static fields are
/// skipped, and a value type without instance fields expands to nothing.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use il2scope::{marshal::expand_type, metadata::{ClassBuilder, Type, TypeKind}, TargetLayout};
///
/// let layout = TargetLayout::x64();
/// let int32 = Arc::new(Type::new("System.Int32", TypeKind::I4));
/// let double = Arc::new(Type::new("System.Double", TypeKind::R8));
///
/// let inner = ClassBuilder::new("Inner")
///     .field("x", double.clone())
///     .field("y", double.clone())
///     .field("z", double)
///     .build_value_type(&layout);
/// let outer = ClassBuilder::new("Outer")
///     .field("a", int32.clone())
///     .field("b", int32)
///     .field("inner", inner)
///     .build_value_type(&layout);
///
/// let slots = expand_type(&outer);
/// let kinds: Vec<_> = slots.iter().map(|ty| ty.kind().short_name()).collect();
/// assert_eq!(kinds, ["i4", "i4", "r8", "r8", "r8"]);
/// ```
#[must_use]
pub fn expand_type(ty: &TypeRc) -> Vec<TypeRc> {
    let mut slots = Vec::new();
    expand_into(ty, &mut slots);
    slots
}

fn expand_into(ty: &TypeRc, slots: &mut Vec<TypeRc>) {
    match ty.kind() {
        TypeKind::ValueType(class) => {
            for field in class.instance_fields() {
                expand_into(&field.ty, slots);
            }
        }
        _ => slots.push(ty.clone()),
    }
}

/// Flattens nested structs into their leaves, converted to values.
fn flatten_values(values: &[NativeValue], leaves: &mut Vec<Value>) {
    for value in values {
        match value {
            NativeValue::Struct(fields) => flatten_values(fields, leaves),
            NativeValue::Int(v) => leaves.push(Value::I8(*v)),
            NativeValue::UInt(v) => leaves.push(Value::U8(*v)),
            NativeValue::Float(v) => leaves.push(Value::R8(*v)),
            NativeValue::Pointer(address) => leaves.push(Value::Pointer(*address)),
        }
    }
}

impl<M: ProcessMemory + ?Sized> Marshaler<'_, M> {
    /// Expands a type into its primitive slot types, see [`expand_type`].
    #[must_use]
    pub fn expand_type(&self, ty: &TypeRc) -> Vec<TypeRc> {
        expand_type(ty)
    }

    /// Builds a value type instance from the flat list of its primitive field values.
    ///
    /// `values` may nest: [`NativeValue::Struct`] entries are flattened depth-first before
    /// pairing. A scratch region of the unboxed size of `ty` is allocated with
    /// [`ProcessMemory::alloc_scratch`], and each value is written at the offset its field
    /// has in the class metadata, with the same conversions as [`Marshaler::write`]. If the
    /// lists differ in length, the shorter one decides how many slots are written.
    ///
    /// The returned instance owns the scratch region; it is released when the instance and
    /// every view derived from it have been dropped.
    ///
    /// Slots whose kind has no storage representation are handled according to
    /// [`MarshalConfig::unknown_kinds`](crate::MarshalConfig::unknown_kinds).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedType`] if `ty` is not a value type, or if a slot kind is
    /// unsupported and the policy is [`UnknownKindPolicy::Reject`]. Allocation and write
    /// errors of the memory backend are propagated, and the scratch region is released.
    pub fn reconstruct(&self, ty: &TypeRc, values: &[NativeValue]) -> Result<ValueTypeInstance> {
        let TypeKind::ValueType(class) = ty.kind() else {
            return Err(Error::unsupported("reconstruct", ty));
        };

        let layout = self.layout();
        let slots = expand_type(ty);
        let mut leaves = Vec::with_capacity(slots.len());
        flatten_values(values, &mut leaves);

        if leaves.len() != slots.len() {
            log::debug!(
                "reconstruct: {} has {} slots, but {} values were supplied",
                ty,
                slots.len(),
                leaves.len()
            );
        }

        let scratch = self.memory().alloc_scratch(class.unboxed_size(layout))?;
        self.write_fields(scratch.address(), class, &mut leaves.iter(), ty)?;

        Ok(ValueTypeInstance::in_scratch(scratch, ty.clone(), class.clone()))
    }

    /// Writes the leaves of `class` below `base`, consuming one value per primitive slot.
    fn write_fields<'v>(
        &self,
        base: Address,
        class: &Class,
        values: &mut impl Iterator<Item = &'v Value>,
        owner: &TypeRc,
    ) -> Result<()> {
        for field in class.instance_fields() {
            let address = base.add(field.unboxed_offset(self.layout()) as u64);
            match field.ty.kind() {
                TypeKind::ValueType(nested) => self.write_fields(address, nested, values, owner)?,
                _ => match values.next() {
                    Some(value) => self.write_flattened(address, value, &field.ty, owner)?,
                    None => return Ok(()),
                },
            }
        }
        Ok(())
    }

    fn write_flattened(
        &self,
        address: Address,
        value: &Value,
        slot: &TypeRc,
        owner: &TypeRc,
    ) -> Result<()> {
        if slot.is_by_reference() || Slot::of(slot.kind()).is_some() {
            self.write(address, value, slot)?;
            return Ok(());
        }

        match self.config().unknown_kinds {
            UnknownKindPolicy::Tolerate => {
                log::warn!(
                    "reconstruct: defaulting {} ({}) in {} to a pointer write",
                    slot,
                    slot.kind().short_name(),
                    owner
                );
                self.memory()
                    .write_pointer(address, value.as_address(), self.layout().pointer_width)
            }
            UnknownKindPolicy::Reject => Err(Error::unsupported("reconstruct", slot)),
        }
    }
}
