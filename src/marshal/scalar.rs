//! Reading and writing single memory slots.

use crate::{
    marshal::Marshaler,
    memory::{Address, MemoryExt, ProcessMemory},
    metadata::{Type, TypeKind, TypeRc},
    value::{ArrayHandle, ObjectHandle, StringHandle, TypedPointer, Value, ValueTypeInstance},
    Error, Result,
};

/// The storage shape of a slot, as far as writing is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    Bool,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    Char,
    I8,
    U8,
    R4,
    R8,
    /// A pointer-width word
    Word,
}

impl Slot {
    /// Classifies a kind, or returns `None` for kinds without a storage representation.
    pub(crate) fn of(kind: &TypeKind) -> Option<Slot> {
        Some(match kind {
            TypeKind::Boolean => Slot::Bool,
            TypeKind::I1 => Slot::I1,
            TypeKind::U1 => Slot::U1,
            TypeKind::I2 => Slot::I2,
            TypeKind::U2 => Slot::U2,
            TypeKind::I4 => Slot::I4,
            TypeKind::U4 => Slot::U4,
            TypeKind::Char => Slot::Char,
            TypeKind::I8 => Slot::I8,
            TypeKind::U8 => Slot::U8,
            TypeKind::R4 => Slot::R4,
            TypeKind::R8 => Slot::R8,
            TypeKind::I
            | TypeKind::U
            | TypeKind::UntypedPointer
            | TypeKind::Pointer(_)
            | TypeKind::ValueType(_)
            | TypeKind::String
            | TypeKind::Object
            | TypeKind::Class
            | TypeKind::GenericInstance
            | TypeKind::SzArray
            | TypeKind::Array => Slot::Word,
            TypeKind::Void
            | TypeKind::TypedByRef
            | TypeKind::FnPtr
            | TypeKind::Var(_)
            | TypeKind::MVar(_) => return None,
        })
    }
}

impl<M: ProcessMemory + ?Sized> Marshaler<'_, M> {
    /// Reads the slot at `address` as a value of type `ty`.
    ///
    /// Primitives are read at their declared width. Reference-like kinds read a
    /// pointer-width word and wrap it in the matching handle. Value types are not read at
    /// all: the result is a view of the instance stored at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedType`] for kinds without a storage representation, before
    /// any memory is accessed, and propagates errors from the memory backend.
    pub fn read(&self, address: Address, ty: &TypeRc) -> Result<Value> {
        let memory = self.memory();
        let width = self.layout().pointer_width;

        let value = match ty.kind() {
            TypeKind::Boolean => Value::Bool(memory.read_value::<i8>(address)? != 0),
            TypeKind::I1 => Value::I1(memory.read_value(address)?),
            TypeKind::U1 => Value::U1(memory.read_value(address)?),
            TypeKind::I2 => Value::I2(memory.read_value(address)?),
            TypeKind::U2 => Value::U2(memory.read_value(address)?),
            TypeKind::I4 => Value::I4(memory.read_value(address)?),
            TypeKind::U4 => Value::U4(memory.read_value(address)?),
            TypeKind::Char => Value::Char(memory.read_value(address)?),
            TypeKind::I8 => Value::I8(memory.read_value(address)?),
            TypeKind::U8 => Value::U8(memory.read_value(address)?),
            TypeKind::R4 => Value::R4(memory.read_value(address)?),
            TypeKind::R8 => Value::R8(memory.read_value(address)?),
            TypeKind::I | TypeKind::U | TypeKind::UntypedPointer => {
                Value::Pointer(memory.read_pointer(address, width)?)
            }
            TypeKind::Pointer(data_type) => Value::TypedPointer(TypedPointer::new(
                memory.read_pointer(address, width)?,
                data_type.clone(),
            )),
            TypeKind::ValueType(class) => Value::ValueType(ValueTypeInstance::from_parts(
                address,
                ty.clone(),
                class.clone(),
            )),
            TypeKind::Object | TypeKind::Class | TypeKind::GenericInstance => {
                Value::Object(ObjectHandle::new(memory.read_pointer(address, width)?))
            }
            TypeKind::String => {
                Value::String(StringHandle::new(memory.read_pointer(address, width)?))
            }
            TypeKind::SzArray | TypeKind::Array => {
                Value::Array(ArrayHandle::new(memory.read_pointer(address, width)?))
            }
            TypeKind::Void
            | TypeKind::TypedByRef
            | TypeKind::FnPtr
            | TypeKind::Var(_)
            | TypeKind::MVar(_) => return Err(Error::unsupported("read", ty)),
        };

        log::trace!("read {} ({}) at {}", ty, ty.kind().short_name(), address);
        Ok(value)
    }

    /// Writes `value` into the slot at `address` as type `ty`, and returns `address`.
    ///
    /// A by-reference type always stores the value's pointer-width
    /// [`native word`](Value::native_word), whatever its kind. Otherwise the kind decides
    /// the width; numeric values are converted to it with `as` semantics, so an `i4` slot
    /// written with `Value::I8(0x1_0000_0001)` stores `1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedType`] for kinds without a storage representation and
    /// [`Error::MalformedValue`] for a value that has no numeric interpretation in a
    /// numeric slot; both before any memory is accessed. Errors from the memory backend
    /// are propagated.
    pub fn write(&self, address: Address, value: &Value, ty: &TypeRc) -> Result<Address> {
        let slot = if ty.is_by_reference() {
            Slot::Word
        } else {
            Slot::of(ty.kind()).ok_or_else(|| Error::unsupported("write", ty))?
        };

        self.write_slot(address, value, slot, ty)?;
        log::trace!("wrote {} ({}) at {}", ty, value.variant_name(), address);
        Ok(address)
    }

    /// Stores `value` in a slot of the given shape.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn write_slot(
        &self,
        address: Address,
        value: &Value,
        slot: Slot,
        ty: &Type,
    ) -> Result<()> {
        let memory = self.memory();
        let integer = || value.as_i64().ok_or_else(|| Error::malformed_value(ty, value));
        let float = || value.as_f64().ok_or_else(|| Error::malformed_value(ty, value));

        match slot {
            Slot::Bool => {
                let flag = value
                    .as_bool()
                    .ok_or_else(|| Error::malformed_value(ty, value))?;
                memory.write_value(address, u8::from(flag))
            }
            Slot::I1 => memory.write_value(address, integer()? as i8),
            Slot::U1 => memory.write_value(address, integer()? as u8),
            Slot::I2 => memory.write_value(address, integer()? as i16),
            Slot::U2 | Slot::Char => memory.write_value(address, integer()? as u16),
            Slot::I4 => memory.write_value(address, integer()? as i32),
            Slot::U4 => memory.write_value(address, integer()? as u32),
            Slot::I8 => memory.write_value(address, integer()?),
            Slot::U8 => memory.write_value(address, integer()? as u64),
            Slot::R4 => memory.write_value(address, float()? as f32),
            Slot::R8 => memory.write_value(address, float()?),
            Slot::Word => {
                memory.write_pointer(address, value.as_address(), self.layout().pointer_width)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::SimulatedMemory,
        test::factories::{
            boolean, by_ref, char16, double, int16, int32, int8, native_int, object, pointer_to,
            single, string, uint16, uint32, uint64, uint8, void, void_pointer,
        },
        MarshalConfig, TargetLayout,
    };

    #[test]
    fn boolean_reads_any_non_zero_byte() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let slot = memory.alloc(1).unwrap();

        for (raw, expected) in [(0_u8, false), (1, true), (0x80, true), (0xff, true)] {
            memory.write_value(slot, raw).unwrap();
            assert_eq!(marshaler.read(slot, &boolean()).unwrap(), Value::Bool(expected));
        }
    }

    #[test]
    fn boolean_writes_zero_or_one() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let slot = memory.alloc(2).unwrap();

        marshaler.write(slot, &Value::I4(42), &boolean()).unwrap();
        assert_eq!(memory.read_value::<u16>(slot).unwrap(), 1);
        marshaler.write(slot, &Value::Bool(false), &boolean()).unwrap();
        assert_eq!(memory.read_value::<u8>(slot).unwrap(), 0);
    }

    #[test]
    fn narrowing_truncates() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let slot = memory.alloc(8).unwrap();

        marshaler.write(slot, &Value::I4(0x1ff), &uint8()).unwrap();
        assert_eq!(marshaler.read(slot, &uint8()).unwrap(), Value::U1(0xff));

        marshaler.write(slot, &Value::I4(0x180), &int8()).unwrap();
        assert_eq!(marshaler.read(slot, &int8()).unwrap(), Value::I1(-128));

        marshaler.write(slot, &Value::I8(0x1_0000_0001), &int32()).unwrap();
        assert_eq!(marshaler.read(slot, &int32()).unwrap(), Value::I4(1));

        marshaler.write(slot, &Value::I4(-1), &uint32()).unwrap();
        assert_eq!(marshaler.read(slot, &uint32()).unwrap(), Value::U4(u32::MAX));

        marshaler.write(slot, &Value::R8(-3.75), &int16()).unwrap();
        assert_eq!(marshaler.read(slot, &int16()).unwrap(), Value::I2(-3));
    }

    #[test]
    fn floats_and_chars() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let slot = memory.alloc(8).unwrap();

        marshaler.write(slot, &Value::R8(0.1), &single()).unwrap();
        assert_eq!(marshaler.read(slot, &single()).unwrap(), Value::R4(0.1_f64 as f32));

        marshaler.write(slot, &Value::I4(7), &double()).unwrap();
        assert_eq!(marshaler.read(slot, &double()).unwrap(), Value::R8(7.0));

        marshaler.write(slot, &Value::Char(0x263a), &char16()).unwrap();
        assert_eq!(marshaler.read(slot, &char16()).unwrap(), Value::Char(0x263a));
        assert_eq!(marshaler.read(slot, &uint16()).unwrap(), Value::U2(0x263a));
    }

    #[test]
    fn u64_keeps_all_bits() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let slot = memory.alloc(8).unwrap();

        marshaler.write(slot, &Value::U8(u64::MAX - 1), &uint64()).unwrap();
        assert_eq!(marshaler.read(slot, &uint64()).unwrap(), Value::U8(u64::MAX - 1));
    }

    #[test]
    fn reference_kinds_wrap_pointer_reads() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let slot = memory.alloc(8).unwrap();
        memory.write_value(slot, 0x1234_5678_u64).unwrap();
        let target = Address::new(0x1234_5678);

        assert_eq!(marshaler.read(slot, &native_int()).unwrap(), Value::Pointer(target));
        assert_eq!(marshaler.read(slot, &void_pointer()).unwrap(), Value::Pointer(target));
        assert_eq!(
            marshaler.read(slot, &string()).unwrap(),
            Value::String(StringHandle::new(target))
        );
        assert_eq!(
            marshaler.read(slot, &object()).unwrap(),
            Value::Object(ObjectHandle::new(target))
        );

        let Value::TypedPointer(pointer) = marshaler.read(slot, &pointer_to(int32())).unwrap()
        else {
            panic!("expected a typed pointer");
        };
        assert_eq!(pointer.address(), target);
        assert_eq!(pointer.element_type(), &int32());
    }

    #[test]
    fn handles_write_their_address() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let slot = memory.alloc(8).unwrap();

        let handle = Value::String(StringHandle::new(Address::new(0xabcdef)));
        assert_eq!(marshaler.write(slot, &handle, &string()).unwrap(), slot);
        assert_eq!(memory.read_value::<u64>(slot).unwrap(), 0xabcdef);
    }

    #[test]
    fn pointer_words_on_x86() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::with_config(&memory, MarshalConfig::new(TargetLayout::x86()));
        let slot = memory.alloc(8).unwrap();
        memory.write_value(slot, u64::MAX).unwrap();

        marshaler
            .write(slot, &Value::Pointer(Address::new(0x8000_0010)), &object())
            .unwrap();
        assert_eq!(memory.read_value::<u32>(slot.add(4)).unwrap(), u32::MAX);
        assert_eq!(
            marshaler.read(slot, &object()).unwrap(),
            Value::Object(ObjectHandle::new(Address::new(0x8000_0010)))
        );
    }

    #[test]
    fn by_reference_writes_a_word() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let slot = memory.alloc(8).unwrap();

        marshaler
            .write(slot, &Value::Pointer(Address::new(0x1122_3344_5566)), &by_ref(&int8()))
            .unwrap();
        assert_eq!(memory.read_value::<u64>(slot).unwrap(), 0x1122_3344_5566);
    }

    #[test]
    fn handle_into_numeric_slot() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let slot = memory.alloc(8).unwrap();

        let err = marshaler
            .write(slot, &Value::Object(ObjectHandle::NULL), &double())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedValue { found: "object", .. }));
    }

    #[test]
    fn unsupported_kinds() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);

        let err = marshaler.read(Address::new(0x10), &void()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { operation: "read", kind: "void", .. }));

        let err = marshaler
            .write(Address::new(0x10), &Value::I4(0), &void())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { operation: "write", .. }));
    }

    #[test]
    fn slot_classification() {
        assert_eq!(Slot::of(&TypeKind::Char), Some(Slot::Char));
        assert_eq!(Slot::of(&TypeKind::GenericInstance), Some(Slot::Word));
        assert_eq!(Slot::of(&TypeKind::FnPtr), None);
    }
}
