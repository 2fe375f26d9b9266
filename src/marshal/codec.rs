//! Conversions at the native call boundary.

use crate::{
    marshal::Marshaler,
    memory::{Address, ProcessMemory},
    metadata::{TypeKind, TypeRc},
    value::{ArrayHandle, ObjectHandle, Reference, StringHandle, TypedPointer, Value},
    Error, Result,
};

/// A value as passed to or returned from a native function.
///
/// Value types passed by value are represented by [`NativeValue::Struct`], holding one entry
/// per instance field in declaration order, nested value types as nested structs.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeValue {
    /// A signed integer, sign-extended to 64 bits
    Int(i64),
    /// An unsigned integer, zero-extended to 64 bits
    UInt(u64),
    /// A floating point number, widened to 64 bits
    Float(f64),
    /// A pointer
    Pointer(Address),
    /// The fields of a value type
    Struct(Vec<NativeValue>),
}

impl NativeValue {
    /// Returns the integer bits of a scalar, or `None` for a struct.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NativeValue::Int(v) => Some(*v),
            NativeValue::UInt(v) => Some(*v as i64),
            NativeValue::Float(v) => Some(*v as i64),
            NativeValue::Pointer(address) => Some(address.as_u64() as i64),
            NativeValue::Struct(_) => None,
        }
    }

    /// Returns a scalar as a float, or `None` for a struct.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::Int(v) => Some(*v as f64),
            NativeValue::UInt(v) => Some(*v as f64),
            NativeValue::Float(v) => Some(*v),
            NativeValue::Pointer(address) => Some(address.as_u64() as f64),
            NativeValue::Struct(_) => None,
        }
    }
}

/// The native signature type of a parameter or return value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeType {
    /// No value
    Void,
    /// 8-bit boolean
    Bool,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 64-bit integer
    UInt64,
    /// UTF-16 code unit
    Char,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Pointer-width word
    Pointer,
    /// A value type passed by value, one entry per instance field
    Struct(Vec<NativeType>),
}

/// Returns the native signature type that matches how [`Marshaler::to_call_argument`]
/// shapes a value of type `ty`.
///
/// By-reference types are always pointers. Value types become a [`NativeType::Struct`] of
/// their instance fields in declaration order.
///
/// # Errors
///
/// Returns [`Error::UnsupportedType`] for typed references and unresolved generic
/// parameters.
pub fn abi_type(ty: &TypeRc) -> Result<NativeType> {
    if ty.is_by_reference() {
        return Ok(NativeType::Pointer);
    }

    Ok(match ty.kind() {
        TypeKind::Void => NativeType::Void,
        TypeKind::Boolean => NativeType::Bool,
        TypeKind::I1 => NativeType::Int8,
        TypeKind::U1 => NativeType::UInt8,
        TypeKind::I2 => NativeType::Int16,
        TypeKind::U2 => NativeType::UInt16,
        TypeKind::I4 => NativeType::Int32,
        TypeKind::U4 => NativeType::UInt32,
        TypeKind::I8 => NativeType::Int64,
        TypeKind::U8 => NativeType::UInt64,
        TypeKind::Char => NativeType::Char,
        TypeKind::R4 => NativeType::Float,
        TypeKind::R8 => NativeType::Double,
        TypeKind::ValueType(class) => NativeType::Struct(
            class
                .instance_fields()
                .map(|field| abi_type(&field.ty))
                .collect::<Result<_>>()?,
        ),
        TypeKind::I
        | TypeKind::U
        | TypeKind::UntypedPointer
        | TypeKind::Pointer(_)
        | TypeKind::FnPtr
        | TypeKind::String
        | TypeKind::Object
        | TypeKind::Class
        | TypeKind::GenericInstance
        | TypeKind::SzArray
        | TypeKind::Array => NativeType::Pointer,
        TypeKind::TypedByRef | TypeKind::Var(_) | TypeKind::MVar(_) => {
            return Err(Error::unsupported("abi_type", ty))
        }
    })
}

impl<M: ProcessMemory + ?Sized> Marshaler<'_, M> {
    /// Converts the result of a native call into a value of type `ty`.
    ///
    /// - A [`NativeValue::Struct`] is a value type returned by value and is
    ///   [reconstructed](Marshaler::reconstruct) into scratch memory.
    /// - A [`NativeValue::Pointer`] for a by-reference type becomes a [`Value::Reference`];
    ///   otherwise it is wrapped in the handle its kind calls for, and returned as a plain
    ///   [`Value::Pointer`] if the kind has none.
    /// - Scalars are converted to the variant of the declared kind. A scalar returned for a
    ///   pointer-like kind is treated as an address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedType`] for a scalar of a kind without a storage
    /// representation, and propagates errors from [`Marshaler::reconstruct`].
    pub fn from_call_result(&self, raw: &NativeValue, ty: &TypeRc) -> Result<Value> {
        match raw {
            NativeValue::Struct(values) => Ok(Value::ValueType(self.reconstruct(ty, values)?)),
            NativeValue::Pointer(address) => Ok(wrap_address(*address, ty)),
            NativeValue::Int(_) | NativeValue::UInt(_) | NativeValue::Float(_) => {
                scalar_result(raw, ty)
            }
        }
    }

    /// Converts a value into the shape a native call expects for it.
    ///
    /// Booleans become `0` or `1`, integers keep their signedness, floats are widened and
    /// every handle passes its address. A value type is passed by value: its fields are
    /// read from memory now and returned as a [`NativeValue::Struct`], recursively.
    ///
    /// # Errors
    ///
    /// Propagates errors from reading the fields of a value type.
    pub fn to_call_argument(&self, value: &Value) -> Result<NativeValue> {
        Ok(match value {
            Value::Bool(v) => NativeValue::Int(i64::from(*v)),
            Value::I1(v) => NativeValue::Int(i64::from(*v)),
            Value::I2(v) => NativeValue::Int(i64::from(*v)),
            Value::I4(v) => NativeValue::Int(i64::from(*v)),
            Value::I8(v) => NativeValue::Int(*v),
            Value::U1(v) => NativeValue::UInt(u64::from(*v)),
            Value::U2(v) | Value::Char(v) => NativeValue::UInt(u64::from(*v)),
            Value::U4(v) => NativeValue::UInt(u64::from(*v)),
            Value::U8(v) => NativeValue::UInt(*v),
            Value::R4(v) => NativeValue::Float(f64::from(*v)),
            Value::R8(v) => NativeValue::Float(*v),
            Value::Pointer(address) => NativeValue::Pointer(*address),
            Value::TypedPointer(pointer) => NativeValue::Pointer(pointer.address()),
            Value::Reference(reference) => NativeValue::Pointer(reference.address()),
            Value::Object(object) => NativeValue::Pointer(object.address()),
            Value::String(string) => NativeValue::Pointer(string.address()),
            Value::Array(array) => NativeValue::Pointer(array.address()),
            Value::ValueType(instance) => NativeValue::Struct(
                instance
                    .fields(self)?
                    .iter()
                    .map(|(_, field)| self.to_call_argument(field))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Returns the native signature type of `ty`, see [`abi_type`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedType`] for kinds that have no native representation.
    pub fn abi_type(&self, ty: &TypeRc) -> Result<NativeType> {
        abi_type(ty)
    }
}

/// Wraps an address returned for `ty` in the matching handle.
fn wrap_address(address: Address, ty: &TypeRc) -> Value {
    if ty.is_by_reference() {
        return Value::Reference(Reference::new(address, ty.clone()));
    }

    match ty.kind() {
        TypeKind::Pointer(data_type) => {
            Value::TypedPointer(TypedPointer::new(address, data_type.clone()))
        }
        TypeKind::String => Value::String(StringHandle::new(address)),
        TypeKind::Object | TypeKind::Class | TypeKind::GenericInstance => {
            Value::Object(ObjectHandle::new(address))
        }
        TypeKind::SzArray | TypeKind::Array => Value::Array(ArrayHandle::new(address)),
        _ => Value::Pointer(address),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scalar_result(raw: &NativeValue, ty: &TypeRc) -> Result<Value> {
    let integer = raw.as_i64().unwrap_or_default();
    let float = raw.as_f64().unwrap_or_default();

    if ty.is_by_reference() {
        return Ok(wrap_address(Address::new(integer as u64), ty));
    }

    Ok(match ty.kind() {
        TypeKind::Boolean => Value::Bool(match raw {
            NativeValue::Float(v) => *v != 0.0,
            _ => integer != 0,
        }),
        TypeKind::I1 => Value::I1(integer as i8),
        TypeKind::U1 => Value::U1(integer as u8),
        TypeKind::I2 => Value::I2(integer as i16),
        TypeKind::U2 => Value::U2(integer as u16),
        TypeKind::I4 => Value::I4(integer as i32),
        TypeKind::U4 => Value::U4(integer as u32),
        TypeKind::Char => Value::Char(integer as u16),
        TypeKind::I8 => Value::I8(integer),
        TypeKind::U8 => Value::U8(integer as u64),
        TypeKind::R4 => Value::R4(float as f32),
        TypeKind::R8 => Value::R8(float),
        TypeKind::I
        | TypeKind::U
        | TypeKind::UntypedPointer
        | TypeKind::Pointer(_)
        | TypeKind::FnPtr
        | TypeKind::ValueType(_)
        | TypeKind::String
        | TypeKind::Object
        | TypeKind::Class
        | TypeKind::GenericInstance
        | TypeKind::SzArray
        | TypeKind::Array => wrap_address(Address::new(integer as u64), ty),
        TypeKind::Void | TypeKind::TypedByRef | TypeKind::Var(_) | TypeKind::MVar(_) => {
            return Err(Error::unsupported("from_call_result", ty))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::{MemoryExt, SimulatedMemory},
        test::factories::{
            array_of, boolean, by_ref, char16, int32, native_uint, nested_class, object,
            point_class, pointer_to, single, string, uint64, value_type, void, vector3_class,
        },
        value::ValueTypeInstance,
    };

    #[test]
    fn pointer_results_are_wrapped() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let address = Address::new(0x5000);
        let raw = NativeValue::Pointer(address);

        assert_eq!(
            marshaler.from_call_result(&raw, &string()).unwrap(),
            Value::String(StringHandle::new(address))
        );
        assert_eq!(
            marshaler.from_call_result(&raw, &object()).unwrap(),
            Value::Object(ObjectHandle::new(address))
        );
        assert_eq!(
            marshaler.from_call_result(&raw, &array_of(&int32())).unwrap(),
            Value::Array(ArrayHandle::new(address))
        );
        assert_eq!(
            marshaler.from_call_result(&raw, &native_uint()).unwrap(),
            Value::Pointer(address)
        );
        assert_eq!(
            marshaler.from_call_result(&raw, &pointer_to(single())).unwrap(),
            Value::TypedPointer(TypedPointer::new(address, single()))
        );
        assert_eq!(
            marshaler.from_call_result(&raw, &void()).unwrap(),
            Value::Pointer(address)
        );
    }

    #[test]
    fn by_reference_results() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let ty = by_ref(&int32());

        let Value::Reference(reference) = marshaler
            .from_call_result(&NativeValue::Pointer(Address::new(0x40)), &ty)
            .unwrap()
        else {
            panic!("expected a reference");
        };
        assert_eq!(reference.address(), Address::new(0x40));
        assert!(reference.ty().is_by_reference());
    }

    #[test]
    fn scalar_results() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);

        assert_eq!(
            marshaler.from_call_result(&NativeValue::Int(2), &boolean()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            marshaler.from_call_result(&NativeValue::Int(0), &boolean()).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            marshaler.from_call_result(&NativeValue::Int(-7), &int32()).unwrap(),
            Value::I4(-7)
        );
        assert_eq!(
            marshaler.from_call_result(&NativeValue::UInt(u64::MAX), &uint64()).unwrap(),
            Value::U8(u64::MAX)
        );
        assert_eq!(
            marshaler.from_call_result(&NativeValue::Float(1.5), &single()).unwrap(),
            Value::R4(1.5)
        );
        assert_eq!(
            marshaler.from_call_result(&NativeValue::UInt(0x41), &char16()).unwrap(),
            Value::Char(0x41)
        );
        assert_eq!(
            marshaler.from_call_result(&NativeValue::UInt(0x99), &string()).unwrap(),
            Value::String(StringHandle::new(Address::new(0x99)))
        );
        assert!(marshaler
            .from_call_result(&NativeValue::Int(0), &void())
            .unwrap_err()
            .is_unsupported());
    }

    #[test]
    fn function_pointer_results_are_addresses() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let callback = std::sync::Arc::new(crate::metadata::Type::new("method*", TypeKind::FnPtr));

        assert_eq!(abi_type(&callback).unwrap(), NativeType::Pointer);
        assert_eq!(
            marshaler.from_call_result(&NativeValue::UInt(0x7f00), &callback).unwrap(),
            Value::Pointer(Address::new(0x7f00))
        );
        assert_eq!(
            marshaler
                .from_call_result(&NativeValue::Pointer(Address::new(0x7f00)), &callback)
                .unwrap(),
            Value::Pointer(Address::new(0x7f00))
        );
    }

    #[test]
    fn struct_results_are_reconstructed() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let raw = NativeValue::Struct(vec![
            NativeValue::Float(1.0),
            NativeValue::Float(2.0),
            NativeValue::Float(3.0),
        ]);

        let Value::ValueType(vector) = marshaler
            .from_call_result(&raw, &value_type(vector3_class()))
            .unwrap()
        else {
            panic!("expected a value type");
        };
        assert_eq!(vector.field(&marshaler, "z").unwrap(), Value::R4(3.0));
        assert_eq!(memory.read_value::<f32>(vector.address().add(4)).unwrap(), 2.0);
    }

    #[test]
    fn scalar_arguments() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);

        assert_eq!(marshaler.to_call_argument(&Value::Bool(true)).unwrap(), NativeValue::Int(1));
        assert_eq!(marshaler.to_call_argument(&Value::I1(-1)).unwrap(), NativeValue::Int(-1));
        assert_eq!(marshaler.to_call_argument(&Value::U4(7)).unwrap(), NativeValue::UInt(7));
        assert_eq!(
            marshaler.to_call_argument(&Value::R4(0.25)).unwrap(),
            NativeValue::Float(0.25)
        );
        assert_eq!(
            marshaler
                .to_call_argument(&Value::Array(ArrayHandle::new(Address::new(0x80))))
                .unwrap(),
            NativeValue::Pointer(Address::new(0x80))
        );
    }

    #[test]
    fn value_type_arguments_nest() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let base = memory.alloc(32).unwrap();
        memory.write_value(base, 1_i32).unwrap();
        memory.write_value(base.add(4), 2_i32).unwrap();
        memory.write_value(base.add(8), 0.5_f64).unwrap();

        let bounds = ValueTypeInstance::new(base, value_type(nested_class())).unwrap();
        let argument = marshaler.to_call_argument(&Value::ValueType(bounds)).unwrap();
        assert_eq!(
            argument,
            NativeValue::Struct(vec![
                NativeValue::Int(1),
                NativeValue::Int(2),
                NativeValue::Struct(vec![
                    NativeValue::Float(0.5),
                    NativeValue::Float(0.0),
                    NativeValue::Float(0.0),
                ]),
            ])
        );
    }

    #[test]
    fn argument_round_trip_through_reconstruct() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let ty = value_type(point_class());

        let raw = NativeValue::Struct(vec![NativeValue::Int(10), NativeValue::Int(-20)]);
        let value = marshaler.from_call_result(&raw, &ty).unwrap();
        assert_eq!(marshaler.to_call_argument(&value).unwrap(), raw);
    }

    #[test]
    fn abi_types() {
        assert_eq!(abi_type(&boolean()).unwrap(), NativeType::Bool);
        assert_eq!(abi_type(&by_ref(&int32())).unwrap(), NativeType::Pointer);
        assert_eq!(abi_type(&string()).unwrap(), NativeType::Pointer);
        assert_eq!(abi_type(&void()).unwrap(), NativeType::Void);
        assert_eq!(
            abi_type(&value_type(nested_class())).unwrap(),
            NativeType::Struct(vec![
                NativeType::Int32,
                NativeType::Int32,
                NativeType::Struct(vec![NativeType::Double; 3]),
            ])
        );

        let generic = std::sync::Arc::new(crate::metadata::Type::new("T", TypeKind::MVar(0)));
        assert!(abi_type(&generic).unwrap_err().is_unsupported());
    }
}
