//! Runtime values produced and consumed by the marshaler.
//!
//! [`Value`] is the closed set of things a read can produce and a write can consume. Scalars
//! keep their declared width and signedness; everything that lives in the heap or somewhere
//! else in memory is represented by a handle that carries an address and, where needed, the
//! descriptor to interpret it with. Handles never copy or own the memory they point at:
//! accessors such as [`ValueTypeInstance::field`] or [`StringHandle::content`] go through a
//! [`Marshaler`](crate::Marshaler) every time they are called.
//!
//! # Type Mapping
//!
//! | Kind | Value Variant |
//! |------|---------------|
//! | `boolean` | [`Value::Bool`] |
//! | `i1` .. `u8`, `char` | [`Value::I1`] .. [`Value::U8`], [`Value::Char`] |
//! | `r4`, `r8` | [`Value::R4`], [`Value::R8`] |
//! | `i`, `u`, untyped `ptr` | [`Value::Pointer`] |
//! | typed `ptr` | [`Value::TypedPointer`] |
//! | any by-reference slot | [`Value::Reference`] (call results only) |
//! | `object`, `class`, `genericinst` | [`Value::Object`] |
//! | `string` | [`Value::String`] |
//! | `szarray`, `array` | [`Value::Array`] |
//! | `valuetype` | [`Value::ValueType`] |

mod handles;
mod valuetype;

pub use handles::{ArrayHandle, ObjectHandle, Reference, StringHandle, TypedPointer};
pub use valuetype::ValueTypeInstance;

use crate::{
    memory::Address,
    metadata::{Type, TypeKind},
    Error, Result,
};

/// A structured runtime value.
///
/// # Write Coercion
///
/// Writes are lenient: a numeric slot accepts any scalar variant and converts it with `as`
/// semantics (truncating or saturating exactly like a cast), and a pointer-width slot
/// accepts every variant through its [`native word`](Value::native_word). Use
/// [`Value::check`] to enforce an exact variant/type match before writing.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// `System.Boolean`
    Bool(bool),
    /// `System.SByte`
    I1(i8),
    /// `System.Byte`
    U1(u8),
    /// `System.Int16`
    I2(i16),
    /// `System.UInt16`
    U2(u16),
    /// `System.Int32`
    I4(i32),
    /// `System.UInt32`
    U4(u32),
    /// `System.Char`, as a raw UTF-16 code unit
    Char(u16),
    /// `System.Int64`
    I8(i64),
    /// `System.UInt64`
    U8(u64),
    /// `System.Single`
    R4(f32),
    /// `System.Double`
    R8(f64),

    /// An opaque pointer or native-width integer.
    Pointer(Address),

    /// A pointer whose pointee type is known.
    TypedPointer(TypedPointer),

    /// The address of a slot passed by reference.
    Reference(Reference),

    /// A managed object.
    Object(ObjectHandle),

    /// A managed string.
    String(StringHandle),

    /// A managed array.
    Array(ArrayHandle),

    /// A value type instance stored at some address.
    ValueType(ValueTypeInstance),
}

impl Value {
    /// Returns a short description of the variant, used in diagnostics.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::I1(_) => "i1",
            Value::U1(_) => "u1",
            Value::I2(_) => "i2",
            Value::U2(_) => "u2",
            Value::I4(_) => "i4",
            Value::U4(_) => "u4",
            Value::Char(_) => "char",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::R4(_) => "r4",
            Value::R8(_) => "r8",
            Value::Pointer(_) => "pointer",
            Value::TypedPointer(_) => "typed pointer",
            Value::Reference(_) => "reference",
            Value::Object(_) => "object",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::ValueType(_) => "value type",
        }
    }

    /// Returns `true` for the variants that carry a plain number.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.as_i64().is_some()
    }

    /// Interprets a scalar as a signed 64-bit integer.
    ///
    /// Unsigned values keep their bit pattern, floats are cast (truncating toward zero,
    /// saturating at the bounds) and pointers yield their raw address. Handles return `None`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn as_i64(&self) -> Option<i64> {
        Some(match self {
            Value::Bool(v) => i64::from(*v),
            Value::I1(v) => i64::from(*v),
            Value::U1(v) => i64::from(*v),
            Value::I2(v) => i64::from(*v),
            Value::U2(v) | Value::Char(v) => i64::from(*v),
            Value::I4(v) => i64::from(*v),
            Value::U4(v) => i64::from(*v),
            Value::I8(v) => *v,
            Value::U8(v) => *v as i64,
            Value::R4(v) => *v as i64,
            Value::R8(v) => *v as i64,
            Value::Pointer(address) => address.as_u64() as i64,
            Value::TypedPointer(_)
            | Value::Reference(_)
            | Value::Object(_)
            | Value::String(_)
            | Value::Array(_)
            | Value::ValueType(_) => return None,
        })
    }

    /// Interprets a scalar as a 64-bit float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::R4(v) => Some(f64::from(*v)),
            Value::R8(v) => Some(*v),
            Value::U8(v) => Some(*v as f64),
            Value::Pointer(address) => Some(address.as_u64() as f64),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Interprets a scalar as a boolean: non-zero numbers and non-null pointers are `true`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::R4(v) => Some(*v != 0.0),
            Value::R8(v) => Some(*v != 0.0),
            other => other.as_i64().map(|v| v != 0),
        }
    }

    /// Returns the pointer-width word this value is stored as in a reference-like slot.
    ///
    /// Handles yield their address, value types the address of their backing storage and
    /// scalars their integer value.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn native_word(&self) -> u64 {
        match self {
            Value::TypedPointer(pointer) => pointer.address().as_u64(),
            Value::Reference(reference) => reference.address().as_u64(),
            Value::Object(object) => object.address().as_u64(),
            Value::String(string) => string.address().as_u64(),
            Value::Array(array) => array.address().as_u64(),
            Value::ValueType(instance) => instance.address().as_u64(),
            Value::U8(v) => *v,
            Value::Pointer(address) => address.as_u64(),
            scalar => scalar.as_i64().unwrap_or_default() as u64,
        }
    }

    /// Returns the [`native word`](Value::native_word) as an address.
    #[must_use]
    pub fn as_address(&self) -> Address {
        Address::new(self.native_word())
    }

    /// Verifies that this value is exactly the variant a slot of `ty` holds.
    ///
    /// The write path never calls this; it coerces instead. Callers that want to catch
    /// mismatched arguments before they reach memory can check them first:
    ///
    /// | Type | Accepted variants |
    /// |------|-------------------|
    /// | by-reference | `Reference` |
    /// | `boolean` | `Bool` |
    /// | `i1` .. `u4`, `char`, `r4`, `r8` | any of `I1`, `U1`, `I2`, `U2`, `I4`, `U4`, `Char`, `R4`, `R8` |
    /// | `i8` / `u8` | `I8` / `U8` |
    /// | `i`, `u` and untyped `ptr` | `Pointer` |
    /// | typed `ptr` | `TypedPointer` |
    /// | `valuetype` | `ValueType` |
    /// | `object`, `class`, `genericinst` | `Object` |
    /// | `string` | `String` |
    /// | `szarray`, `array` | `Array` |
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedValue`] on a mismatch and [`Error::UnsupportedType`] for
    /// kinds without a storage representation.
    pub fn check(&self, ty: &Type) -> Result<()> {
        let accepted = if ty.is_by_reference() {
            matches!(self, Value::Reference(_))
        } else {
            match ty.kind() {
                TypeKind::Boolean => matches!(self, Value::Bool(_)),
                TypeKind::I1
                | TypeKind::U1
                | TypeKind::I2
                | TypeKind::U2
                | TypeKind::I4
                | TypeKind::U4
                | TypeKind::Char
                | TypeKind::R4
                | TypeKind::R8 => matches!(
                    self,
                    Value::I1(_)
                        | Value::U1(_)
                        | Value::I2(_)
                        | Value::U2(_)
                        | Value::I4(_)
                        | Value::U4(_)
                        | Value::Char(_)
                        | Value::R4(_)
                        | Value::R8(_)
                ),
                TypeKind::I8 => matches!(self, Value::I8(_)),
                TypeKind::U8 => matches!(self, Value::U8(_)),
                TypeKind::I | TypeKind::U | TypeKind::UntypedPointer => {
                    matches!(self, Value::Pointer(_))
                }
                TypeKind::Pointer(_) => matches!(self, Value::TypedPointer(_)),
                TypeKind::ValueType(_) => matches!(self, Value::ValueType(_)),
                TypeKind::Object | TypeKind::Class | TypeKind::GenericInstance => {
                    matches!(self, Value::Object(_))
                }
                TypeKind::String => matches!(self, Value::String(_)),
                TypeKind::SzArray | TypeKind::Array => matches!(self, Value::Array(_)),
                TypeKind::Void
                | TypeKind::TypedByRef
                | TypeKind::FnPtr
                | TypeKind::Var(_)
                | TypeKind::MVar(_) => return Err(Error::unsupported("check", ty)),
            }
        };

        if accepted {
            Ok(())
        } else {
            Err(Error::malformed_value(ty, self))
        }
    }
}

macro_rules! impl_value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_value_from! {
    bool => Bool,
    i8 => I1,
    u8 => U1,
    i16 => I2,
    u16 => U2,
    i32 => I4,
    u32 => U4,
    i64 => I8,
    u64 => U8,
    f32 => R4,
    f64 => R8,
    Address => Pointer,
    ObjectHandle => Object,
    StringHandle => String,
    ArrayHandle => Array,
    TypedPointer => TypedPointer,
    Reference => Reference,
    ValueTypeInstance => ValueType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::{
        boolean, by_ref, double, int32, int64, object, pointer_to, point_class, string, uint64,
        value_type, void,
    };

    #[test]
    fn scalar_interpretation() {
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert_eq!(Value::I1(-1).as_i64(), Some(-1));
        assert_eq!(Value::U8(u64::MAX).as_i64(), Some(-1));
        assert_eq!(Value::R8(-2.9).as_i64(), Some(-2));
        assert_eq!(Value::Char(0x41).as_i64(), Some(0x41));
        assert_eq!(Value::Pointer(Address::new(0x10)).as_i64(), Some(0x10));
        assert_eq!(Value::String(StringHandle::new(Address::new(0x10))).as_i64(), None);

        assert_eq!(Value::I4(3).as_f64(), Some(3.0));
        assert_eq!(Value::R4(0.5).as_bool(), Some(true));
        assert_eq!(Value::R8(0.0).as_bool(), Some(false));
        assert_eq!(Value::Object(ObjectHandle::NULL).as_bool(), None);
    }

    #[test]
    fn native_words() {
        assert_eq!(Value::I4(-1).native_word(), u64::MAX);
        assert_eq!(Value::U8(u64::MAX).native_word(), u64::MAX);
        assert_eq!(Value::Bool(true).native_word(), 1);
        assert_eq!(
            Value::Object(ObjectHandle::new(Address::new(0x1234))).native_word(),
            0x1234
        );

        let instance =
            ValueTypeInstance::new(Address::new(0x40), value_type(point_class())).unwrap();
        assert_eq!(Value::ValueType(instance).as_address(), Address::new(0x40));
    }

    #[test]
    fn check_exact_variants() {
        assert!(Value::Bool(false).check(&boolean()).is_ok());
        assert!(Value::I4(1).check(&boolean()).is_err());
        assert!(Value::U1(1).check(&int32()).is_ok());
        assert!(Value::R4(1.0).check(&double()).is_ok());
        assert!(Value::I4(1).check(&int64()).is_err());
        assert!(Value::U8(1).check(&uint64()).is_ok());
        assert!(Value::String(StringHandle::NULL).check(&string()).is_ok());
        assert!(Value::Object(ObjectHandle::NULL).check(&string()).is_err());
        assert!(Value::Object(ObjectHandle::NULL).check(&object()).is_ok());

        let pointer = TypedPointer::new(Address::NULL, int32());
        assert!(Value::TypedPointer(pointer).check(&pointer_to(int32())).is_ok());
        assert!(Value::Pointer(Address::NULL).check(&pointer_to(int32())).is_err());
    }

    #[test]
    fn check_by_reference() {
        let ty = by_ref(&int32());
        assert!(matches!(
            Value::I4(0).check(&ty),
            Err(Error::MalformedValue { found: "i4", .. })
        ));
        let reference = Reference::new(Address::new(0x20), ty.clone());
        assert!(Value::Reference(reference).check(&ty).is_ok());
    }

    #[test]
    fn check_unsupported() {
        let err = Value::I4(0).check(&void()).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from(7_u16), Value::U2(7));
        assert_eq!(Value::from(-7_i64), Value::I8(-7));
        assert_eq!(Value::from(Address::new(1)), Value::Pointer(Address::new(1)));
        assert_eq!(Value::from(1.5_f32).variant_name(), "r4");
    }
}
