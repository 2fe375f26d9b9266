use std::{fmt, sync::Arc};

use crate::{
    config::TargetLayout,
    metadata::{ClassRc, TypeTag},
    Result,
};

/// A reference-counted [`Type`] descriptor.
pub type TypeRc = Arc<Type>;

/// The kind of a [`Type`], with the payload each kind requires.
///
/// This is a closed set: every operation of the marshaler matches on it exhaustively, so
/// adding a kind forces each dispatch site to decide how to handle it. Kinds without a
/// storage representation of their own (`Void`, `TypedByRef`, `FnPtr`, `Var`, `MVar`) are
/// part of the set because the runtime does describe them, but every read and write path
/// rejects them.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeKind {
    /// `void`
    Void,
    /// 8-bit boolean, non-zero is `true`
    Boolean,
    /// UTF-16 code unit
    Char,
    /// Signed 8-bit integer
    I1,
    /// Unsigned 8-bit integer
    U1,
    /// Signed 16-bit integer
    I2,
    /// Unsigned 16-bit integer
    U2,
    /// Signed 32-bit integer
    I4,
    /// Unsigned 32-bit integer
    U4,
    /// Signed 64-bit integer
    I8,
    /// Unsigned 64-bit integer
    U8,
    /// 32-bit IEEE-754 float
    R4,
    /// 64-bit IEEE-754 float
    R8,
    /// Signed native-width integer (`System.IntPtr`)
    I,
    /// Unsigned native-width integer (`System.UIntPtr`)
    U,
    /// Pointer without a known pointee (`void*`)
    UntypedPointer,
    /// Pointer to values of the given type
    Pointer(TypeRc),
    /// Value type stored inline, described by its class
    ValueType(ClassRc),
    /// `System.String`
    String,
    /// `System.Object`
    Object,
    /// A reference type
    Class,
    /// A generic instantiation
    GenericInstance,
    /// Single-dimensional, zero-based array
    SzArray,
    /// Multi-dimensional array
    Array,
    /// `System.TypedReference`
    TypedByRef,
    /// Function pointer
    FnPtr,
    /// Generic parameter of a type, by index
    Var(u32),
    /// Generic parameter of a method, by index
    MVar(u32),
}

impl TypeKind {
    /// Returns the raw tag of this kind.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        match self {
            TypeKind::Void => TypeTag::Void,
            TypeKind::Boolean => TypeTag::Boolean,
            TypeKind::Char => TypeTag::Char,
            TypeKind::I1 => TypeTag::I1,
            TypeKind::U1 => TypeTag::U1,
            TypeKind::I2 => TypeTag::I2,
            TypeKind::U2 => TypeTag::U2,
            TypeKind::I4 => TypeTag::I4,
            TypeKind::U4 => TypeTag::U4,
            TypeKind::I8 => TypeTag::I8,
            TypeKind::U8 => TypeTag::U8,
            TypeKind::R4 => TypeTag::R4,
            TypeKind::R8 => TypeTag::R8,
            TypeKind::I => TypeTag::I,
            TypeKind::U => TypeTag::U,
            TypeKind::UntypedPointer | TypeKind::Pointer(_) => TypeTag::Ptr,
            TypeKind::ValueType(_) => TypeTag::ValueType,
            TypeKind::String => TypeTag::String,
            TypeKind::Object => TypeTag::Object,
            TypeKind::Class => TypeTag::Class,
            TypeKind::GenericInstance => TypeTag::GenericInst,
            TypeKind::SzArray => TypeTag::SzArray,
            TypeKind::Array => TypeTag::Array,
            TypeKind::TypedByRef => TypeTag::TypedByRef,
            TypeKind::FnPtr => TypeTag::FnPtr,
            TypeKind::Var(_) => TypeTag::Var,
            TypeKind::MVar(_) => TypeTag::MVar,
        }
    }

    /// Returns the short name of this kind (`"i4"`, `"valuetype"`, ...).
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.tag().short_name()
    }

    /// Returns `true` for kinds stored as a pointer-width reference to a heap object.
    #[must_use]
    pub fn is_heap_reference(&self) -> bool {
        matches!(
            self,
            TypeKind::String
                | TypeKind::Object
                | TypeKind::Class
                | TypeKind::GenericInstance
                | TypeKind::SzArray
                | TypeKind::Array
        )
    }

    /// Returns `true` for kinds that have no storage representation.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            TypeKind::Void
                | TypeKind::TypedByRef
                | TypeKind::FnPtr
                | TypeKind::Var(_)
                | TypeKind::MVar(_)
        )
    }

    /// Builds the kind for a tag that carries no payload.
    ///
    /// Returns `None` for `ptr` and `valuetype`, whose payload has to be supplied through
    /// [`Type::from_raw`], and for the generic parameter tags, which carry an index.
    #[must_use]
    pub fn from_tag(tag: TypeTag) -> Option<TypeKind> {
        Some(match tag {
            TypeTag::Void => TypeKind::Void,
            TypeTag::Boolean => TypeKind::Boolean,
            TypeTag::Char => TypeKind::Char,
            TypeTag::I1 => TypeKind::I1,
            TypeTag::U1 => TypeKind::U1,
            TypeTag::I2 => TypeKind::I2,
            TypeTag::U2 => TypeKind::U2,
            TypeTag::I4 => TypeKind::I4,
            TypeTag::U4 => TypeKind::U4,
            TypeTag::I8 => TypeKind::I8,
            TypeTag::U8 => TypeKind::U8,
            TypeTag::R4 => TypeKind::R4,
            TypeTag::R8 => TypeKind::R8,
            TypeTag::I => TypeKind::I,
            TypeTag::U => TypeKind::U,
            TypeTag::String => TypeKind::String,
            TypeTag::Object => TypeKind::Object,
            TypeTag::Class => TypeKind::Class,
            TypeTag::GenericInst => TypeKind::GenericInstance,
            TypeTag::SzArray => TypeKind::SzArray,
            TypeTag::Array => TypeKind::Array,
            TypeTag::TypedByRef => TypeKind::TypedByRef,
            TypeTag::FnPtr => TypeKind::FnPtr,
            TypeTag::Ptr | TypeTag::ValueType | TypeTag::Var | TypeTag::MVar => return None,
        })
    }
}

/// A runtime type descriptor, as discovered from the target's metadata.
///
/// Descriptors are immutable and shared through [`TypeRc`]. The marshaler only ever borrows
/// them; the [`TypeKind`] decides how a slot of this type is read and written, and
/// `is_by_reference` overrides the kind for writes (a by-reference slot stores the address
/// of the referent, never the referent itself).
///
/// # Example
///
/// ```rust
/// use il2scope::metadata::{Type, TypeKind};
///
/// let int32 = Type::new("System.Int32", TypeKind::I4);
/// assert_eq!(int32.kind().short_name(), "i4");
/// assert!(!int32.is_by_reference());
///
/// let by_ref = int32.clone().by_reference();
/// assert!(by_ref.is_by_reference());
/// assert_eq!(by_ref.to_string(), "System.Int32&");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Type {
    name: String,
    kind: TypeKind,
    by_reference: bool,
}

impl Type {
    /// Creates a new by-value type descriptor.
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Type {
            name: name.into(),
            kind,
            by_reference: false,
        }
    }

    /// Builds a descriptor from the raw fields of an `Il2CppType`.
    ///
    /// The payload arguments must be present exactly when the tag requires them:
    /// `data_type` for `ptr` (absent means an untyped pointer), `class` for `valuetype`, and
    /// `generic_index` for `var` / `mvar`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for unknown tags, a missing class on a value
    /// type, or a payload supplied for a tag that takes none.
    pub fn from_raw(
        name: impl Into<String>,
        raw_tag: u8,
        by_reference: bool,
        data_type: Option<TypeRc>,
        class: Option<ClassRc>,
        generic_index: Option<u32>,
    ) -> Result<Self> {
        let name = name.into();
        let tag = TypeTag::try_from(raw_tag)?;

        let kind = match (tag, data_type, class, generic_index) {
            (TypeTag::Ptr, Some(data_type), None, None) => TypeKind::Pointer(data_type),
            (TypeTag::Ptr, None, None, None) => TypeKind::UntypedPointer,
            (TypeTag::ValueType, None, Some(class), None) => TypeKind::ValueType(class),
            (TypeTag::Var, None, None, Some(index)) => TypeKind::Var(index),
            (TypeTag::MVar, None, None, Some(index)) => TypeKind::MVar(index),
            (tag, None, None, None) => TypeKind::from_tag(tag).ok_or_else(|| {
                malformed_error!("\"{}\" ({}) is missing its payload", name, tag.short_name())
            })?,
            (tag, ..) => {
                return Err(malformed_error!(
                    "\"{}\" ({}) carries an unexpected payload",
                    name,
                    tag.short_name()
                ))
            }
        };

        Ok(Type {
            name,
            kind,
            by_reference,
        })
    }

    /// Marks this descriptor as passed by reference.
    #[must_use]
    pub fn by_reference(mut self) -> Self {
        self.by_reference = true;
        self
    }

    /// Returns the by-value descriptor of the referent of a by-reference type.
    #[must_use]
    pub fn dereferenced(&self) -> Type {
        Type {
            name: self.name.clone(),
            kind: self.kind.clone(),
            by_reference: false,
        }
    }

    /// Returns the full name of this type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the kind of this type.
    #[must_use]
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Returns the raw tag of this type.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        self.kind.tag()
    }

    /// Returns `true` if slots of this type hold the address of the referent.
    #[must_use]
    pub fn is_by_reference(&self) -> bool {
        self.by_reference
    }

    /// Returns `true` if this is a value type.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(self.kind, TypeKind::ValueType(_))
    }

    /// Returns the pointee type of a typed pointer.
    #[must_use]
    pub fn data_type(&self) -> Option<&TypeRc> {
        match &self.kind {
            TypeKind::Pointer(data_type) => Some(data_type),
            _ => None,
        }
    }

    /// Returns the class of a value type.
    #[must_use]
    pub fn class(&self) -> Option<&ClassRc> {
        match &self.kind {
            TypeKind::ValueType(class) => Some(class),
            _ => None,
        }
    }

    /// Returns the number of bytes one slot of this type occupies inline.
    ///
    /// This is the stride between consecutive array elements and the amount a flattened
    /// struct advances per slot: the width of a primitive, one pointer for every
    /// reference-like kind, and the unboxed size for value types. Kinds without a storage
    /// representation are treated as pointer-sized.
    #[must_use]
    pub fn element_size(&self, layout: &TargetLayout) -> usize {
        match &self.kind {
            TypeKind::Boolean | TypeKind::I1 | TypeKind::U1 => 1,
            TypeKind::Char | TypeKind::I2 | TypeKind::U2 => 2,
            TypeKind::I4 | TypeKind::U4 | TypeKind::R4 => 4,
            TypeKind::I8 | TypeKind::U8 | TypeKind::R8 => 8,
            TypeKind::ValueType(class) => class.unboxed_size(layout),
            TypeKind::I
            | TypeKind::U
            | TypeKind::UntypedPointer
            | TypeKind::Pointer(_)
            | TypeKind::String
            | TypeKind::Object
            | TypeKind::Class
            | TypeKind::GenericInstance
            | TypeKind::SzArray
            | TypeKind::Array
            | TypeKind::Void
            | TypeKind::TypedByRef
            | TypeKind::FnPtr
            | TypeKind::Var(_)
            | TypeKind::MVar(_) => layout.pointer_size(),
        }
    }

    /// Returns the natural alignment of a slot of this type.
    ///
    /// Primitives align to their own size, capped at the pointer width; value types align
    /// to their most-aligned instance field.
    #[must_use]
    pub fn alignment(&self, layout: &TargetLayout) -> usize {
        match &self.kind {
            TypeKind::ValueType(class) => class.alignment(layout),
            _ => self.element_size(layout).clamp(1, layout.pointer_size()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.by_reference {
            write!(f, "&")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::{int32, point_class, vector3_class};

    #[test]
    fn from_raw_primitives() {
        let ty = Type::from_raw("System.Int32", 0x08, false, None, None, None).unwrap();
        assert_eq!(ty.kind(), &TypeKind::I4);

        let ty = Type::from_raw("System.Int32&", 0x08, true, None, None, None).unwrap();
        assert!(ty.is_by_reference());

        let ty = Type::from_raw("System.IntPtr", 0x18, false, None, None, None).unwrap();
        assert_eq!(ty.kind(), &TypeKind::I);
    }

    #[test]
    fn from_raw_payloads() {
        let pointer =
            Type::from_raw("System.Int32*", 0x0f, false, Some(int32()), None, None).unwrap();
        assert_eq!(pointer.data_type(), Some(&int32()));

        let untyped = Type::from_raw("System.Void*", 0x0f, false, None, None, None).unwrap();
        assert_eq!(untyped.kind(), &TypeKind::UntypedPointer);
        assert_eq!(untyped.data_type(), None);

        let class = point_class();
        let value = Type::from_raw("Point", 0x11, false, None, Some(class.clone()), None).unwrap();
        assert_eq!(value.class(), Some(&class));

        let var = Type::from_raw("T", 0x13, false, None, None, Some(1)).unwrap();
        assert_eq!(var.kind(), &TypeKind::Var(1));
    }

    #[test]
    fn from_raw_rejects_inconsistent_payloads() {
        assert!(Type::from_raw("Point", 0x11, false, None, None, None).is_err());
        assert!(Type::from_raw("T", 0x1e, false, None, None, None).is_err());
        assert!(Type::from_raw("System.Int32", 0x08, false, Some(int32()), None, None).is_err());
        assert!(Type::from_raw("System.Int32", 0x08, false, None, Some(point_class()), None)
            .is_err());
        assert!(Type::from_raw("Bogus", 0x10, false, None, None, None).is_err());
    }

    #[test]
    fn element_sizes() {
        let x64 = TargetLayout::x64();
        let x86 = TargetLayout::x86();

        assert_eq!(Type::new("System.Boolean", TypeKind::Boolean).element_size(&x64), 1);
        assert_eq!(Type::new("System.Char", TypeKind::Char).element_size(&x64), 2);
        assert_eq!(Type::new("System.Double", TypeKind::R8).element_size(&x86), 8);
        assert_eq!(Type::new("System.String", TypeKind::String).element_size(&x64), 8);
        assert_eq!(Type::new("System.String", TypeKind::String).element_size(&x86), 4);

        let vector3 = Type::new("UnityEngine.Vector3", TypeKind::ValueType(vector3_class()));
        assert_eq!(vector3.element_size(&x64), 12);
        assert_eq!(vector3.alignment(&x64), 4);
    }

    #[test]
    fn alignment_capped_at_pointer_width() {
        let int64 = Type::new("System.Int64", TypeKind::I8);
        assert_eq!(int64.alignment(&TargetLayout::x64()), 8);
        assert_eq!(int64.alignment(&TargetLayout::x86()), 4);
    }

    #[test]
    fn unsupported_kinds() {
        assert!(TypeKind::Void.is_unsupported());
        assert!(TypeKind::MVar(0).is_unsupported());
        assert!(!TypeKind::I.is_unsupported());
        assert!(TypeKind::SzArray.is_heap_reference());
        assert!(!TypeKind::UntypedPointer.is_heap_reference());
    }
}
