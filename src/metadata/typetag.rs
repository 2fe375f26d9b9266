use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::Result;

/// Raw type tags as stored in `Il2CppType::type`.
///
/// The runtime reuses the ECMA-335 element type codes, so the discriminants match the
/// `ELEMENT_TYPE_*` constants of a metadata signature. Only codes the runtime actually
/// emits for a type are listed; signature-only codes (modifiers, sentinels, pinned) never
/// reach the marshaler. `ByRef` is not a tag here: IL2CPP stores it as a separate flag on
/// the type, see [`Type::is_by_reference`](crate::metadata::Type::is_by_reference).
///
/// The static string of each tag is the short name used in diagnostics:
///
/// ```rust
/// use il2scope::metadata::TypeTag;
///
/// let tag = TypeTag::try_from(0x08)?;
/// assert_eq!(tag, TypeTag::I4);
/// assert_eq!(<&'static str>::from(tag), "i4");
/// assert!(TypeTag::try_from(0x45).is_err());
/// # Ok::<(), il2scope::Error>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
#[repr(u8)]
pub enum TypeTag {
    /// `System.Void`
    #[strum(serialize = "void")]
    Void = 0x01,
    /// `System.Boolean`
    #[strum(serialize = "boolean")]
    Boolean = 0x02,
    /// `System.Char`, a UTF-16 code unit
    #[strum(serialize = "char")]
    Char = 0x03,
    /// `System.SByte`
    #[strum(serialize = "i1")]
    I1 = 0x04,
    /// `System.Byte`
    #[strum(serialize = "u1")]
    U1 = 0x05,
    /// `System.Int16`
    #[strum(serialize = "i2")]
    I2 = 0x06,
    /// `System.UInt16`
    #[strum(serialize = "u2")]
    U2 = 0x07,
    /// `System.Int32`
    #[strum(serialize = "i4")]
    I4 = 0x08,
    /// `System.UInt32`
    #[strum(serialize = "u4")]
    U4 = 0x09,
    /// `System.Int64`
    #[strum(serialize = "i8")]
    I8 = 0x0a,
    /// `System.UInt64`
    #[strum(serialize = "u8")]
    U8 = 0x0b,
    /// `System.Single`
    #[strum(serialize = "r4")]
    R4 = 0x0c,
    /// `System.Double`
    #[strum(serialize = "r8")]
    R8 = 0x0d,
    /// `System.String`
    #[strum(serialize = "string")]
    String = 0x0e,
    /// Unmanaged pointer, followed by the pointee type
    #[strum(serialize = "ptr")]
    Ptr = 0x0f,
    /// A value type, followed by its class
    #[strum(serialize = "valuetype")]
    ValueType = 0x11,
    /// A reference type, followed by its class
    #[strum(serialize = "class")]
    Class = 0x12,
    /// Generic parameter of a type
    #[strum(serialize = "var")]
    Var = 0x13,
    /// Multi-dimensional array
    #[strum(serialize = "array")]
    Array = 0x14,
    /// Generic instantiation
    #[strum(serialize = "genericinst")]
    GenericInst = 0x15,
    /// `System.TypedReference`
    #[strum(serialize = "typedbyref")]
    TypedByRef = 0x16,
    /// `System.IntPtr`
    #[strum(serialize = "i")]
    I = 0x18,
    /// `System.UIntPtr`
    #[strum(serialize = "u")]
    U = 0x19,
    /// Function pointer
    #[strum(serialize = "fnptr")]
    FnPtr = 0x1b,
    /// `System.Object`
    #[strum(serialize = "object")]
    Object = 0x1c,
    /// Single-dimensional, zero-based array
    #[strum(serialize = "szarray")]
    SzArray = 0x1d,
    /// Generic parameter of a method
    #[strum(serialize = "mvar")]
    MVar = 0x1e,
}

impl TypeTag {
    /// Returns the raw tag byte.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the short name of this tag (`"i4"`, `"valuetype"`, ...).
    #[must_use]
    pub fn short_name(self) -> &'static str {
        self.into()
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self> {
        use strum::IntoEnumIterator;

        TypeTag::iter()
            .find(|tag| tag.as_u8() == value)
            .ok_or_else(|| malformed_error!("Unknown type tag - 0x{:02x}", value))
    }
}
