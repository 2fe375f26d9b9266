use std::sync::Arc;

use widestring::U16String;

use crate::{
    memory::{Address, MemoryExt, ProcessMemory},
    metadata::{TypeKind, TypeRc},
    value::{Value, ValueTypeInstance},
    Error, Marshaler, Result,
};

macro_rules! address_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name(Address);

        impl $name {
            /// The null handle.
            pub const NULL: $name = $name(Address::NULL);

            /// Wraps the given address.
            #[must_use]
            pub const fn new(address: Address) -> Self {
                $name(address)
            }

            /// Wraps the given address, or returns `None` if it is null.
            #[must_use]
            pub fn non_null(address: Address) -> Option<Self> {
                (!address.is_null()).then_some($name(address))
            }

            /// Returns the address of the instance.
            #[must_use]
            pub const fn address(&self) -> Address {
                self.0
            }

            /// Returns `true` if this handle is null.
            #[must_use]
            pub const fn is_null(&self) -> bool {
                self.0.is_null()
            }
        }
    };
}

address_handle! {
    /// A handle to a managed object.
    ObjectHandle
}

address_handle! {
    /// A handle to a managed `System.String`.
    StringHandle
}

address_handle! {
    /// A handle to a managed array.
    ///
    /// The element type is not stored in the handle; accessors take it as an argument.
    ArrayHandle
}

impl ObjectHandle {
    /// Reads the class pointer from the object header.
    ///
    /// # Errors
    ///
    /// Propagates errors from the memory backend.
    pub fn class_pointer<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
    ) -> Result<Address> {
        marshaler
            .memory()
            .read_pointer(self.0, marshaler.layout().pointer_width)
    }

    /// Returns a view of the value type boxed in this object.
    ///
    /// The payload of a boxed value type starts right after the object header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if `ty` is not a value type.
    pub fn unbox<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        ty: &TypeRc,
    ) -> Result<ValueTypeInstance> {
        let header = marshaler.layout().object_header_size as u64;
        ValueTypeInstance::new(self.0.add(header), ty.clone())
    }
}

impl StringHandle {
    /// Reads the length of the string in UTF-16 code units.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] for a negative length and propagates errors from the
    /// memory backend.
    pub fn length<M: ProcessMemory + ?Sized>(&self, marshaler: &Marshaler<'_, M>) -> Result<usize> {
        let offset = marshaler.layout().string_length_offset() as u64;
        let length = marshaler.memory().read_value::<i32>(self.0.add(offset))?;

        usize::try_from(length).map_err(|_| {
            malformed_error!("String at {} has a negative length - {}", self.0, length)
        })
    }

    /// Reads the raw UTF-16 contents, or `None` for a null handle.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`StringHandle::length`] and from the memory backend.
    pub fn content_utf16<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
    ) -> Result<Option<U16String>> {
        if self.is_null() {
            return Ok(None);
        }

        let length = self.length(marshaler)?;
        let size = length.checked_mul(2).ok_or(Error::OutOfBounds)?;
        let mut bytes = vec![0_u8; size];

        let offset = marshaler.layout().string_chars_offset() as u64;
        marshaler.memory().read_bytes(self.0.add(offset), &mut bytes)?;

        let units = bytes
            .chunks_exact(2)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
            .collect::<Vec<_>>();
        Ok(Some(U16String::from_vec(units)))
    }

    /// Reads the contents as a Rust string, or `None` for a null handle.
    ///
    /// Unpaired surrogates are replaced with `U+FFFD`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`StringHandle::content_utf16`].
    pub fn content<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
    ) -> Result<Option<String>> {
        Ok(self
            .content_utf16(marshaler)?
            .map(|content| content.to_string_lossy()))
    }
}

impl ArrayHandle {
    /// Reads the number of elements.
    ///
    /// # Errors
    ///
    /// Propagates errors from the memory backend.
    pub fn length<M: ProcessMemory + ?Sized>(&self, marshaler: &Marshaler<'_, M>) -> Result<u64> {
        let layout = marshaler.layout();
        let address = self.0.add(layout.array_length_offset() as u64);
        Ok(marshaler
            .memory()
            .read_pointer(address, layout.pointer_width)?
            .as_u64())
    }

    /// Returns the address of the element at `index`, without bounds checking.
    #[must_use]
    pub fn element_address<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        element_type: &TypeRc,
        index: u64,
    ) -> Address {
        let layout = marshaler.layout();
        let stride = element_type.element_size(layout) as u64;
        self.0
            .add(layout.array_data_offset() as u64)
            .add(index.wrapping_mul(stride))
    }

    /// Reads the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index` is not below the array length, and
    /// propagates errors from [`Marshaler::read`].
    pub fn get<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        element_type: &TypeRc,
        index: u64,
    ) -> Result<Value> {
        self.check_index(marshaler, index)?;
        marshaler.read(
            self.element_address(marshaler, element_type, index),
            element_type,
        )
    }

    /// Writes the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index` is not below the array length, and
    /// propagates errors from [`Marshaler::write`].
    pub fn set<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        element_type: &TypeRc,
        index: u64,
        value: &Value,
    ) -> Result<()> {
        self.check_index(marshaler, index)?;
        marshaler.write(
            self.element_address(marshaler, element_type, index),
            value,
            element_type,
        )?;
        Ok(())
    }

    /// Reads every element.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`ArrayHandle::length`] and [`Marshaler::read`].
    pub fn elements<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        element_type: &TypeRc,
    ) -> Result<Vec<Value>> {
        (0..self.length(marshaler)?)
            .map(|index| {
                marshaler.read(
                    self.element_address(marshaler, element_type, index),
                    element_type,
                )
            })
            .collect()
    }

    fn check_index<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        index: u64,
    ) -> Result<()> {
        let length = self.length(marshaler)?;
        if index >= length {
            return Err(Error::IndexOutOfRange { index, length });
        }
        Ok(())
    }
}

/// A pointer to one or more values of a known type.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedPointer {
    address: Address,
    element_type: TypeRc,
}

impl TypedPointer {
    /// Creates a pointer to values of `element_type`.
    #[must_use]
    pub fn new(address: Address, element_type: TypeRc) -> Self {
        TypedPointer {
            address,
            element_type,
        }
    }

    /// Creates a pointer, or returns `None` if `address` is null.
    #[must_use]
    pub fn non_null(address: Address, element_type: TypeRc) -> Option<Self> {
        (!address.is_null()).then(|| TypedPointer::new(address, element_type))
    }

    /// Returns the address this pointer holds.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the pointee type.
    #[must_use]
    pub fn element_type(&self) -> &TypeRc {
        &self.element_type
    }

    /// Returns `true` if this pointer is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.address.is_null()
    }

    fn element_address<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        index: u64,
    ) -> Address {
        let stride = self.element_type.element_size(marshaler.layout()) as u64;
        self.address.add(index.wrapping_mul(stride))
    }

    /// Reads the element at `index`, counted in elements from the pointer.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Marshaler::read`].
    pub fn get<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        index: u64,
    ) -> Result<Value> {
        marshaler.read(self.element_address(marshaler, index), &self.element_type)
    }

    /// Writes the element at `index`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Marshaler::write`].
    pub fn set<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        index: u64,
        value: &Value,
    ) -> Result<()> {
        marshaler.write(self.element_address(marshaler, index), value, &self.element_type)?;
        Ok(())
    }

    /// Reads `count` consecutive elements starting at `offset`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Marshaler::read`].
    pub fn read<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        offset: u64,
        count: u64,
    ) -> Result<Vec<Value>> {
        (offset..offset.saturating_add(count))
            .map(|index| self.get(marshaler, index))
            .collect()
    }
}

/// The address of a slot passed by reference, together with the slot's type.
///
/// Produced for by-reference parameters and return values. The slot itself holds a value of
/// the referenced type; reading and writing it through the reference uses the by-value form
/// of the type.
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    address: Address,
    ty: TypeRc,
}

impl Reference {
    /// Creates a reference to the slot at `address`.
    #[must_use]
    pub fn new(address: Address, ty: TypeRc) -> Self {
        Reference { address, ty }
    }

    /// Returns the address of the referenced slot.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the type of the reference.
    #[must_use]
    pub fn ty(&self) -> &TypeRc {
        &self.ty
    }

    fn referent_type(&self) -> TypeRc {
        if self.ty.is_by_reference() {
            Arc::new(self.ty.dereferenced())
        } else {
            self.ty.clone()
        }
    }

    /// Reads the referenced slot.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Marshaler::read`].
    pub fn value<M: ProcessMemory + ?Sized>(&self, marshaler: &Marshaler<'_, M>) -> Result<Value> {
        marshaler.read(self.address, &self.referent_type())
    }

    /// Writes the referenced slot.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Marshaler::write`].
    pub fn set<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        value: &Value,
    ) -> Result<()> {
        marshaler.write(self.address, value, &self.referent_type())?;
        Ok(())
    }

    /// Returns `true` if the referenced slot holds a pointer-width word.
    ///
    /// Useful to decide whether [`Reference::value`] yields a handle that needs a second
    /// dereference.
    #[must_use]
    pub fn is_indirect(&self) -> bool {
        matches!(
            self.ty.kind(),
            TypeKind::I | TypeKind::U | TypeKind::UntypedPointer | TypeKind::Pointer(_)
        ) || self.ty.kind().is_heap_reference()
    }
}
