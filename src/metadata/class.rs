use std::sync::Arc;

use bitflags::bitflags;

use crate::{
    config::TargetLayout,
    metadata::{Type, TypeKind, TypeRc},
};

/// A reference-counted [`Class`] descriptor.
pub type ClassRc = Arc<Class>;

bitflags! {
    /// Field attributes as stored in `FieldInfo::type->attrs`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FieldAttributes: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field can only be initialized, not written to after init
        const INIT_ONLY = 0x0020;
        /// Value is compile time constant
        const LITERAL = 0x0040;
        /// Field is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime provides special behavior, depending upon the name of the field
        const RTSPECIAL_NAME = 0x0400;
    }
}

/// A field of a class.
///
/// `offset` is relative to the start of a *boxed* instance, so for instance fields it
/// includes the object header. Value types stored inline have no header; accessors subtract
/// [`TargetLayout::object_header_size`] before dereferencing.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Declared type of the field
    pub ty: TypeRc,
    /// Field attributes
    pub attributes: FieldAttributes,
    /// Offset from the start of a boxed instance
    pub offset: usize,
}

impl Field {
    /// Returns `true` if this field has no per-instance storage.
    ///
    /// Constants are always flagged static by the compiler, so `LITERAL` fields are covered.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }

    /// Returns the offset of this field inside an unboxed value of its class.
    #[must_use]
    pub fn unboxed_offset(&self, layout: &TargetLayout) -> usize {
        self.offset.saturating_sub(layout.object_header_size)
    }
}

/// A class descriptor, reduced to what memory marshaling needs.
///
/// The field list keeps declaration order, which is also the order the native call
/// convention uses when a value type is passed by value.
#[derive(Clone, Debug, PartialEq)]
pub struct Class {
    /// Simple name of the class
    pub name: String,
    /// Namespace of the class, empty for the global namespace
    pub namespace: String,
    /// Size of a boxed instance in bytes, including the object header
    pub instance_size: usize,
    /// Fields in declaration order, static fields included
    pub fields: Vec<Field>,
}

impl Class {
    /// Returns the namespace-qualified name.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Returns the instance (non-static) fields in declaration order.
    pub fn instance_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|field| !field.is_static())
    }

    /// Finds an instance field by name.
    #[must_use]
    pub fn instance_field(&self, name: &str) -> Option<&Field> {
        self.instance_fields().find(|field| field.name == name)
    }

    /// Returns the size of an unboxed instance (the instance size without the header).
    #[must_use]
    pub fn unboxed_size(&self, layout: &TargetLayout) -> usize {
        self.instance_size.saturating_sub(layout.object_header_size)
    }

    /// Returns the alignment of an unboxed instance.
    #[must_use]
    pub fn alignment(&self, layout: &TargetLayout) -> usize {
        self.instance_fields()
            .map(|field| field.ty.alignment(layout))
            .max()
            .unwrap_or(1)
    }
}

/// Builder for [`Class`] descriptors with sequential layout.
///
/// The metadata layer fills classes from the runtime, which reports offsets and sizes
/// directly; this builder computes them the way the runtime lays out value types with
/// sequential layout, which is what offline tools and tests need.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use il2scope::{metadata::{ClassBuilder, Type, TypeKind}, TargetLayout};
///
/// let int8 = Arc::new(Type::new("System.SByte", TypeKind::I1));
/// let object = Arc::new(Type::new("System.Object", TypeKind::Object));
///
/// let class = ClassBuilder::new("Pair")
///     .namespace("Sample")
///     .field("tag", int8)
///     .field("target", object)
///     .build(&TargetLayout::x64());
///
/// // 16-byte header, tag at 16, target aligned to 24
/// assert_eq!(class.fields[0].offset, 16);
/// assert_eq!(class.fields[1].offset, 24);
/// assert_eq!(class.instance_size, 32);
/// ```
#[derive(Debug, Default)]
pub struct ClassBuilder {
    name: String,
    namespace: String,
    fields: Vec<(String, TypeRc, FieldAttributes, Option<usize>)>,
    instance_size: Option<usize>,
}

impl ClassBuilder {
    /// Starts a class with the given simple name.
    pub fn new(name: impl Into<String>) -> Self {
        ClassBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Appends a public instance field at the next sequential offset.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeRc) -> Self {
        self.fields
            .push((name.into(), ty, FieldAttributes::PUBLIC, None));
        self
    }

    /// Appends a public instance field at an explicit boxed offset.
    #[must_use]
    pub fn field_at(mut self, name: impl Into<String>, ty: TypeRc, offset: usize) -> Self {
        self.fields
            .push((name.into(), ty, FieldAttributes::PUBLIC, Some(offset)));
        self
    }

    /// Appends a public static field; static fields take no instance storage.
    #[must_use]
    pub fn static_field(mut self, name: impl Into<String>, ty: TypeRc) -> Self {
        self.fields.push((
            name.into(),
            ty,
            FieldAttributes::PUBLIC | FieldAttributes::STATIC,
            Some(0),
        ));
        self
    }

    /// Overrides the computed boxed instance size.
    #[must_use]
    pub fn instance_size(mut self, size: usize) -> Self {
        self.instance_size = Some(size);
        self
    }

    /// Computes the layout and returns the class.
    #[must_use]
    pub fn build(self, layout: &TargetLayout) -> ClassRc {
        let header = layout.object_header_size;
        let mut cursor = 0_usize;
        let mut alignment = 1_usize;
        let mut fields = Vec::with_capacity(self.fields.len());

        for (name, ty, attributes, offset) in self.fields {
            let offset = if attributes.contains(FieldAttributes::STATIC) {
                offset.unwrap_or(0)
            } else {
                let field_alignment = ty.alignment(layout);
                alignment = alignment.max(field_alignment);

                let unboxed = match offset {
                    Some(offset) => offset.saturating_sub(header),
                    None => align_to(cursor, field_alignment),
                };
                cursor = cursor.max(unboxed + ty.element_size(layout));
                unboxed + header
            };

            fields.push(Field {
                name,
                ty,
                attributes,
                offset,
            });
        }

        let instance_size = self
            .instance_size
            .unwrap_or_else(|| header + align_to(cursor, alignment));

        Arc::new(Class {
            name: self.name,
            namespace: self.namespace,
            instance_size,
            fields,
        })
    }

    /// Builds the class and wraps it in a value type descriptor.
    #[must_use]
    pub fn build_value_type(self, layout: &TargetLayout) -> TypeRc {
        let class = self.build(layout);
        Arc::new(Type::new(class.full_name(), TypeKind::ValueType(class)))
    }
}

/// Rounds `offset` up to the next multiple of `alignment`.
fn align_to(offset: usize, alignment: usize) -> usize {
    let alignment = alignment.max(1);
    offset.div_ceil(alignment) * alignment
}
