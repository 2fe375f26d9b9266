use std::sync::Arc;

use crate::{
    config::TargetLayout,
    memory::{Address, ProcessMemory, ScratchRegion},
    metadata::{ClassRc, Field, TypeKind, TypeRc},
    value::Value,
    Error, Marshaler, Result,
};

/// A view of a value type instance stored at some address.
///
/// The instance is unboxed: the first field lives at `address`, and a field declared at
/// boxed offset `o` lives at `address + o - object_header_size`. Nothing is copied when the
/// view is created; every field access reads or writes memory.
///
/// An instance [reconstructed](Marshaler::reconstruct) from a call result owns the scratch
/// region it lives in. Clones and nested value type fields read from it share that region,
/// which is released once the last of them is dropped. Views created with
/// [`ValueTypeInstance::new`] borrow memory owned by the target and release nothing.
#[derive(Clone, Debug)]
pub struct ValueTypeInstance {
    address: Address,
    ty: TypeRc,
    class: ClassRc,
    scratch: Option<Arc<ScratchRegion>>,
}

impl PartialEq for ValueTypeInstance {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.ty == other.ty && self.class == other.class
    }
}

impl ValueTypeInstance {
    /// Creates a view of a value of type `ty` at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if `ty` is not a value type.
    pub fn new(address: Address, ty: TypeRc) -> Result<Self> {
        let TypeKind::ValueType(class) = ty.kind() else {
            return Err(malformed_error!(
                "\"{}\" ({}) is not a value type",
                ty.name(),
                ty.kind().short_name()
            ));
        };

        let class = class.clone();
        Ok(ValueTypeInstance::from_parts(address, ty, class))
    }

    pub(crate) fn from_parts(address: Address, ty: TypeRc, class: ClassRc) -> Self {
        ValueTypeInstance {
            address,
            ty,
            class,
            scratch: None,
        }
    }

    pub(crate) fn in_scratch(scratch: ScratchRegion, ty: TypeRc, class: ClassRc) -> Self {
        ValueTypeInstance {
            address: scratch.address(),
            ty,
            class,
            scratch: Some(Arc::new(scratch)),
        }
    }

    /// Returns the scratch region backing this instance, if it owns one.
    #[must_use]
    pub fn scratch(&self) -> Option<&Arc<ScratchRegion>> {
        self.scratch.as_ref()
    }

    /// Nested value types are views into this instance and keep its storage alive.
    fn share_storage(&self, value: Value) -> Value {
        match value {
            Value::ValueType(mut nested) => {
                nested.scratch.clone_from(&self.scratch);
                Value::ValueType(nested)
            }
            value => value,
        }
    }

    /// Returns the address of the first byte of the instance.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the type of the instance.
    #[must_use]
    pub fn ty(&self) -> &TypeRc {
        &self.ty
    }

    /// Returns the class describing the field layout.
    #[must_use]
    pub fn class(&self) -> &ClassRc {
        &self.class
    }

    /// Returns the address of `field` inside this instance.
    #[must_use]
    pub fn field_address(&self, layout: &TargetLayout, field: &Field) -> Address {
        self.address.add(field.unboxed_offset(layout) as u64)
    }

    fn find_field(&self, name: &str) -> Result<&Field> {
        self.class
            .instance_field(name)
            .ok_or_else(|| Error::FieldNotFound {
                class: self.class.full_name(),
                field: name.to_string(),
            })
    }

    /// Reads the instance field called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] if there is no such instance field, and propagates
    /// errors from [`Marshaler::read`].
    pub fn field<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        name: &str,
    ) -> Result<Value> {
        let field = self.find_field(name)?;
        let value = marshaler.read(self.field_address(marshaler.layout(), field), &field.ty)?;
        Ok(self.share_storage(value))
    }

    /// Writes the instance field called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] if there is no such instance field, and propagates
    /// errors from [`Marshaler::write`].
    pub fn set_field<M: ProcessMemory + ?Sized>(
        &self,
        marshaler: &Marshaler<'_, M>,
        name: &str,
        value: &Value,
    ) -> Result<()> {
        let field = self.find_field(name)?;
        marshaler.write(self.field_address(marshaler.layout(), field), value, &field.ty)?;
        Ok(())
    }

    /// Reads every instance field in declaration order.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Marshaler::read`].
    pub fn fields<'a, M: ProcessMemory + ?Sized>(
        &'a self,
        marshaler: &Marshaler<'_, M>,
    ) -> Result<Vec<(&'a Field, Value)>> {
        self.class
            .instance_fields()
            .map(|field| {
                let value =
                    marshaler.read(self.field_address(marshaler.layout(), field), &field.ty)?;
                Ok((field, self.share_storage(value)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        marshal::NativeValue,
        memory::{MemoryExt, SimulatedMemory},
        test::factories::{int32, nested_class, point_class, value_type, vector3_class},
    };

    #[test]
    fn field_offsets_skip_the_header() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let base = memory.alloc(8).unwrap();
        memory.write_value(base, 3_i32).unwrap();
        memory.write_value(base.add(4), -4_i32).unwrap();

        let point = ValueTypeInstance::new(base, value_type(point_class())).unwrap();
        assert_eq!(point.field(&marshaler, "x").unwrap(), Value::I4(3));
        assert_eq!(point.field(&marshaler, "y").unwrap(), Value::I4(-4));

        point.set_field(&marshaler, "x", &Value::I4(30)).unwrap();
        assert_eq!(memory.read_value::<i32>(base).unwrap(), 30);
    }

    #[test]
    fn unknown_field() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let point = ValueTypeInstance::new(Address::new(0x10), value_type(point_class())).unwrap();

        match point.field(&marshaler, "z") {
            Err(Error::FieldNotFound { class, field }) => {
                assert_eq!(class, "Sample.Point");
                assert_eq!(field, "z");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn nested_fields_are_views() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let base = memory.alloc(32).unwrap();
        memory.write_value(base.add(16), 2.5_f64).unwrap();

        let bounds = ValueTypeInstance::new(base, value_type(nested_class())).unwrap();
        let Value::ValueType(extent) = bounds.field(&marshaler, "extent").unwrap() else {
            panic!("expected a value type");
        };
        assert_eq!(extent.address(), base.add(8));
        assert_eq!(extent.field(&marshaler, "y").unwrap(), Value::R8(2.5));
    }

    #[test]
    fn nested_views_share_scratch() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let values = [
            NativeValue::Int(1),
            NativeValue::Int(2),
            NativeValue::Struct(vec![NativeValue::Float(0.5)]),
        ];

        let bounds = marshaler.reconstruct(&value_type(nested_class()), &values).unwrap();
        let Value::ValueType(extent) = bounds.field(&marshaler, "extent").unwrap() else {
            panic!("expected a value type");
        };
        assert!(extent.scratch().is_some());

        drop(bounds);
        assert_eq!(extent.field(&marshaler, "x").unwrap(), Value::R8(0.5));

        drop(extent);
        assert_eq!(memory.region_count(), 0);
    }

    #[test]
    fn views_release_nothing() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let base = memory.alloc(8).unwrap();

        let point = ValueTypeInstance::new(base, value_type(point_class())).unwrap();
        assert!(point.scratch().is_none());
        drop(point);
        assert_eq!(memory.region_count(), 1);
        assert_eq!(marshaler.read(base, &int32()).unwrap(), Value::I4(0));
    }

    #[test]
    fn all_fields() {
        let memory = SimulatedMemory::default();
        let marshaler = Marshaler::new(&memory);
        let base = memory.alloc(12).unwrap();
        memory.write_value(base.add(8), 1.0_f32).unwrap();

        let vector = ValueTypeInstance::new(base, value_type(vector3_class())).unwrap();
        let fields = vector.fields(&marshaler).unwrap();
        let names: Vec<_> = fields.iter().map(|(field, _)| field.name.as_str()).collect();
        assert_eq!(names, ["x", "y", "z"]);
        assert_eq!(fields[2].1, Value::R4(1.0));
    }

    #[test]
    fn requires_a_value_type() {
        assert!(matches!(
            ValueTypeInstance::new(Address::new(0x10), int32()),
            Err(Error::Malformed { .. })
        ));
    }
}
