// Copyright 2015-2023 Swim Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::convert::access::{FieldProperty, ParamOps, PropertyOps, TypedCase, TypedParam, UnionCaseOps};
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::serializer::MessagePackSerializer;
use crate::shape::Shaped;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Shape of an aggregate type with properties, an optional constructor and
/// optional known-subtype entries.
pub struct ObjectShape<T: Send + Sync + 'static> {
    pub(crate) properties: Vec<PropertyShape<T>>,
    pub(crate) constructor: Option<ConstructorShape<T>>,
    pub(crate) subtypes: Vec<KnownSubtype<T>>,
    pub(crate) custom_converter: Option<Box<dyn Fn() -> Arc<dyn Converter<T>> + Send + Sync>>,
}

impl<T: Send + Sync + 'static> ObjectShape<T> {
    pub fn new() -> Self {
        ObjectShape {
            properties: Vec::new(),
            constructor: None,
            subtypes: Vec::new(),
            custom_converter: None,
        }
    }

    pub fn with_property(mut self, property: PropertyShape<T>) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_constructor(mut self, constructor: ConstructorShape<T>) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn with_subtype(mut self, subtype: KnownSubtype<T>) -> Self {
        self.subtypes.push(subtype);
        self
    }

    /// Attach a user-written converter; the visitor uses it instead of
    /// synthesizing one from the properties.
    pub fn with_converter<Factory>(mut self, factory: Factory) -> Self
    where
        Factory: Fn() -> Arc<dyn Converter<T>> + Send + Sync + 'static,
    {
        self.custom_converter = Some(Box::new(factory));
        self
    }
}

impl<T: Send + Sync + 'static> Default for ObjectShape<T> {
    fn default() -> Self {
        ObjectShape::new()
    }
}

pub(crate) type PropertyBinder<T> = Box<
    dyn Fn(&MessagePackSerializer) -> Result<Box<dyn PropertyOps<T>>, SerializationError>
        + Send
        + Sync,
>;

/// Shape of one object property: its declared name, optional key index and
/// name override, accessor presence flags and the binder that resolves its
/// field type converter.
pub struct PropertyShape<T: Send + Sync + 'static> {
    pub(crate) name: &'static str,
    pub(crate) key: Option<u32>,
    pub(crate) rename: Option<&'static str>,
    pub(crate) has_getter: bool,
    pub(crate) has_setter: bool,
    pub(crate) binder: PropertyBinder<T>,
}

fn bind_field<T, F>(
    get: Option<fn(&T) -> &F>,
    set: Option<fn(&mut T, F)>,
    get_mut: Option<fn(&mut T) -> &mut F>,
    default: Option<(fn() -> F, fn(&F, &F) -> bool)>,
) -> PropertyBinder<T>
where
    T: Send + Sync + 'static,
    F: Shaped,
{
    Box::new(move |serializer| {
        let converter = serializer.converter_for::<F>()?;
        Ok(Box::new(FieldProperty {
            get,
            set,
            get_mut,
            default,
            suppress_defaults: !serializer.options().serialize_default_values,
            converter,
        }))
    })
}

fn values_equal<F: PartialEq>(left: &F, right: &F) -> bool {
    left == right
}

impl<T: Send + Sync + 'static> PropertyShape<T> {
    pub fn readwrite<F: Shaped>(
        name: &'static str,
        get: fn(&T) -> &F,
        set: fn(&mut T, F),
    ) -> Self {
        PropertyShape {
            name,
            key: None,
            rename: None,
            has_getter: true,
            has_setter: true,
            binder: bind_field(Some(get), Some(set), None, None),
        }
    }

    pub fn readwrite_with_default<F: Shaped + PartialEq>(
        name: &'static str,
        get: fn(&T) -> &F,
        set: fn(&mut T, F),
        default: fn() -> F,
    ) -> Self {
        PropertyShape {
            name,
            key: None,
            rename: None,
            has_getter: true,
            has_setter: true,
            binder: bind_field(Some(get), Some(set), None, Some((default, values_equal::<F>))),
        }
    }

    /// A read-only property. Serialized only when a constructor parameter
    /// matches it by name; elided otherwise.
    pub fn getter<F: Shaped>(name: &'static str, get: fn(&T) -> &F) -> Self {
        PropertyShape {
            name,
            key: None,
            rename: None,
            has_getter: true,
            has_setter: false,
            binder: bind_field(Some(get), None, None, None),
        }
    }

    /// A write-only property.
    pub fn setter<F: Shaped>(name: &'static str, set: fn(&mut T, F)) -> Self {
        PropertyShape {
            name,
            key: None,
            rename: None,
            has_getter: false,
            has_setter: true,
            binder: bind_field(None, Some(set), None, None),
        }
    }

    /// A property with a getter but no setter whose value is replaced in
    /// place through a mutable accessor on decode. A nil wire value leaves
    /// the existing value untouched.
    pub fn populate<F: Shaped>(
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        PropertyShape {
            name,
            key: None,
            rename: None,
            has_getter: true,
            has_setter: true,
            binder: bind_field(Some(get), None, Some(get_mut), None),
        }
    }

    /// Tag this property with an integer key, switching the declaring type
    /// to array-shaped encoding.
    pub fn with_key(mut self, index: u32) -> Self {
        self.key = Some(index);
        self
    }

    /// Override the serialized name, bypassing the naming policy.
    pub fn renamed(mut self, name: &'static str) -> Self {
        self.rename = Some(name);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// A scratch aggregate populated during decode before a parameterized
/// constructor is invoked. Slots are positional; the constructor closure
/// pulls typed values back out.
pub struct ArgumentBag {
    slots: Vec<Option<Box<dyn Any + Send>>>,
}

impl ArgumentBag {
    pub(crate) fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        ArgumentBag { slots }
    }

    pub fn put<F: Send + 'static>(&mut self, slot: usize, value: F) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(Box::new(value));
        }
    }

    pub fn is_filled(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    /// Remove and return the value at `slot`, failing if it was never
    /// filled or holds a different type.
    pub fn take<F: 'static>(&mut self, slot: usize) -> Result<F, SerializationError> {
        self.slots
            .get_mut(slot)
            .and_then(Option::take)
            .and_then(|boxed| boxed.downcast::<F>().ok())
            .map(|boxed| *boxed)
            .ok_or_else(|| {
                SerializationError::DecodeFormat(format!(
                    "missing value for constructor parameter {}",
                    slot
                ))
            })
    }

    /// Remove and return the value at `slot`, falling back to `make` if the
    /// slot was never filled.
    pub fn take_or_else<F: 'static>(
        &mut self,
        slot: usize,
        make: impl FnOnce() -> F,
    ) -> Result<F, SerializationError> {
        if self.is_filled(slot) {
            self.take(slot)
        } else {
            Ok(make())
        }
    }
}

pub(crate) type ParamBinder = Box<
    dyn Fn(&MessagePackSerializer) -> Result<Box<dyn ParamOps>, SerializationError> + Send + Sync,
>;

/// Shape of one constructor parameter.
pub struct ParameterShape {
    pub(crate) name: &'static str,
    pub(crate) position: usize,
    pub(crate) binder: ParamBinder,
}

fn bind_param<F: Shaped>(position: usize, default: Option<fn() -> F>) -> ParamBinder {
    Box::new(move |serializer| {
        let converter = serializer.converter_for::<F>()?;
        Ok(Box::new(TypedParam {
            position,
            default,
            converter,
        }))
    })
}

impl ParameterShape {
    pub fn new<F: Shaped>(name: &'static str, position: usize) -> Self {
        ParameterShape {
            name,
            position,
            binder: bind_param::<F>(position, None),
        }
    }

    pub fn with_default<F: Shaped>(name: &'static str, position: usize, default: fn() -> F) -> Self {
        ParameterShape {
            name,
            position,
            binder: bind_param::<F>(position, Some(default)),
        }
    }
}

/// Shape of a type's constructor: either parameterless, or parameterized
/// with an argument-state flow.
pub enum ConstructorShape<T> {
    Default {
        make: fn() -> T,
    },
    Parameterized {
        params: Vec<ParameterShape>,
        make: Box<dyn Fn(&mut ArgumentBag) -> Result<T, SerializationError> + Send + Sync>,
    },
}

impl<T> ConstructorShape<T> {
    pub fn parameterless(make: fn() -> T) -> Self {
        ConstructorShape::Default { make }
    }

    pub fn parameterized<Make>(params: Vec<ParameterShape>, make: Make) -> Self
    where
        Make: Fn(&mut ArgumentBag) -> Result<T, SerializationError> + Send + Sync + 'static,
    {
        ConstructorShape::Parameterized {
            params,
            make: Box::new(make),
        }
    }
}

pub(crate) type CaseBinder<T> = Box<
    dyn Fn(&MessagePackSerializer) -> Result<Box<dyn UnionCaseOps<T>>, SerializationError>
        + Send
        + Sync,
>;

/// One known-subtype entry of a polymorphic type: an integer alias paired
/// with conversion handles between the declared type and the case type.
pub struct KnownSubtype<T: Send + Sync + 'static> {
    pub(crate) alias: u32,
    pub(crate) case_type: TypeId,
    pub(crate) case_name: &'static str,
    pub(crate) binder: CaseBinder<T>,
}

impl<T: Send + Sync + 'static> KnownSubtype<T> {
    pub fn new<D: Shaped>(alias: u32, downcast: fn(&T) -> Option<&D>, upcast: fn(D) -> T) -> Self {
        KnownSubtype {
            alias,
            case_type: TypeId::of::<D>(),
            case_name: std::any::type_name::<D>(),
            binder: Box::new(move |serializer| {
                let converter = serializer.converter_for::<D>()?;
                Ok(Box::new(TypedCase {
                    downcast,
                    upcast,
                    converter,
                }))
            }),
        }
    }
}
