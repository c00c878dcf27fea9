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

//! Type-erased accessors bound from property, parameter and union case
//! shapes. A bound accessor owns the converter for its (erased) field type
//! together with the getter and setter handles the shape supplied.

use crate::context::SerializationContext;
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::shape::ArgumentBag;
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Accessor surface of one bound object property.
pub(crate) trait PropertyOps<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    fn can_write(&self) -> bool;
    fn can_read(&self) -> bool;
    fn prefer_async(&self) -> bool;

    /// Whether the current value should be emitted. Always true unless
    /// default-value suppression is active and the value equals its
    /// declared default.
    fn should_serialize(&self, value: &T) -> bool;

    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError>;

    fn write_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>>;

    fn read_into(
        &self,
        reader: &mut Reader<'_>,
        target: &mut T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError>;

    fn read_into_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        target: &'a mut T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>>;

    fn read_into_bag(
        &self,
        reader: &mut Reader<'_>,
        bag: &mut ArgumentBag,
        slot: usize,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError>;

    fn read_into_bag_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        bag: &'a mut ArgumentBag,
        slot: usize,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>>;

    /// Move a value deposited in the bag into the target through the
    /// setter. An unfilled slot is left alone.
    fn apply_from_bag(
        &self,
        bag: &mut ArgumentBag,
        slot: usize,
        target: &mut T,
    ) -> Result<(), SerializationError>;
}

fn no_accessor(what: &'static str) -> SerializationError {
    SerializationError::NotSupported(format!("property has no {}", what))
}

/// The single [`PropertyOps`] implementation: a property backed by plain
/// function handles over a concrete field type `F`.
pub(crate) struct FieldProperty<T, F: Send + Sync + 'static> {
    pub get: Option<fn(&T) -> &F>,
    pub set: Option<fn(&mut T, F)>,
    pub get_mut: Option<fn(&mut T) -> &mut F>,
    pub default: Option<(fn() -> F, fn(&F, &F) -> bool)>,
    pub suppress_defaults: bool,
    pub converter: Arc<dyn Converter<F>>,
}

impl<T, F> PropertyOps<T> for FieldProperty<T, F>
where
    T: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    fn can_write(&self) -> bool {
        self.get.is_some()
    }

    fn can_read(&self) -> bool {
        self.set.is_some() || self.get_mut.is_some()
    }

    fn prefer_async(&self) -> bool {
        self.converter.prefer_async()
    }

    fn should_serialize(&self, value: &T) -> bool {
        if !self.suppress_defaults {
            return true;
        }
        match (self.get, &self.default) {
            (Some(get), Some((make_default, eq))) => !eq(get(value), &make_default()),
            _ => true,
        }
    }

    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        match self.get {
            Some(get) => self.converter.write(writer, get(value), ctx),
            None => Err(no_accessor("getter")),
        }
    }

    fn write_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        match self.get {
            Some(get) => self.converter.write_async(writer, get(value), ctx),
            None => Box::pin(std::future::ready(Err(no_accessor("getter")))),
        }
    }

    fn read_into(
        &self,
        reader: &mut Reader<'_>,
        target: &mut T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        if let Some(set) = self.set {
            let value = self.converter.read(reader, ctx)?;
            set(target, value);
            Ok(())
        } else if let Some(get_mut) = self.get_mut {
            if reader.try_read_nil().map_err(SerializationError::from)? {
                return Ok(());
            }
            let value = self.converter.read(reader, ctx)?;
            *get_mut(target) = value;
            Ok(())
        } else {
            Err(no_accessor("setter"))
        }
    }

    fn read_into_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        target: &'a mut T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        Box::pin(async move {
            if let Some(set) = self.set {
                let value = self.converter.read_async(reader, ctx).await?;
                set(target, value);
                Ok(())
            } else if let Some(get_mut) = self.get_mut {
                let was_nil = reader.with_buffer(|r| r.try_read_nil()).await?;
                if was_nil {
                    return Ok(());
                }
                let value = self.converter.read_async(reader, ctx).await?;
                *get_mut(target) = value;
                Ok(())
            } else {
                Err(no_accessor("setter"))
            }
        })
    }

    fn read_into_bag(
        &self,
        reader: &mut Reader<'_>,
        bag: &mut ArgumentBag,
        slot: usize,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let value = self.converter.read(reader, ctx)?;
        bag.put(slot, value);
        Ok(())
    }

    fn read_into_bag_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        bag: &'a mut ArgumentBag,
        slot: usize,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        Box::pin(async move {
            let value = self.converter.read_async(reader, ctx).await?;
            bag.put(slot, value);
            Ok(())
        })
    }

    fn apply_from_bag(
        &self,
        bag: &mut ArgumentBag,
        slot: usize,
        target: &mut T,
    ) -> Result<(), SerializationError> {
        if !bag.is_filled(slot) {
            return Ok(());
        }
        match self.set {
            Some(set) => {
                let value = bag.take::<F>(slot)?;
                set(target, value);
                Ok(())
            }
            None => Err(no_accessor("setter")),
        }
    }
}

/// Accessor surface of one bound constructor parameter.
pub(crate) trait ParamOps: Send + Sync {
    fn position(&self) -> usize;
    fn prefer_async(&self) -> bool;

    fn read_into_bag(
        &self,
        reader: &mut Reader<'_>,
        bag: &mut ArgumentBag,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError>;

    fn read_into_bag_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        bag: &'a mut ArgumentBag,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>>;

    /// Install the declared default into an unfilled slot.
    fn fill_default(&self, bag: &mut ArgumentBag);
}

pub(crate) struct TypedParam<F: Send + Sync + 'static> {
    pub position: usize,
    pub default: Option<fn() -> F>,
    pub converter: Arc<dyn Converter<F>>,
}

impl<F> ParamOps for TypedParam<F>
where
    F: Send + Sync + 'static,
{
    fn position(&self) -> usize {
        self.position
    }

    fn prefer_async(&self) -> bool {
        self.converter.prefer_async()
    }

    fn read_into_bag(
        &self,
        reader: &mut Reader<'_>,
        bag: &mut ArgumentBag,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let value = self.converter.read(reader, ctx)?;
        bag.put(self.position, value);
        Ok(())
    }

    fn read_into_bag_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        bag: &'a mut ArgumentBag,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        Box::pin(async move {
            let value = self.converter.read_async(reader, ctx).await?;
            bag.put(self.position, value);
            Ok(())
        })
    }

    fn fill_default(&self, bag: &mut ArgumentBag) {
        if let Some(make_default) = self.default {
            if !bag.is_filled(self.position) {
                bag.put(self.position, make_default());
            }
        }
    }
}

/// Accessor surface of one union case.
pub(crate) trait UnionCaseOps<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    fn matches(&self, value: &T) -> bool;
    fn prefer_async(&self) -> bool;

    fn write_payload(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError>;

    fn write_payload_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>>;

    fn read_payload(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError>;

    fn read_payload_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<T, SerializationError>>;
}

pub(crate) struct TypedCase<T, D: Send + Sync + 'static> {
    pub downcast: fn(&T) -> Option<&D>,
    pub upcast: fn(D) -> T,
    pub converter: Arc<dyn Converter<D>>,
}

fn case_mismatch() -> SerializationError {
    SerializationError::NotSupported("value no longer matches its union case".to_owned())
}

impl<T, D> UnionCaseOps<T> for TypedCase<T, D>
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    fn matches(&self, value: &T) -> bool {
        (self.downcast)(value).is_some()
    }

    fn prefer_async(&self) -> bool {
        self.converter.prefer_async()
    }

    fn write_payload(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        match (self.downcast)(value) {
            Some(case_value) => self.converter.write(writer, case_value, ctx),
            None => Err(case_mismatch()),
        }
    }

    fn write_payload_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        match (self.downcast)(value) {
            Some(case_value) => self.converter.write_async(writer, case_value, ctx),
            None => Box::pin(std::future::ready(Err(case_mismatch()))),
        }
    }

    fn read_payload(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        let case_value = self.converter.read(reader, ctx)?;
        Ok((self.upcast)(case_value))
    }

    fn read_payload_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<T, SerializationError>> {
        Box::pin(async move {
            let case_value = self.converter.read_async(reader, ctx).await?;
            Ok((self.upcast)(case_value))
        })
    }
}
