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

//! Array-shaped object converters for types whose properties carry integer
//! key attributes. Encoding writes `max_index + 1` positional slots with
//! nil in the gaps; decoding reads whatever slot count the wire carries,
//! skipping slots it has no reader for and defaulting missing trailing
//! parameters.

use crate::context::SerializationContext;
use crate::convert::access::ParamOps;
use crate::convert::object::{bind_properties, BoundProperty};
use crate::convert::{deny_nil, to_u32_len};
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::serializer::MessagePackSerializer;
use crate::shape::{ArgumentBag, ConstructorShape, PropertyShape, Shaped};
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use futures::future::BoxFuture;
use std::sync::Arc;

fn slot_table<T: Send + Sync + 'static>(bound: &[BoundProperty<T>]) -> Vec<Option<usize>> {
    let max_index = bound
        .iter()
        .filter_map(|p| p.key)
        .max()
        .map(|i| i as usize);
    let mut slots = vec![None; max_index.map_or(0, |m| m + 1)];
    for (index, prop) in bound.iter().enumerate() {
        if let Some(key) = prop.key {
            slots[key as usize] = Some(index);
        }
    }
    slots
}

pub(crate) fn build_keyed<T: Shaped>(
    serializer: &MessagePackSerializer,
    properties: Vec<PropertyShape<T>>,
    constructor: Option<ConstructorShape<T>>,
) -> Result<Arc<dyn Converter<T>>, SerializationError> {
    let (bound, declared_names) = bind_properties(serializer, properties)?;
    let slots = slot_table(&bound);

    match constructor {
        None => Ok(Arc::new(KeyedObjectConverter {
            make: None,
            slots,
            props: bound,
        })),
        Some(ConstructorShape::Default { make }) => Ok(Arc::new(KeyedObjectConverter {
            make: Some(make),
            slots,
            props: bound,
        })),
        Some(ConstructorShape::Parameterized { params, make }) => {
            let mut param_ops: Vec<Box<dyn ParamOps>> = Vec::with_capacity(params.len());
            let mut param_by_slot: Vec<Option<usize>> = vec![None; slots.len()];
            let mut matched_props: Vec<Option<usize>> = vec![None; bound.len()];

            for (param_index, param) in params.iter().enumerate() {
                let matching = declared_names
                    .iter()
                    .position(|name| name.eq_ignore_ascii_case(param.name));
                if let Some(prop_index) = matching {
                    matched_props[prop_index] = Some(param_index);
                    if let Some(key) = bound[prop_index].key {
                        param_by_slot[key as usize] = Some(param_index);
                    }
                }
                param_ops.push((param.binder)(serializer)?);
            }

            let mut extras = Vec::new();
            let mut extra_by_slot: Vec<Option<usize>> = vec![None; slots.len()];
            let mut bag_size = params.len();
            for (prop_index, prop) in bound.iter().enumerate() {
                if prop.has_setter && matched_props[prop_index].is_none() {
                    if let Some(key) = prop.key {
                        let slot = bag_size;
                        bag_size += 1;
                        extras.push((prop_index, slot));
                        extra_by_slot[key as usize] = Some(slot);
                    }
                }
            }

            Ok(Arc::new(KeyedCtorObjectConverter {
                params: param_ops,
                make,
                extras,
                bag_size,
                slots,
                param_by_slot,
                extra_by_slot,
                props: bound,
            }))
        }
    }
}

fn write_slots<T: Send + Sync + 'static>(
    props: &[BoundProperty<T>],
    slots: &[Option<usize>],
    writer: &mut Writer<'_>,
    value: &T,
    ctx: &mut SerializationContext<'_>,
) -> Result<(), SerializationError> {
    writer.write_array_header(to_u32_len("array", slots.len())?)?;
    for slot in slots {
        match slot {
            Some(index)
                if props[*index].has_getter && props[*index].ops.should_serialize(value) =>
            {
                props[*index].ops.write(writer, value, ctx)?;
            }
            _ => writer.write_nil()?,
        }
    }
    Ok(())
}

async fn write_slots_async<T: Send + Sync + 'static>(
    props: &[BoundProperty<T>],
    slots: &[Option<usize>],
    writer: &mut AsyncWriter<'_>,
    value: &T,
    ctx: &mut SerializationContext<'_>,
) -> Result<(), SerializationError> {
    writer
        .staging()
        .write_array_header(to_u32_len("array", slots.len())?)?;
    for slot in slots {
        match slot {
            Some(index)
                if props[*index].has_getter && props[*index].ops.should_serialize(value) =>
            {
                let prop = &props[*index];
                if prop.ops.prefer_async() {
                    prop.ops.write_async(writer, value, ctx).await?;
                } else {
                    let mut staging = writer.staging();
                    prop.ops.write(&mut staging, value, ctx)?;
                }
            }
            _ => writer.staging().write_nil()?,
        }
        if writer.is_time_to_flush(ctx.unflushed_bytes_threshold()) {
            writer.flush().await?;
        }
    }
    Ok(())
}

async fn deny_nil_async(
    reader: &mut AsyncReader<'_>,
    type_name: &'static str,
) -> Result<(), SerializationError> {
    let was_nil = reader.with_buffer(|r| r.try_read_nil()).await?;
    if was_nil {
        Err(SerializationError::UnexpectedNil(type_name))
    } else {
        Ok(())
    }
}

/// Array-shaped converter for keyed objects with a parameterless (or no)
/// constructor.
pub(crate) struct KeyedObjectConverter<T: Send + Sync + 'static> {
    make: Option<fn() -> T>,
    props: Vec<BoundProperty<T>>,
    slots: Vec<Option<usize>>,
}

impl<T: Shaped> Converter<T> for KeyedObjectConverter<T> {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        ctx.depth_step()?;
        write_slots(&self.props, &self.slots, writer, value, ctx)?;
        ctx.depth_leave();
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        deny_nil(reader, std::any::type_name::<T>())?;
        ctx.depth_step()?;
        let make = self.make.ok_or_else(|| {
            SerializationError::NotSupported(format!(
                "'{}' has no constructor and cannot be deserialized",
                std::any::type_name::<T>()
            ))
        })?;
        let mut target = make();
        let n = reader.read_array_header()? as usize;
        for i in 0..n {
            let readable = self
                .slots
                .get(i)
                .and_then(|slot| *slot)
                .filter(|index| self.props[*index].ops.can_read());
            match readable {
                Some(index) => {
                    if reader.try_read_nil()? {
                        continue;
                    }
                    self.props[index].ops.read_into(reader, &mut target, ctx)?;
                }
                None => reader.skip_value()?,
            }
        }
        ctx.depth_leave();
        Ok(target)
    }

    fn prefer_async(&self) -> bool {
        true
    }

    fn write_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        Box::pin(async move {
            ctx.depth_step()?;
            write_slots_async(&self.props, &self.slots, writer, value, ctx).await?;
            ctx.depth_leave();
            Ok(())
        })
    }

    fn read_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<T, SerializationError>> {
        Box::pin(async move {
            deny_nil_async(reader, std::any::type_name::<T>()).await?;
            ctx.depth_step()?;
            let make = self.make.ok_or_else(|| {
                SerializationError::NotSupported(format!(
                    "'{}' has no constructor and cannot be deserialized",
                    std::any::type_name::<T>()
                ))
            })?;
            let mut target = make();
            let n = reader.with_buffer(|r| r.read_array_header()).await? as usize;
            for i in 0..n {
                let readable = self
                    .slots
                    .get(i)
                    .and_then(|slot| *slot)
                    .filter(|index| self.props[*index].ops.can_read());
                match readable {
                    Some(index) => {
                        let mut structure = reader.next_structure().await?;
                        let mut sync_reader = Reader::new(&mut structure);
                        if sync_reader.try_read_nil()? {
                            continue;
                        }
                        self.props[index]
                            .ops
                            .read_into(&mut sync_reader, &mut target, ctx)?;
                    }
                    None => {
                        let _ = reader.next_structure().await?;
                    }
                }
            }
            ctx.depth_leave();
            Ok(target)
        })
    }
}

/// Array-shaped converter for keyed objects with a parameterized
/// constructor: slot `i` feeds the parameter matching the property keyed
/// `i`; missing trailing slots fall back to parameter defaults.
pub(crate) struct KeyedCtorObjectConverter<T: Send + Sync + 'static> {
    params: Vec<Box<dyn ParamOps>>,
    make: Box<dyn Fn(&mut ArgumentBag) -> Result<T, SerializationError> + Send + Sync>,
    extras: Vec<(usize, usize)>,
    bag_size: usize,
    props: Vec<BoundProperty<T>>,
    slots: Vec<Option<usize>>,
    param_by_slot: Vec<Option<usize>>,
    extra_by_slot: Vec<Option<usize>>,
}

impl<T: Shaped> KeyedCtorObjectConverter<T> {
    fn materialize(&self, bag: &mut ArgumentBag) -> Result<T, SerializationError> {
        for param in &self.params {
            param.fill_default(bag);
        }
        let mut target = (self.make)(bag)?;
        for (prop_index, slot) in &self.extras {
            self.props[*prop_index]
                .ops
                .apply_from_bag(bag, *slot, &mut target)?;
        }
        Ok(target)
    }

    fn read_slot(
        &self,
        reader: &mut Reader<'_>,
        i: usize,
        bag: &mut ArgumentBag,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        if let Some(Some(param_index)) = self.param_by_slot.get(i) {
            if reader.try_read_nil()? {
                return Ok(());
            }
            self.params[*param_index].read_into_bag(reader, bag, ctx)
        } else if let Some(Some(slot)) = self.extra_by_slot.get(i) {
            if reader.try_read_nil()? {
                return Ok(());
            }
            let prop_index = match self.slots.get(i).and_then(|s| *s) {
                Some(index) => index,
                None => return reader.skip_value().map_err(Into::into),
            };
            self.props[prop_index].ops.read_into_bag(reader, bag, *slot, ctx)
        } else {
            reader.skip_value().map_err(Into::into)
        }
    }
}

impl<T: Shaped> Converter<T> for KeyedCtorObjectConverter<T> {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        ctx.depth_step()?;
        write_slots(&self.props, &self.slots, writer, value, ctx)?;
        ctx.depth_leave();
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        deny_nil(reader, std::any::type_name::<T>())?;
        ctx.depth_step()?;
        let n = reader.read_array_header()? as usize;
        let mut bag = ArgumentBag::new(self.bag_size);
        for i in 0..n {
            self.read_slot(reader, i, &mut bag, ctx)?;
        }
        let target = self.materialize(&mut bag)?;
        ctx.depth_leave();
        Ok(target)
    }

    fn prefer_async(&self) -> bool {
        true
    }

    fn write_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        Box::pin(async move {
            ctx.depth_step()?;
            write_slots_async(&self.props, &self.slots, writer, value, ctx).await?;
            ctx.depth_leave();
            Ok(())
        })
    }

    fn read_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<T, SerializationError>> {
        Box::pin(async move {
            deny_nil_async(reader, std::any::type_name::<T>()).await?;
            ctx.depth_step()?;
            let n = reader.with_buffer(|r| r.read_array_header()).await? as usize;
            let mut bag = ArgumentBag::new(self.bag_size);
            for i in 0..n {
                let mut structure = reader.next_structure().await?;
                let mut sync_reader = Reader::new(&mut structure);
                self.read_slot(&mut sync_reader, i, &mut bag, ctx)?;
            }
            let target = self.materialize(&mut bag)?;
            ctx.depth_leave();
            Ok(target)
        })
    }
}
