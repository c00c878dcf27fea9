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

//! Map-shaped object converters.
//!
//! Objects with named properties encode as a string-keyed map. Serialized
//! names are pre-encoded at synthesis time, both as bare UTF8 (for the
//! decode-side key table) and as complete MessagePack string tokens (for
//! direct emission). Decoding looks keys up by byte slice, without
//! allocating a string per field, and skips one whole structure for any
//! unknown key.

use crate::config::to_camel_case;
use crate::config::to_pascal_case;
use crate::context::SerializationContext;
use crate::convert::access::{ParamOps, PropertyOps};
use crate::convert::{deny_nil, keyed, union};
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::serializer::MessagePackSerializer;
use crate::shape::{ArgumentBag, ConstructorShape, ObjectShape, PropertyShape, Shaped};
use bytes::BytesMut;
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One property after binding: its pre-encoded names, key attribute and
/// erased accessors.
pub(crate) struct BoundProperty<T: Send + Sync + 'static> {
    pub name_utf8: Box<[u8]>,
    pub encoded_name: Box<[u8]>,
    pub key: Option<u32>,
    pub has_getter: bool,
    pub has_setter: bool,
    pub ops: Box<dyn PropertyOps<T>>,
}

pub(crate) fn encode_name(serialized: &str) -> Result<Box<[u8]>, SerializationError> {
    let mut buffer = BytesMut::with_capacity(serialized.len() + 5);
    let mut writer = Writer::new(&mut buffer);
    writer.write_str(serialized)?;
    Ok(Vec::from(buffer.as_ref()).into_boxed_slice())
}

pub(crate) fn bind_properties<T: Send + Sync + 'static>(
    serializer: &MessagePackSerializer,
    properties: Vec<PropertyShape<T>>,
) -> Result<(Vec<BoundProperty<T>>, Vec<&'static str>), SerializationError> {
    let policy = serializer.options().naming_policy;
    let mut bound = Vec::with_capacity(properties.len());
    let mut declared_names = Vec::with_capacity(properties.len());
    for property in properties {
        let serialized = match property.rename {
            Some(name) => name.to_owned(),
            None => policy.apply(property.name),
        };
        let ops = (property.binder)(serializer)?;
        bound.push(BoundProperty {
            name_utf8: serialized.as_bytes().to_vec().into_boxed_slice(),
            encoded_name: encode_name(&serialized)?,
            key: property.key,
            has_getter: property.has_getter,
            has_setter: property.has_setter,
            ops,
        });
        declared_names.push(property.name);
    }
    Ok((bound, declared_names))
}

/// Build the converter for an object shape: validate the key attributes,
/// bind the properties, dispatch on the constructor flavor and wrap with a
/// union converter when known subtypes are present.
pub(crate) fn build<T: Shaped>(
    serializer: &MessagePackSerializer,
    shape: ObjectShape<T>,
) -> Result<Arc<dyn Converter<T>>, SerializationError> {
    let ObjectShape {
        properties,
        constructor,
        subtypes,
        custom_converter,
    } = shape;

    if let Some(factory) = custom_converter {
        return Ok(factory());
    }

    let tagged = properties.iter().filter(|p| p.key.is_some()).count();
    if tagged != 0 && tagged != properties.len() {
        return Err(SerializationError::ShapeConstruction(format!(
            "'{}' mixes keyed and named properties",
            std::any::type_name::<T>()
        )));
    }
    let is_keyed = tagged != 0;

    if is_keyed {
        let mut seen = HashSet::new();
        for property in &properties {
            if let Some(index) = property.key {
                if !seen.insert(index) {
                    return Err(SerializationError::ShapeConstruction(format!(
                        "'{}' declares key index {} more than once",
                        std::any::type_name::<T>(),
                        index
                    )));
                }
            }
        }
    }

    let base = if is_keyed {
        keyed::build_keyed(serializer, properties, constructor)?
    } else {
        build_map_shaped(serializer, properties, constructor)?
    };

    if subtypes.is_empty() {
        Ok(base)
    } else {
        union::wrap(serializer, base, subtypes)
    }
}

/// Decode-side destination of one map key.
#[derive(Clone, Copy)]
enum ReadTarget {
    /// A constructor parameter slot.
    Param(usize),
    /// A settable property that has no matching parameter; read into an
    /// extra bag slot and applied after construction.
    Extra { prop: usize, slot: usize },
}

fn build_map_shaped<T: Shaped>(
    serializer: &MessagePackSerializer,
    properties: Vec<PropertyShape<T>>,
    constructor: Option<ConstructorShape<T>>,
) -> Result<Arc<dyn Converter<T>>, SerializationError> {
    let (bound, declared_names) = bind_properties(serializer, properties)?;

    match constructor {
        None => Ok(Arc::new(MapObjectConverter {
            make: None,
            write_list: direct_write_list(&bound),
            lookup: direct_lookup(&bound),
            props: bound,
        })),
        Some(ConstructorShape::Default { make }) => Ok(Arc::new(MapObjectConverter {
            make: Some(make),
            write_list: direct_write_list(&bound),
            lookup: direct_lookup(&bound),
            props: bound,
        })),
        Some(ConstructorShape::Parameterized { params, make }) => {
            let mut param_ops: Vec<Box<dyn ParamOps>> = Vec::with_capacity(params.len());
            let mut matched_props: Vec<Option<usize>> = vec![None; bound.len()];
            let mut lookup: HashMap<Box<[u8]>, ReadTarget> = HashMap::new();

            for (param_index, param) in params.iter().enumerate() {
                let matching = declared_names
                    .iter()
                    .position(|name| name.eq_ignore_ascii_case(param.name));
                if let Some(prop_index) = matching {
                    matched_props[prop_index] = Some(param_index);
                    lookup.insert(
                        bound[prop_index].name_utf8.clone(),
                        ReadTarget::Param(param_index),
                    );
                }
                lookup
                    .entry(to_camel_case(param.name).into_bytes().into_boxed_slice())
                    .or_insert(ReadTarget::Param(param_index));
                lookup
                    .entry(to_pascal_case(param.name).into_bytes().into_boxed_slice())
                    .or_insert(ReadTarget::Param(param_index));
                param_ops.push((param.binder)(serializer)?);
            }

            // Settable properties not covered by a parameter land in extra
            // bag slots and are applied through their setters afterwards.
            let mut extras = Vec::new();
            let mut bag_size = params.len();
            for (prop_index, prop) in bound.iter().enumerate() {
                if prop.has_setter && matched_props[prop_index].is_none() {
                    let slot = bag_size;
                    bag_size += 1;
                    extras.push((prop_index, slot));
                    lookup
                        .entry(prop.name_utf8.clone())
                        .or_insert(ReadTarget::Extra {
                            prop: prop_index,
                            slot,
                        });
                }
            }

            // Read-only properties serialize only when a parameter carries
            // their value back in; anything else would be lossy.
            let write_list = bound
                .iter()
                .enumerate()
                .filter(|(i, p)| p.has_getter && (p.has_setter || matched_props[*i].is_some()))
                .map(|(i, _)| i)
                .collect();

            Ok(Arc::new(MapCtorObjectConverter {
                params: param_ops,
                make,
                extras,
                bag_size,
                write_list,
                lookup,
                props: bound,
            }))
        }
    }
}

fn direct_write_list<T: Send + Sync + 'static>(bound: &[BoundProperty<T>]) -> Vec<usize> {
    bound
        .iter()
        .enumerate()
        .filter(|(_, p)| p.has_getter && p.has_setter)
        .map(|(i, _)| i)
        .collect()
}

fn direct_lookup<T: Send + Sync + 'static>(bound: &[BoundProperty<T>]) -> HashMap<Box<[u8]>, usize> {
    bound
        .iter()
        .enumerate()
        .filter(|(_, p)| p.has_setter)
        .map(|(i, p)| (p.name_utf8.clone(), i))
        .collect()
}

pub(crate) fn write_map_properties<T: Send + Sync + 'static>(
    props: &[BoundProperty<T>],
    write_list: &[usize],
    writer: &mut Writer<'_>,
    value: &T,
    ctx: &mut SerializationContext<'_>,
) -> Result<(), SerializationError> {
    let mut count = 0u32;
    for &index in write_list {
        if props[index].ops.should_serialize(value) {
            count += 1;
        }
    }
    writer.write_map_header(count)?;
    for &index in write_list {
        let prop = &props[index];
        if !prop.ops.should_serialize(value) {
            continue;
        }
        writer.write_raw(&prop.encoded_name)?;
        prop.ops.write(writer, value, ctx)?;
    }
    Ok(())
}

pub(crate) async fn write_map_properties_async<T: Send + Sync + 'static>(
    props: &[BoundProperty<T>],
    write_list: &[usize],
    writer: &mut AsyncWriter<'_>,
    value: &T,
    ctx: &mut SerializationContext<'_>,
) -> Result<(), SerializationError> {
    let mut count = 0u32;
    for &index in write_list {
        if props[index].ops.should_serialize(value) {
            count += 1;
        }
    }
    writer.staging().write_map_header(count)?;
    for &index in write_list {
        let prop = &props[index];
        if !prop.ops.should_serialize(value) {
            continue;
        }
        writer.staging().write_raw(&prop.encoded_name)?;
        if prop.ops.prefer_async() {
            prop.ops.write_async(writer, value, ctx).await?;
        } else {
            let mut staging = writer.staging();
            prop.ops.write(&mut staging, value, ctx)?;
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

fn not_constructible<T>() -> SerializationError {
    SerializationError::NotSupported(format!(
        "'{}' has no constructor and cannot be deserialized",
        std::any::type_name::<T>()
    ))
}

/// Map-shaped converter for objects with a parameterless (or no)
/// constructor: decode default-constructs the target and populates it
/// through setters.
pub(crate) struct MapObjectConverter<T: Send + Sync + 'static> {
    make: Option<fn() -> T>,
    props: Vec<BoundProperty<T>>,
    write_list: Vec<usize>,
    lookup: HashMap<Box<[u8]>, usize>,
}

impl<T: Shaped> Converter<T> for MapObjectConverter<T> {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        ctx.depth_step()?;
        write_map_properties(&self.props, &self.write_list, writer, value, ctx)?;
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
        let make = self.make.ok_or_else(not_constructible::<T>)?;
        let mut target = make();
        let n = reader.read_map_header()?;
        let mut scratch = BytesMut::new();
        for _ in 0..n {
            reader.read_str_bytes(&mut scratch)?;
            match self.lookup.get(scratch.as_ref()).copied() {
                Some(index) => self.props[index].ops.read_into(reader, &mut target, ctx)?,
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
            write_map_properties_async(&self.props, &self.write_list, writer, value, ctx).await?;
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
            let make = self.make.ok_or_else(not_constructible::<T>)?;
            let mut target = make();
            let n = reader.with_buffer(|r| r.read_map_header()).await?;
            let mut scratch = BytesMut::new();
            for _ in 0..n {
                reader
                    .with_buffer(|r| r.read_str_bytes(&mut scratch))
                    .await?;
                match self.lookup.get(scratch.as_ref()).copied() {
                    Some(index) => {
                        let prop = &self.props[index];
                        if prop.ops.prefer_async() {
                            prop.ops.read_into_async(reader, &mut target, ctx).await?;
                        } else {
                            let mut structure = reader.next_structure().await?;
                            let mut sync_reader = Reader::new(&mut structure);
                            prop.ops.read_into(&mut sync_reader, &mut target, ctx)?;
                        }
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

/// Map-shaped converter for objects with a parameterized constructor:
/// decode fills an argument bag by name, materializes through the
/// constructor and applies any leftover settable properties.
pub(crate) struct MapCtorObjectConverter<T: Send + Sync + 'static> {
    params: Vec<Box<dyn ParamOps>>,
    make: Box<dyn Fn(&mut ArgumentBag) -> Result<T, SerializationError> + Send + Sync>,
    extras: Vec<(usize, usize)>,
    bag_size: usize,
    props: Vec<BoundProperty<T>>,
    write_list: Vec<usize>,
    lookup: HashMap<Box<[u8]>, ReadTarget>,
}

impl<T: Shaped> MapCtorObjectConverter<T> {
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
}

impl<T: Shaped> Converter<T> for MapCtorObjectConverter<T> {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        ctx.depth_step()?;
        write_map_properties(&self.props, &self.write_list, writer, value, ctx)?;
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
        let n = reader.read_map_header()?;
        let mut bag = ArgumentBag::new(self.bag_size);
        let mut scratch = BytesMut::new();
        for _ in 0..n {
            reader.read_str_bytes(&mut scratch)?;
            match self.lookup.get(scratch.as_ref()).copied() {
                Some(ReadTarget::Param(index)) => {
                    self.params[index].read_into_bag(reader, &mut bag, ctx)?;
                }
                Some(ReadTarget::Extra { prop, slot }) => {
                    self.props[prop].ops.read_into_bag(reader, &mut bag, slot, ctx)?;
                }
                None => reader.skip_value()?,
            }
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
            write_map_properties_async(&self.props, &self.write_list, writer, value, ctx).await?;
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
            let n = reader.with_buffer(|r| r.read_map_header()).await?;
            let mut bag = ArgumentBag::new(self.bag_size);
            let mut scratch = BytesMut::new();
            for _ in 0..n {
                reader
                    .with_buffer(|r| r.read_str_bytes(&mut scratch))
                    .await?;
                match self.lookup.get(scratch.as_ref()).copied() {
                    Some(ReadTarget::Param(index)) => {
                        let param = &self.params[index];
                        if param.prefer_async() {
                            param.read_into_bag_async(reader, &mut bag, ctx).await?;
                        } else {
                            let mut structure = reader.next_structure().await?;
                            let mut sync_reader = Reader::new(&mut structure);
                            param.read_into_bag(&mut sync_reader, &mut bag, ctx)?;
                        }
                    }
                    Some(ReadTarget::Extra { prop, slot }) => {
                        let prop = &self.props[prop];
                        if prop.ops.prefer_async() {
                            prop.ops
                                .read_into_bag_async(reader, &mut bag, slot, ctx)
                                .await?;
                        } else {
                            let mut structure = reader.next_structure().await?;
                            let mut sync_reader = Reader::new(&mut structure);
                            prop.ops.read_into_bag(&mut sync_reader, &mut bag, slot, ctx)?;
                        }
                    }
                    None => {
                        let _ = reader.next_structure().await?;
                    }
                }
            }
            let target = self.materialize(&mut bag)?;
            ctx.depth_leave();
            Ok(target)
        })
    }
}
