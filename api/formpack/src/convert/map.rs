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

use crate::context::SerializationContext;
use crate::convert::{deny_nil, to_u32_len};
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::shape::PairIterFn;
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use futures::future::BoxFuture;
use std::sync::Arc;

fn write_entries<T, K, V>(
    iter: PairIterFn<T, K, V>,
    len: fn(&T) -> usize,
    key_converter: &Arc<dyn Converter<K>>,
    value_converter: &Arc<dyn Converter<V>>,
    writer: &mut Writer<'_>,
    value: &T,
    ctx: &mut SerializationContext<'_>,
) -> Result<(), SerializationError>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    ctx.depth_step()?;
    writer.write_map_header(to_u32_len("map", len(value))?)?;
    for (entry_key, entry_value) in iter(value) {
        key_converter.write(writer, entry_key, ctx)?;
        value_converter.write(writer, entry_value, ctx)?;
    }
    ctx.depth_leave();
    Ok(())
}

fn write_entries_async<'a, T, K, V>(
    iter: PairIterFn<T, K, V>,
    len: fn(&T) -> usize,
    key_converter: &'a Arc<dyn Converter<K>>,
    value_converter: &'a Arc<dyn Converter<V>>,
    writer: &'a mut AsyncWriter<'_>,
    value: &'a T,
    ctx: &'a mut SerializationContext<'_>,
) -> BoxFuture<'a, Result<(), SerializationError>>
where
    T: Send + Sync + 'static,
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    Box::pin(async move {
        ctx.depth_step()?;
        writer
            .staging()
            .write_map_header(to_u32_len("map", len(value))?)?;
        for (entry_key, entry_value) in iter(value) {
            if key_converter.prefer_async() {
                key_converter.write_async(writer, entry_key, ctx).await?;
            } else {
                let mut staging = writer.staging();
                key_converter.write(&mut staging, entry_key, ctx)?;
            }
            if value_converter.prefer_async() {
                value_converter.write_async(writer, entry_value, ctx).await?;
            } else {
                let mut staging = writer.staging();
                value_converter.write(&mut staging, entry_value, ctx)?;
            }
            if writer.is_time_to_flush(ctx.unflushed_bytes_threshold()) {
                writer.flush().await?;
            }
        }
        ctx.depth_leave();
        Ok(())
    })
}

fn read_entries<K, V>(
    reader: &mut Reader<'_>,
    key_converter: &Arc<dyn Converter<K>>,
    value_converter: &Arc<dyn Converter<V>>,
    ctx: &mut SerializationContext<'_>,
    mut sink: impl FnMut(K, V),
) -> Result<(), SerializationError>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let n = reader.read_map_header()?;
    for _ in 0..n {
        let entry_key = key_converter.read(reader, ctx)?;
        let entry_value = value_converter.read(reader, ctx)?;
        sink(entry_key, entry_value);
    }
    Ok(())
}

async fn read_entries_async<K, V>(
    reader: &mut AsyncReader<'_>,
    key_converter: &Arc<dyn Converter<K>>,
    value_converter: &Arc<dyn Converter<V>>,
    ctx: &mut SerializationContext<'_>,
    sink: &mut (impl FnMut(K, V) + Send),
) -> Result<(), SerializationError>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let n = reader.with_buffer(|r| r.read_map_header()).await?;
    for _ in 0..n {
        let entry_key = if key_converter.prefer_async() {
            key_converter.read_async(reader, ctx).await?
        } else {
            let mut structure = reader.next_structure().await?;
            let mut sync_reader = Reader::new(&mut structure);
            key_converter.read(&mut sync_reader, ctx)?
        };
        let entry_value = if value_converter.prefer_async() {
            value_converter.read_async(reader, ctx).await?
        } else {
            let mut structure = reader.next_structure().await?;
            let mut sync_reader = Reader::new(&mut structure);
            value_converter.read(&mut sync_reader, ctx)?
        };
        sink(entry_key, entry_value);
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

macro_rules! dict_write_impls {
    () => {
        fn write(
            &self,
            writer: &mut Writer<'_>,
            value: &T,
            ctx: &mut SerializationContext<'_>,
        ) -> Result<(), SerializationError> {
            write_entries(
                self.iter,
                self.len,
                &self.key_converter,
                &self.value_converter,
                writer,
                value,
                ctx,
            )
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
            write_entries_async(
                self.iter,
                self.len,
                &self.key_converter,
                &self.value_converter,
                writer,
                value,
                ctx,
            )
        }
    };
}

/// Dictionary with no construction strategy: write-only.
pub(crate) struct DictWriteOnly<T, K: Send + Sync + 'static, V: Send + Sync + 'static> {
    pub iter: PairIterFn<T, K, V>,
    pub len: fn(&T) -> usize,
    pub key_converter: Arc<dyn Converter<K>>,
    pub value_converter: Arc<dyn Converter<V>>,
}

impl<T, K, V> Converter<T> for DictWriteOnly<T, K, V>
where
    T: Send + Sync + 'static,
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    dict_write_impls!();

    fn read(
        &self,
        _reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        Err(SerializationError::NotSupported(format!(
            "'{}' cannot be constructed during deserialization",
            std::any::type_name::<T>()
        )))
    }
}

/// Dictionary built by default-constructing and inserting entries.
pub(crate) struct DictMutable<T, K: Send + Sync + 'static, V: Send + Sync + 'static> {
    pub new: fn() -> T,
    pub insert: fn(&mut T, K, V),
    pub iter: PairIterFn<T, K, V>,
    pub len: fn(&T) -> usize,
    pub key_converter: Arc<dyn Converter<K>>,
    pub value_converter: Arc<dyn Converter<V>>,
}

impl<T, K, V> Converter<T> for DictMutable<T, K, V>
where
    T: Send + Sync + 'static,
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    dict_write_impls!();

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        deny_nil(reader, std::any::type_name::<T>())?;
        ctx.depth_step()?;
        let mut target = (self.new)();
        read_entries(
            reader,
            &self.key_converter,
            &self.value_converter,
            ctx,
            |entry_key, entry_value| (self.insert)(&mut target, entry_key, entry_value),
        )?;
        ctx.depth_leave();
        Ok(target)
    }

    fn read_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<T, SerializationError>> {
        Box::pin(async move {
            deny_nil_async(reader, std::any::type_name::<T>()).await?;
            ctx.depth_step()?;
            let mut target = (self.new)();
            let mut sink =
                |entry_key, entry_value| (self.insert)(&mut target, entry_key, entry_value);
            read_entries_async(
                reader,
                &self.key_converter,
                &self.value_converter,
                ctx,
                &mut sink,
            )
            .await?;
            drop(sink);
            ctx.depth_leave();
            Ok(target)
        })
    }
}

/// Dictionary built from a complete buffer of entries.
pub(crate) struct DictFromVec<T, K: Send + Sync + 'static, V: Send + Sync + 'static> {
    pub make: fn(Vec<(K, V)>) -> T,
    pub iter: PairIterFn<T, K, V>,
    pub len: fn(&T) -> usize,
    pub key_converter: Arc<dyn Converter<K>>,
    pub value_converter: Arc<dyn Converter<V>>,
}

impl<T, K, V> Converter<T> for DictFromVec<T, K, V>
where
    T: Send + Sync + 'static,
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    dict_write_impls!();

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        deny_nil(reader, std::any::type_name::<T>())?;
        ctx.depth_step()?;
        let mut entries = Vec::new();
        read_entries(
            reader,
            &self.key_converter,
            &self.value_converter,
            ctx,
            |entry_key, entry_value| entries.push((entry_key, entry_value)),
        )?;
        ctx.depth_leave();
        Ok((self.make)(entries))
    }
}

/// Dictionary built from a draining iterator over the decoded entries.
pub(crate) struct DictFromIter<T, K: Send + Sync + 'static, V: Send + Sync + 'static> {
    pub make: fn(Box<dyn Iterator<Item = (K, V)>>) -> T,
    pub iter: PairIterFn<T, K, V>,
    pub len: fn(&T) -> usize,
    pub key_converter: Arc<dyn Converter<K>>,
    pub value_converter: Arc<dyn Converter<V>>,
}

impl<T, K, V> Converter<T> for DictFromIter<T, K, V>
where
    T: Send + Sync + 'static,
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    dict_write_impls!();

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        deny_nil(reader, std::any::type_name::<T>())?;
        ctx.depth_step()?;
        let mut entries = Vec::new();
        read_entries(
            reader,
            &self.key_converter,
            &self.value_converter,
            ctx,
            |entry_key, entry_value| entries.push((entry_key, entry_value)),
        )?;
        ctx.depth_leave();
        Ok((self.make)(Box::new(entries.into_iter())))
    }
}
