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

use crate::config::MultiDimFormat;
use crate::context::SerializationContext;
use crate::convert::{deny_nil, to_u32_len};
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::shape::RefIterFn;
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use futures::future::BoxFuture;
use std::any::{Any, TypeId};
use std::sync::Arc;

pub(crate) fn element_is_byte<E: 'static>() -> bool {
    TypeId::of::<E>() == TypeId::of::<u8>()
}

fn elem_to_byte<E: Any>(element: &E) -> Option<u8> {
    (element as &dyn Any).downcast_ref::<u8>().copied()
}

fn byte_to_elem<E: Any>(byte: u8) -> Option<E> {
    (Box::new(byte) as Box<dyn Any>)
        .downcast::<E>()
        .ok()
        .map(|boxed| *boxed)
}

fn byte_shape_corrupt() -> SerializationError {
    SerializationError::ShapeConstruction(
        "byte sequence shape used with a non-byte element".to_owned(),
    )
}

fn write_elements<T, E>(
    iter: RefIterFn<T, E>,
    len: fn(&T) -> usize,
    byte: bool,
    converter: &Arc<dyn Converter<E>>,
    writer: &mut Writer<'_>,
    value: &T,
    ctx: &mut SerializationContext<'_>,
) -> Result<(), SerializationError>
where
    E: Send + Sync + 'static,
{
    ctx.depth_step()?;
    if byte {
        let mut bytes = Vec::with_capacity(len(value));
        for element in iter(value) {
            bytes.push(elem_to_byte(element).ok_or_else(byte_shape_corrupt)?);
        }
        writer.write_bin(&bytes)?;
    } else {
        writer.write_array_header(to_u32_len("array", len(value))?)?;
        for element in iter(value) {
            converter.write(writer, element, ctx)?;
        }
    }
    ctx.depth_leave();
    Ok(())
}

fn write_elements_async<'a, T, E>(
    iter: RefIterFn<T, E>,
    len: fn(&T) -> usize,
    byte: bool,
    converter: &'a Arc<dyn Converter<E>>,
    writer: &'a mut AsyncWriter<'_>,
    value: &'a T,
    ctx: &'a mut SerializationContext<'_>,
) -> BoxFuture<'a, Result<(), SerializationError>>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    Box::pin(async move {
        ctx.depth_step()?;
        if byte {
            let mut bytes = Vec::with_capacity(len(value));
            for element in iter(value) {
                bytes.push(elem_to_byte(element).ok_or_else(byte_shape_corrupt)?);
            }
            writer.staging().write_bin(&bytes)?;
            if writer.is_time_to_flush(ctx.unflushed_bytes_threshold()) {
                writer.flush().await?;
            }
        } else {
            writer
                .staging()
                .write_array_header(to_u32_len("array", len(value))?)?;
            for element in iter(value) {
                if converter.prefer_async() {
                    converter.write_async(writer, element, ctx).await?;
                } else {
                    let mut staging = writer.staging();
                    converter.write(&mut staging, element, ctx)?;
                }
                if writer.is_time_to_flush(ctx.unflushed_bytes_threshold()) {
                    writer.flush().await?;
                }
            }
        }
        ctx.depth_leave();
        Ok(())
    })
}

fn read_elements<E>(
    reader: &mut Reader<'_>,
    byte: bool,
    converter: &Arc<dyn Converter<E>>,
    ctx: &mut SerializationContext<'_>,
    mut sink: impl FnMut(E),
) -> Result<(), SerializationError>
where
    E: Send + Sync + 'static,
{
    if byte {
        let blob = reader.read_bin()?;
        for &b in blob.as_ref() {
            sink(byte_to_elem(b).ok_or_else(byte_shape_corrupt)?);
        }
    } else {
        let n = reader.read_array_header()?;
        for _ in 0..n {
            sink(converter.read(reader, ctx)?);
        }
    }
    Ok(())
}

async fn read_elements_async<E>(
    reader: &mut AsyncReader<'_>,
    byte: bool,
    converter: &Arc<dyn Converter<E>>,
    ctx: &mut SerializationContext<'_>,
    sink: &mut (impl FnMut(E) + Send),
) -> Result<(), SerializationError>
where
    E: Send + Sync + 'static,
{
    if byte {
        let blob = reader.with_buffer(|r| r.read_bin()).await?;
        for &b in blob.as_ref() {
            sink(byte_to_elem(b).ok_or_else(byte_shape_corrupt)?);
        }
    } else {
        let n = reader.with_buffer(|r| r.read_array_header()).await?;
        for _ in 0..n {
            if converter.prefer_async() {
                sink(converter.read_async(reader, ctx).await?);
            } else {
                let mut structure = reader.next_structure().await?;
                let mut sync_reader = Reader::new(&mut structure);
                sink(converter.read(&mut sync_reader, ctx)?);
            }
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

/// Sequence with no construction strategy: values can be written but
/// reading fails.
pub(crate) struct SeqWriteOnly<T, E: Send + Sync + 'static> {
    pub iter: RefIterFn<T, E>,
    pub len: fn(&T) -> usize,
    pub byte: bool,
    pub converter: Arc<dyn Converter<E>>,
}

impl<T, E> Converter<T> for SeqWriteOnly<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        write_elements(self.iter, self.len, self.byte, &self.converter, writer, value, ctx)
    }

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

    fn prefer_async(&self) -> bool {
        true
    }

    fn write_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        write_elements_async(self.iter, self.len, self.byte, &self.converter, writer, value, ctx)
    }
}

/// Sequence built by default-constructing and pushing elements.
pub(crate) struct SeqMutable<T, E: Send + Sync + 'static> {
    pub new: fn() -> T,
    pub push: fn(&mut T, E),
    pub iter: RefIterFn<T, E>,
    pub len: fn(&T) -> usize,
    pub byte: bool,
    pub converter: Arc<dyn Converter<E>>,
}

impl<T, E> Converter<T> for SeqMutable<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        write_elements(self.iter, self.len, self.byte, &self.converter, writer, value, ctx)
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        deny_nil(reader, std::any::type_name::<T>())?;
        ctx.depth_step()?;
        let mut target = (self.new)();
        read_elements(reader, self.byte, &self.converter, ctx, |element| {
            (self.push)(&mut target, element)
        })?;
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
        write_elements_async(self.iter, self.len, self.byte, &self.converter, writer, value, ctx)
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
            let mut sink = |element| (self.push)(&mut target, element);
            read_elements_async(reader, self.byte, &self.converter, ctx, &mut sink).await?;
            drop(sink);
            ctx.depth_leave();
            Ok(target)
        })
    }
}

/// Sequence built from a complete buffer of elements.
pub(crate) struct SeqFromVec<T, E: Send + Sync + 'static> {
    pub make: fn(Vec<E>) -> T,
    pub iter: RefIterFn<T, E>,
    pub len: fn(&T) -> usize,
    pub byte: bool,
    pub converter: Arc<dyn Converter<E>>,
}

impl<T, E> Converter<T> for SeqFromVec<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        write_elements(self.iter, self.len, self.byte, &self.converter, writer, value, ctx)
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        deny_nil(reader, std::any::type_name::<T>())?;
        ctx.depth_step()?;
        let mut buffer = Vec::new();
        read_elements(reader, self.byte, &self.converter, ctx, |element| {
            buffer.push(element)
        })?;
        ctx.depth_leave();
        Ok((self.make)(buffer))
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
        write_elements_async(self.iter, self.len, self.byte, &self.converter, writer, value, ctx)
    }

    fn read_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<T, SerializationError>> {
        Box::pin(async move {
            deny_nil_async(reader, std::any::type_name::<T>()).await?;
            ctx.depth_step()?;
            let mut buffer = Vec::new();
            let mut sink = |element| buffer.push(element);
            read_elements_async(reader, self.byte, &self.converter, ctx, &mut sink).await?;
            drop(sink);
            ctx.depth_leave();
            Ok((self.make)(buffer))
        })
    }
}

/// Sequence built from a draining iterator over the decoded elements.
pub(crate) struct SeqFromIter<T, E: Send + Sync + 'static> {
    pub make: fn(Box<dyn Iterator<Item = E>>) -> T,
    pub iter: RefIterFn<T, E>,
    pub len: fn(&T) -> usize,
    pub byte: bool,
    pub converter: Arc<dyn Converter<E>>,
}

impl<T, E> Converter<T> for SeqFromIter<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        write_elements(self.iter, self.len, self.byte, &self.converter, writer, value, ctx)
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        deny_nil(reader, std::any::type_name::<T>())?;
        ctx.depth_step()?;
        let mut buffer = Vec::new();
        read_elements(reader, self.byte, &self.converter, ctx, |element| {
            buffer.push(element)
        })?;
        ctx.depth_leave();
        Ok((self.make)(Box::new(buffer.into_iter())))
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
        write_elements_async(self.iter, self.len, self.byte, &self.converter, writer, value, ctx)
    }

    fn read_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<T, SerializationError>> {
        Box::pin(async move {
            deny_nil_async(reader, std::any::type_name::<T>()).await?;
            ctx.depth_step()?;
            let mut buffer = Vec::new();
            let mut sink = |element| buffer.push(element);
            read_elements_async(reader, self.byte, &self.converter, ctx, &mut sink).await?;
            drop(sink);
            ctx.depth_leave();
            Ok((self.make)(Box::new(buffer.into_iter())))
        })
    }
}

/// Multi-dimensional array; writes either nested arrays matching the rank
/// or a single flat array of the dimensions followed by the elements.
pub(crate) struct SeqMultiDim<T, E: Send + Sync + 'static> {
    pub rank: usize,
    pub dims: fn(&T) -> Vec<usize>,
    pub iter: RefIterFn<T, E>,
    pub make: fn(Vec<usize>, Vec<E>) -> Result<T, String>,
    pub format: MultiDimFormat,
    pub converter: Arc<dyn Converter<E>>,
}

impl<T, E> SeqMultiDim<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn write_nested(
        &self,
        writer: &mut Writer<'_>,
        dims: &[usize],
        elements: &[&E],
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let head = dims[0];
        writer.write_array_header(to_u32_len("array", head)?)?;
        if dims.len() == 1 {
            for element in elements {
                self.converter.write(writer, element, ctx)?;
            }
        } else {
            let stride: usize = dims[1..].iter().product();
            for chunk in elements.chunks(stride.max(1)) {
                self.write_nested(writer, &dims[1..], chunk, ctx)?;
            }
        }
        Ok(())
    }

    fn read_nested(
        &self,
        reader: &mut Reader<'_>,
        level: usize,
        dims: &mut Vec<usize>,
        out: &mut Vec<E>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let n = reader.read_array_header()? as usize;
        if dims.len() <= level {
            dims.push(n);
        } else if dims[level] != n {
            return Err(SerializationError::DecodeFormat(
                "ragged multi-dimensional array".to_owned(),
            ));
        }
        if level + 1 == self.rank {
            for _ in 0..n {
                out.push(self.converter.read(reader, ctx)?);
            }
        } else {
            for _ in 0..n {
                self.read_nested(reader, level + 1, dims, out, ctx)?;
            }
        }
        Ok(())
    }
}

impl<T, E> Converter<T> for SeqMultiDim<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        ctx.depth_step()?;
        let dims = (self.dims)(value);
        if self.rank == 0 || dims.len() != self.rank {
            return Err(SerializationError::ShapeConstruction(format!(
                "dimension accessor of '{}' does not match rank {}",
                std::any::type_name::<T>(),
                self.rank
            )));
        }
        let elements: Vec<&E> = (self.iter)(value).collect();
        match self.format {
            MultiDimFormat::Nested => {
                self.write_nested(writer, &dims, &elements, ctx)?;
            }
            MultiDimFormat::Flat => {
                let total = dims.len() + elements.len();
                writer.write_array_header(to_u32_len("array", total)?)?;
                for dim in &dims {
                    writer.write_uint(*dim as u64)?;
                }
                for element in elements {
                    self.converter.write(writer, element, ctx)?;
                }
            }
        }
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
        let (dims, elements) = match self.format {
            MultiDimFormat::Nested => {
                let mut dims = Vec::with_capacity(self.rank);
                let mut elements = Vec::new();
                self.read_nested(reader, 0, &mut dims, &mut elements, ctx)?;
                (dims, elements)
            }
            MultiDimFormat::Flat => {
                let total = reader.read_array_header()? as usize;
                if total < self.rank {
                    return Err(SerializationError::DecodeFormat(
                        "flat multi-dimensional array shorter than its rank".to_owned(),
                    ));
                }
                let mut dims = Vec::with_capacity(self.rank);
                for _ in 0..self.rank {
                    dims.push(reader.read_u64()? as usize);
                }
                let mut elements = Vec::with_capacity(total - self.rank);
                for _ in 0..total - self.rank {
                    elements.push(self.converter.read(reader, ctx)?);
                }
                (dims, elements)
            }
        };
        ctx.depth_leave();
        (self.make)(dims, elements).map_err(SerializationError::DecodeFormat)
    }

    fn prefer_async(&self) -> bool {
        true
    }
}
