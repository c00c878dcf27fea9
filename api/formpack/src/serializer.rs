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

use crate::config::SerializerOptions;
use crate::context::SerializationContext;
use crate::convert::primitives;
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::registry::Registry;
use crate::shape::Shaped;
use bytes::{Buf, Bytes, BytesMut};
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A configured serializer instance. Converters are synthesized lazily on
/// the first use of each type and cached for the lifetime of the instance.
pub struct MessagePackSerializer {
    options: SerializerOptions,
    registry: Registry,
    user_converters: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Default for MessagePackSerializer {
    fn default() -> Self {
        MessagePackSerializer::new()
    }
}

impl MessagePackSerializer {
    pub fn new() -> Self {
        MessagePackSerializer::with_options(SerializerOptions::default())
    }

    pub fn with_options(options: SerializerOptions) -> Self {
        MessagePackSerializer {
            options,
            registry: Registry::default(),
            user_converters: HashMap::new(),
        }
    }

    /// Register a user-supplied converter for `T`, overriding synthesis.
    pub fn with_converter<T: Shaped>(mut self, converter: Arc<dyn Converter<T>>) -> Self {
        self.user_converters
            .insert(TypeId::of::<T>(), Box::new(converter));
        self
    }

    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// The converter for `T`: a user registration if present, else the
    /// built-in table, else synthesis from the type shape (memoized).
    pub fn converter_for<T: Shaped>(&self) -> Result<Arc<dyn Converter<T>>, SerializationError> {
        if let Some(entry) = self.user_converters.get(&TypeId::of::<T>()) {
            return entry
                .downcast_ref::<Arc<dyn Converter<T>>>()
                .cloned()
                .ok_or_else(|| {
                    SerializationError::ShapeConstruction(
                        "registered converter holds an unexpected type".to_owned(),
                    )
                });
        }
        if let Some(converter) = primitives::builtin::<T>() {
            return Ok(converter);
        }
        self.registry.get_or_build::<T>(self)
    }

    /// Encode `value` as one MessagePack structure appended to `out`.
    pub fn encode<T: Shaped>(
        &self,
        value: &T,
        out: &mut BytesMut,
    ) -> Result<(), SerializationError> {
        trace!(ty = std::any::type_name::<T>(), "Encoding value");
        let converter = self.converter_for::<T>()?;
        let mut ctx = SerializationContext::new(self);
        let mut writer = Writer::new(out);
        converter.write(&mut writer, value, &mut ctx)
    }

    pub fn to_bytes<T: Shaped>(&self, value: &T) -> Result<Bytes, SerializationError> {
        let mut buffer = BytesMut::new();
        self.encode(value, &mut buffer)?;
        Ok(buffer.freeze())
    }

    /// Decode one MessagePack structure from the cursor.
    pub fn decode<T: Shaped>(&self, input: &mut dyn Buf) -> Result<T, SerializationError> {
        trace!(ty = std::any::type_name::<T>(), "Decoding value");
        let converter = self.converter_for::<T>()?;
        let mut ctx = SerializationContext::new(self);
        let mut reader = Reader::new(input);
        converter.read(&mut reader, &mut ctx)
    }

    pub fn from_slice<T: Shaped>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        let mut input = bytes;
        self.decode(&mut input)
    }

    /// Encode `value` to an asynchronous transport, flushing staged bytes
    /// whenever they exceed the configured threshold.
    pub async fn encode_async<T: Shaped>(
        &self,
        value: &T,
        transport: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: CancellationToken,
    ) -> Result<(), SerializationError> {
        trace!(ty = std::any::type_name::<T>(), "Encoding value (async)");
        let converter = self.converter_for::<T>()?;
        let mut ctx = SerializationContext::new(self);
        let mut writer = AsyncWriter::new(transport, cancel);
        converter.write_async(&mut writer, value, &mut ctx).await?;
        writer.finish().await?;
        Ok(())
    }

    /// Decode one structure from an asynchronous transport, suspending
    /// whenever more input is required.
    pub async fn decode_async<T: Shaped>(
        &self,
        transport: &mut (dyn AsyncRead + Send + Unpin),
        cancel: CancellationToken,
    ) -> Result<T, SerializationError> {
        trace!(ty = std::any::type_name::<T>(), "Decoding value (async)");
        let converter = self.converter_for::<T>()?;
        let mut ctx = SerializationContext::new(self);
        let mut reader = AsyncReader::new(transport, cancel);
        converter.read_async(&mut reader, &mut ctx).await
    }
}
