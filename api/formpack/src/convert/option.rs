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
use crate::converter::Converter;
use crate::error::SerializationError;
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Writes nil for absent values and delegates to the element converter
/// otherwise.
pub(crate) struct OptionConverter<U: Send + Sync + 'static> {
    inner: Arc<dyn Converter<U>>,
}

impl<U: Send + Sync + 'static> OptionConverter<U> {
    pub(crate) fn new(inner: Arc<dyn Converter<U>>) -> Self {
        OptionConverter { inner }
    }
}

impl<U> Converter<Option<U>> for OptionConverter<U>
where
    U: Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Option<U>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        match value {
            Some(inner_value) => self.inner.write(writer, inner_value, ctx),
            None => {
                writer.write_nil()?;
                Ok(())
            }
        }
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<Option<U>, SerializationError> {
        if reader.try_read_nil()? {
            Ok(None)
        } else {
            self.inner.read(reader, ctx).map(Some)
        }
    }

    fn prefer_async(&self) -> bool {
        self.inner.prefer_async()
    }

    fn write_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a Option<U>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        match value {
            Some(inner_value) => self.inner.write_async(writer, inner_value, ctx),
            None => Box::pin(async move {
                writer.staging().write_nil()?;
                if writer.is_time_to_flush(ctx.unflushed_bytes_threshold()) {
                    writer.flush().await?;
                }
                Ok(())
            }),
        }
    }

    fn read_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<Option<U>, SerializationError>> {
        Box::pin(async move {
            let was_nil = reader.with_buffer(|r| r.try_read_nil()).await?;
            if was_nil {
                Ok(None)
            } else {
                self.inner.read_async(reader, ctx).await.map(Some)
            }
        })
    }
}
