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
use crate::error::SerializationError;
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use futures::future::BoxFuture;

/// A pair of routines that encode values of `T` into MessagePack and decode
/// them back. Converters are immutable once published to the registry and
/// are composed by reference; they hold no per-operation state and are safe
/// to invoke concurrently on disjoint readers, writers and contexts.
///
/// The asynchronous methods have default implementations that stage the
/// synchronous encoding into the writer's buffer, or isolate one complete
/// structure from the reader and decode it synchronously. Aggregate
/// converters override them to interleave element work with flushes and to
/// recurse into element converters that prefer the asynchronous path.
pub trait Converter<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError>;

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError>;

    /// Whether this converter wants to drive the asynchronous reader
    /// directly instead of having a whole structure isolated for it.
    fn prefer_async(&self) -> bool {
        false
    }

    fn write_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        Box::pin(async move {
            {
                let mut staging = writer.staging();
                self.write(&mut staging, value, ctx)?;
            }
            if writer.is_time_to_flush(ctx.unflushed_bytes_threshold()) {
                writer.flush().await?;
            }
            Ok(())
        })
    }

    fn read_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<T, SerializationError>> {
        Box::pin(async move {
            let mut structure = reader.next_structure().await?;
            let mut sync_reader = Reader::new(&mut structure);
            self.read(&mut sync_reader, ctx)
        })
    }
}
