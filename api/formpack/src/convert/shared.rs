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

//! Reference preservation at shared handle boundaries.
//!
//! When a context carries a reference tracker, writing a handle that was
//! already seen emits a reference extension token holding the previously
//! assigned sequence number; the first occurrence is assigned its number
//! *before* the ordinary encoding is emitted, so a value reachable from
//! itself terminates. Reading mirrors this: a reference token resolves in
//! the tracker, anything else is decoded and recorded. With no tracker in
//! the context every path is a straight delegate.

use crate::context::SerializationContext;
use crate::converter::Converter;
use crate::error::SerializationError;
use formpack_wire::{varint, Reader, Writer, REFERENCE_EXT};
use parking_lot::Mutex;
use std::sync::Arc;

fn unknown_reference(seq: u64) -> SerializationError {
    SerializationError::NotSupported(format!("reference to unknown sequence number {}", seq))
}

fn read_ref_seq(reader: &mut Reader<'_>) -> Result<Option<u64>, SerializationError> {
    match reader.try_read_ext(REFERENCE_EXT)? {
        Some(body) => Ok(Some(varint::decode(body.as_ref())?)),
        None => Ok(None),
    }
}

fn resolve_handle<H: Clone + 'static>(
    ctx: &mut SerializationContext<'_>,
    seq: u64,
) -> Result<H, SerializationError> {
    ctx.ref_tracker()
        .and_then(|tracker| tracker.resolve(seq))
        .and_then(|object| object.downcast_ref::<H>())
        .cloned()
        .ok_or_else(|| unknown_reference(seq))
}

/// Returns the sequence number to reference if this identity was already
/// written, assigning a fresh number otherwise.
fn written_before(ctx: &mut SerializationContext<'_>, identity: usize) -> Option<u64> {
    let tracker = ctx.ref_tracker()?;
    match tracker.existing(identity) {
        Some(seq) => Some(seq),
        None => {
            tracker.assign(identity);
            None
        }
    }
}

/// Converter for plain shared handles. Identical handles are deduped; the
/// decoded value is recorded after the inner decode completes, so this
/// flavor does not resolve cycles through itself.
pub(crate) struct SharedConverter<I: Send + Sync + 'static> {
    inner: Arc<dyn Converter<I>>,
}

impl<I: Send + Sync + 'static> SharedConverter<I> {
    pub(crate) fn new(inner: Arc<dyn Converter<I>>) -> Self {
        SharedConverter { inner }
    }
}

impl<I> Converter<Arc<I>> for SharedConverter<I>
where
    I: Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Arc<I>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let identity = Arc::as_ptr(value) as usize;
        if ctx.ref_tracker().is_some() {
            if let Some(seq) = written_before(ctx, identity) {
                writer.write_ref_ext(REFERENCE_EXT, seq)?;
                return Ok(());
            }
        }
        self.inner.write(writer, value.as_ref(), ctx)
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<Arc<I>, SerializationError> {
        if ctx.ref_tracker().is_none() {
            return self.inner.read(reader, ctx).map(Arc::new);
        }
        if let Some(seq) = read_ref_seq(reader)? {
            return resolve_handle::<Arc<I>>(ctx, seq);
        }
        let seq = match ctx.ref_tracker() {
            Some(tracker) => tracker.reserve(),
            None => return Err(unknown_reference(0)),
        };
        let handle = Arc::new(self.inner.read(reader, ctx)?);
        if let Some(tracker) = ctx.ref_tracker() {
            tracker.fulfill(seq, Box::new(handle.clone()));
        }
        Ok(handle)
    }

    fn prefer_async(&self) -> bool {
        self.inner.prefer_async()
    }
}

/// Converter for shared mutable cells. A default-constructed placeholder is
/// recorded *before* the inner decode runs, so cyclic graphs (including
/// self-loops) resolve to aliased handles.
pub(crate) struct SharedCellConverter<I: Send + Sync + 'static> {
    inner: Arc<dyn Converter<I>>,
}

impl<I: Send + Sync + 'static> SharedCellConverter<I> {
    pub(crate) fn new(inner: Arc<dyn Converter<I>>) -> Self {
        SharedCellConverter { inner }
    }
}

impl<I> Converter<Arc<Mutex<I>>> for SharedCellConverter<I>
where
    I: Default + Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Arc<Mutex<I>>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let identity = Arc::as_ptr(value) as usize;
        if ctx.ref_tracker().is_some() {
            if let Some(seq) = written_before(ctx, identity) {
                writer.write_ref_ext(REFERENCE_EXT, seq)?;
                return Ok(());
            }
        }
        let guard = value.lock();
        self.inner.write(writer, &guard, ctx)
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<Arc<Mutex<I>>, SerializationError> {
        if ctx.ref_tracker().is_none() {
            return self
                .inner
                .read(reader, ctx)
                .map(|inner_value| Arc::new(Mutex::new(inner_value)));
        }
        if let Some(seq) = read_ref_seq(reader)? {
            return resolve_handle::<Arc<Mutex<I>>>(ctx, seq);
        }
        let handle = Arc::new(Mutex::new(I::default()));
        if let Some(tracker) = ctx.ref_tracker() {
            let seq = tracker.reserve();
            tracker.fulfill(seq, Box::new(handle.clone()));
        }
        let inner_value = self.inner.read(reader, ctx)?;
        *handle.lock() = inner_value;
        Ok(handle)
    }

    fn prefer_async(&self) -> bool {
        self.inner.prefer_async()
    }
}

/// Converter for shared strings; the string body is written literally once
/// and referenced afterwards.
pub(crate) struct SharedStrConverter;

impl Converter<Arc<str>> for SharedStrConverter {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &Arc<str>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        let identity = Arc::as_ptr(value) as *const u8 as usize;
        if ctx.ref_tracker().is_some() {
            if let Some(seq) = written_before(ctx, identity) {
                writer.write_ref_ext(REFERENCE_EXT, seq)?;
                return Ok(());
            }
        }
        writer.write_str(value)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<Arc<str>, SerializationError> {
        if ctx.ref_tracker().is_none() {
            return Ok(Arc::from(reader.read_string()?.as_str()));
        }
        if let Some(seq) = read_ref_seq(reader)? {
            return resolve_handle::<Arc<str>>(ctx, seq);
        }
        let handle: Arc<str> = Arc::from(reader.read_string()?.as_str());
        if let Some(tracker) = ctx.ref_tracker() {
            let seq = tracker.reserve();
            tracker.fulfill(seq, Box::new(handle.clone()));
        }
        Ok(handle)
    }
}
