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

//! Per-serializer converter memoization and cycle resolution.
//!
//! At most one thread synthesizes the converter for a given type. A request
//! for a type the *same* thread is already constructing (a recursive shape)
//! receives a delayed converter bound to a slot the visitor fulfills on
//! completion; requests from other threads block until the entry is ready.
//! The map lock is never held across synthesis.

use crate::context::SerializationContext;
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::serializer::MessagePackSerializer;
use crate::shape::Shaped;
use crate::visit;
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use futures::future::BoxFuture;
use parking_lot::{Condvar, Mutex};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

enum Entry {
    Building {
        slot: Box<dyn Any + Send + Sync>,
        thread: ThreadId,
    },
    Ready(Box<dyn Any + Send + Sync>),
}

enum Found<T: Send + Sync + 'static> {
    Ready(Arc<dyn Converter<T>>),
    Delayed(Arc<OnceLock<Arc<dyn Converter<T>>>>),
    Wait,
    Missing,
    Corrupt,
}

fn corrupt_entry() -> SerializationError {
    SerializationError::ShapeConstruction("registry entry holds an unexpected type".to_owned())
}

#[derive(Default)]
pub(crate) struct Registry {
    entries: Mutex<HashMap<TypeId, Entry>>,
    ready: Condvar,
}

impl Registry {
    pub(crate) fn get_or_build<T: Shaped>(
        &self,
        serializer: &MessagePackSerializer,
    ) -> Result<Arc<dyn Converter<T>>, SerializationError> {
        let key = TypeId::of::<T>();
        let mut guard = self.entries.lock();
        loop {
            let found = match guard.get(&key) {
                Some(Entry::Ready(entry)) => match entry.downcast_ref::<Arc<dyn Converter<T>>>() {
                    Some(converter) => Found::Ready(converter.clone()),
                    None => Found::Corrupt,
                },
                Some(Entry::Building { slot, thread }) => {
                    if *thread == thread::current().id() {
                        match slot.downcast_ref::<Arc<OnceLock<Arc<dyn Converter<T>>>>>() {
                            Some(slot) => Found::Delayed(slot.clone()),
                            None => Found::Corrupt,
                        }
                    } else {
                        Found::Wait
                    }
                }
                None => Found::Missing,
            };
            match found {
                Found::Ready(converter) => return Ok(converter),
                Found::Delayed(slot) => return Ok(Arc::new(DelayedConverter { slot })),
                Found::Wait => {
                    self.ready.wait(&mut guard);
                }
                Found::Missing => break,
                Found::Corrupt => return Err(corrupt_entry()),
            }
        }

        let slot: Arc<OnceLock<Arc<dyn Converter<T>>>> = Arc::new(OnceLock::new());
        guard.insert(
            key,
            Entry::Building {
                slot: Box::new(slot.clone()),
                thread: thread::current().id(),
            },
        );
        drop(guard);

        let outcome = visit::synthesize::<T>(serializer);

        let mut guard = self.entries.lock();
        match outcome {
            Ok(converter) => {
                let _ = slot.set(converter.clone());
                guard.insert(key, Entry::Ready(Box::new(converter.clone())));
                self.ready.notify_all();
                Ok(converter)
            }
            Err(error) => {
                guard.remove(&key);
                self.ready.notify_all();
                Err(error)
            }
        }
    }
}

/// Stands in for a converter that is still under construction on this
/// thread. By the time any top-level operation runs, the slot has been
/// fulfilled; an unfulfilled slot at call time means the shape traversal
/// itself tried to use the converter, which the registry ordering forbids.
struct DelayedConverter<T: Send + Sync + 'static> {
    slot: Arc<OnceLock<Arc<dyn Converter<T>>>>,
}

impl<T: Send + Sync + 'static> DelayedConverter<T> {
    fn resolve(&self) -> Result<&Arc<dyn Converter<T>>, SerializationError> {
        self.slot.get().ok_or_else(|| {
            SerializationError::ShapeConstruction(
                "converter invoked before its construction completed".to_owned(),
            )
        })
    }
}

impl<T: Send + Sync + 'static> Converter<T> for DelayedConverter<T> {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        self.resolve()?.write(writer, value, ctx)
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        self.resolve()?.read(reader, ctx)
    }

    fn prefer_async(&self) -> bool {
        self.slot
            .get()
            .map(|converter| converter.prefer_async())
            .unwrap_or(false)
    }

    fn write_async<'a>(
        &'a self,
        writer: &'a mut AsyncWriter<'_>,
        value: &'a T,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<(), SerializationError>> {
        match self.resolve() {
            Ok(converter) => converter.write_async(writer, value, ctx),
            Err(error) => Box::pin(std::future::ready(Err(error))),
        }
    }

    fn read_async<'a>(
        &'a self,
        reader: &'a mut AsyncReader<'_>,
        ctx: &'a mut SerializationContext<'_>,
    ) -> BoxFuture<'a, Result<T, SerializationError>> {
        match self.resolve() {
            Ok(converter) => converter.read_async(reader, ctx),
            Err(error) => Box::pin(std::future::ready(Err(error))),
        }
    }
}
