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

//! Polymorphic dispatch over a closed set of known subtypes. The wire form
//! is always a two element array `[alias, payload]`; a nil alias marks the
//! declared type itself and the payload is its ordinary encoding.

use crate::context::SerializationContext;
use crate::convert::access::UnionCaseOps;
use crate::convert::deny_nil;
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::serializer::MessagePackSerializer;
use crate::shape::{KnownSubtype, Shaped};
use formpack_wire::{AsyncReader, AsyncWriter, Reader, Writer};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub(crate) fn wrap<T: Shaped>(
    serializer: &MessagePackSerializer,
    base: Arc<dyn Converter<T>>,
    subtypes: Vec<KnownSubtype<T>>,
) -> Result<Arc<dyn Converter<T>>, SerializationError> {
    let mut cases = Vec::with_capacity(subtypes.len());
    let mut by_alias = HashMap::with_capacity(subtypes.len());
    let mut seen_types = HashSet::new();
    for subtype in subtypes {
        if !seen_types.insert(subtype.case_type) {
            return Err(SerializationError::ShapeConstruction(format!(
                "'{}' is registered as a known subtype of '{}' more than once",
                subtype.case_name,
                std::any::type_name::<T>()
            )));
        }
        if by_alias.insert(subtype.alias, cases.len()).is_some() {
            return Err(SerializationError::ShapeConstruction(format!(
                "duplicate known subtype alias {} on '{}'",
                subtype.alias,
                std::any::type_name::<T>()
            )));
        }
        cases.push((subtype.alias, (subtype.binder)(serializer)?));
    }
    Ok(Arc::new(UnionConverter {
        base,
        cases,
        by_alias,
    }))
}

pub(crate) struct UnionConverter<T: Send + Sync + 'static> {
    base: Arc<dyn Converter<T>>,
    cases: Vec<(u32, Box<dyn UnionCaseOps<T>>)>,
    by_alias: HashMap<u32, usize>,
}

impl<T: Shaped> UnionConverter<T> {
    fn case_for_alias(
        &self,
        alias: u64,
    ) -> Result<&(u32, Box<dyn UnionCaseOps<T>>), SerializationError> {
        u32::try_from(alias)
            .ok()
            .and_then(|alias| self.by_alias.get(&alias))
            .map(|index| &self.cases[*index])
            .ok_or_else(|| {
                SerializationError::DecodeFormat(format!(
                    "unknown subtype alias {} for '{}'",
                    alias,
                    std::any::type_name::<T>()
                ))
            })
    }
}

impl<T: Shaped> Converter<T> for UnionConverter<T> {
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        ctx.depth_step()?;
        writer.write_array_header(2)?;
        match self.cases.iter().find(|(_, case)| case.matches(value)) {
            Some((alias, case)) => {
                writer.write_uint(*alias as u64)?;
                case.write_payload(writer, value, ctx)?;
            }
            None => {
                writer.write_nil()?;
                self.base.write(writer, value, ctx)?;
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
        let n = reader.read_array_header()?;
        if n != 2 {
            return Err(SerializationError::DecodeFormat(format!(
                "subtype envelope for '{}' must be a two element array",
                std::any::type_name::<T>()
            )));
        }
        let value = if reader.try_read_nil()? {
            self.base.read(reader, ctx)?
        } else {
            let alias = reader.read_u64()?;
            let (_, case) = self.case_for_alias(alias)?;
            case.read_payload(reader, ctx)?
        };
        ctx.depth_leave();
        Ok(value)
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
            match self.cases.iter().find(|(_, case)| case.matches(value)) {
                Some((alias, case)) => {
                    {
                        let mut staging = writer.staging();
                        staging.write_array_header(2)?;
                        staging.write_uint(*alias as u64)?;
                    }
                    if case.prefer_async() {
                        case.write_payload_async(writer, value, ctx).await?;
                    } else {
                        let mut staging = writer.staging();
                        case.write_payload(&mut staging, value, ctx)?;
                    }
                }
                None => {
                    {
                        let mut staging = writer.staging();
                        staging.write_array_header(2)?;
                        staging.write_nil()?;
                    }
                    self.base.write_async(writer, value, ctx).await?;
                }
            }
            if writer.is_time_to_flush(ctx.unflushed_bytes_threshold()) {
                writer.flush().await?;
            }
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
            let header = reader
                .with_buffer(|r| {
                    if r.try_read_nil()? {
                        return Ok(None);
                    }
                    let n = r.read_array_header()?;
                    if r.try_read_nil()? {
                        Ok(Some((n, None)))
                    } else {
                        Ok(Some((n, Some(r.read_u64()?))))
                    }
                })
                .await?;
            let (n, alias) = match header {
                Some(parts) => parts,
                None => {
                    return Err(SerializationError::UnexpectedNil(std::any::type_name::<T>()))
                }
            };
            if n != 2 {
                return Err(SerializationError::DecodeFormat(format!(
                    "subtype envelope for '{}' must be a two element array",
                    std::any::type_name::<T>()
                )));
            }
            ctx.depth_step()?;
            let value = match alias {
                None => self.base.read_async(reader, ctx).await?,
                Some(alias) => {
                    let (_, case) = self.case_for_alias(alias)?;
                    if case.prefer_async() {
                        case.read_payload_async(reader, ctx).await?
                    } else {
                        let mut structure = reader.next_structure().await?;
                        let mut sync_reader = Reader::new(&mut structure);
                        case.read_payload(&mut sync_reader, ctx)?
                    }
                }
            };
            ctx.depth_leave();
            Ok(value)
        })
    }
}
