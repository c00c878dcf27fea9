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
use crate::convert::deny_nil;
use crate::converter::Converter;
use crate::error::SerializationError;
use formpack_wire::{Reader, Writer};

/// Serializes an enum as its underlying integer.
pub(crate) struct EnumConverter<T> {
    pub to_underlying: fn(&T) -> i64,
    pub from_underlying: fn(i64) -> Option<T>,
}

impl<T> Converter<T> for EnumConverter<T>
where
    T: Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut Writer<'_>,
        value: &T,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), SerializationError> {
        writer.write_int((self.to_underlying)(value))?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut Reader<'_>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<T, SerializationError> {
        deny_nil(reader, std::any::type_name::<T>())?;
        let raw = reader.read_i64()?;
        (self.from_underlying)(raw).ok_or_else(|| {
            SerializationError::DecodeFormat(format!(
                "{} is not a value of '{}'",
                raw,
                std::any::type_name::<T>()
            ))
        })
    }
}
