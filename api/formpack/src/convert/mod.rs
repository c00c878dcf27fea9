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

//! Converter implementations: the built-in primitive table and the
//! aggregate converters composed by the synthesis visitor.

pub(crate) mod access;
pub(crate) mod enums;
pub(crate) mod keyed;
pub(crate) mod map;
pub(crate) mod object;
pub(crate) mod option;
pub(crate) mod primitives;
pub(crate) mod seq;
pub(crate) mod shared;
pub(crate) mod union;

use crate::error::SerializationError;
use formpack_wire::{Reader, WireError};

/// Fail with [`SerializationError::UnexpectedNil`] if the next token is
/// nil.
pub(crate) fn deny_nil(
    reader: &mut Reader<'_>,
    type_name: &'static str,
) -> Result<(), SerializationError> {
    if reader.try_read_nil()? {
        Err(SerializationError::UnexpectedNil(type_name))
    } else {
        Ok(())
    }
}

/// Narrow a collection length to the `u32` the wire headers carry.
pub(crate) fn to_u32_len(what: &'static str, len: usize) -> Result<u32, SerializationError> {
    u32::try_from(len).map_err(|_| SerializationError::from(WireError::TooLarge { what, len }))
}
