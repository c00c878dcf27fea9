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

//! The converter synthesis visitor: structural recursion over a type
//! shape, composing a converter from the converters of the constituent
//! types. Recursion into field types goes back through
//! [`MessagePackSerializer::converter_for`], so memoization and cycle
//! resolution apply at every step.

use crate::convert::enums::EnumConverter;
use crate::convert::{object, primitives};
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::serializer::MessagePackSerializer;
use crate::shape::{Shaped, TypeShape};
use std::sync::Arc;
use tracing::debug;

pub(crate) fn synthesize<T: Shaped>(
    serializer: &MessagePackSerializer,
) -> Result<Arc<dyn Converter<T>>, SerializationError> {
    let type_name = std::any::type_name::<T>();
    debug!(ty = type_name, "Synthesizing converter");
    match T::shape() {
        TypeShape::Primitive => primitives::builtin::<T>().ok_or_else(|| {
            SerializationError::ShapeConstruction(format!(
                "'{}' declares a primitive shape but has no built-in converter",
                type_name
            ))
        }),
        TypeShape::Object(shape) => object::build(serializer, shape),
        TypeShape::Sequence(shape) => (shape.build)(serializer),
        TypeShape::Dictionary(shape) => (shape.build)(serializer),
        TypeShape::Enum(shape) => Ok(Arc::new(EnumConverter {
            to_underlying: shape.to_underlying,
            from_underlying: shape.from_underlying,
        })),
        TypeShape::Optional(shape) => (shape.build)(serializer),
        TypeShape::Shared(shape) => (shape.build)(serializer),
    }
}
