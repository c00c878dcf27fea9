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

//! Shape driven MessagePack serialization.
//!
//! A type describes itself through the [`shape::Shaped`] trait (implemented
//! by an external shape provider, by hand or by generation). Given that
//! structural description, a [`MessagePackSerializer`] synthesizes a
//! reusable [`Converter`] for the type by structural recursion, memoizes it
//! for the lifetime of the instance and resolves recursive types through
//! lazy placeholders. Converters run both synchronously over contiguous
//! buffers and asynchronously over byte transports with flush thresholding
//! and whole-structure read isolation.
//!
//! ```
//! use formpack::shape::{ConstructorShape, ObjectShape, PropertyShape, Shaped, TypeShape};
//! use formpack::MessagePackSerializer;
//!
//! #[derive(Debug, PartialEq, Default)]
//! struct Point {
//!     x: i64,
//!     y: i64,
//! }
//!
//! impl Shaped for Point {
//!     fn shape() -> TypeShape<Point> {
//!         TypeShape::Object(
//!             ObjectShape::new()
//!                 .with_property(PropertyShape::readwrite(
//!                     "x",
//!                     |p: &Point| &p.x,
//!                     |p: &mut Point, x| p.x = x,
//!                 ))
//!                 .with_property(PropertyShape::readwrite(
//!                     "y",
//!                     |p: &Point| &p.y,
//!                     |p: &mut Point, y| p.y = y,
//!                 ))
//!                 .with_constructor(ConstructorShape::parameterless(Point::default)),
//!         )
//!     }
//! }
//!
//! let serializer = MessagePackSerializer::new();
//! let point = Point { x: 3, y: -4 };
//! let bytes = serializer.to_bytes(&point).unwrap();
//! let restored: Point = serializer.from_slice(bytes.as_ref()).unwrap();
//! assert_eq!(restored, point);
//! ```

pub mod config;
pub mod shape;

mod context;
mod convert;
mod converter;
mod error;
mod reftrack;
mod registry;
mod serializer;
mod visit;

#[cfg(test)]
mod tests;

pub use config::{MultiDimFormat, NamingPolicy, SerializerOptions};
pub use context::SerializationContext;
pub use converter::Converter;
pub use error::SerializationError;
pub use reftrack::RefTracker;
pub use serializer::MessagePackSerializer;

pub use formpack_wire as wire;
