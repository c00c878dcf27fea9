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

//! The shape provider contract.
//!
//! A shape is a structural description of a user type: its properties and
//! constructor for object kinds, its element shape and construction
//! strategy for collections, its underlying integer for enums. Shapes are
//! supplied by an external provider (hand-written or generated); the engine
//! walks them once per (serializer, type) pair to synthesize a converter.
//!
//! Field and element types are erased inside a shape. Each constructor is
//! generic over the field type and captures it in a *binder*: a closure
//! that, handed the owning serializer, resolves the field type's converter
//! (recursing into the registry) and returns erased accessors.

mod collections;
mod object;

pub use collections::{ConstructionStrategy, DictionaryShape, PairIterFn, RefIterFn, SequenceShape};
pub use object::{
    ArgumentBag, ConstructorShape, KnownSubtype, ObjectShape, ParameterShape, PropertyShape,
};

use crate::convert::option::OptionConverter;
use crate::convert::shared::{SharedCellConverter, SharedConverter};
use crate::converter::Converter;
use crate::error::SerializationError;
use crate::serializer::MessagePackSerializer;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

/// A type that can describe itself to the converter synthesis visitor.
pub trait Shaped: Sized + Send + Sync + 'static {
    fn shape() -> TypeShape<Self>;
}

pub(crate) type BuildFn<T> = Box<
    dyn Fn(&MessagePackSerializer) -> Result<Arc<dyn Converter<T>>, SerializationError>
        + Send
        + Sync,
>;

/// Structural description of a type, dispatched over by the synthesis
/// visitor.
pub enum TypeShape<T: Send + Sync + 'static> {
    /// Resolved by type identity against the built-in converter table.
    Primitive,
    /// An aggregate with named (or integer-keyed) properties and an
    /// optional constructor.
    Object(ObjectShape<T>),
    /// A homogeneous sequence of elements.
    Sequence(SequenceShape<T>),
    /// A key-value collection.
    Dictionary(DictionaryShape<T>),
    /// A closed set of named values carried as an integer.
    Enum(EnumShape<T>),
    /// A value that may be absent, encoded as nil.
    Optional(OptionalShape<T>),
    /// A shared handle; the attachment point of reference preservation.
    Shared(SharedShape<T>),
}

/// Shape of an enum: conversion functions to and from the underlying
/// integer representation.
pub struct EnumShape<T> {
    pub(crate) to_underlying: fn(&T) -> i64,
    pub(crate) from_underlying: fn(i64) -> Option<T>,
}

impl<T> EnumShape<T> {
    pub fn new(to_underlying: fn(&T) -> i64, from_underlying: fn(i64) -> Option<T>) -> Self {
        EnumShape {
            to_underlying,
            from_underlying,
        }
    }
}

/// Shape of an option-like value wrapping an element shape.
pub struct OptionalShape<T: Send + Sync + 'static> {
    pub(crate) build: BuildFn<T>,
}

impl<U: Shaped> OptionalShape<Option<U>> {
    pub fn new() -> Self {
        OptionalShape {
            build: Box::new(|serializer| {
                Ok(Arc::new(OptionConverter::new(serializer.converter_for::<U>()?)) as _)
            }),
        }
    }
}

impl<U: Shaped> Default for OptionalShape<Option<U>> {
    fn default() -> Self {
        OptionalShape::new()
    }
}

/// Shape of a shared handle. The plain flavor dedupes identical handles;
/// the cell flavor additionally supports cyclic graphs by recording a
/// placeholder before descending.
pub struct SharedShape<T: Send + Sync + 'static> {
    pub(crate) build: BuildFn<T>,
}

impl<I: Shaped> SharedShape<Arc<I>> {
    pub fn plain() -> Self {
        SharedShape {
            build: Box::new(|serializer| {
                Ok(Arc::new(SharedConverter::new(serializer.converter_for::<I>()?)) as _)
            }),
        }
    }
}

impl<I: Shaped + Default> SharedShape<Arc<Mutex<I>>> {
    pub fn cell() -> Self {
        SharedShape {
            build: Box::new(|serializer| {
                Ok(Arc::new(SharedCellConverter::new(serializer.converter_for::<I>()?)) as _)
            }),
        }
    }
}

impl<U: Shaped> Shaped for Option<U> {
    fn shape() -> TypeShape<Option<U>> {
        TypeShape::Optional(OptionalShape::new())
    }
}

fn vec_iter<E: Sync>(v: &Vec<E>) -> Box<dyn Iterator<Item = &E> + Send + '_> {
    Box::new(v.iter())
}

impl<E: Shaped> Shaped for Vec<E> {
    fn shape() -> TypeShape<Vec<E>> {
        TypeShape::Sequence(SequenceShape::mutable(
            Vec::new,
            Vec::push,
            vec_iter,
            Vec::len,
        ))
    }
}

fn hash_map_insert<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, value: V) {
    map.insert(key, value);
}

fn hash_map_iter<K: Sync, V: Sync>(
    map: &HashMap<K, V>,
) -> Box<dyn Iterator<Item = (&K, &V)> + Send + '_> {
    Box::new(map.iter())
}

impl<K, V> Shaped for HashMap<K, V>
where
    K: Shaped + Eq + Hash,
    V: Shaped,
{
    fn shape() -> TypeShape<HashMap<K, V>> {
        TypeShape::Dictionary(DictionaryShape::mutable(
            HashMap::new,
            hash_map_insert,
            hash_map_iter,
            HashMap::len,
        ))
    }
}

fn btree_map_insert<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, value: V) {
    map.insert(key, value);
}

fn btree_map_iter<K: Sync, V: Sync>(
    map: &BTreeMap<K, V>,
) -> Box<dyn Iterator<Item = (&K, &V)> + Send + '_> {
    Box::new(map.iter())
}

impl<K, V> Shaped for BTreeMap<K, V>
where
    K: Shaped + Ord,
    V: Shaped,
{
    fn shape() -> TypeShape<BTreeMap<K, V>> {
        TypeShape::Dictionary(DictionaryShape::mutable(
            BTreeMap::new,
            btree_map_insert,
            btree_map_iter,
            BTreeMap::len,
        ))
    }
}
