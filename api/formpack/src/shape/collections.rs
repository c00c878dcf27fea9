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

use crate::convert::map::{DictFromIter, DictFromVec, DictMutable, DictWriteOnly};
use crate::convert::seq::{
    element_is_byte, SeqFromIter, SeqFromVec, SeqMultiDim, SeqMutable, SeqWriteOnly,
};
use crate::shape::{BuildFn, Shaped};
use std::sync::Arc;

/// How a collection can be built on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionStrategy {
    /// The collection cannot be constructed; decoding fails.
    None,
    /// Default-construct and insert elements one by one.
    Mutable,
    /// Collect elements into a buffer and hand it over whole.
    Span,
    /// Hand the elements over as an iterator.
    Enumerable,
}

/// Borrowing iterator handle over a sequence's elements.
pub type RefIterFn<T, E> = for<'a> fn(&'a T) -> Box<dyn Iterator<Item = &'a E> + Send + 'a>;

/// Borrowing iterator handle over a dictionary's entries.
pub type PairIterFn<T, K, V> =
    for<'a> fn(&'a T) -> Box<dyn Iterator<Item = (&'a K, &'a V)> + Send + 'a>;

/// Shape of a homogeneous sequence. Carries the construction strategy and a
/// binder that resolves the element converter. Sequences of bytes use the
/// MessagePack `bin` format instead of an array.
pub struct SequenceShape<T: Send + Sync + 'static> {
    pub(crate) strategy: ConstructionStrategy,
    pub(crate) build: BuildFn<T>,
}

impl<T: Send + Sync + 'static> SequenceShape<T> {
    pub fn write_only<E: Shaped>(iter: RefIterFn<T, E>, len: fn(&T) -> usize) -> Self {
        SequenceShape {
            strategy: ConstructionStrategy::None,
            build: Box::new(move |serializer| {
                Ok(Arc::new(SeqWriteOnly {
                    iter,
                    len,
                    byte: element_is_byte::<E>(),
                    converter: serializer.converter_for::<E>()?,
                }) as _)
            }),
        }
    }

    pub fn mutable<E: Shaped>(
        new: fn() -> T,
        push: fn(&mut T, E),
        iter: RefIterFn<T, E>,
        len: fn(&T) -> usize,
    ) -> Self {
        SequenceShape {
            strategy: ConstructionStrategy::Mutable,
            build: Box::new(move |serializer| {
                Ok(Arc::new(SeqMutable {
                    new,
                    push,
                    iter,
                    len,
                    byte: element_is_byte::<E>(),
                    converter: serializer.converter_for::<E>()?,
                }) as _)
            }),
        }
    }

    pub fn span<E: Shaped>(
        make: fn(Vec<E>) -> T,
        iter: RefIterFn<T, E>,
        len: fn(&T) -> usize,
    ) -> Self {
        SequenceShape {
            strategy: ConstructionStrategy::Span,
            build: Box::new(move |serializer| {
                Ok(Arc::new(SeqFromVec {
                    make,
                    iter,
                    len,
                    byte: element_is_byte::<E>(),
                    converter: serializer.converter_for::<E>()?,
                }) as _)
            }),
        }
    }

    pub fn enumerable<E: Shaped>(
        make: fn(Box<dyn Iterator<Item = E>>) -> T,
        iter: RefIterFn<T, E>,
        len: fn(&T) -> usize,
    ) -> Self {
        SequenceShape {
            strategy: ConstructionStrategy::Enumerable,
            build: Box::new(move |serializer| {
                Ok(Arc::new(SeqFromIter {
                    make,
                    iter,
                    len,
                    byte: element_is_byte::<E>(),
                    converter: serializer.converter_for::<E>()?,
                }) as _)
            }),
        }
    }

    /// A multi-dimensional array flattened behind a dimension accessor. The
    /// wire layout (nested or flat) follows the serializer configuration.
    pub fn multi_dim<E: Shaped>(
        rank: usize,
        dims: fn(&T) -> Vec<usize>,
        iter: RefIterFn<T, E>,
        make: fn(Vec<usize>, Vec<E>) -> Result<T, String>,
    ) -> Self {
        SequenceShape {
            strategy: ConstructionStrategy::Span,
            build: Box::new(move |serializer| {
                Ok(Arc::new(SeqMultiDim {
                    rank,
                    dims,
                    iter,
                    make,
                    format: serializer.options().multi_dim_format,
                    converter: serializer.converter_for::<E>()?,
                }) as _)
            }),
        }
    }

    pub fn strategy(&self) -> ConstructionStrategy {
        self.strategy
    }
}

/// Shape of a key-value collection. Strategies mirror those of sequences
/// with entries in place of elements.
pub struct DictionaryShape<T: Send + Sync + 'static> {
    pub(crate) strategy: ConstructionStrategy,
    pub(crate) build: BuildFn<T>,
}

impl<T: Send + Sync + 'static> DictionaryShape<T> {
    pub fn write_only<K: Shaped, V: Shaped>(
        iter: PairIterFn<T, K, V>,
        len: fn(&T) -> usize,
    ) -> Self {
        DictionaryShape {
            strategy: ConstructionStrategy::None,
            build: Box::new(move |serializer| {
                Ok(Arc::new(DictWriteOnly {
                    iter,
                    len,
                    key_converter: serializer.converter_for::<K>()?,
                    value_converter: serializer.converter_for::<V>()?,
                }) as _)
            }),
        }
    }

    pub fn mutable<K: Shaped, V: Shaped>(
        new: fn() -> T,
        insert: fn(&mut T, K, V),
        iter: PairIterFn<T, K, V>,
        len: fn(&T) -> usize,
    ) -> Self {
        DictionaryShape {
            strategy: ConstructionStrategy::Mutable,
            build: Box::new(move |serializer| {
                Ok(Arc::new(DictMutable {
                    new,
                    insert,
                    iter,
                    len,
                    key_converter: serializer.converter_for::<K>()?,
                    value_converter: serializer.converter_for::<V>()?,
                }) as _)
            }),
        }
    }

    pub fn span<K: Shaped, V: Shaped>(
        make: fn(Vec<(K, V)>) -> T,
        iter: PairIterFn<T, K, V>,
        len: fn(&T) -> usize,
    ) -> Self {
        DictionaryShape {
            strategy: ConstructionStrategy::Span,
            build: Box::new(move |serializer| {
                Ok(Arc::new(DictFromVec {
                    make,
                    iter,
                    len,
                    key_converter: serializer.converter_for::<K>()?,
                    value_converter: serializer.converter_for::<V>()?,
                }) as _)
            }),
        }
    }

    pub fn enumerable<K: Shaped, V: Shaped>(
        make: fn(Box<dyn Iterator<Item = (K, V)>>) -> T,
        iter: PairIterFn<T, K, V>,
        len: fn(&T) -> usize,
    ) -> Self {
        DictionaryShape {
            strategy: ConstructionStrategy::Enumerable,
            build: Box::new(move |serializer| {
                Ok(Arc::new(DictFromIter {
                    make,
                    iter,
                    len,
                    key_converter: serializer.converter_for::<K>()?,
                    value_converter: serializer.converter_for::<V>()?,
                }) as _)
            }),
        }
    }

    pub fn strategy(&self) -> ConstructionStrategy {
        self.strategy
    }
}
