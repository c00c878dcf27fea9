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

//! Low level MessagePack wire codec.
//!
//! This crate contains the token-by-token reader and writer that the
//! `formpack` converters are built on. The writer emits shortest-form
//! MessagePack tokens into a [`bytes::BytesMut`]; the reader is a cursor over
//! any [`bytes::Buf`] and consumes exactly one token per call. An
//! asynchronous reader and writer wrap a byte transport, refilling and
//! flushing an internal buffer at suspension points.

mod asyncio;
mod error;
mod marker;
mod reader;
mod scan;
pub mod varint;
mod writer;

#[cfg(test)]
mod tests;

pub use asyncio::{AsyncReader, AsyncWriter};
pub use error::WireError;
pub use marker::Marker;
pub use reader::Reader;
pub use scan::{measure_value, Measure};
pub use writer::Writer;

/// Extension type code for big signed integers (sign byte followed by the
/// big endian magnitude).
pub const BIG_INT_EXT: i8 = 0;
/// Extension type code for big unsigned integers (big endian magnitude).
pub const BIG_UINT_EXT: i8 = 1;
/// Extension type code for reference tokens emitted by the reference
/// preservation layer. The body is an unsigned LEB128 sequence number. This
/// code is part of the on-wire contract and must not change between
/// versions.
pub const REFERENCE_EXT: i8 = 2;
/// Extension type code for UUID values (16 raw bytes).
pub const UUID_EXT: i8 = 3;
/// Extension type code for durations (u64 seconds, u32 nanoseconds).
pub const DURATION_EXT: i8 = 4;
/// Extension type code for timestamps (u32 nanoseconds, i64 seconds).
pub const TIMESTAMP_EXT: i8 = -1;
