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

use crate::{Marker, WireError};

/// Result of scanning a buffer for one complete structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// The buffer starts with a complete structure occupying this many
    /// bytes.
    Complete(usize),
    /// More input is required before the first structure is complete.
    Incomplete,
}

struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn u8(&mut self) -> Option<u8> {
        let byte = *self.input.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn u16(&mut self) -> Option<u16> {
        let bytes = self.input.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        let bytes = self.input.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn skip(&mut self, len: usize) -> Option<()> {
        if self.input.len() - self.pos < len {
            None
        } else {
            self.pos += len;
            Some(())
        }
    }
}

/// Scan one complete top-level structure at the start of `input` without
/// decoding it, reporting the number of bytes it occupies. Used by the
/// asynchronous reader to isolate a nested structure into a contiguous
/// buffer before decoding it synchronously.
pub fn measure_value(input: &[u8]) -> Result<Measure, WireError> {
    let mut scanner = Scanner { input, pos: 0 };
    let mut pending: u64 = 1;
    while pending > 0 {
        pending -= 1;
        let head = match scanner.u8() {
            Some(byte) => byte,
            None => return Ok(Measure::Incomplete),
        };
        let advanced = match Marker::from_u8(head) {
            Marker::Nil | Marker::False | Marker::True | Marker::FixPos(_) | Marker::FixNeg(_) => {
                Some(())
            }
            Marker::I8 | Marker::U8 => scanner.skip(1),
            Marker::I16 | Marker::U16 => scanner.skip(2),
            Marker::I32 | Marker::U32 | Marker::F32 => scanner.skip(4),
            Marker::I64 | Marker::U64 | Marker::F64 => scanner.skip(8),
            Marker::FixStr(n) => scanner.skip(n as usize),
            Marker::Str8 | Marker::Bin8 => scanner
                .u8()
                .and_then(|len| scanner.skip(len as usize)),
            Marker::Str16 | Marker::Bin16 => scanner
                .u16()
                .and_then(|len| scanner.skip(len as usize)),
            Marker::Str32 | Marker::Bin32 => scanner
                .u32()
                .and_then(|len| scanner.skip(len as usize)),
            Marker::FixExt1 => scanner.skip(2),
            Marker::FixExt2 => scanner.skip(3),
            Marker::FixExt4 => scanner.skip(5),
            Marker::FixExt8 => scanner.skip(9),
            Marker::FixExt16 => scanner.skip(17),
            Marker::Ext8 => scanner
                .u8()
                .and_then(|len| scanner.skip(len as usize + 1)),
            Marker::Ext16 => scanner
                .u16()
                .and_then(|len| scanner.skip(len as usize + 1)),
            Marker::Ext32 => scanner
                .u32()
                .and_then(|len| scanner.skip(len as usize + 1)),
            Marker::FixArray(n) => {
                pending += n as u64;
                Some(())
            }
            Marker::Array16 => match scanner.u16() {
                Some(n) => {
                    pending += n as u64;
                    Some(())
                }
                None => None,
            },
            Marker::Array32 => match scanner.u32() {
                Some(n) => {
                    pending += n as u64;
                    Some(())
                }
                None => None,
            },
            Marker::FixMap(n) => {
                pending += 2 * n as u64;
                Some(())
            }
            Marker::Map16 => match scanner.u16() {
                Some(n) => {
                    pending += 2 * n as u64;
                    Some(())
                }
                None => None,
            },
            Marker::Map32 => match scanner.u32() {
                Some(n) => {
                    pending += 2 * n as u64;
                    Some(())
                }
                None => None,
            },
            Marker::Reserved => return Err(WireError::Reserved),
        };
        if advanced.is_none() {
            return Ok(Measure::Incomplete);
        }
    }
    Ok(Measure::Complete(scanner.pos))
}
