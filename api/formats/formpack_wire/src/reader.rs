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
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::convert::TryFrom;

/// A small queue of bytes that probing reads have consumed from the input
/// and handed back. Drained before the underlying buffer. Never holds more
/// than the prefix of a single extension token.
#[derive(Default)]
struct PushBack {
    bytes: [u8; 8],
    len: u8,
    pos: u8,
}

impl PushBack {
    fn is_empty(&self) -> bool {
        self.pos == self.len
    }

    fn remaining(&self) -> usize {
        (self.len - self.pos) as usize
    }

    fn pop(&mut self) -> Option<u8> {
        if self.pos < self.len {
            let byte = self.bytes[self.pos as usize];
            self.pos += 1;
            if self.pos == self.len {
                self.pos = 0;
                self.len = 0;
            }
            Some(byte)
        } else {
            None
        }
    }

    fn unread(&mut self, prefix: &[u8]) {
        let tail_start = self.pos as usize;
        let tail_end = self.len as usize;
        let tail_len = tail_end - tail_start;
        debug_assert!(prefix.len() + tail_len <= self.bytes.len());
        self.bytes.copy_within(tail_start..tail_end, prefix.len());
        self.bytes[..prefix.len()].copy_from_slice(prefix);
        self.pos = 0;
        self.len = (prefix.len() + tail_len) as u8;
    }
}

/// Reads MessagePack tokens from a cursor over a (possibly non-contiguous)
/// byte sequence. Every `read_*` call consumes exactly one token; probing
/// (`try_*`) calls consume nothing on a miss. Exhausted input surfaces as
/// [`WireError::Incomplete`].
pub struct Reader<'a> {
    input: &'a mut dyn Buf,
    pushback: PushBack,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a mut dyn Buf) -> Self {
        Reader {
            input,
            pushback: PushBack::default(),
        }
    }

    pub(crate) fn pushback_len(&self) -> usize {
        self.pushback.remaining()
    }

    fn take_u8(&mut self) -> Result<u8, WireError> {
        if let Some(byte) = self.pushback.pop() {
            Ok(byte)
        } else if self.input.has_remaining() {
            Ok(self.input.get_u8())
        } else {
            Err(WireError::Incomplete)
        }
    }

    fn take_exact(&mut self, dst: &mut [u8]) -> Result<(), WireError> {
        let mut filled = 0;
        while filled < dst.len() {
            match self.pushback.pop() {
                Some(byte) => {
                    dst[filled] = byte;
                    filled += 1;
                }
                None => break,
            }
        }
        let rest = dst.len() - filled;
        if self.input.remaining() < rest {
            return Err(WireError::Incomplete);
        }
        self.input.copy_to_slice(&mut dst[filled..]);
        Ok(())
    }

    fn take_u16(&mut self) -> Result<u16, WireError> {
        let mut buf = [0u8; 2];
        self.take_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn take_u32(&mut self) -> Result<u32, WireError> {
        let mut buf = [0u8; 4];
        self.take_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn take_u64(&mut self) -> Result<u64, WireError> {
        let mut buf = [0u8; 8];
        self.take_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn take_bytes(&mut self, len: usize) -> Result<Bytes, WireError> {
        if self.pushback.is_empty() {
            if self.input.remaining() < len {
                return Err(WireError::Incomplete);
            }
            Ok(self.input.copy_to_bytes(len))
        } else {
            let mut out = BytesMut::with_capacity(len);
            while out.len() < len {
                match self.pushback.pop() {
                    Some(byte) => out.put_u8(byte),
                    None => break,
                }
            }
            let rest = len - out.len();
            if self.input.remaining() < rest {
                return Err(WireError::Incomplete);
            }
            out.put(self.input.copy_to_bytes(rest));
            Ok(out.freeze())
        }
    }

    fn skip_bytes(&mut self, len: usize) -> Result<(), WireError> {
        let mut remaining = len;
        while remaining > 0 && self.pushback.pop().is_some() {
            remaining -= 1;
        }
        if self.input.remaining() < remaining {
            return Err(WireError::Incomplete);
        }
        self.input.advance(remaining);
        Ok(())
    }

    fn read_marker(&mut self) -> Result<Marker, WireError> {
        let marker = Marker::from_u8(self.take_u8()?);
        if marker == Marker::Reserved {
            Err(WireError::Reserved)
        } else {
            Ok(marker)
        }
    }

    /// Consume a nil token if one is next, leaving the input untouched
    /// otherwise.
    pub fn try_read_nil(&mut self) -> Result<bool, WireError> {
        let byte = self.take_u8()?;
        if byte == Marker::Nil.to_u8() {
            Ok(true)
        } else {
            self.pushback.unread(&[byte]);
            Ok(false)
        }
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        match self.read_marker()? {
            Marker::True => Ok(true),
            Marker::False => Ok(false),
            marker => Err(WireError::UnexpectedMarker {
                marker,
                expected: "a boolean",
            }),
        }
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        match self.read_marker()? {
            Marker::FixPos(n) => Ok(n as i64),
            Marker::FixNeg(n) => Ok(n as i64),
            Marker::I8 => {
                let mut buf = [0u8; 1];
                self.take_exact(&mut buf)?;
                Ok(i8::from_be_bytes(buf) as i64)
            }
            Marker::I16 => Ok(self.take_u16()? as i16 as i64),
            Marker::I32 => Ok(self.take_u32()? as i32 as i64),
            Marker::I64 => Ok(self.take_u64()? as i64),
            Marker::U8 => Ok(self.take_u8()? as i64),
            Marker::U16 => Ok(self.take_u16()? as i64),
            Marker::U32 => Ok(self.take_u32()? as i64),
            Marker::U64 => {
                i64::try_from(self.take_u64()?).map_err(|_| WireError::IntegerOverflow)
            }
            marker => Err(WireError::UnexpectedMarker {
                marker,
                expected: "an integer",
            }),
        }
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        match self.read_marker()? {
            Marker::FixPos(n) => Ok(n as u64),
            Marker::U8 => Ok(self.take_u8()? as u64),
            Marker::U16 => Ok(self.take_u16()? as u64),
            Marker::U32 => Ok(self.take_u32()? as u64),
            Marker::U64 => self.take_u64(),
            Marker::I8 => {
                let mut buf = [0u8; 1];
                self.take_exact(&mut buf)?;
                u64::try_from(i8::from_be_bytes(buf)).map_err(|_| WireError::IntegerOverflow)
            }
            Marker::I16 => u64::try_from(self.take_u16()? as i16)
                .map_err(|_| WireError::IntegerOverflow),
            Marker::I32 => u64::try_from(self.take_u32()? as i32)
                .map_err(|_| WireError::IntegerOverflow),
            Marker::I64 => u64::try_from(self.take_u64()? as i64)
                .map_err(|_| WireError::IntegerOverflow),
            Marker::FixNeg(_) => Err(WireError::IntegerOverflow),
            marker => Err(WireError::UnexpectedMarker {
                marker,
                expected: "an unsigned integer",
            }),
        }
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        match self.read_marker()? {
            Marker::F32 => Ok(f32::from_bits(self.take_u32()?)),
            marker => Err(WireError::UnexpectedMarker {
                marker,
                expected: "a 32 bit float",
            }),
        }
    }

    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        match self.read_marker()? {
            Marker::F32 => Ok(f32::from_bits(self.take_u32()?) as f64),
            Marker::F64 => Ok(f64::from_bits(self.take_u64()?)),
            marker => Err(WireError::UnexpectedMarker {
                marker,
                expected: "a float",
            }),
        }
    }

    fn read_str_len(&mut self) -> Result<usize, WireError> {
        match self.read_marker()? {
            Marker::FixStr(n) => Ok(n as usize),
            Marker::Str8 => Ok(self.take_u8()? as usize),
            Marker::Str16 => Ok(self.take_u16()? as usize),
            Marker::Str32 => Ok(self.take_u32()? as usize),
            marker => Err(WireError::UnexpectedMarker {
                marker,
                expected: "a string",
            }),
        }
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_str_len()?;
        let bytes = self.take_bytes(len)?;
        match std::str::from_utf8(bytes.as_ref()) {
            Ok(s) => Ok(s.to_owned()),
            Err(e) => Err(WireError::BadUtf8(e)),
        }
    }

    /// Read a string token into `scratch`, validating UTF8 without
    /// allocating a `String`. Used for decode-side key lookup.
    pub fn read_str_bytes(&mut self, scratch: &mut BytesMut) -> Result<(), WireError> {
        let len = self.read_str_len()?;
        let bytes = self.take_bytes(len)?;
        std::str::from_utf8(bytes.as_ref())?;
        scratch.clear();
        scratch.extend_from_slice(bytes.as_ref());
        Ok(())
    }

    pub fn read_bin(&mut self) -> Result<Bytes, WireError> {
        let len = match self.read_marker()? {
            Marker::Bin8 => self.take_u8()? as usize,
            Marker::Bin16 => self.take_u16()? as usize,
            Marker::Bin32 => self.take_u32()? as usize,
            marker => {
                return Err(WireError::UnexpectedMarker {
                    marker,
                    expected: "a binary blob",
                })
            }
        };
        self.take_bytes(len)
    }

    fn ext_len(&mut self, marker: Marker) -> Result<Option<usize>, WireError> {
        match marker {
            Marker::FixExt1 => Ok(Some(1)),
            Marker::FixExt2 => Ok(Some(2)),
            Marker::FixExt4 => Ok(Some(4)),
            Marker::FixExt8 => Ok(Some(8)),
            Marker::FixExt16 => Ok(Some(16)),
            Marker::Ext8 => Ok(Some(self.take_u8()? as usize)),
            Marker::Ext16 => Ok(Some(self.take_u16()? as usize)),
            Marker::Ext32 => Ok(Some(self.take_u32()? as usize)),
            _ => Ok(None),
        }
    }

    pub fn read_ext(&mut self) -> Result<(i8, Bytes), WireError> {
        let marker = self.read_marker()?;
        let len = match self.ext_len(marker)? {
            Some(len) => len,
            None => {
                return Err(WireError::UnexpectedMarker {
                    marker,
                    expected: "an extension",
                })
            }
        };
        let type_code = self.take_u8()? as i8;
        let body = self.take_bytes(len)?;
        Ok((type_code, body))
    }

    /// Consume an extension token of type `code` if one is next, returning
    /// its body. Any other token (including extensions of a different type)
    /// is left untouched.
    pub fn try_read_ext(&mut self, code: i8) -> Result<Option<Bytes>, WireError> {
        let mut prefix = [0u8; 6];
        let head = self.take_u8()?;
        prefix[0] = head;
        let mut used = 1;
        let len = match Marker::from_u8(head) {
            Marker::FixExt1 => 1usize,
            Marker::FixExt2 => 2,
            Marker::FixExt4 => 4,
            Marker::FixExt8 => 8,
            Marker::FixExt16 => 16,
            Marker::Ext8 => {
                let b = self.take_u8()?;
                prefix[used] = b;
                used += 1;
                b as usize
            }
            Marker::Ext16 => {
                let mut buf = [0u8; 2];
                self.take_exact(&mut buf)?;
                prefix[used..used + 2].copy_from_slice(&buf);
                used += 2;
                u16::from_be_bytes(buf) as usize
            }
            Marker::Ext32 => {
                let mut buf = [0u8; 4];
                self.take_exact(&mut buf)?;
                prefix[used..used + 4].copy_from_slice(&buf);
                used += 4;
                u32::from_be_bytes(buf) as usize
            }
            _ => {
                self.pushback.unread(&prefix[..used]);
                return Ok(None);
            }
        };
        let type_byte = self.take_u8()?;
        prefix[used] = type_byte;
        used += 1;
        if type_byte as i8 != code {
            self.pushback.unread(&prefix[..used]);
            return Ok(None);
        }
        self.take_bytes(len).map(Some)
    }

    pub fn read_array_header(&mut self) -> Result<u32, WireError> {
        match self.read_marker()? {
            Marker::FixArray(n) => Ok(n as u32),
            Marker::Array16 => Ok(self.take_u16()? as u32),
            Marker::Array32 => self.take_u32(),
            marker => Err(WireError::UnexpectedMarker {
                marker,
                expected: "an array",
            }),
        }
    }

    pub fn read_map_header(&mut self) -> Result<u32, WireError> {
        match self.read_marker()? {
            Marker::FixMap(n) => Ok(n as u32),
            Marker::Map16 => Ok(self.take_u16()? as u32),
            Marker::Map32 => self.take_u32(),
            marker => Err(WireError::UnexpectedMarker {
                marker,
                expected: "a map",
            }),
        }
    }

    pub fn try_read_array_header(&mut self) -> Result<Option<u32>, WireError> {
        let head = self.take_u8()?;
        match Marker::from_u8(head) {
            Marker::FixArray(n) => Ok(Some(n as u32)),
            Marker::Array16 => Ok(Some(self.take_u16()? as u32)),
            Marker::Array32 => Ok(Some(self.take_u32()?)),
            _ => {
                self.pushback.unread(&[head]);
                Ok(None)
            }
        }
    }

    pub fn try_read_map_header(&mut self) -> Result<Option<u32>, WireError> {
        let head = self.take_u8()?;
        match Marker::from_u8(head) {
            Marker::FixMap(n) => Ok(Some(n as u32)),
            Marker::Map16 => Ok(Some(self.take_u16()? as u32)),
            Marker::Map32 => Ok(Some(self.take_u32()?)),
            _ => {
                self.pushback.unread(&[head]);
                Ok(None)
            }
        }
    }

    /// Consume exactly one complete structure (scalar, string, blob,
    /// extension, array or map, including all nested values) without
    /// decoding it.
    pub fn skip_value(&mut self) -> Result<(), WireError> {
        let mut pending: u64 = 1;
        while pending > 0 {
            pending -= 1;
            match self.read_marker()? {
                Marker::Nil
                | Marker::False
                | Marker::True
                | Marker::FixPos(_)
                | Marker::FixNeg(_) => {}
                Marker::I8 | Marker::U8 => self.skip_bytes(1)?,
                Marker::I16 | Marker::U16 => self.skip_bytes(2)?,
                Marker::I32 | Marker::U32 | Marker::F32 => self.skip_bytes(4)?,
                Marker::I64 | Marker::U64 | Marker::F64 => self.skip_bytes(8)?,
                Marker::FixStr(n) => self.skip_bytes(n as usize)?,
                Marker::Str8 | Marker::Bin8 => {
                    let len = self.take_u8()? as usize;
                    self.skip_bytes(len)?;
                }
                Marker::Str16 | Marker::Bin16 => {
                    let len = self.take_u16()? as usize;
                    self.skip_bytes(len)?;
                }
                Marker::Str32 | Marker::Bin32 => {
                    let len = self.take_u32()? as usize;
                    self.skip_bytes(len)?;
                }
                Marker::FixExt1 => self.skip_bytes(2)?,
                Marker::FixExt2 => self.skip_bytes(3)?,
                Marker::FixExt4 => self.skip_bytes(5)?,
                Marker::FixExt8 => self.skip_bytes(9)?,
                Marker::FixExt16 => self.skip_bytes(17)?,
                Marker::Ext8 => {
                    let len = self.take_u8()? as usize;
                    self.skip_bytes(len + 1)?;
                }
                Marker::Ext16 => {
                    let len = self.take_u16()? as usize;
                    self.skip_bytes(len + 1)?;
                }
                Marker::Ext32 => {
                    let len = self.take_u32()? as usize;
                    self.skip_bytes(len + 1)?;
                }
                Marker::FixArray(n) => pending += n as u64,
                Marker::Array16 => pending += self.take_u16()? as u64,
                Marker::Array32 => pending += self.take_u32()? as u64,
                Marker::FixMap(n) => pending += 2 * n as u64,
                Marker::Map16 => pending += 2 * self.take_u16()? as u64,
                Marker::Map32 => pending += 2 * self.take_u32()? as u64,
                Marker::Reserved => return Err(WireError::Reserved),
            }
        }
        Ok(())
    }
}
