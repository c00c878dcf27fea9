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

use crate::varint;
use crate::{Marker, WireError};
use bytes::{BufMut, BytesMut};
use std::convert::TryFrom;

/// Writes MessagePack tokens into an externally owned buffer. Integers are
/// written in the shortest form that fits the value. Every call appends
/// exactly one token (headers and raw spans count as one token each).
pub struct Writer<'a> {
    out: &'a mut BytesMut,
    start: usize,
}

fn to_len(what: &'static str, len: usize) -> Result<u32, WireError> {
    u32::try_from(len).map_err(|_| WireError::TooLarge { what, len })
}

impl<'a> Writer<'a> {
    pub fn new(out: &'a mut BytesMut) -> Self {
        let start = out.len();
        Writer { out, start }
    }

    /// The number of bytes this writer has appended to the buffer.
    pub fn bytes_written(&self) -> usize {
        self.out.len() - self.start
    }

    pub fn write_nil(&mut self) -> Result<(), WireError> {
        self.out.put_u8(Marker::Nil.to_u8());
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), WireError> {
        let marker = if value { Marker::True } else { Marker::False };
        self.out.put_u8(marker.to_u8());
        Ok(())
    }

    pub fn write_int(&mut self, value: i64) -> Result<(), WireError> {
        match value {
            0..=0x7f => self.out.put_u8(value as u8),
            -32..=-1 => self.out.put_u8(value as u8),
            -128..=-33 => {
                self.out.put_u8(Marker::I8.to_u8());
                self.out.put_i8(value as i8);
            }
            0x80..=0xff => {
                self.out.put_u8(Marker::U8.to_u8());
                self.out.put_u8(value as u8);
            }
            -32768..=-129 => {
                self.out.put_u8(Marker::I16.to_u8());
                self.out.put_i16(value as i16);
            }
            0x100..=0xffff => {
                self.out.put_u8(Marker::U16.to_u8());
                self.out.put_u16(value as u16);
            }
            -2147483648..=-32769 => {
                self.out.put_u8(Marker::I32.to_u8());
                self.out.put_i32(value as i32);
            }
            0x1_0000..=0xffff_ffff => {
                self.out.put_u8(Marker::U32.to_u8());
                self.out.put_u32(value as u32);
            }
            _ => {
                self.out.put_u8(Marker::I64.to_u8());
                self.out.put_i64(value);
            }
        }
        Ok(())
    }

    pub fn write_uint(&mut self, value: u64) -> Result<(), WireError> {
        match value {
            0..=0x7f => self.out.put_u8(value as u8),
            0x80..=0xff => {
                self.out.put_u8(Marker::U8.to_u8());
                self.out.put_u8(value as u8);
            }
            0x100..=0xffff => {
                self.out.put_u8(Marker::U16.to_u8());
                self.out.put_u16(value as u16);
            }
            0x1_0000..=0xffff_ffff => {
                self.out.put_u8(Marker::U32.to_u8());
                self.out.put_u32(value as u32);
            }
            _ => {
                self.out.put_u8(Marker::U64.to_u8());
                self.out.put_u64(value);
            }
        }
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), WireError> {
        self.out.put_u8(Marker::F32.to_u8());
        self.out.put_f32(value);
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), WireError> {
        self.out.put_u8(Marker::F64.to_u8());
        self.out.put_f64(value);
        Ok(())
    }

    pub fn write_str_header(&mut self, len: u32) -> Result<(), WireError> {
        match len {
            0..=31 => self.out.put_u8(Marker::FixStr(len as u8).to_u8()),
            32..=0xff => {
                self.out.put_u8(Marker::Str8.to_u8());
                self.out.put_u8(len as u8);
            }
            0x100..=0xffff => {
                self.out.put_u8(Marker::Str16.to_u8());
                self.out.put_u16(len as u16);
            }
            _ => {
                self.out.put_u8(Marker::Str32.to_u8());
                self.out.put_u32(len);
            }
        }
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> Result<(), WireError> {
        let len = to_len("string", value.len())?;
        self.write_str_header(len)?;
        self.out.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn write_bin_header(&mut self, len: u32) -> Result<(), WireError> {
        match len {
            0..=0xff => {
                self.out.put_u8(Marker::Bin8.to_u8());
                self.out.put_u8(len as u8);
            }
            0x100..=0xffff => {
                self.out.put_u8(Marker::Bin16.to_u8());
                self.out.put_u16(len as u16);
            }
            _ => {
                self.out.put_u8(Marker::Bin32.to_u8());
                self.out.put_u32(len);
            }
        }
        Ok(())
    }

    pub fn write_bin(&mut self, value: &[u8]) -> Result<(), WireError> {
        let len = to_len("binary blob", value.len())?;
        self.write_bin_header(len)?;
        self.out.put_slice(value);
        Ok(())
    }

    pub fn write_ext(&mut self, type_code: i8, data: &[u8]) -> Result<(), WireError> {
        let len = to_len("extension", data.len())?;
        match len {
            1 => self.out.put_u8(Marker::FixExt1.to_u8()),
            2 => self.out.put_u8(Marker::FixExt2.to_u8()),
            4 => self.out.put_u8(Marker::FixExt4.to_u8()),
            8 => self.out.put_u8(Marker::FixExt8.to_u8()),
            16 => self.out.put_u8(Marker::FixExt16.to_u8()),
            0..=0xff => {
                self.out.put_u8(Marker::Ext8.to_u8());
                self.out.put_u8(len as u8);
            }
            0x100..=0xffff => {
                self.out.put_u8(Marker::Ext16.to_u8());
                self.out.put_u16(len as u16);
            }
            _ => {
                self.out.put_u8(Marker::Ext32.to_u8());
                self.out.put_u32(len);
            }
        }
        self.out.put_i8(type_code);
        self.out.put_slice(data);
        Ok(())
    }

    /// Write a reference token: an extension whose body is the LEB128
    /// encoding of `seq`.
    pub fn write_ref_ext(&mut self, type_code: i8, seq: u64) -> Result<(), WireError> {
        let mut buf = [0u8; varint::MAX_LEN];
        let n = varint::encode(seq, &mut buf);
        self.write_ext(type_code, &buf[..n])
    }

    pub fn write_array_header(&mut self, len: u32) -> Result<(), WireError> {
        match len {
            0..=15 => self.out.put_u8(Marker::FixArray(len as u8).to_u8()),
            16..=0xffff => {
                self.out.put_u8(Marker::Array16.to_u8());
                self.out.put_u16(len as u16);
            }
            _ => {
                self.out.put_u8(Marker::Array32.to_u8());
                self.out.put_u32(len);
            }
        }
        Ok(())
    }

    pub fn write_map_header(&mut self, len: u32) -> Result<(), WireError> {
        match len {
            0..=15 => self.out.put_u8(Marker::FixMap(len as u8).to_u8()),
            16..=0xffff => {
                self.out.put_u8(Marker::Map16.to_u8());
                self.out.put_u16(len as u16);
            }
            _ => {
                self.out.put_u8(Marker::Map32.to_u8());
                self.out.put_u32(len);
            }
        }
        Ok(())
    }

    /// Append pre-encoded MessagePack bytes verbatim.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.out.put_slice(bytes);
        Ok(())
    }
}
