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

//! Unsigned LEB128 encoding for the bodies of reference extension tokens.

use crate::WireError;

/// Maximum encoded length of a `u64`.
pub const MAX_LEN: usize = 10;

/// Encode `value` into `buf`, returning the number of bytes used.
pub fn encode(mut value: u64, buf: &mut [u8; MAX_LEN]) -> usize {
    let mut i = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf[i] = byte;
            return i + 1;
        }
        buf[i] = byte | 0x80;
        i += 1;
    }
}

/// Decode a complete LEB128 value occupying exactly `bytes`.
pub fn decode(bytes: &[u8]) -> Result<u64, WireError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 {
            return Err(WireError::BadVarint);
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return if i + 1 == bytes.len() {
                Ok(value)
            } else {
                Err(WireError::BadVarint)
            };
        }
        shift += 7;
    }
    Err(WireError::BadVarint)
}
