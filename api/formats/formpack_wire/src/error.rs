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

use crate::Marker;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::Utf8Error;

/// Reading or writing MessagePack data can fail if the bytes do not
/// constitute valid MessagePack, the input terminates part way through a
/// token or the transport fails.
#[derive(Debug)]
pub enum WireError {
    /// The input ended part way through a token or structure. In the
    /// synchronous path this is fatal; the asynchronous reader treats it as
    /// a signal to await more input.
    Incomplete,
    /// An unexpected MessagePack marker was encountered.
    UnexpectedMarker {
        marker: Marker,
        expected: &'static str,
    },
    /// The reserved format code (`0xc1`) occurred in the data.
    Reserved,
    /// A string value contained invalid UTF8.
    BadUtf8(Utf8Error),
    /// An integer value was outside the range of the requested type.
    IntegerOverflow,
    /// A reference token carried a malformed LEB128 body.
    BadVarint,
    /// A value was too large to be written in the MessagePack format.
    TooLarge { what: &'static str, len: usize },
    /// An error occurred in the underlying transport.
    Io(std::io::Error),
    /// The operation was cancelled while suspended.
    Cancelled,
}

impl PartialEq for WireError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (WireError::Incomplete, WireError::Incomplete) => true,
            (
                WireError::UnexpectedMarker { marker: m1, .. },
                WireError::UnexpectedMarker { marker: m2, .. },
            ) => m1 == m2,
            (WireError::Reserved, WireError::Reserved) => true,
            (WireError::BadUtf8(e1), WireError::BadUtf8(e2)) => e1 == e2,
            (WireError::IntegerOverflow, WireError::IntegerOverflow) => true,
            (WireError::BadVarint, WireError::BadVarint) => true,
            (
                WireError::TooLarge { what: w1, len: l1 },
                WireError::TooLarge { what: w2, len: l2 },
            ) => w1 == w2 && l1 == l2,
            (WireError::Cancelled, WireError::Cancelled) => true,
            _ => false,
        }
    }
}

impl Display for WireError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Incomplete => {
                write!(f, "The input ended part way through a structure.")
            }
            WireError::UnexpectedMarker { marker, expected } => {
                write!(
                    f,
                    "Unexpected MessagePack marker: {:?}, expected {}.",
                    marker, expected
                )
            }
            WireError::Reserved => {
                write!(f, "The reserved format code occurred in the input.")
            }
            WireError::BadUtf8(err) => {
                write!(f, "A string value contained invalid UTF8: {}", err)
            }
            WireError::IntegerOverflow => {
                write!(f, "Integer value out of range for the requested type.")
            }
            WireError::BadVarint => {
                write!(f, "A reference token carried a malformed LEB128 body.")
            }
            WireError::TooLarge { what, len } => {
                write!(f, "A {} of length {} cannot be written as MessagePack.", what, len)
            }
            WireError::Io(err) => {
                write!(f, "An error occurred in the underlying transport: {}", err)
            }
            WireError::Cancelled => write!(f, "The operation was cancelled."),
        }
    }
}

impl Error for WireError {}

impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        WireError::Io(err)
    }
}

impl From<Utf8Error> for WireError {
    fn from(err: Utf8Error) -> Self {
        WireError::BadUtf8(err)
    }
}
