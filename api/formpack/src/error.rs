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

use formpack_wire::WireError;
use thiserror::Error;

/// Errors surfaced by serialization and deserialization operations.
/// Construction errors propagate out of the first converter request for an
/// ill-formed type; wire errors propagate out of the top-level operation
/// with no partial result.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The input bytes are not valid MessagePack or the type code disagrees
    /// with the target type.
    #[error("invalid MessagePack data: {0}")]
    DecodeFormat(String),
    /// The input ended part way through a structure.
    #[error("the input ended part way through a structure")]
    TruncatedInput,
    /// Nil was encountered where a non-optional value was required.
    #[error("nil encountered where a value of type '{0}' was required")]
    UnexpectedNil(&'static str),
    /// The depth budget of the serialization context was exhausted.
    #[error("maximum serialization depth exceeded")]
    DepthExceeded,
    /// A type shape was ill-formed; no converter is produced for it.
    #[error("invalid type shape: {0}")]
    ShapeConstruction(String),
    /// The requested operation cannot be performed for the type.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// An asynchronous operation was cancelled.
    #[error("the operation was cancelled")]
    Cancelled,
    /// The underlying transport failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WireError> for SerializationError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Incomplete => SerializationError::TruncatedInput,
            WireError::Cancelled => SerializationError::Cancelled,
            WireError::Io(err) => SerializationError::Io(err),
            other => SerializationError::DecodeFormat(other.to_string()),
        }
    }
}
