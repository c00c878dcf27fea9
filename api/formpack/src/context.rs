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

use crate::error::SerializationError;
use crate::reftrack::{self, RefTracker};
use crate::serializer::MessagePackSerializer;

/// State threaded through every converter call within one top-level
/// operation: the remaining depth budget, the flush threshold for
/// asynchronous writers, the owning serializer (for sub-converter lookup in
/// custom converters) and the optional reference tracker.
pub struct SerializationContext<'a> {
    remaining_depth: i32,
    unflushed_bytes_threshold: usize,
    owner: &'a MessagePackSerializer,
    ref_tracker: Option<RefTracker>,
}

impl<'a> SerializationContext<'a> {
    pub(crate) fn new(owner: &'a MessagePackSerializer) -> Self {
        let options = owner.options();
        let ref_tracker = if options.preserve_references {
            Some(reftrack::acquire())
        } else {
            None
        };
        SerializationContext {
            remaining_depth: options.max_depth,
            unflushed_bytes_threshold: options.unflushed_bytes_threshold,
            owner,
            ref_tracker,
        }
    }

    /// The serializer this context belongs to.
    pub fn owner(&self) -> &'a MessagePackSerializer {
        self.owner
    }

    pub fn unflushed_bytes_threshold(&self) -> usize {
        self.unflushed_bytes_threshold
    }

    /// Claim one level of the depth budget. Converters that descend into
    /// nested values call this on entry and pair it with [`depth_leave`] on
    /// the success path.
    ///
    /// [`depth_leave`]: SerializationContext::depth_leave
    pub fn depth_step(&mut self) -> Result<(), SerializationError> {
        self.remaining_depth -= 1;
        if self.remaining_depth < 0 {
            Err(SerializationError::DepthExceeded)
        } else {
            Ok(())
        }
    }

    pub fn depth_leave(&mut self) {
        self.remaining_depth += 1;
    }

    pub fn ref_tracker(&mut self) -> Option<&mut RefTracker> {
        self.ref_tracker.as_mut()
    }
}

impl Drop for SerializationContext<'_> {
    fn drop(&mut self) {
        if let Some(tracker) = self.ref_tracker.take() {
            reftrack::release(tracker);
        }
    }
}
