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

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;

const POOL_CAPACITY: usize = 16;

static POOL: Mutex<Vec<RefTracker>> = Mutex::new(Vec::new());

/// Tracks object identity within a single top-level operation. The write
/// side maps pointer identity to a sequence number; the read side maps
/// sequence numbers back to decoded handles. Trackers are pooled; a context
/// borrows one for the duration of one top-level call and returns it on
/// every exit path.
#[derive(Default)]
pub struct RefTracker {
    write_ids: HashMap<usize, u64>,
    read_objs: Vec<Option<Box<dyn Any + Send + Sync>>>,
}

impl RefTracker {
    /// The sequence number previously assigned to this identity, if any.
    pub fn existing(&self, identity: usize) -> Option<u64> {
        self.write_ids.get(&identity).copied()
    }

    /// Assign the next sequence number to an identity about to be written.
    pub fn assign(&mut self, identity: usize) -> u64 {
        let seq = self.write_ids.len() as u64;
        self.write_ids.insert(identity, seq);
        seq
    }

    /// Reserve the next read-side sequence number. The slot is fulfilled
    /// once the decoded handle exists; cell-shaped converters fulfill it
    /// before descending so that cycles resolve.
    pub fn reserve(&mut self) -> u64 {
        self.read_objs.push(None);
        (self.read_objs.len() - 1) as u64
    }

    pub fn fulfill(&mut self, seq: u64, object: Box<dyn Any + Send + Sync>) {
        if let Some(slot) = self.read_objs.get_mut(seq as usize) {
            *slot = Some(object);
        }
    }

    pub fn resolve(&self, seq: u64) -> Option<&(dyn Any + Send + Sync)> {
        self.read_objs
            .get(seq as usize)
            .and_then(|slot| slot.as_deref())
    }

    fn clear(&mut self) {
        self.write_ids.clear();
        self.read_objs.clear();
    }
}

/// Borrow a tracker from the process-wide pool, allocating a fresh one if
/// the pool is empty.
pub(crate) fn acquire() -> RefTracker {
    POOL.lock().pop().unwrap_or_default()
}

/// Return a tracker to the pool. Depleted capacity drops the tracker
/// instead of growing the pool.
pub(crate) fn release(mut tracker: RefTracker) {
    tracker.clear();
    let mut pool = POOL.lock();
    if pool.len() < POOL_CAPACITY {
        pool.push(tracker);
    }
}
