// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::{BTreeMap, VecDeque};

use rewind_core::command::Command;
use rewind_core::id::NodeId;
use tracing::warn;

/// Replayed commands waiting for the node they need.
///
/// Commands are keyed by the missing identifier and released in arrival
/// order once that node is created. When full, the oldest command overall is
/// dropped.
#[derive(Debug)]
pub struct PendingQueue {
    capacity: usize,
    len: usize,
    next_seq: u64,
    waiting: BTreeMap<NodeId, VecDeque<(u64, Command)>>,
}

impl PendingQueue {
    /// Creates an empty queue holding at most `capacity` commands.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            len: 0,
            next_seq: 0,
            waiting: BTreeMap::new(),
        }
    }

    /// Holds `command` until `missing` exists.
    ///
    /// Returns `false` if an older command had to be dropped to make room, or
    /// if the queue has no room at all and `command` itself was dropped.
    pub fn push(&mut self, missing: NodeId, command: Command) -> bool {
        if self.capacity == 0 {
            warn!(?missing, "pending queue disabled, command dropped");
            return false;
        }
        let mut kept_all = true;
        if self.len >= self.capacity {
            self.drop_oldest();
            kept_all = false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiting.entry(missing).or_default().push_back((seq, command));
        self.len += 1;
        kept_all
    }

    /// Removes and returns every command waiting for `id`, oldest first.
    pub fn take(&mut self, id: NodeId) -> Vec<Command> {
        let Some(queue) = self.waiting.remove(&id) else {
            return Vec::new();
        };
        self.len -= queue.len();
        queue.into_iter().map(|(_, command)| command).collect()
    }

    /// Returns how many commands wait for `id`.
    #[must_use]
    pub fn waiting_for(&self, id: NodeId) -> usize {
        self.waiting.get(&id).map_or(0, VecDeque::len)
    }

    /// Returns the total number of waiting commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.waiting.clear();
        self.len = 0;
    }

    fn drop_oldest(&mut self) {
        let oldest = self
            .waiting
            .iter()
            .filter_map(|(id, queue)| queue.front().map(|(seq, _)| (*seq, *id)))
            .min();
        let Some((_, id)) = oldest else {
            return;
        };
        if let Some(queue) = self.waiting.get_mut(&id) {
            if let Some((_, command)) = queue.pop_front() {
                warn!(missing = ?id, code = command.type_code(), "pending queue full, oldest command dropped");
                self.len -= 1;
            }
            if queue.is_empty() {
                self.waiting.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rewind_core::id::ProcessId;

    fn id(local: u32) -> NodeId {
        NodeId::new(ProcessId(1), local)
    }

    fn destroy(local: u32) -> Command {
        Command::DestroyNode { id: id(local) }
    }

    #[test]
    fn released_in_arrival_order() {
        let mut queue = PendingQueue::new(8);
        queue.push(id(1), destroy(10));
        queue.push(id(2), destroy(20));
        queue.push(id(1), destroy(11));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.waiting_for(id(1)), 2);

        assert_eq!(queue.take(id(1)), vec![destroy(10), destroy(11)]);
        assert_eq!(queue.len(), 1);
        assert!(queue.take(id(1)).is_empty());
    }

    #[test]
    fn full_queue_drops_the_oldest() {
        let mut queue = PendingQueue::new(2);
        assert!(queue.push(id(1), destroy(10)));
        assert!(queue.push(id(2), destroy(20)));
        assert!(!queue.push(id(2), destroy(21)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.waiting_for(id(1)), 0);
        assert_eq!(queue.take(id(2)), vec![destroy(20), destroy(21)]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut queue = PendingQueue::new(0);
        assert!(!queue.push(id(1), destroy(1)));
        assert!(queue.is_empty());
    }

    proptest! {
        #[test]
        fn len_tracks_waiting_commands(
            capacity in 0_usize..16,
            pushes in proptest::collection::vec(0_u32..6, 0..64),
        ) {
            let mut queue = PendingQueue::new(capacity);
            for (n, missing) in pushes.iter().enumerate() {
                queue.push(id(*missing), destroy(u32::try_from(n).unwrap()));
                prop_assert!(queue.len() <= capacity);
            }
            let waiting: usize = (0..6).map(|l| queue.waiting_for(id(l))).sum();
            prop_assert_eq!(waiting, queue.len());
            let released: usize = (0..6).map(|l| queue.take(id(l)).len()).sum();
            prop_assert_eq!(released, waiting);
            prop_assert!(queue.is_empty());
        }
    }
}
