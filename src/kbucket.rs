// Copyright 2026 kaddht contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! A single k-bucket: a capacity-bounded, least-recently-seen-ordered set of
//! contacts covering one contiguous slice of the id space, plus a bounded
//! replacement cache. Grounded on `liaa/routing.py::KBucket`, generalized
//! from the Python `OrderedDict` LRU idiom to an explicit `Vec` shuffled by
//! position (ksize is small, so this stays cheap).

use crate::node::{Node, NodeId};
use std::time::Instant;

/// A half-open... in practice closed-closed `[low, high]` integer interval
/// that this bucket owns, plus its main and replacement sets.
pub struct KBucket {
    low: NodeId,
    high: NodeId,
    capacity: usize,
    replacement_capacity: usize,
    main: Vec<Node>,
    replacement: Vec<Node>,
    last_seen: Instant,
}

impl KBucket {
    pub fn new(low: NodeId, high: NodeId, capacity: usize, replacement_capacity: usize) -> Self {
        KBucket {
            low,
            high,
            capacity,
            replacement_capacity,
            main: Vec::new(),
            replacement: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    pub fn range(&self) -> (NodeId, NodeId) {
        (self.low, self.high)
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn main_set(&self) -> &[Node] {
        &self.main
    }

    pub fn replacement_set(&self) -> &[Node] {
        &self.replacement
    }

    pub fn len(&self) -> usize {
        self.main.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.main.len() >= self.capacity
    }

    pub fn has_in_range(&self, node: &Node) -> bool {
        self.low <= node.long_id() && node.long_id() <= self.high
    }

    pub fn head(&self) -> Option<&Node> {
        self.main.first()
    }

    fn position_main(&self, key: &str) -> Option<usize> {
        self.main.iter().position(|n| n.key() == key)
    }

    fn position_replacement(&self, key: &str) -> Option<usize> {
        self.replacement.iter().position(|n| n.key() == key)
    }

    /// See SPEC_FULL.md §4.3: re-add moves to most-recent; room appends;
    /// else falls through to the replacement cache. Returns whether the
    /// node ended up in the main set.
    pub fn add(&mut self, node: Node) -> bool {
        if let Some(pos) = self.position_main(&node.key().to_string()) {
            self.main.remove(pos);
            self.main.push(node);
            return true;
        }

        if self.main.len() < self.capacity {
            self.main.push(node);
            return true;
        }

        if let Some(pos) = self.position_replacement(&node.key().to_string()) {
            self.replacement.remove(pos);
            self.replacement.push(node);
            return false;
        }

        if self.replacement.len() >= self.replacement_capacity && !self.replacement.is_empty() {
            self.replacement.remove(0);
        }
        self.replacement.push(node);
        false
    }

    /// Remove `node` from whichever set holds it. If it was in the main set
    /// and a replacement is available, the most-recent replacement is
    /// promoted into the vacated slot.
    pub fn remove(&mut self, key: &str) {
        if let Some(pos) = self.position_replacement(key) {
            self.replacement.remove(pos);
        }

        if let Some(pos) = self.position_main(key) {
            self.main.remove(pos);
            if let Some(promoted) = self.replacement.pop() {
                self.main.push(promoted);
            }
        }
    }

    /// Drop the node at `expected_head_key` (if still present) and insert
    /// `candidate` directly into the main set's most-recent position,
    /// bypassing the replacement cache entirely. Used for the "dead head,
    /// live candidate" eviction path, where the candidate must land in the
    /// main set regardless of what the replacement cache holds.
    pub fn replace_head(&mut self, expected_head_key: &str, candidate: Node) {
        if let Some(pos) = self.position_main(expected_head_key) {
            self.main.remove(pos);
        }
        if self.main.len() >= self.capacity && !self.main.is_empty() {
            self.main.remove(0);
        }
        self.main.push(candidate);
    }

    pub fn is_new_node(&self, node: &Node) -> bool {
        self.position_main(node.key()).is_none()
    }

    pub fn total_nodes(&self) -> usize {
        self.main.len() + self.replacement.len()
    }

    /// Length of the longest shared bit prefix among main-set digests.
    /// Empty/singleton buckets have maximal depth (no disagreement yet).
    pub fn depth(&self) -> usize {
        if self.main.len() < 2 {
            return crate::node::ID_BYTES * 8;
        }
        let first = self.main[0].digest();
        self.main[1..]
            .iter()
            .map(|n| first.shared_prefix_len(&n.digest()))
            .min()
            .unwrap_or(crate::node::ID_BYTES * 8)
    }

    /// Split at the midpoint into `(lower, upper)`, redistributing both the
    /// main set and the replacement cache.
    pub fn split(self) -> (KBucket, KBucket) {
        let midpoint = NodeId::midpoint(self.low, self.high);
        let mut lower = KBucket::new(self.low, midpoint, self.capacity, self.replacement_capacity);
        let mut upper = KBucket::new(midpoint.succ(), self.high, self.capacity, self.replacement_capacity);

        for node in self.main.into_iter().chain(self.replacement.into_iter()) {
            if node.long_id() <= midpoint {
                lower.add(node);
            } else {
                upper.add(node);
            }
        }
        (lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_range() -> (NodeId, NodeId) {
        (NodeId::ZERO, NodeId::max_value())
    }

    #[test]
    fn capacity_is_respected() {
        let (low, high) = full_range();
        let mut bucket = KBucket::new(low, high, 2, 2);
        assert!(bucket.add(Node::peer("127.0.0.1", 1)));
        assert!(bucket.add(Node::peer("127.0.0.1", 2)));
        assert!(!bucket.add(Node::peer("127.0.0.1", 3)));
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.replacement_set().len(), 1);
    }

    #[test]
    fn readd_moves_to_most_recent() {
        let (low, high) = full_range();
        let mut bucket = KBucket::new(low, high, 3, 3);
        let a = Node::peer("127.0.0.1", 1);
        let b = Node::peer("127.0.0.1", 2);
        bucket.add(a.clone());
        bucket.add(b.clone());
        bucket.add(a.clone());
        assert_eq!(bucket.main_set()[0].key(), b.key());
        assert_eq!(bucket.main_set()[1].key(), a.key());
    }

    #[test]
    fn eviction_promotes_replacement() {
        let (low, high) = full_range();
        let mut bucket = KBucket::new(low, high, 1, 2);
        let a = Node::peer("127.0.0.1", 1);
        let b = Node::peer("127.0.0.1", 2);
        bucket.add(a.clone());
        bucket.add(b.clone());
        assert_eq!(bucket.len(), 1);
        bucket.remove(a.key());
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.main_set()[0].key(), b.key());
    }

    #[test]
    fn split_tiles_and_preserves_membership() {
        let (low, high) = full_range();
        let mut bucket = KBucket::new(low, high, 20, 20);
        let nodes: Vec<Node> = (0..20u16).map(|p| Node::peer("127.0.0.1", p)).collect();
        for n in &nodes {
            bucket.add(n.clone());
        }
        let (lower, upper) = bucket.split();
        assert_eq!(lower.range().0, low);
        assert_eq!(upper.range().1, high);
        assert_eq!(lower.range().1.succ(), upper.range().0);
        let total: usize = lower.total_nodes() + upper.total_nodes();
        assert_eq!(total, nodes.len());
        for n in &nodes {
            assert!(lower.has_in_range(n) != upper.has_in_range(n));
        }
    }
}
