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

//! Node identity, the XOR distance metric, and the bounded lookup heap.
//!
//! Mirrors `kademlia/node.py` / `liaa/node.py`: a node is either a reachable
//! peer (`ip:port`) or an index entry (a stored key/value pair). Both derive
//! their 160-bit id the same way, by hashing the string `key`.

use sha1::{Digest, Sha1};
use std::cmp::Ordering;
use std::fmt;
use std::ops::BitXor;
use std::time::Instant;

/// Width of the id space in bytes. 160 bits, per DESIGN.md Open Question 1.
pub const ID_BYTES: usize = 20;

/// A 160-bit unsigned integer, represented big-endian so that byte-wise
/// lexicographic ordering is equivalent to unsigned integer ordering.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId([u8; ID_BYTES]);

impl NodeId {
    pub const ZERO: NodeId = NodeId([0u8; ID_BYTES]);

    /// Hash `bytes` with SHA-1 to produce a deterministic id. This is a pure
    /// function of the input: identical across every peer in the network.
    pub fn from_key(bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; ID_BYTES];
        out.copy_from_slice(&digest);
        NodeId(out)
    }

    pub fn from_bytes(bytes: [u8; ID_BYTES]) -> Self {
        NodeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    /// The largest representable id, `2^160 - 1`.
    pub fn max_value() -> Self {
        NodeId([0xffu8; ID_BYTES])
    }

    /// Saturating successor (`self + 1`), used to compute a split bucket's
    /// lower bound from the sibling's midpoint.
    pub fn succ(&self) -> Self {
        let mut out = self.0;
        for byte in out.iter_mut().rev() {
            if *byte == 0xff {
                *byte = 0;
            } else {
                *byte += 1;
                return NodeId(out);
            }
        }
        NodeId::max_value()
    }

    /// `floor((low + high) / 2)`, computed as 161-bit big-endian arithmetic
    /// so the sum can't overflow before the shift.
    pub fn midpoint(low: NodeId, high: NodeId) -> Self {
        let mut sum = [0u8; ID_BYTES + 1];
        let mut carry = 0u16;
        for i in (0..ID_BYTES).rev() {
            let total = low.0[i] as u16 + high.0[i] as u16 + carry;
            sum[i + 1] = (total & 0xff) as u8;
            carry = total >> 8;
        }
        sum[0] = carry as u8;

        let mut out = [0u8; ID_BYTES];
        let mut carry_bit = 0u8;
        for i in 0..sum.len() {
            let byte = sum[i];
            let new_carry = byte & 1;
            let shifted = (byte >> 1) | (carry_bit << 7);
            if i == 0 {
                debug_assert_eq!(shifted, 0, "sum of two 160-bit values can't need a 161st bit after shifting");
            } else {
                out[i - 1] = shifted;
            }
            carry_bit = new_carry;
        }
        NodeId(out)
    }

    /// Random id, used to pick a refresh target inside a bucket's range and
    /// to generate message ids (see `rpc::message`).
    pub fn random() -> Self {
        let mut out = [0u8; ID_BYTES];
        rand::Rng::fill(&mut rand::thread_rng(), &mut out);
        NodeId(out)
    }

    /// Length, in bits, of the shared prefix between `self` and `other`.
    /// Used by `KBucket::depth`.
    pub fn shared_prefix_len(&self, other: &NodeId) -> usize {
        let mut bits = 0;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let x = a ^ b;
            if x == 0 {
                bits += 8;
                continue;
            }
            bits += x.leading_zeros() as usize;
            break;
        }
        bits
    }
}

impl BitXor for NodeId {
    type Output = NodeId;

    fn bitxor(self, rhs: NodeId) -> NodeId {
        let mut out = [0u8; ID_BYTES];
        for i in 0..ID_BYTES {
            out[i] = self.0[i] ^ rhs.0[i];
        }
        NodeId(out)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a `Node` represents: a reachable peer, or a stored key/value pair.
/// Replaces the source's heterogeneous collections (storage iteration and
/// crawler heaps both yielding plain `Node`s) with an explicit tagged enum;
/// callers match on `kind()` instead of duck-typing.
#[derive(Clone, Debug)]
pub enum NodeKind {
    Peer { ip: String, port: u16 },
    Index { value: Vec<u8>, birthday: Instant },
}

#[derive(Clone, Debug)]
pub struct Node {
    key: String,
    digest: NodeId,
    kind: NodeKind,
}

impl Node {
    pub fn peer(ip: impl Into<String>, port: u16) -> Self {
        let ip = ip.into();
        let key = format!("{}:{}", ip, port);
        let digest = NodeId::from_key(key.as_bytes());
        Node { key, digest, kind: NodeKind::Peer { ip, port } }
    }

    pub fn index(key: impl Into<String>, value: Vec<u8>) -> Self {
        let key = key.into();
        let digest = NodeId::from_key(key.as_bytes());
        Node { key, digest, kind: NodeKind::Index { value, birthday: Instant::now() } }
    }

    /// Rebuild an index node preserving an already-known birthday, used when
    /// loading an entry back out of storage for republish.
    pub fn index_with_birthday(key: impl Into<String>, value: Vec<u8>, birthday: Instant) -> Self {
        let key = key.into();
        let digest = NodeId::from_key(key.as_bytes());
        Node { key, digest, kind: NodeKind::Index { value, birthday } }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn digest(&self) -> NodeId {
        self.digest
    }

    pub fn long_id(&self) -> NodeId {
        self.digest
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_peer(&self) -> bool {
        matches!(self.kind, NodeKind::Peer { .. })
    }

    pub fn as_peer(&self) -> Option<(&str, u16)> {
        match &self.kind {
            NodeKind::Peer { ip, port } => Some((ip.as_str(), *port)),
            NodeKind::Index { .. } => None,
        }
    }

    pub fn value(&self) -> Option<&[u8]> {
        match &self.kind {
            NodeKind::Index { value, .. } => Some(value),
            NodeKind::Peer { .. } => None,
        }
    }

    pub fn distance_to(&self, other: &Node) -> NodeId {
        self.digest ^ other.digest
    }

    pub fn distance_to_id(&self, other: NodeId) -> NodeId {
        self.digest ^ other
    }

    /// Same endpoint as another node (ignores what's being represented).
    pub fn is_same_node(&self, other: &Node) -> bool {
        self.key == other.key
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// A bounded heap of peer nodes ordered by distance to a fixed target,
/// tracking which peers have already been queried during a crawl. Mirrors
/// `kademlia.node.NodeHeap`.
///
/// `ksize` is small in practice (tens of entries), so a sorted `Vec` scanned
/// linearly is within the same asymptotic ballpark as a paired heap + index
/// and is what's implemented (see SPEC_FULL.md Design Notes).
pub struct NodeHeap {
    target: NodeId,
    maxsize: usize,
    entries: Vec<(NodeId, Node)>,
    contacted: std::collections::HashSet<String>,
}

impl NodeHeap {
    pub fn new(target: NodeId, maxsize: usize) -> Self {
        NodeHeap { target, maxsize, entries: Vec::new(), contacted: Default::default() }
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
    }

    /// Push one or more newly-discovered nodes, skipping ones already present.
    pub fn push(&mut self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            if self.contains(&node) {
                continue;
            }
            let distance = self.target ^ node.digest();
            self.entries.push((distance, node));
        }
        self.sort();
    }

    pub fn push_one(&mut self, node: Node) {
        self.push(std::iter::once(node));
    }

    /// Remove peers by key. The heap's *visible* size may not shrink: nodes
    /// beyond `maxsize` can become newly visible (matches the source).
    pub fn remove(&mut self, keys: &std::collections::HashSet<String>) {
        if keys.is_empty() {
            return;
        }
        self.entries.retain(|(_, node)| !keys.contains(node.key()));
    }

    pub fn get_node(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|(_, n)| n.key() == key).map(|(_, n)| n)
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.entries.iter().any(|(_, n)| n.key() == node.key())
    }

    pub fn mark_contacted(&mut self, node: &Node) {
        self.contacted.insert(node.key().to_string());
    }

    pub fn have_contacted_all(&self) -> bool {
        self.get_uncontacted().is_empty()
    }

    pub fn get_ids(&self) -> Vec<String> {
        self.iter().map(|n| n.key().to_string()).collect()
    }

    pub fn get_uncontacted(&self) -> Vec<&Node> {
        self.iter().filter(|n| !self.contacted.contains(n.key())).collect()
    }

    /// Pop the globally-closest entry (used by `nearest_without_value`).
    pub fn popleft(&mut self) -> Option<Node> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.entries.remove(0).1)
    }

    /// Visible length: `min(internal_size, maxsize)`.
    pub fn len(&self) -> usize {
        self.entries.len().min(self.maxsize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.entries.iter().take(self.maxsize).map(|(_, n)| n)
    }

    pub fn to_vec(&self) -> Vec<Node> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_identity_and_symmetry() {
        let a = Node::peer("127.0.0.1", 9001);
        let b = Node::peer("127.0.0.1", 9002);
        assert_eq!(a.distance_to(&a), NodeId::ZERO);
        assert_eq!(a.distance_to(&b), b.distance_to(&a));
    }

    #[test]
    fn distance_is_deterministic() {
        let a1 = Node::peer("10.0.0.1", 4000);
        let a2 = Node::peer("10.0.0.1", 4000);
        assert_eq!(a1.digest(), a2.digest());
    }

    #[test]
    fn node_heap_respects_maxsize_and_order() {
        let target = NodeId::from_key(b"target");
        let mut heap = NodeHeap::new(target, 2);
        heap.push(vec![
            Node::peer("127.0.0.1", 1),
            Node::peer("127.0.0.1", 2),
            Node::peer("127.0.0.1", 3),
        ]);
        assert_eq!(heap.len(), 2);
        let ids = heap.to_vec();
        assert!((target ^ ids[0].digest()) <= (target ^ ids[1].digest()));
    }

    #[test]
    fn node_heap_contacted_tracking() {
        let target = NodeId::from_key(b"target");
        let mut heap = NodeHeap::new(target, 20);
        let n = Node::peer("127.0.0.1", 1);
        heap.push_one(n.clone());
        assert!(!heap.have_contacted_all());
        heap.mark_contacted(&n);
        assert!(heap.have_contacted_all());
    }

    #[test]
    fn node_heap_remove_keeps_hidden_entries() {
        let target = NodeId::from_key(b"target");
        let mut heap = NodeHeap::new(target, 1);
        heap.push(vec![Node::peer("127.0.0.1", 1), Node::peer("127.0.0.1", 2)]);
        let visible = heap.to_vec();
        let mut to_remove = std::collections::HashSet::new();
        to_remove.insert(visible[0].key().to_string());
        heap.remove(&to_remove);
        assert_eq!(heap.len(), 1);
    }
}
