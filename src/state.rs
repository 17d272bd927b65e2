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

//! Bootstrap state snapshot: enough to rejoin the network without a fresh
//! bootstrap list. Grounded on `kademlia/network.py::Server.save_state`/
//! `load_state`, using `bincode` in place of Python's `pickle`.

use crate::error::DhtError;
use crate::node::{Node, NodeId, ID_BYTES};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize)]
pub struct StateSnapshot {
    pub interface: String,
    pub port: u16,
    pub ksize: usize,
    pub alpha: usize,
    pub id: [u8; ID_BYTES],
    pub neighbors: Vec<(String, u16)>,
}

impl StateSnapshot {
    pub fn new(interface: String, port: u16, ksize: usize, alpha: usize, id: NodeId, neighbors: Vec<Node>) -> Self {
        let neighbors =
            neighbors.iter().filter_map(|n| n.as_peer()).map(|(ip, port)| (ip.to_string(), port)).collect();
        StateSnapshot { interface, port, ksize, alpha, id: *id.as_bytes(), neighbors }
    }

    pub fn id(&self) -> NodeId {
        NodeId::from_bytes(self.id)
    }

    pub fn bootstrap_nodes(&self) -> Vec<Node> {
        self.neighbors.iter().map(|(ip, port)| Node::peer(ip.clone(), *port)).collect()
    }

    pub fn save(&self, path: &Path) -> Result<(), DhtError> {
        let bytes = bincode::serialize(self).map_err(|err| DhtError::State(err.to_string()))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, DhtError> {
        let bytes = std::fs::read(path)?;
        bincode::deserialize(&bytes).map_err(|err| DhtError::State(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("kaddht-state-test-{:?}", std::time::Instant::now()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.bin");

        let neighbors = vec![Node::peer("10.0.0.1", 9000), Node::peer("10.0.0.2", 9001)];
        let snapshot =
            StateSnapshot::new("0.0.0.0".to_string(), 9000, 20, 3, NodeId::random(), neighbors);
        snapshot.save(&path).unwrap();

        let loaded = StateSnapshot::load(&path).unwrap();
        assert_eq!(loaded.id(), snapshot.id());
        assert_eq!(loaded.bootstrap_nodes().len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn loading_missing_file_errors() {
        let path = std::env::temp_dir().join("kaddht-state-test-missing.bin");
        assert!(StateSnapshot::load(&path).is_err());
    }
}
