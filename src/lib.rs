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

//! Kademlia distributed hash table engine: node identity and the XOR
//! metric, a k-bucket routing table, a length-framed UDP RPC transport, the
//! four Kademlia RPCs, iterative α-parallel lookups, TTL-backed local
//! storage, and the housekeeping loops that keep a long-running node useful
//! to its peers.
//!
//! The entry point is [`Server`]; build a [`Config`] and call
//! [`Server::listen`].

pub mod config;
pub mod crawl;
pub mod error;
pub mod kbucket;
pub mod metrics;
pub mod node;
pub mod protocol;
pub mod routing;
pub mod rpc;
pub mod server;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::DhtError;
pub use metrics::Metrics;
pub use node::{Node, NodeId, NodeKind};
pub use protocol::KademliaProtocol;
pub use server::Server;
pub use state::StateSnapshot;
pub use storage::{DiskStorage, MemoryStorage, Storage};
