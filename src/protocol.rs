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

//! The five Kademlia RPCs (handlers + client-side wrappers), welcome-new-node
//! replication, and the `Pinger` implementation that lets the routing table
//! liveness-check a bucket head without holding a reference back to this
//! type directly. Grounded on `kademlia/protocol.py::KademliaProtocol`.

use crate::config::Config;
use crate::metrics::Metrics;
use crate::node::{Node, NodeId};
use crate::routing::{Pinger, RoutingTable};
use crate::rpc::transport::{RequestHandler, UdpTransport};
use crate::storage::Storage;
use async_std::sync::Mutex;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// What `call_find_value` got back: either the value was stored locally at
/// the remote peer, or it wasn't and the peer suggests closer nodes.
pub enum FindValueResult {
    Value(Vec<u8>),
    Nodes(Vec<Node>),
}

fn node_addr(node: &Node) -> Option<SocketAddr> {
    let (ip, port) = node.as_peer()?;
    format!("{}:{}", ip, port).parse().ok()
}

fn encode_node_ref(node: &Node) -> rmpv::Value {
    let (ip, port) = node.as_peer().expect("only peer nodes travel over the wire");
    rmpv::Value::Array(vec![node.key().into(), ip.into(), (port as i64).into()])
}

fn decode_node_ref(value: &rmpv::Value) -> Option<Node> {
    let items = value.as_array()?;
    if items.len() != 3 {
        return None;
    }
    let ip = items[1].as_str()?.to_string();
    let port = items[2].as_u64()? as u16;
    Some(Node::peer(ip, port))
}

fn encode_node_list(nodes: &[Node]) -> rmpv::Value {
    rmpv::Value::Array(nodes.iter().map(encode_node_ref).collect())
}

fn decode_node_list(value: &rmpv::Value) -> Vec<Node> {
    value.as_array().map(|items| items.iter().filter_map(decode_node_ref).collect()).unwrap_or_default()
}

/// Encode a `find_value` hit as a bare `{"value": bytes}` map.
fn encode_value_response(value: Vec<u8>) -> rmpv::Value {
    rmpv::Value::Map(vec![(rmpv::Value::String("value".into()), rmpv::Value::Binary(value))])
}

/// A `find_value` response is a map when the peer had the value, or a plain
/// node list (no wrapping) when it didn't.
fn decode_find_value_response(value: &rmpv::Value) -> Option<FindValueResult> {
    match value {
        rmpv::Value::Map(entries) => {
            let bytes = entries.iter().find(|(k, _)| k.as_str() == Some("value"))?.1.as_slice()?;
            Some(FindValueResult::Value(bytes.to_vec()))
        }
        rmpv::Value::Array(_) => Some(FindValueResult::Nodes(decode_node_list(value))),
        _ => None,
    }
}

/// Send a bare liveness probe without going through the full protocol
/// dispatch, since this is called from `ProtocolPinger`, which only has a
/// transport handle and no storage/routing-table access of its own.
async fn ping_once(transport: &UdpTransport, to: &Node, timeout: Duration) -> bool {
    let addr = match node_addr(to) {
        Some(addr) => addr,
        None => return false,
    };
    let args = rmpv::Value::Array(vec![]);
    transport.call(addr, "ping", args, timeout).await.is_some()
}

/// Implements `Pinger` for the routing table without exposing anything else
/// about `KademliaProtocol`. Holds only a transport handle and a weak
/// back-reference to the routing table it serves, breaking the
/// protocol<->routing-table cycle (SPEC_FULL.md §4.4).
pub struct ProtocolPinger {
    transport: Arc<UdpTransport>,
    routing: Weak<Mutex<RoutingTable<ProtocolPinger>>>,
    rpc_timeout: Duration,
}

#[async_trait]
impl Pinger for ProtocolPinger {
    async fn probe_and_replace(&self, head: Node, candidate: Node) {
        if ping_once(&self.transport, &head, self.rpc_timeout).await {
            return;
        }
        if let Some(routing) = self.routing.upgrade() {
            let mut table = routing.lock().await;
            table.replace_head(&head, candidate);
        }
    }
}

fn build_routing(
    source: Node,
    ksize: usize,
    replacement_capacity: usize,
    transport: Arc<UdpTransport>,
    rpc_timeout: Duration,
) -> Arc<Mutex<RoutingTable<ProtocolPinger>>> {
    Arc::new_cyclic(|weak_routing| {
        let pinger = Arc::new(ProtocolPinger { transport, routing: weak_routing.clone(), rpc_timeout });
        Mutex::new(RoutingTable::new(source, ksize, replacement_capacity, pinger))
    })
}

/// The Kademlia RPC layer: five request handlers, matching client-side
/// wrappers, and the welcome-new-node replication rule. Owns the routing
/// table and storage behind locks shared with `Server`.
pub struct KademliaProtocol {
    source: Node,
    transport: Arc<UdpTransport>,
    routing: Arc<Mutex<RoutingTable<ProtocolPinger>>>,
    storage: Arc<Mutex<Box<dyn Storage>>>,
    config: Config,
    metrics: Arc<Metrics>,
    self_ref: Weak<KademliaProtocol>,
}

impl KademliaProtocol {
    pub fn new(
        source: Node,
        transport: Arc<UdpTransport>,
        storage: Box<dyn Storage>,
        config: Config,
        metrics: Arc<Metrics>,
    ) -> Arc<KademliaProtocol> {
        let routing =
            build_routing(source.clone(), config.ksize, config.ksize, transport.clone(), config.rpc_timeout);
        Arc::new_cyclic(|weak_self| KademliaProtocol {
            source,
            transport,
            routing,
            storage: Arc::new(Mutex::new(storage)),
            config,
            metrics,
            self_ref: weak_self.clone(),
        })
    }

    pub fn source(&self) -> &Node {
        &self.source
    }

    pub fn routing(&self) -> &Arc<Mutex<RoutingTable<ProtocolPinger>>> {
        &self.routing
    }

    pub fn storage(&self) -> &Arc<Mutex<Box<dyn Storage>>> {
        &self.storage
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn get_refresh_ids(&self) -> Vec<NodeId> {
        self.routing.lock().await.get_refresh_ids()
    }

    /// After any call completes, either drop the peer (no reply) or welcome
    /// it as freshly confirmed-alive. Mirrors
    /// `KademliaProtocol.handle_call_response`.
    async fn handle_call_response(&self, node: &Node, responded: bool) {
        if !responded {
            log::warn!("no reply from {}, dropping from routing table", node);
            self.routing.lock().await.remove_contact(node);
            self.metrics.record_rpc_timeout();
        } else {
            self.welcome_if_new(node.clone()).await;
        }
    }

    /// Admit a newly-observed peer: if it wasn't already known, replicate
    /// locally-stored keys it should now hold a replica of (fire-and-forget),
    /// then record it in the routing table either way (refreshes its LRU
    /// position if already known).
    ///
    /// A key is replicated to `node` only if `node` is closer to the key
    /// than the current furthest of our known neighbors for that key, *and*
    /// either we have no neighbors for it yet or we are ourselves closer to
    /// it than the current closest neighbor — i.e. only when we look like an
    /// actual replica-holder for that key, not merely a node that happens to
    /// know one closer than itself.
    pub async fn welcome_if_new(&self, node: Node) {
        let is_new = self.routing.lock().await.is_new_node(&node);

        if is_new {
            self.metrics.record_peer_welcomed();
            let entries = self.storage.lock().await.iter();
            for (key, value) in entries {
                let key_id = NodeId::from_key(key.as_bytes());
                let neighbors = self.routing.lock().await.find_neighbors(key_id, Some(self.config.ksize), None);

                let should_replicate = match (neighbors.first(), neighbors.last()) {
                    (Some(closest), Some(furthest)) => {
                        let node_is_close = node.distance_to_id(key_id) < furthest.distance_to_id(key_id);
                        let we_are_closest = self.source.distance_to_id(key_id) < closest.distance_to_id(key_id);
                        node_is_close && we_are_closest
                    }
                    _ => true,
                };

                if should_replicate {
                    if let Some(handle) = self.self_ref.upgrade() {
                        let target = node.clone();
                        async_std::task::spawn(async move {
                            handle.call_store(&target, &key, value).await;
                        });
                    }
                }
            }
        }

        self.routing.lock().await.add_contact(node, false);
    }

    // ---- client-side wrappers ----

    pub async fn call_ping(&self, to: &Node) -> bool {
        let addr = match node_addr(to) {
            Some(addr) => addr,
            None => return false,
        };
        let args = rmpv::Value::Array(vec![self.source.key().into()]);
        let reply = self.transport.call(addr, "ping", args, self.config.rpc_timeout).await;
        let responded = reply.is_some();
        self.handle_call_response(to, responded).await;
        responded
    }

    pub async fn call_store(&self, to: &Node, key: &str, value: Vec<u8>) -> bool {
        let addr = match node_addr(to) {
            Some(addr) => addr,
            None => return false,
        };
        let args = rmpv::Value::Array(vec![self.source.key().into(), key.into(), rmpv::Value::Binary(value)]);
        let reply = self.transport.call(addr, "store", args, self.config.rpc_timeout).await;
        let responded = reply.is_some();
        self.handle_call_response(to, responded).await;
        responded
    }

    pub async fn call_find_node(&self, to: &Node, target: NodeId) -> Vec<Node> {
        let addr = match node_addr(to) {
            Some(addr) => addr,
            None => return Vec::new(),
        };
        let args = rmpv::Value::Array(vec![
            self.source.key().into(),
            rmpv::Value::Binary(target.as_bytes().to_vec()),
        ]);
        let reply = self.transport.call(addr, "find_node", args, self.config.rpc_timeout).await;
        let responded = reply.is_some();
        self.handle_call_response(to, responded).await;
        reply.map(|body| decode_node_list(&body)).unwrap_or_default()
    }

    pub async fn call_find_value(&self, to: &Node, key: &str) -> Option<FindValueResult> {
        let addr = node_addr(to)?;
        let args = rmpv::Value::Array(vec![self.source.key().into(), key.into()]);
        let reply = self.transport.call(addr, "find_value", args, self.config.rpc_timeout).await;
        let responded = reply.is_some();
        self.handle_call_response(to, responded).await;

        let body = reply?;
        decode_find_value_response(&body)
    }

    pub async fn call_stun(&self, to: &Node) -> Option<(String, u16)> {
        let addr = node_addr(to)?;
        let reply = self.transport.call(addr, "stun", rmpv::Value::Array(vec![]), self.config.rpc_timeout).await?;
        let items = reply.as_array()?;
        if items.len() != 2 {
            return None;
        }
        Some((items[0].as_str()?.to_string(), items[1].as_u64()? as u16))
    }

    // ---- request handlers ----

    async fn rpc_ping(&self, from: SocketAddr, args: &rmpv::Value) -> rmpv::Value {
        let sender = args.as_array().and_then(|items| items.first()).and_then(|k| sender_from_key(k, from));
        if let Some(sender) = sender {
            self.welcome_if_new(sender).await;
        }
        rmpv::Value::Binary(self.source.digest().as_bytes().to_vec())
    }

    async fn rpc_store(&self, from: SocketAddr, args: &rmpv::Value) -> rmpv::Value {
        let items = match args.as_array() {
            Some(items) if items.len() == 3 => items,
            _ => return rmpv::Value::Boolean(false),
        };
        if let Some(sender) = sender_from_key(&items[0], from) {
            self.welcome_if_new(sender).await;
        }
        let key = match items[1].as_str() {
            Some(k) => k.to_string(),
            None => return rmpv::Value::Boolean(false),
        };
        let value = match items[2].as_slice() {
            Some(bytes) => bytes.to_vec(),
            None => return rmpv::Value::Boolean(false),
        };
        self.storage.lock().await.set(&key, value);
        rmpv::Value::Boolean(true)
    }

    async fn rpc_find_node(&self, from: SocketAddr, args: &rmpv::Value) -> rmpv::Value {
        let items = match args.as_array() {
            Some(items) if items.len() == 2 => items,
            _ => return encode_node_list(&[]),
        };
        let sender = sender_from_key(&items[0], from);
        let target_bytes = match items[1].as_slice() {
            Some(b) if b.len() == crate::node::ID_BYTES => b,
            _ => return encode_node_list(&[]),
        };
        let mut target_id = [0u8; crate::node::ID_BYTES];
        target_id.copy_from_slice(target_bytes);
        let target = NodeId::from_bytes(target_id);

        if let Some(sender) = sender.clone() {
            self.welcome_if_new(sender).await;
        }

        let routing = self.routing.lock().await;
        let neighbors = routing.find_neighbors(target, None, sender.as_ref());
        encode_node_list(&neighbors)
    }

    async fn rpc_find_value(&self, from: SocketAddr, args: &rmpv::Value) -> rmpv::Value {
        let items = match args.as_array() {
            Some(items) if items.len() == 2 => items,
            _ => return encode_node_list(&[]),
        };
        let sender = sender_from_key(&items[0], from);
        let key = match items[1].as_str() {
            Some(k) => k.to_string(),
            None => return encode_node_list(&[]),
        };

        if let Some(sender) = sender.clone() {
            self.welcome_if_new(sender).await;
        }

        if let Some(value) = self.storage.lock().await.get(&key) {
            return encode_value_response(value);
        }

        let target = NodeId::from_key(key.as_bytes());
        let routing = self.routing.lock().await;
        let neighbors = routing.find_neighbors(target, None, sender.as_ref());
        encode_node_list(&neighbors)
    }

    async fn rpc_stun(&self, from: SocketAddr) -> rmpv::Value {
        rmpv::Value::Array(vec![from.ip().to_string().into(), (from.port() as i64).into()])
    }
}

fn sender_from_key(key_value: &rmpv::Value, from: SocketAddr) -> Option<Node> {
    let _ = key_value.as_str()?;
    Some(Node::peer(from.ip().to_string(), from.port()))
}

#[async_trait]
impl RequestHandler for KademliaProtocol {
    async fn handle(&self, from: SocketAddr, name: String, args: rmpv::Value) -> Option<rmpv::Value> {
        match name.as_str() {
            "ping" => Some(self.rpc_ping(from, &args).await),
            "store" => Some(self.rpc_store(from, &args).await),
            "find_node" => Some(self.rpc_find_node(from, &args).await),
            "find_value" => Some(self.rpc_find_value(from, &args).await),
            "stun" => Some(self.rpc_stun(from).await),
            other => {
                log::warn!("dropping unknown rpc {} from {}", other, from);
                None
            }
        }
    }
}
