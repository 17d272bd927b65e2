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

//! Lifecycle and public API: bind, bootstrap, get/set, and the periodic
//! housekeeping loops (bucket refresh, republish, state snapshot). Grounded
//! on `kademlia/network.py::Server`.

use crate::config::Config;
use crate::crawl;
use crate::error::DhtError;
use crate::metrics::Metrics;
use crate::node::Node;
use crate::protocol::KademliaProtocol;
use crate::rpc::transport::{RequestHandler, UdpTransport};
use crate::state::StateSnapshot;
use crate::storage::{DiskStorage, MemoryStorage, Storage};
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use wasm_timer::Delay;

pub struct Server {
    protocol: Arc<KademliaProtocol>,
    config: Config,
    metrics: Arc<Metrics>,
    transport_handle: async_std::task::JoinHandle<()>,
    refresh_stop: async_std::channel::Sender<()>,
    republish_stop: async_std::channel::Sender<()>,
    save_state_stop: async_std::channel::Sender<()>,
}

impl Server {
    /// Bind a UDP socket and start serving RPCs. The returned `Server` owns
    /// three background loops (transport receive, bucket refresh, republish
    /// + periodic state save) until `stop()` is called.
    pub async fn listen(config: Config) -> Result<Self, DhtError> {
        config.validate()?;

        let transport = Arc::new(UdpTransport::bind(&config.interface, config.port).await?);
        let bound_addr = transport.local_addr()?;
        let source = Node::peer(bound_addr.ip().to_string(), bound_addr.port());

        let storage: Box<dyn Storage> = match &config.storage_dir {
            Some(dir) => Box::new(DiskStorage::open(dir.clone(), config.ttl)?),
            None => Box::new(MemoryStorage::new(config.ttl)),
        };

        let metrics = Arc::new(Metrics::new());
        let protocol = KademliaProtocol::new(source, transport.clone(), storage, config.clone(), metrics.clone());

        let handler: Arc<dyn RequestHandler> = protocol.clone();
        let transport_handle = async_std::task::spawn(async move {
            transport.run(handler).await;
        });

        let (refresh_tx, refresh_rx) = async_std::channel::unbounded();
        let (republish_tx, republish_rx) = async_std::channel::unbounded();
        let (save_tx, save_rx) = async_std::channel::unbounded();

        spawn_refresh_loop(protocol.clone(), config.clone(), refresh_rx);
        spawn_republish_loop(protocol.clone(), config.clone(), republish_rx);
        spawn_save_state_loop(protocol.clone(), config.clone(), save_rx);

        Ok(Server {
            protocol,
            config,
            metrics,
            transport_handle,
            refresh_stop: refresh_tx,
            republish_stop: republish_tx,
            save_state_stop: save_tx,
        })
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn source(&self) -> &Node {
        self.protocol.source()
    }

    /// Seed the routing table from a set of known-good peers and crawl for
    /// our own id, populating neighbors the way a fresh node would learn of
    /// the network.
    pub async fn bootstrap(&self, seed: Vec<Node>) {
        for node in &seed {
            self.protocol.welcome_if_new(node.clone()).await;
        }
        let own_id = self.protocol.source().digest();
        crawl::find_nodes(self.protocol.clone(), own_id, seed, self.config.ksize, self.config.alpha).await;
    }

    /// Rejoin the network from a previously saved snapshot.
    pub async fn load_state(&self, path: &std::path::Path) -> Result<(), DhtError> {
        let snapshot = StateSnapshot::load(path)?;
        self.bootstrap(snapshot.bootstrap_nodes()).await;
        Ok(())
    }

    /// Fetch `key`, trying local storage first, then an iterative value
    /// crawl. A value found remotely is cached at the nearest peer that
    /// didn't have it (fire-and-forget), matching the source's write-back.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(value) = self.protocol.storage().lock().await.get(key) {
            return Some(value);
        }

        let neighbors = self.protocol.routing().lock().await.find_neighbors(
            crate::node::NodeId::from_key(key.as_bytes()),
            Some(self.config.ksize),
            None,
        );
        if neighbors.is_empty() {
            return None;
        }

        let (value, nearest_without_value) =
            crawl::find_value(self.protocol.clone(), key, neighbors, self.config.ksize, self.config.alpha).await?;

        if let Some(node) = nearest_without_value {
            let protocol = self.protocol.clone();
            let key = key.to_string();
            let value = value.clone();
            async_std::task::spawn(async move {
                protocol.call_store(&node, &key, value).await;
            });
        }

        Some(value)
    }

    /// Store `value` at the nodes nearest the key, crawling the network to
    /// find them rather than relying on a single-hop routing table lookup.
    /// `value` is encoded with MessagePack before being treated as an opaque
    /// byte string everywhere else in the engine; an encoding failure (e.g.
    /// a `NaN` float) surfaces as `DhtError::InvalidValueType`, matching the
    /// source's single up-front type check before any RPC is issued.
    ///
    /// Returns `Ok(false)` rather than an error when we have no known
    /// neighbors to store to — the absence of neighbors isn't a fault, just
    /// nothing to do yet. Otherwise returns whether at least one replica
    /// store actually succeeded.
    pub async fn set<V: Serialize>(&self, key: impl Into<String>, value: V) -> Result<bool, DhtError> {
        let key = key.into();
        let bytes = rmp_serde::to_vec(&value).map_err(|_| DhtError::InvalidValueType)?;
        let target = crate::node::NodeId::from_key(key.as_bytes());

        let seed = self.protocol.routing().lock().await.find_neighbors(target, Some(self.config.ksize), None);
        if seed.is_empty() {
            log::warn!("no known neighbors to store key {}", key);
            return Ok(false);
        }

        let nodes =
            crawl::find_nodes(self.protocol.clone(), target, seed, self.config.ksize, self.config.alpha).await;
        if nodes.is_empty() {
            return Ok(false);
        }

        // Only keep a local copy if we're actually closer to the key than
        // the furthest node we'd be replicating to — otherwise we're not a
        // real replica-holder, just the node that happened to run `set`.
        let furthest = nodes.iter().map(|n| n.distance_to_id(target)).max().unwrap();
        if self.protocol.source().distance_to_id(target) < furthest {
            self.protocol.storage().lock().await.set(&key, bytes.clone());
        }

        let results = futures::future::join_all(nodes.iter().map(|node| {
            let protocol = self.protocol.clone();
            let key = key.clone();
            let bytes = bytes.clone();
            let node = node.clone();
            async move { protocol.call_store(&node, &key, bytes).await }
        }))
        .await;

        Ok(results.into_iter().any(|stored| stored))
    }

    /// Stop all background loops. The transport receive loop is cancelled
    /// directly (it blocks on `recv_from`, with nothing to select against);
    /// the two interval loops are asked to stop via their channel, which is
    /// how they actually notice between ticks.
    pub async fn stop(self) {
        let _ = self.refresh_stop.send(()).await;
        let _ = self.republish_stop.send(()).await;
        let _ = self.save_state_stop.send(()).await;
        self.transport_handle.cancel().await;
    }
}

fn spawn_refresh_loop(protocol: Arc<KademliaProtocol>, config: Config, stop: async_std::channel::Receiver<()>) {
    async_std::task::spawn(async move {
        loop {
            let tick = Delay::new(config.refresh_interval);
            futures::pin_mut!(tick);
            futures::select! {
                _ = tick.fuse() => {}
                _ = stop.recv().fuse() => return,
            }

            let ids = protocol.get_refresh_ids().await;
            for id in ids {
                let seed = protocol.routing().lock().await.find_neighbors(id, Some(config.ksize), None);
                crawl::find_nodes(protocol.clone(), id, seed, config.ksize, config.alpha).await;
            }
        }
    });
}

fn spawn_republish_loop(protocol: Arc<KademliaProtocol>, config: Config, stop: async_std::channel::Receiver<()>) {
    async_std::task::spawn(async move {
        loop {
            let tick = Delay::new(config.republish_interval);
            futures::pin_mut!(tick);
            futures::select! {
                _ = tick.fuse() => {}
                _ = stop.recv().fuse() => return,
            }

            let entries = protocol.storage().lock().await.iter_older_than(config.republish_interval);
            for (key, value) in entries {
                let target = crate::node::NodeId::from_key(key.as_bytes());
                let neighbors = protocol.routing().lock().await.find_neighbors(target, Some(config.ksize), None);
                for node in neighbors {
                    let protocol = protocol.clone();
                    let key = key.clone();
                    let value = value.clone();
                    async_std::task::spawn(async move {
                        protocol.call_store(&node, &key, value).await;
                    });
                }
            }
        }
    });
}

fn spawn_save_state_loop(protocol: Arc<KademliaProtocol>, config: Config, stop: async_std::channel::Receiver<()>) {
    async_std::task::spawn(async move {
        let path = match &config.state_path {
            Some(path) => path.clone(),
            None => return,
        };
        loop {
            let tick = Delay::new(config.save_state_interval);
            futures::pin_mut!(tick);
            futures::select! {
                _ = tick.fuse() => {}
                _ = stop.recv().fuse() => return,
            }

            let neighbors = protocol.routing().lock().await.find_neighbors(protocol.source().digest(), None, None);
            let snapshot = StateSnapshot::new(
                config.interface.clone(),
                config.port,
                config.ksize,
                config.alpha,
                protocol.source().digest(),
                neighbors,
            );
            if let Err(err) = snapshot.save(&path) {
                log::error!("failed to save state snapshot: {}", err);
            }
        }
    });
}

