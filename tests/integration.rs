//! End-to-end scenarios over real loopback UDP sockets.

use kaddht::{Config, Node, Server};
use std::time::Duration;

fn test_config() -> Config {
    Config::new("127.0.0.1", 0).with_rpc_timeout(Duration::from_millis(300))
}

#[async_std::test]
async fn set_then_get_across_two_peers() {
    let a = Server::listen(test_config()).await.unwrap();
    let b = Server::listen(test_config()).await.unwrap();

    let a_as_seed = a.source().clone();
    b.bootstrap(vec![a_as_seed]).await;

    b.set("greeting", "hello").await.unwrap();

    let value: Option<String> = a.get("greeting").await.map(|bytes| rmp_serde::from_slice(&bytes).unwrap());
    assert_eq!(value.as_deref(), Some("hello"));

    a.stop().await;
    b.stop().await;
}

#[async_std::test]
async fn get_on_absent_key_returns_none() {
    let a = Server::listen(test_config()).await.unwrap();
    assert_eq!(a.get("nothing-stored-here").await, None);
    a.stop().await;
}

#[async_std::test]
async fn unreachable_bootstrap_peer_does_not_hang_a_crawl() {
    let a = Server::listen(test_config()).await.unwrap();
    let dead = Node::peer("127.0.0.1", 1);
    a.bootstrap(vec![dead]).await;
    // A peer that never answers a single RPC never gets welcomed into the
    // routing table, so the lookup has no neighbors to query and terminates
    // immediately instead of hanging on a dead address.
    assert_eq!(a.get("anything").await, None);
    a.stop().await;
}
