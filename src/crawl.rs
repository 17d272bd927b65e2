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

//! Iterative α-parallel lookups ("spider crawl"). Grounded on
//! `kademlia/crawling.py::SpiderCrawl`/`NodeSpiderCrawl`/`ValueSpiderCrawl`.

use crate::node::{Node, NodeHeap, NodeId};
use crate::protocol::{FindValueResult, KademliaProtocol};
use std::collections::HashSet;
use std::sync::Arc;

/// Drive rounds of parallel queries against the nearest uncontacted nodes in
/// `heap`, stopping once every visible node has been queried. `query` issues
/// one RPC and reports back any nodes it learned of (so the heap can grow
/// with closer candidates); its own per-node result is returned verbatim to
/// the caller for round-specific bookkeeping.
///
/// Each round queries up to `alpha` nodes, except when the previous round
/// left the visible nearest-node set unchanged (none of the new discoveries
/// made it into view) — then the round widens to query everything currently
/// visible, so a crawl can't stall forever circling the same `alpha`
/// uncontacted nodes.
async fn run_rounds<T, F, Fut>(heap: &mut NodeHeap, alpha: usize, mut query: F) -> Vec<T>
where
    F: FnMut(Node) -> Fut,
    Fut: std::future::Future<Output = (T, Vec<Node>)>,
{
    let mut all_results = Vec::new();
    let mut last_ids_crawled: Option<Vec<String>> = None;
    loop {
        let current_ids = heap.get_ids();
        let count = if last_ids_crawled.as_ref() == Some(&current_ids) { heap.len() } else { alpha };
        last_ids_crawled = Some(current_ids);

        let batch: Vec<Node> = heap.get_uncontacted().into_iter().take(count).cloned().collect();
        if batch.is_empty() {
            break;
        }
        for node in &batch {
            heap.mark_contacted(node);
        }

        let outcomes = futures::future::join_all(batch.into_iter().map(|node| query(node))).await;
        for (result, discovered) in outcomes {
            heap.push(discovered);
            all_results.push(result);
        }

        if heap.have_contacted_all() {
            break;
        }
    }
    all_results
}

/// Iteratively find the `ksize` nodes nearest to `target`.
pub async fn find_nodes(
    protocol: Arc<KademliaProtocol>,
    target: NodeId,
    seed: Vec<Node>,
    ksize: usize,
    alpha: usize,
) -> Vec<Node> {
    let mut heap = NodeHeap::new(target, ksize);
    heap.push(seed);

    run_rounds(&mut heap, alpha, |node| {
        let protocol = protocol.clone();
        async move {
            let found = protocol.call_find_node(&node, target).await;
            ((), found)
        }
    })
    .await;

    heap.to_vec()
}

/// Iteratively search for `key`'s value. Returns the value plus the node
/// nearest the target that did *not* have it, so the caller can cache the
/// value there (`Server::get`'s write-back step). `None` if no peer had it.
pub async fn find_value(
    protocol: Arc<KademliaProtocol>,
    key: &str,
    seed: Vec<Node>,
    ksize: usize,
    alpha: usize,
) -> Option<(Vec<u8>, Option<Node>)> {
    let target = NodeId::from_key(key.as_bytes());
    let mut heap = NodeHeap::new(target, ksize);
    heap.push(seed);

    let key = key.to_string();
    let mut found_values: Vec<Vec<u8>> = Vec::new();
    let mut nearest_without_value: Option<Node> = None;
    let mut last_ids_crawled: Option<Vec<String>> = None;

    loop {
        let current_ids = heap.get_ids();
        let count = if last_ids_crawled.as_ref() == Some(&current_ids) { heap.len() } else { alpha };
        last_ids_crawled = Some(current_ids);

        let batch: Vec<Node> = heap.get_uncontacted().into_iter().take(count).cloned().collect();
        if batch.is_empty() {
            break;
        }
        for node in &batch {
            heap.mark_contacted(node);
        }

        let key = key.clone();
        let outcomes = futures::future::join_all(batch.into_iter().map(|node| {
            let protocol = protocol.clone();
            let key = key.clone();
            async move {
                let result = protocol.call_find_value(&node, &key).await;
                (node, result)
            }
        }))
        .await;

        for (node, result) in outcomes {
            match result {
                Some(FindValueResult::Value(value)) => found_values.push(value),
                Some(FindValueResult::Nodes(discovered)) => {
                    if nearest_without_value.is_none()
                        || target ^ node.digest() < target ^ nearest_without_value.as_ref().unwrap().digest()
                    {
                        nearest_without_value = Some(node);
                    }
                    heap.push(discovered);
                }
                None => {}
            }
        }

        if !found_values.is_empty() {
            break;
        }
        if heap.have_contacted_all() {
            break;
        }
    }

    if found_values.is_empty() {
        return None;
    }

    let distinct: HashSet<&Vec<u8>> = found_values.iter().collect();
    if distinct.len() > 1 {
        log::warn!("value disagreement for key {}: {} distinct values seen", key, distinct.len());
        protocol.metrics().record_value_disagreement();
    }

    let mut counts: Vec<(Vec<u8>, usize)> = Vec::new();
    for value in found_values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }
    let most_common = counts.into_iter().max_by_key(|(_, count)| *count).map(|(value, _)| value).unwrap();

    Some((most_common, nearest_without_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::sync::Mutex;

    #[async_std::test]
    async fn run_rounds_stops_when_all_contacted() {
        let target = NodeId::from_key(b"target");
        let mut heap = NodeHeap::new(target, 20);
        heap.push(vec![Node::peer("127.0.0.1", 1), Node::peer("127.0.0.1", 2)]);

        let call_count = Arc::new(Mutex::new(0usize));
        let results = run_rounds(&mut heap, 3, |_node| {
            let call_count = call_count.clone();
            async move {
                *call_count.lock().await += 1;
                ((), Vec::new())
            }
        })
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(*call_count.lock().await, 2);
        assert!(heap.have_contacted_all());
    }
}
