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

//! Lightweight observability counters. The core engine has no HTTP/Prometheus
//! surface of its own (that's a CLI/collaborator concern, per SPEC_FULL.md
//! §1), so this is a handful of atomics a collaborator can sample and export
//! however it likes — the same role `misc/metrics` plays for libp2p-kad, just
//! without a registry dependency for a single counter family.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    /// Incremented each time a value crawl collects more than one distinct
    /// value for the same key (DESIGN.md Open Question 3).
    value_disagreements: AtomicU64,
    /// Incremented on every RPC timeout (no reply within the configured wait).
    rpc_timeouts: AtomicU64,
    /// Incremented every time `welcome_if_new` admits a previously-unknown peer.
    peers_welcomed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn record_value_disagreement(&self) {
        self.value_disagreements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_timeout(&self) {
        self.rpc_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_welcomed(&self) {
        self.peers_welcomed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value_disagreements(&self) -> u64 {
        self.value_disagreements.load(Ordering::Relaxed)
    }

    pub fn rpc_timeouts(&self) -> u64 {
        self.rpc_timeouts.load(Ordering::Relaxed)
    }

    pub fn peers_welcomed(&self) -> u64 {
        self.peers_welcomed.load(Ordering::Relaxed)
    }
}
