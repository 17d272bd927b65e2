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

//! Length-framed UDP request/response multiplexer. Grounded on
//! `kademlia/network.py`'s `Server._listen`/transport pairing with
//! `rpc.py::RPCMessageQueue`, translated into explicit locked tables instead
//! of relying on asyncio's single-thread scheduling (SPEC_FULL.md §5).

use crate::error::DhtError;
use crate::rpc::message::{decode, encode_request, encode_response, Frame, MessageId, MAX_PAYLOAD_SIZE};
use async_std::net::UdpSocket;
use async_std::sync::Mutex;
use async_trait::async_trait;
use fnv::FnvHashMap;
use futures::channel::oneshot;
use futures::select;
use futures::FutureExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Invoked once per inbound request after the transport has demultiplexed
/// it from responses. Implemented by `KademliaProtocol`; kept separate from
/// `UdpTransport` so the transport has no knowledge of routing tables or
/// storage, only of framing and correlation.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// `None` means the request is dropped with no reply sent — used for
    /// unrecognized RPC names, so a prober learns nothing from the silence.
    async fn handle(&self, from: SocketAddr, name: String, args: rmpv::Value) -> Option<rmpv::Value>;
}

type InFlight = Arc<Mutex<FnvHashMap<MessageId, oneshot::Sender<rmpv::Value>>>>;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    in_flight: InFlight,
}

impl UdpTransport {
    pub async fn bind(interface: &str, port: u16) -> Result<Self, DhtError> {
        let socket = UdpSocket::bind((interface, port)).await?;
        Ok(UdpTransport { socket: Arc::new(socket), in_flight: Arc::new(Mutex::new(FnvHashMap::default())) })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DhtError> {
        Ok(self.socket.local_addr()?)
    }

    /// Drive the receive loop. Runs until the socket errors (normally only
    /// on shutdown, when the caller drops the transport and the task is
    /// cancelled from outside). Every inbound request is handed to `handler`
    /// on its own spawned task so a slow handler (e.g. one that issues
    /// nested RPCs) never blocks draining the socket, per §4.5.
    pub async fn run(&self, handler: Arc<dyn RequestHandler>) {
        let mut buf = vec![0u8; MAX_PAYLOAD_SIZE];
        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(err) => {
                    log::error!("udp transport recv failed: {}", err);
                    return;
                }
            };

            match decode(&buf[..len]) {
                Some(Frame::Request { id, name, args }) => {
                    let socket = self.socket.clone();
                    let handler = handler.clone();
                    async_std::task::spawn(async move {
                        let body = match handler.handle(from, name, args).await {
                            Some(body) => body,
                            None => return,
                        };
                        match encode_response(id, body) {
                            Ok(bytes) => {
                                if let Err(err) = socket.send_to(&bytes, from).await {
                                    log::warn!("failed to send response to {}: {}", from, err);
                                }
                            }
                            Err(err) => log::warn!("failed to encode response to {}: {}", from, err),
                        }
                    });
                }
                Some(Frame::Response { id, body }) => {
                    let in_flight = self.in_flight.clone();
                    async_std::task::spawn(async move {
                        let mut table = in_flight.lock().await;
                        if let Some(sender) = table.remove(&id) {
                            let _ = sender.send(body);
                        }
                    });
                }
                None => {
                    log::warn!("dropping malformed datagram from {}", from);
                }
            }
        }
    }

    /// Send a request to `to` and wait up to `timeout` for the matching
    /// response. Returns `None` on timeout or any I/O/encode failure;
    /// callers distinguish "no reply" from "decode failure" only by logging,
    /// per the masked-fault policy in §7.
    pub async fn call(&self, to: SocketAddr, name: &str, args: rmpv::Value, timeout: Duration) -> Option<rmpv::Value> {
        let (id, bytes) = match encode_request(name, args) {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("failed to encode request {} to {}: {}", name, to, err);
                return None;
            }
        };

        let (sender, receiver) = oneshot::channel();
        {
            let mut table = self.in_flight.lock().await;
            table.insert(id, sender);
        }

        if let Err(err) = self.socket.send_to(&bytes, to).await {
            log::warn!("failed to send request {} to {}: {}", name, to, err);
            self.in_flight.lock().await.remove(&id);
            return None;
        }

        let mut delay = wasm_timer::Delay::new(timeout).fuse();
        let mut reply = receiver.fuse();
        let result = select! {
            body = reply => body.ok(),
            _ = delay => {
                self.in_flight.lock().await.remove(&id);
                None
            }
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, _from: SocketAddr, _name: String, args: rmpv::Value) -> Option<rmpv::Value> {
            Some(args)
        }
    }

    #[async_std::test]
    async fn request_response_round_trip() {
        let server = Arc::new(UdpTransport::bind("127.0.0.1", 0).await.unwrap());
        let server_addr = server.local_addr().unwrap();
        let server_loop = server.clone();
        async_std::task::spawn(async move {
            server_loop.run(Arc::new(Echo)).await;
        });

        let client = UdpTransport::bind("127.0.0.1", 0).await.unwrap();
        let args = rmpv::Value::Array(vec![42.into()]);
        let reply = client.call(server_addr, "ping", args.clone(), Duration::from_secs(1)).await;
        assert_eq!(reply, Some(args));
    }

    #[async_std::test]
    async fn call_times_out_when_nothing_answers() {
        let client = UdpTransport::bind("127.0.0.1", 0).await.unwrap();
        let dead_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let reply = client.call(dead_addr, "ping", rmpv::Value::Nil, Duration::from_millis(50)).await;
        assert_eq!(reply, None);
    }
}
