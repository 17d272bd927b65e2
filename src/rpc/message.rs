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

//! Wire framing: the 1-byte tag + 20-byte message id + MessagePack body
//! layout from SPEC_FULL.md §4.5. Grounded on `kademlia/rpc.py::Datagram` /
//! `Header`, with the dynamically-shaped body represented as `rmpv::Value`
//! instead of Python's duck-typed list, since handlers need to inspect a
//! request's shape (`[name, args]`) before they know the concrete argument
//! types.

use crate::error::DhtError;
use rand::RngCore;
use std::fmt;

pub const MAX_PAYLOAD_SIZE: usize = 8192;
const ID_LEN: usize = 20;
const HEADER_LEN: usize = 1 + ID_LEN;

const TAG_REQUEST: u8 = 0x00;
const TAG_RESPONSE: u8 = 0x01;

/// A 20-byte random id correlating a request with its response. Unrelated to
/// `NodeId` even though both happen to be 20 bytes; kept as a distinct type
/// so the two can't be confused at a call site.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct MessageId([u8; ID_LEN]);

impl MessageId {
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        MessageId(bytes)
    }

    fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; ID_LEN];
        out.copy_from_slice(bytes);
        MessageId(out)
    }

    fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A fully-decoded incoming datagram: either a request naming an RPC and its
/// positional arguments, or a response correlated by message id.
pub enum Frame {
    Request { id: MessageId, name: String, args: rmpv::Value },
    Response { id: MessageId, body: rmpv::Value },
}

/// Build the bytes for an outgoing request. Returns `OversizedMessage` if the
/// encoded frame would exceed `MAX_PAYLOAD_SIZE`, per SPEC_FULL.md §7.
pub fn encode_request(name: &str, args: rmpv::Value) -> Result<(MessageId, Vec<u8>), DhtError> {
    let id = MessageId::random();
    let body = rmpv::Value::Array(vec![rmpv::Value::String(name.into()), args]);
    let encoded = rmp_serde::to_vec(&body).map_err(|_| DhtError::OversizedMessage { max: MAX_PAYLOAD_SIZE })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + encoded.len());
    frame.push(TAG_REQUEST);
    frame.extend_from_slice(id.as_bytes());
    frame.extend_from_slice(&encoded);

    if frame.len() > MAX_PAYLOAD_SIZE {
        return Err(DhtError::OversizedMessage { max: MAX_PAYLOAD_SIZE });
    }
    Ok((id, frame))
}

/// Build the bytes for a response to `id`.
pub fn encode_response(id: MessageId, body: rmpv::Value) -> Result<Vec<u8>, DhtError> {
    let encoded = rmp_serde::to_vec(&body).map_err(|_| DhtError::OversizedMessage { max: MAX_PAYLOAD_SIZE })?;
    let mut frame = Vec::with_capacity(HEADER_LEN + encoded.len());
    frame.push(TAG_RESPONSE);
    frame.extend_from_slice(id.as_bytes());
    frame.extend_from_slice(&encoded);
    Ok(frame)
}

/// Parse an incoming datagram. Returns `None` for anything malformed
/// (too short, undecodable body, or a request body whose shape isn't
/// `[name, args]`) — callers drop and log at `warn`, per SPEC_FULL.md §7.
pub fn decode(buf: &[u8]) -> Option<Frame> {
    if buf.len() < HEADER_LEN + 1 {
        return None;
    }
    let tag = buf[0];
    let id = MessageId::from_slice(&buf[1..HEADER_LEN]);
    let body_bytes = &buf[HEADER_LEN..];

    match tag {
        TAG_REQUEST => {
            let value: rmpv::Value = rmp_serde::from_read_ref(body_bytes).ok()?;
            let items = value.as_array()?;
            if items.len() != 2 {
                return None;
            }
            let name = items[0].as_str()?.to_string();
            let args = items[1].clone();
            Some(Frame::Request { id, name, args })
        }
        TAG_RESPONSE => {
            let value: rmpv::Value = rmp_serde::from_read_ref(body_bytes).ok()?;
            Some(Frame::Response { id, body: value })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let args = rmpv::Value::Array(vec!["127.0.0.1:9000".into()]);
        let (id, bytes) = encode_request("ping", args).unwrap();
        match decode(&bytes).unwrap() {
            Frame::Request { id: got_id, name, args } => {
                assert_eq!(got_id, id);
                assert_eq!(name, "ping");
                assert_eq!(args.as_array().unwrap().len(), 1);
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn short_datagram_is_rejected() {
        assert!(decode(&[0u8; 10]).is_none());
    }

    #[test]
    fn oversized_request_is_rejected() {
        let args = rmpv::Value::Binary(vec![0u8; MAX_PAYLOAD_SIZE * 2]);
        let result = encode_request("store", args);
        assert!(result.is_err());
    }
}
