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

//! The crate's single public error type. Transport- and crawl-internal
//! faults (malformed datagrams, unknown RPCs, timeouts) are not represented
//! here — they're masked at the RPC boundary and only visible through `log`
//! records and `Metrics` (see SPEC_FULL.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("payload exceeds {max} bytes")]
    OversizedMessage { max: usize },

    #[error("unsupported value type for set()")]
    InvalidValueType,

    #[error("storage I/O error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("state snapshot error: {0}")]
    State(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
