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

//! Explicit, constructed configuration. Replaces the source's module-level
//! `CONFIG` singleton (`kademlia/config.py`, read from a JSON file at import
//! time) with a plain value built once and threaded through `Server::new` —
//! no global state anywhere in the core (see SPEC_FULL.md Design Notes).

use crate::error::DhtError;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub interface: String,
    pub port: u16,
    pub ksize: usize,
    pub alpha: usize,
    pub ttl: Duration,
    pub rpc_timeout: Duration,
    pub refresh_interval: Duration,
    pub republish_interval: Duration,
    pub save_state_interval: Duration,
    pub state_path: Option<PathBuf>,
    pub storage_dir: Option<PathBuf>,
}

impl Config {
    pub fn new(interface: impl Into<String>, port: u16) -> Self {
        Config {
            interface: interface.into(),
            port,
            ksize: 20,
            alpha: 3,
            ttl: Duration::from_secs(604_800),
            rpc_timeout: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(3600),
            republish_interval: Duration::from_secs(3600),
            save_state_interval: Duration::from_secs(600),
            state_path: None,
            storage_dir: None,
        }
    }

    pub fn with_ksize(mut self, ksize: usize) -> Self {
        self.ksize = ksize;
        self
    }

    pub fn with_alpha(mut self, alpha: usize) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_state_path(mut self, path: PathBuf) -> Self {
        self.state_path = Some(path);
        self
    }

    pub fn with_storage_dir(mut self, path: PathBuf) -> Self {
        self.storage_dir = Some(path);
        self
    }

    pub fn validate(&self) -> Result<(), DhtError> {
        if self.ksize == 0 {
            return Err(DhtError::Config("ksize must be at least 1".into()));
        }
        if self.alpha == 0 {
            return Err(DhtError::Config("alpha must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_paper_conventional_values() {
        let cfg = Config::new("0.0.0.0", 9000);
        assert_eq!(cfg.ksize, 20);
        assert_eq!(cfg.alpha, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_ksize_is_rejected() {
        let cfg = Config::new("0.0.0.0", 9000).with_ksize(0);
        assert!(cfg.validate().is_err());
    }
}
