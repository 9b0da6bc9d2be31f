//! Render configuration: static file root, default host, websocket key, and
//! the explicit randomness source.
//!
//! A `Settings` is read-only for the duration of a render and safe to share
//! by reference across concurrent renders. There is no global mutable state:
//! every random draw goes through [`Settings::rng`] or [`Settings::seed`],
//! which are deterministic when the `testing` flag is set.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

/// Seed used for every random draw when `testing` is set.
const TESTING_SEED: u64 = 0x5eed_f00d;

/// Per-render configuration, passed explicitly to resolve/freeze/serve.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Root directory for file values (`<path`). Absent disables file access.
    pub staticdir: Option<PathBuf>,
    /// Default `Host` header value for rendered requests.
    pub request_host: Option<String>,
    /// Client key used to resolve `ws` handshakes. A `ws` response cannot
    /// resolve without it.
    pub websocket_key: Option<String>,
    /// Deterministic randomness for test runs.
    pub testing: bool,
}

impl Settings {
    /// Randomness source for offset resolution and key generation.
    pub fn rng(&self) -> StdRng {
        if self.testing {
            StdRng::seed_from_u64(TESTING_SEED)
        } else {
            StdRng::from_os_rng()
        }
    }

    /// Fresh seed for a generated-value byte source.
    pub fn seed(&self) -> u64 {
        if self.testing {
            TESTING_SEED
        } else {
            StdRng::from_os_rng().random()
        }
    }
}
