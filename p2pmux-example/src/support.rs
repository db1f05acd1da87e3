//! Helpers shared by the demos.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;

use p2pmux_domain::{Frame, PeerAddr};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

// ---

pub fn alice() -> PeerAddr {
    PeerAddr::new("alice@example.com")
}

pub fn bob() -> PeerAddr {
    PeerAddr::new("bob@example.com")
}

/// Message `n`, every byte set to `n` so order is visible on the wire.
pub fn message(n: usize, size: usize) -> Frame {
    Frame::data(1, vec![n as u8; size])
}

/// Number of relay frames a message of `size` bytes occupies.
pub fn pieces_per_message(size: usize, max_payload: usize) -> usize {
    size.div_ceil(max_payload).max(1)
}

// ---

/// Poll `check` until it holds, failing after a few seconds.
pub async fn wait_for<F, Fut>(what: &str, mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    // ---
    tokio::time::timeout(WAIT_LIMIT, async {
        while !check().await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .with_context(|| format!("timed out waiting for {what}"))
}
