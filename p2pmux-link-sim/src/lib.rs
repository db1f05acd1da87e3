//! In-process simulated carriers for p2pmux unit and integration testing.
//!
//! - [`SimTransport`] implements [`p2pmux_domain::PacketTransport`] without
//!   sockets, recording every hand-off and reporting completions on a tokio
//!   channel.
//! - [`SimRelayChannel`] implements [`p2pmux_domain::RelayChannel`] around a
//!   `SimTransport`, with join/leave/close helpers that yield the matching
//!   [`p2pmux_domain::PresenceEvent`].
//! - [`SimPresence`] implements [`p2pmux_domain::Presence`] with a
//!   controllable online set and signaling link.
//!
//! [`LinkSimConfig`] controls link behaviour:
//!
//! - Payload size limit (drives frame splitting)
//! - Automatic or test-driven send confirmation
//! - Confirmation loss with a deterministic RNG seed
//!
//! # Quick start
//!
//! ```rust
//! use p2pmux_domain::PeerAddr;
//! use p2pmux_link_sim::{LinkSimConfig, SimTransport};
//!
//! let (transport, _events) =
//!     SimTransport::new(PeerAddr::new("bob@example.com"), LinkSimConfig::manual_confirm());
//! ```

mod channel;
mod config;
mod presence;
mod transport;

// --- public API
pub use channel::SimRelayChannel;
pub use config::LinkSimConfig;
pub use presence::SimPresence;
pub use transport::SimTransport;
