//! Session registry, bridges and queue migration for p2pmux.
//!
//! Logical peer-to-peer sessions are multiplexed over interchangeable
//! transports. A [`Bridge`] wraps one [`p2pmux_domain::PacketTransport`] and
//! gives each session its own flow-controlled queue; the [`P2pHandler`]
//! keeps every session bound to a bridge that can carry it, moving pending
//! traffic whenever the binding changes.
//!
//! # Structure
//!
//! - `config`  — [`BridgeConfig`], [`HandlerConfig`]
//! - `queue`   — [`SendQueue`], [`SendingQueue`], [`SendItem`]
//! - `ack`     — [`AckRegistry`] of one-shot acknowledgment callbacks
//! - `session` — [`Session`] sequence state, lifecycle and route
//! - `bridge`  — [`Bridge`] draining, numbering and migration
//! - `handler` — [`P2pHandler`] registry and transport selection

mod ack;
mod bridge;
mod config;
mod handler;
mod queue;
mod session;

// --- ack
pub use ack::{AckCallback, AckRegistry};

// --- bridge
pub use bridge::{Bridge, BridgeEvent, BridgeId, BridgeNotice, BridgeNoticeTx};

// --- config
pub use config::{BridgeConfig, HandlerConfig};

// --- handler
pub use handler::{HandlerEvent, P2pHandler};

// --- queue
pub use queue::{SendItem, SendQueue, SendingQueue};

// --- session
pub use session::{Session, LOCAL_BASE_MAX, LOCAL_BASE_MIN};
