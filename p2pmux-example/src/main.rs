//! p2pmux example — session multiplexing over the link simulator.
//!
//! Runs two demos against an in-process presence server and relay channels:
//!
//! * **migration** — a session's traffic is queued on one relay channel, the
//!   peer leaves it, and the pending frames continue on a second channel in
//!   their original order.
//!
//! * **backpressure** — frames queue behind a per-session in-flight limit
//!   and drain one confirmation at a time.
//!
//! Run with:
//!   cargo run -p p2pmux-example
//!   cargo run -p p2pmux-example -- --capacity 4 --frames 32 --payload-size 3000
//!   cargo run -p p2pmux-example -- --policy count

use clap::{Parser, ValueEnum};

use p2pmux_core::{BridgeConfig, HandlerConfig};
use p2pmux_domain::SequencePolicy;

mod backpressure_demo;
mod migration_demo;
mod support;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    /// One sequence number per message.
    Count,
    /// Sequence numbers advance by payload bytes.
    Size,
}

impl From<Policy> for SequencePolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Count => SequencePolicy::CountBased,
            Policy::Size => SequencePolicy::SizeBased,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "p2pmux-example", about = "p2pmux demo runner over the link simulator")]
struct Config {
    // ---
    /// Maximum unconfirmed frames per session. 0 = no flow control.
    #[arg(long, default_value_t = 2)]
    capacity: usize,

    /// Number of messages each demo sends.
    #[arg(long, default_value_t = 8)]
    frames: usize,

    /// Bytes per message. Messages above the relay payload limit are split.
    #[arg(long, default_value_t = 512)]
    payload_size: usize,

    /// Largest payload one simulated relay frame may carry.
    #[arg(long, default_value_t = 1202)]
    max_payload: usize,

    /// Sequence numbering scheme.
    #[arg(long, value_enum, default_value_t = Policy::Size)]
    policy: Policy,
}

// ---

/// Settings shared by the demos.
#[derive(Debug, Clone, Copy)]
pub struct DemoSettings {
    pub handler: HandlerConfig,
    pub frames: usize,
    pub payload_size: usize,
    pub max_payload: usize,
}

impl From<&Config> for DemoSettings {
    fn from(cfg: &Config) -> Self {
        // ---
        let bridge = BridgeConfig::flow_controlled(cfg.capacity).with_policy(cfg.policy.into());
        Self {
            handler: HandlerConfig {
                bridge,
                ..Default::default()
            },
            frames: cfg.frames,
            payload_size: cfg.payload_size,
            max_payload: cfg.max_payload,
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---
    let cfg = Config::parse();

    let no_color = std::env::var("EMACS").is_ok()
        || std::env::var("NO_COLOR").is_ok()
        || std::env::var("CARGO_TERM_COLOR").as_deref() == Ok("never")
        || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    tracing_subscriber::fmt()
        .with_target(false)
        .without_time()
        .with_ansi(!no_color)
        .init();

    anyhow::ensure!((1..=255).contains(&cfg.frames), "--frames must be between 1 and 255");
    anyhow::ensure!(cfg.max_payload > 0, "--max-payload must be at least 1");

    let settings = DemoSettings::from(&cfg);
    tracing::info!(?settings, "starting demos");

    println!("=== 1. Queue migration demo ===");
    migration_demo::run(&settings).await?;

    println!();
    println!("=== 2. Backpressure demo ===");
    backpressure_demo::run(&settings).await?;

    Ok(())
}
