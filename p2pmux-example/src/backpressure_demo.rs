//! Backpressure demo — a session never has more than `capacity` frames in
//! flight; the rest wait in its send queue and drain as confirmations land.

use std::sync::Arc;

use p2pmux_core::P2pHandler;
use p2pmux_link_sim::{LinkSimConfig, SimPresence};

use super::support::{alice, bob, message, pieces_per_message, wait_for};
use super::DemoSettings;

// ---

pub async fn run(settings: &DemoSettings) -> anyhow::Result<()> {
    // ---
    let sim = LinkSimConfig::manual_confirm().with_max_payload_size(settings.max_payload);
    let (presence, presence_rx) = SimPresence::new(alice(), sim);
    presence.set_online(&bob(), true);

    let handler = P2pHandler::new(settings.handler, presence.clone());
    let runner = tokio::spawn(Arc::clone(&handler).run(presence_rx));

    let channel = presence.offer_channel(&bob());
    let session = handler.get_or_create_session(&alice(), &bob()).await;
    wait_for("channel binding", || {
        let session = Arc::clone(&session);
        async move { session.has_valid_bridge().await }
    })
    .await?;

    for n in 1..=settings.frames {
        handler
            .send(&session, message(n, settings.payload_size), None)
            .await?;
    }

    let capacity = settings.handler.bridge.queue_capacity;
    let wire = channel.sim_transport();
    let expected = settings.frames * pieces_per_message(settings.payload_size, settings.max_payload);
    let mut peak = 0;

    while wire.sent_len() < expected || wire.unconfirmed_len() > 0 {
        let in_flight = wire.unconfirmed_len();
        peak = peak.max(in_flight);
        println!("  handed over {:>3}/{expected}, in flight {in_flight}", wire.sent_len());

        if capacity > 0 {
            anyhow::ensure!(in_flight <= capacity, "{in_flight} in flight exceeds capacity {capacity}");
        }

        let before = wire.sent_len();
        wire.confirm_next();
        wait_for("drain after confirmation", || {
            let wire = Arc::clone(wire);
            async move { wire.sent_len() > before || wire.sent_len() >= expected }
        })
        .await?;
    }

    println!("all {expected} relay frames confirmed; peak in flight {peak} (capacity {capacity})");

    handler.close_session(&session).await;
    runner.abort();
    Ok(())
}
