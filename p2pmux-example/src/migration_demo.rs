//! Migration demo — a session's pending frames move from one relay channel
//! to another when the peer leaves the first, keeping their order.

use std::sync::Arc;

use p2pmux_core::P2pHandler;
use p2pmux_domain::RelayChannel;
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

    let first = presence.offer_channel(&bob());
    let session = handler.get_or_create_session(&alice(), &bob()).await;
    wait_for("first channel binding", || {
        let session = Arc::clone(&session);
        async move { session.has_valid_bridge().await }
    })
    .await?;

    for n in 1..=settings.frames {
        handler
            .send(&session, message(n, settings.payload_size), None)
            .await?;
    }

    let on_first = first.sim_transport().sent_len();
    println!(
        "queued {} messages; {on_first} relay frames handed to channel {} (unconfirmed)",
        settings.frames,
        first.id(),
    );

    let second = presence.offer_channel(&bob());
    presence.emit(first.leave(&bob()));

    let expected = settings.frames * pieces_per_message(settings.payload_size, settings.max_payload);
    wait_for("all frames on the second channel", || {
        let wire = Arc::clone(second.sim_transport());
        async move {
            wire.confirm_all();
            tokio::task::yield_now().await;
            wire.sent_len() >= expected && wire.unconfirmed_len() == 0
        }
    })
    .await?;

    let order: Vec<u8> = second
        .sim_transport()
        .sent()
        .iter()
        .map(|p| p.frame.payload.first().copied().unwrap_or_default())
        .collect();
    let in_order = order.windows(2).all(|w| w[0] <= w[1]);

    println!(
        "channel {} carried {} relay frames after migration; order preserved: {in_order}",
        second.id(),
        order.len(),
    );
    anyhow::ensure!(in_order, "migrated frames arrived out of order: {order:?}");

    handler.close_session(&session).await;
    runner.abort();
    Ok(())
}
