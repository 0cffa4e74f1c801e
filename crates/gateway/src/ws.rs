use std::sync::Arc;

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt},
    tokio::sync::broadcast::error::RecvError,
    tracing::{debug, warn},
};

use well_pits::{PitRegistry, PitUpdate};

/// Drive one client attachment for its whole lifetime.
pub async fn handle_connection(
    socket: WebSocket,
    registry: Arc<PitRegistry>,
    slug: String,
    conn_id: u64,
) {
    let pit = match registry.ensure(&slug).await {
        Ok(pit) => pit,
        Err(e) => {
            warn!(slug = %slug, error = %e, "rejecting attachment");
            return;
        },
    };
    registry.increment_connections(&slug).await;
    debug!(slug = %slug, conn_id, "client attached");

    // Subscribe before the catch-up frame so no update can slip between.
    let mut updates = pit.subscribe();
    let (mut sink, mut stream) = socket.split();

    // Bring the new client up to date with one full-state update.
    let snapshot = pit.encode_full().await;
    if sink.send(Message::Binary(snapshot.into())).await.is_err() {
        registry.decrement_connections(&slug).await;
        return;
    }

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Binary(bytes))) => {
                    registry.apply_update(&slug, conn_id, bytes).await;
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    debug!(slug = %slug, conn_id, error = %e, "socket error");
                    break;
                },
            },
            update = updates.recv() => match update {
                Ok(PitUpdate { origin, bytes }) if origin != conn_id => {
                    if sink.send(Message::Binary(bytes)).await.is_err() {
                        break;
                    }
                },
                Ok(_) => {},
                Err(RecvError::Lagged(skipped)) => {
                    // Fell too far behind the fan-out; resync with full state.
                    warn!(slug = %slug, conn_id, skipped, "fan-out lagged, resyncing");
                    let snapshot = pit.encode_full().await;
                    if sink.send(Message::Binary(snapshot.into())).await.is_err() {
                        break;
                    }
                },
                Err(RecvError::Closed) => break,
            },
        }
    }

    registry.decrement_connections(&slug).await;
    debug!(slug = %slug, conn_id, "client detached");
}
