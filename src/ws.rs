use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::state::AppState;

/// Pushes the current snapshot, then one frame per change, until either
/// side goes away. Incoming frames other than close are ignored.
pub async fn stream_state(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut snapshots = state.session.subscribe();

    info!("State subscriber connected");

    loop {
        let frame = serde_json::to_string(&*snapshots.borrow_and_update());
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode snapshot: {e}");
                break;
            }
        };
        if ws_tx.send(Message::Text(frame.into())).await.is_err() {
            break;
        }

        let changed = loop {
            tokio::select! {
                changed = snapshots.changed() => break changed.is_ok(),
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break false,
                    _ => continue,
                },
            }
        };
        if !changed {
            break;
        }
    }

    let _ = ws_tx.close().await;
    info!("State subscriber disconnected");
}
