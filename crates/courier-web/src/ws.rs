use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Restrict the stream to one tenant's events.
    pub tenant_id: Option<String>,
}

/// GET /session/events - Stream relay events as JSON text frames.
///
/// No replay: the stream starts with the next published event. A subscriber
/// that falls behind the broadcast capacity gets an `events-dropped` notice
/// instead of the missed frames.
pub async fn events(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| events_task(socket, state, query.tenant_id))
}

async fn events_task(socket: WebSocket, state: Arc<AppState>, tenant_filter: Option<String>) {
    if let Err(err) = events_inner(socket, state, tenant_filter).await {
        warn!("event stream closed with error: {err}");
    }
}

async fn events_inner(
    socket: WebSocket,
    state: Arc<AppState>,
    tenant_filter: Option<String>,
) -> Result<()> {
    let mut events = state.broker.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            outcome = events.recv() => {
                match outcome {
                    Ok(event) => {
                        if !matches_filter(tenant_filter.as_deref(), event.tenant_id()) {
                            continue;
                        }
                        let frame = serde_json::to_string(&event)?;
                        ws_tx.send(Message::Text(frame.into())).await?;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        let notice = json!({
                            "event": "events-dropped",
                            "missed": missed,
                        })
                        .to_string();
                        ws_tx.send(Message::Text(notice.into())).await?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            maybe_msg = ws_rx.next() => {
                let Some(msg) = maybe_msg else {
                    break;
                };
                match msg? {
                    Message::Close(_) => break,
                    Message::Ping(payload) => ws_tx.send(Message::Pong(payload)).await?,
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

fn matches_filter(filter: Option<&str>, tenant_id: &str) -> bool {
    filter.is_none_or(|wanted| wanted == tenant_id)
}

#[cfg(test)]
mod tests {
    use super::matches_filter;

    #[test]
    fn no_filter_passes_everything() {
        assert!(matches_filter(None, "t1"));
        assert!(matches_filter(None, "t2"));
    }

    #[test]
    fn filter_restricts_to_one_tenant() {
        assert!(matches_filter(Some("t1"), "t1"));
        assert!(!matches_filter(Some("t1"), "t2"));
    }
}
