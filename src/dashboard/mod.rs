//! Live dashboard
//!
//! Serves a static page over HTTP and pushes tick, trade and engine-status
//! events over a WebSocket. The contract is push-only: clients never send
//! anything the server acts on.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

const INDEX_HTML: &str = include_str!("index.html");

/// Handle for pushing events to connected clients; cheap to clone
#[derive(Clone)]
pub struct DashboardHandle {
    tx: broadcast::Sender<String>,
}

impl DashboardHandle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Broadcast one event; dropped silently when no client is connected
    pub fn broadcast(&self, event: &Value) {
        if self.tx.receiver_count() == 0 {
            return;
        }
        if let Ok(body) = serde_json::to_string(event) {
            let _ = self.tx.send(body);
        }
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for DashboardHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the HTTP/WebSocket server until shutdown
pub async fn serve(
    port: u16,
    handle: DashboardHandle,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_upgrade))
        .with_state(handle);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Dashboard listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    tracing::info!("Dashboard stopped");
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(handle): State<DashboardHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_events(socket, handle))
}

/// Forward broadcast events to one client until it disconnects
async fn push_events(mut socket: WebSocket, handle: DashboardHandle) {
    let mut rx = handle.tx.subscribe();
    tracing::debug!("Dashboard client connected");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(body) => {
                        if socket.send(Message::Text(body)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Dashboard client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                // Push-only: drain client frames, stop on close
                match incoming {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }

    tracing::debug!("Dashboard client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_broadcast_without_clients_is_noop() {
        let handle = DashboardHandle::new();
        assert_eq!(handle.client_count(), 0);
        handle.broadcast(&json!({"type": "price_tick", "price": 60000.0}));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let handle = DashboardHandle::new();
        let mut rx = handle.tx.subscribe();
        handle.broadcast(&json!({"type": "state", "cycle": 3}));

        let body = rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["cycle"], 3);
    }
}
