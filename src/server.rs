//! HTTP/WebSocket transport bootstrap.
//!
//! Upgrades connections at `/ws` into message channels for the session
//! layer, hosts the health endpoint, and runs the idle sweep that tears
//! down silently dead connections.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::session::{handle_frame, teardown};
use crate::state::{AppState, RelayConfig};

/// Build the application router. Exposed separately from [`run_server`] so
/// tests can serve it on an ephemeral port.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the signalling relay server.
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port number to bind to (e.g., 8080)
/// * `config` - Relay core configuration (room capacity, idle timeout)
pub async fn run_server(
    host: String,
    port: u16,
    config: RelayConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(config));
    if !config.idle_timeout.is_zero() {
        spawn_idle_sweep(state.clone());
    }

    let app = router(state);
    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!(
        "signalling relay listening on {} (max {} per room)",
        listener.local_addr()?,
        config.max_room_size
    );
    tracing::info!("Connect to: ws://{}/ws", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one connection: register it under a fresh id, pump inbound frames
/// into the session layer and outbound messages from the client's channel
/// into the sink, then tear the client down when either side closes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let client_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .registry
        .lock()
        .await
        .insert_client(client_id.clone(), tx);
    tracing::info!("client '{}' connected", client_id);

    let (mut sink, mut stream) = socket.split();

    let recv_state = state.clone();
    let recv_id = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!("websocket error for client '{}': {}", recv_id, e);
                    break;
                }
            };

            match frame {
                Message::Text(text) => {
                    handle_frame(&recv_state, &recv_id, text.as_str()).await;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    recv_state.registry.lock().await.touch(&recv_id);
                }
                Message::Close(_) => {
                    tracing::debug!("client '{}' requested close", recv_id);
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // If either pump stops, the other has nothing left to do.
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    teardown(&state, &client_id).await;
}

/// Periodically tear down clients with no inbound activity inside the
/// idle window. Shares teardown with the transport path, so a reaped
/// client looks exactly like one whose socket closed.
pub fn spawn_idle_sweep(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let timeout = state.config.idle_timeout;
    tokio::spawn(async move {
        let period = (timeout / 2).max(Duration::from_secs(1));
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let Some(deadline) = Instant::now().checked_sub(timeout) else {
                continue;
            };
            let stale = state.registry.lock().await.idle_since(deadline);
            for id in stale {
                tracing::info!("client '{}' idle past {:?}; forcing teardown", id, timeout);
                teardown(&state, &id).await;
            }
        }
    })
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use crate::protocol::{Meta, Status};
    use crate::registry::room_key;

    #[tokio::test]
    async fn test_idle_sweep_reaps_only_stale_clients() {
        let state = Arc::new(AppState::new(RelayConfig {
            max_room_size: 8,
            idle_timeout: Duration::from_secs(5),
        }));

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        {
            let mut registry = state.registry.lock().await;
            let key = room_key("demo", "r1");
            for (id, tx, name) in [("a", tx_a, "Alice"), ("b", tx_b, "Bob")] {
                registry.insert_client(id.to_string(), tx);
                registry.add_member(&key, id);
                let client = registry.client_mut(id).unwrap();
                client.app = Some("demo".into());
                client.room = Some("r1".into());
                client.meta = Some(Meta {
                    name: name.into(),
                    status: Status::Lobby,
                });
            }
            // A went silent long ago; B is fresh.
            registry.client_mut("a").unwrap().last_seen = Instant::now()
                .checked_sub(Duration::from_secs(60))
                .expect("clock running long enough");
        }

        let sweep = spawn_idle_sweep(state.clone());

        // The first sweep tick fires immediately; wait for it to land.
        let mut reaped = false;
        for _ in 0..200 {
            if state.registry.lock().await.client_count() == 1 {
                reaped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweep.abort();
        assert!(reaped, "stale client was never reaped");

        {
            let registry = state.registry.lock().await;
            assert!(registry.client("a").is_none());
            assert!(registry.client("b").is_some());
            assert_eq!(registry.room_size(&room_key("demo", "r1")), 1);
        }

        // B hears exactly one peer-left, same as a transport close.
        let left: Value =
            serde_json::from_str(&rx_b.try_recv().expect("peer-left pending")).unwrap();
        assert_eq!(left["type"], "peer-left");
        assert_eq!(left["id"], "a");
        assert!(rx_b.try_recv().is_err());

        // A's sender went down with its registry entry, closing its pump.
        assert!(matches!(
            rx_a.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
