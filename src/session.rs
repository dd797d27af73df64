//! Per-connection session state machine and relay dispatch.
//!
//! A connection is in one of two states: unjoined (freshly accepted,
//! `meta` unset) or joined (member of exactly one room). The only
//! transition is a successful `join`; there is no way back short of
//! disconnecting. All handlers run under the registry mutex, so capacity
//! checks, name allocation, and membership mutation are atomic with
//! respect to every other connection. Delivery to peers goes through
//! unbounded channels and never blocks while the lock is held; a failed
//! send to a dead peer is logged and swallowed (at-most-once, no retry).

use serde_json::Value;

use crate::identity::{
    coerce_name, normalize_display_name, normalize_presence_status, valid_channel_name,
};
use crate::names::unique_name;
use crate::protocol::{Meta, PeerMetaEntry, Reject, ServerMessage};
use crate::registry::{Registry, room_key};
use crate::state::{AppState, RelayConfig};

/// Handle one inbound text frame from a connected client.
pub async fn handle_frame(state: &AppState, client_id: &str, text: &str) {
    let mut registry = state.registry.lock().await;
    registry.touch(client_id);

    let msg: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("client '{}' sent unparseable frame: {}", client_id, e);
            reply(&registry, client_id, Reject::InvalidJson);
            return;
        }
    };

    if let Err(reject) = dispatch(&mut registry, &state.config, client_id, &msg) {
        reply(&registry, client_id, reject);
    }
}

/// Remove a client from its room and the registry, notifying remaining
/// members. Invoked on transport close or error and by the idle sweep.
/// Idempotent: a second call for the same id is a no-op.
pub async fn teardown(state: &AppState, client_id: &str) {
    let mut registry = state.registry.lock().await;
    let Some(client) = registry.remove_client(client_id) else {
        return;
    };

    if let Some(key) = client.room_key() {
        registry.remove_member(&key, client_id);
        let left = ServerMessage::PeerLeft {
            id: client_id.to_string(),
        }
        .to_json();
        for member in registry.room_members(&key) {
            send_to(&registry, member, &left);
        }
        tracing::info!("client '{}' left room '{}'", client_id, key);
    }

    tracing::info!(
        "client '{}' removed from registry ({} remaining)",
        client_id,
        registry.client_count()
    );
    // Dropping `client` here drops the registry's only sender handle,
    // which closes the connection's outbound pump.
}

fn dispatch(
    registry: &mut Registry,
    config: &RelayConfig,
    client_id: &str,
    msg: &Value,
) -> Result<(), Reject> {
    let Some(client) = registry.client(client_id) else {
        // Torn down while the frame was in flight; nothing to answer.
        return Ok(());
    };
    let joined = client.meta.is_some();
    let msg_type = msg.get("type").and_then(Value::as_str);

    if !joined {
        return if msg_type == Some("join") {
            handle_join(registry, config, client_id, msg)
        } else {
            Err(Reject::JoinRequiredFirst)
        };
    }

    match msg_type {
        Some("signal") => relay_addressed(registry, client_id, msg, Relay::Signal),
        Some("direct") => relay_addressed(registry, client_id, msg, Relay::Direct),
        Some("broadcast") => {
            handle_broadcast(registry, client_id, msg);
            Ok(())
        }
        Some("set-meta") => handle_set_meta(registry, client_id, msg),
        Some("ping") => {
            send_to(
                registry,
                client_id,
                &ServerMessage::Pong {
                    now: chrono::Utc::now().timestamp_millis(),
                }
                .to_json(),
            );
            Ok(())
        }
        _ => Err(Reject::UnknownMessageType {
            received: msg.get("type").cloned().unwrap_or(Value::Null),
        }),
    }
}

/// `Connected → Joined` transition. Capacity is checked, peers are
/// snapshotted, and only then is the client inserted, so its own
/// `welcome` never lists itself and every `peer-joined` goes out after
/// the membership is durable.
fn handle_join(
    registry: &mut Registry,
    config: &RelayConfig,
    client_id: &str,
    msg: &Value,
) -> Result<(), Reject> {
    let Some(app) = msg.get("app").and_then(Value::as_str) else {
        return Err(Reject::InvalidAppOrRoom);
    };
    let Some(room) = msg.get("room").and_then(Value::as_str) else {
        return Err(Reject::InvalidAppOrRoom);
    };
    if !valid_channel_name(app) || !valid_channel_name(room) {
        return Err(Reject::InvalidAppOrRoom);
    }

    let key = room_key(app, room);
    if registry.room_size(&key) >= config.max_room_size {
        return Err(Reject::RoomFull {
            max_room_size: config.max_room_size,
        });
    }

    let mut meta = Meta::from_value(msg.get("meta").unwrap_or(&Value::Null));
    meta.name = unique_name(&meta.name, &registry.used_names(&key, client_id));

    let peers: Vec<String> = registry.room_members(&key).to_vec();
    let peer_meta: Vec<PeerMetaEntry> = peers
        .iter()
        .filter_map(|id| {
            registry
                .client(id)
                .and_then(|peer| peer.meta.clone())
                .map(|meta| PeerMetaEntry {
                    id: id.clone(),
                    meta,
                })
        })
        .collect();

    registry.add_member(&key, client_id);
    if let Some(client) = registry.client_mut(client_id) {
        client.app = Some(app.to_string());
        client.room = Some(room.to_string());
        client.meta = Some(meta.clone());
    }

    tracing::info!(
        "client '{}' joined room '{}' as '{}' ({} members)",
        client_id,
        key,
        meta.name,
        registry.room_size(&key)
    );

    send_to(
        registry,
        client_id,
        &ServerMessage::Welcome {
            id: client_id.to_string(),
            app: app.to_string(),
            room: room.to_string(),
            peers: peers.clone(),
            peer_meta,
            meta: meta.clone(),
            max_room_size: config.max_room_size,
        }
        .to_json(),
    );

    let joined_json = ServerMessage::PeerJoined {
        id: client_id.to_string(),
        meta,
    }
    .to_json();
    for peer in &peers {
        send_to(registry, peer, &joined_json);
    }

    Ok(())
}

#[derive(Clone, Copy)]
enum Relay {
    Signal,
    Direct,
}

/// Point-to-point relay for `signal` and `direct`. The payload is passed
/// through untouched; only the envelope is validated.
fn relay_addressed(
    registry: &Registry,
    client_id: &str,
    msg: &Value,
    kind: Relay,
) -> Result<(), Reject> {
    let Some(to) = msg.get("to").and_then(Value::as_str) else {
        return Err(Reject::MissingTarget);
    };
    let Some(target) = registry.client(to) else {
        return Err(Reject::PeerNotFound);
    };

    let sender_room = registry.client(client_id).and_then(|c| c.room_key());
    if target.room_key() != sender_room {
        return Err(Reject::PeerOutsideRoom);
    }

    let from = client_id.to_string();
    let forwarded = match kind {
        Relay::Signal => ServerMessage::Signal {
            from,
            signal: msg.get("signal").cloned().unwrap_or(Value::Null),
        },
        Relay::Direct => ServerMessage::Direct {
            from,
            payload: msg.get("payload").cloned().unwrap_or(Value::Null),
        },
    };
    send_to(registry, to, &forwarded.to_json());
    Ok(())
}

/// Fan a payload out to every other member of the sender's room. No-op if
/// the room has vanished.
fn handle_broadcast(registry: &Registry, client_id: &str, msg: &Value) {
    let Some(key) = registry.client(client_id).and_then(|c| c.room_key()) else {
        return;
    };
    let forwarded = ServerMessage::Broadcast {
        from: client_id.to_string(),
        payload: msg.get("payload").cloned().unwrap_or(Value::Null),
    }
    .to_json();
    for member in registry.room_members(&key) {
        if member != client_id {
            send_to(registry, member, &forwarded);
        }
    }
}

/// Merge a metadata patch. A patched name is re-resolved against the room
/// (excluding the client itself); unspecified fields keep their value.
fn handle_set_meta(registry: &mut Registry, client_id: &str, msg: &Value) -> Result<(), Reject> {
    let Some(patch) = msg.get("patch").and_then(Value::as_object) else {
        return Err(Reject::InvalidMetaPatch);
    };
    let Some(client) = registry.client(client_id) else {
        return Ok(());
    };
    let key = client.room_key();
    let Some(mut meta) = client.meta.clone() else {
        return Ok(());
    };

    if let Some(name_value) = patch.get("name").filter(|v| !v.is_null()) {
        let base = normalize_display_name(&coerce_name(Some(name_value)));
        let taken = match &key {
            Some(key) => registry.used_names(key, client_id),
            None => Default::default(),
        };
        meta.name = unique_name(&base, &taken);
    }
    if patch.contains_key("status") {
        meta.status = normalize_presence_status(patch.get("status").and_then(Value::as_str));
    }

    if let Some(client) = registry.client_mut(client_id) {
        client.meta = Some(meta.clone());
    }
    tracing::debug!("client '{}' updated meta to '{}'", client_id, meta.name);

    send_to(
        registry,
        client_id,
        &ServerMessage::MetaUpdated {
            id: client_id.to_string(),
            meta: meta.clone(),
        }
        .to_json(),
    );

    if let Some(key) = key {
        let peer_json = ServerMessage::PeerMeta {
            id: client_id.to_string(),
            meta,
        }
        .to_json();
        for member in registry.room_members(&key) {
            if member != client_id {
                send_to(registry, member, &peer_json);
            }
        }
    }
    Ok(())
}

fn reply(registry: &Registry, client_id: &str, reject: Reject) {
    send_to(registry, client_id, &ServerMessage::from(reject).to_json());
}

/// Best-effort push to one client. A closed channel means the peer is
/// already on its way out; the failure stays local to this call.
fn send_to(registry: &Registry, id: &str, json: &str) {
    let Some(client) = registry.client(id) else {
        return;
    };
    if client.sender.send(json.to_string()).is_err() {
        tracing::warn!("failed to push message to client '{}'", id);
    }
}
