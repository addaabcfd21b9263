//! WebSocket upgrade handler and per-connection session loop.
//!
//! A session owns no game state. It parses client messages, forwards them
//! as commands to its room's task, and relays the room's broadcast stream
//! back to the socket. Malformed JSON and unknown message types are logged
//! and ignored; only the errors the protocol defines get `error` replies.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::room::{RoomCmd, RoomHandle, RoomOptions};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Room membership for one connection
struct Membership {
    handle: RoomHandle,
    slot: u8,
    forward_task: tokio::task::JoinHandle<()>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    debug!("New WebSocket connection");

    let (ws_sink, mut ws_stream) = socket.split();

    // All outbound traffic (direct replies and room broadcasts) funnels
    // through one mpsc so a single writer task owns the sink.
    let (out_tx, out_rx) = mpsc::channel::<ServerMsg>(256);
    let writer_task = tokio::spawn(write_outbound(ws_sink, out_rx));

    let rate_limiter = ConnectionRateLimiter::new();
    let mut membership: Option<Membership> = None;

    while let Some(result) = ws_stream.next().await {
        let msg = match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!("Rate limited inbound message");
                    continue;
                }
                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(error = %e, "Ignoring unparseable client message");
                        continue;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "WebSocket error");
                break;
            }
        };

        match msg {
            ClientMsg::CreateRoom {
                allow_bots,
                auto_start_bots,
            } => {
                if membership.is_some() {
                    send_error(&out_tx, "already in a room").await;
                    continue;
                }
                let options = RoomOptions {
                    allow_bots,
                    auto_start_bots: allow_bots && auto_start_bots,
                    ..state.rooms.default_options()
                };
                let handle = state.rooms.clone().create(options);
                membership = join_room(&out_tx, handle, None, true).await;
            }
            ClientMsg::JoinRoom { code, token } => {
                if membership.is_some() {
                    send_error(&out_tx, "already in a room").await;
                    continue;
                }
                match state.rooms.clone().lookup_for_join(&code) {
                    Ok(handle) => {
                        membership = join_room(&out_tx, handle, token, false).await;
                    }
                    Err(e) => send_error(&out_tx, &e.to_string()).await,
                }
            }
            ClientMsg::StartMatch => {
                if let Some(m) = &membership {
                    let _ = m.handle.cmd_tx.send(RoomCmd::StartMatch { slot: m.slot }).await;
                }
            }
            ClientMsg::Input { seq, time: _, input } => {
                if let Some(m) = &membership {
                    let _ = m
                        .handle
                        .cmd_tx
                        .send(RoomCmd::Input {
                            slot: m.slot,
                            seq,
                            sample: input,
                        })
                        .await;
                }
            }
            ClientMsg::Ping { time } => {
                let _ = out_tx
                    .send(ServerMsg::Pong {
                        time,
                        server_time: unix_millis(),
                    })
                    .await;
            }
        }
    }

    // Disconnect keeps the slot token so the client can reclaim it
    if let Some(m) = membership {
        let _ = m.handle.cmd_tx.send(RoomCmd::Disconnect { slot: m.slot }).await;
        m.forward_task.abort();
        info!(room_code = %m.handle.code, slot = m.slot, "Session left room");
    }
    writer_task.abort();
    debug!("WebSocket connection closed");
}

/// Ask the room for a slot, reply to the client, and start forwarding the
/// room's broadcast stream to this connection.
async fn join_room(
    out_tx: &mpsc::Sender<ServerMsg>,
    handle: RoomHandle,
    token: Option<uuid::Uuid>,
    created: bool,
) -> Option<Membership> {
    let (reply_tx, reply_rx) = oneshot::channel();
    if handle
        .cmd_tx
        .send(RoomCmd::Join {
            token,
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        send_error(out_tx, "room not found").await;
        return None;
    }

    let grant = match reply_rx.await {
        Ok(Ok(grant)) => grant,
        Ok(Err(e)) => {
            send_error(out_tx, &e.to_string()).await;
            return None;
        }
        Err(_) => {
            send_error(out_tx, "room not found").await;
            return None;
        }
    };

    let reply = if created {
        ServerMsg::RoomCreated {
            code: grant.code.clone(),
            player_id: grant.slot,
            team: grant.team,
            token: grant.token,
            host: grant.host,
        }
    } else {
        ServerMsg::RoomJoined {
            code: grant.code.clone(),
            player_id: grant.slot,
            team: grant.team,
            token: grant.token,
            host: grant.host,
        }
    };
    let _ = out_tx.send(reply).await;

    let forward_task = tokio::spawn(forward_broadcast(
        handle.broadcast_tx.subscribe(),
        out_tx.clone(),
    ));

    Some(Membership {
        slot: grant.slot,
        handle,
        forward_task,
    })
}

/// Relay room broadcasts into the session's outbound queue. Lagging only
/// skips snapshots for this client; it never stalls the room.
async fn forward_broadcast(
    mut rx: broadcast::Receiver<ServerMsg>,
    out_tx: mpsc::Sender<ServerMsg>,
) {
    loop {
        match rx.recv().await {
            Ok(msg) => {
                if out_tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(lagged = n, "Client lagged, skipping snapshots");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn write_outbound(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<ServerMsg>) {
    while let Some(msg) = rx.recv().await {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize server message");
                continue;
            }
        };
        if sink.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}

async fn send_error(out_tx: &mpsc::Sender<ServerMsg>, message: &str) {
    let _ = out_tx
        .send(ServerMsg::Error {
            message: message.to_string(),
        })
        .await;
}
