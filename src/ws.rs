//! Binary WebSocket protocol (§6): `/ws/v1/updates?lat&lon&radius[&token]`.
//!
//! Every frame is binary: a one-byte frame-type tag followed by a JSON
//! body, mirroring how [`crate::broadcaster`] already pre-serializes
//! entity updates once per update rather than once per subscriber. The
//! connection moves through `Connecting -> Authenticated? -> Subscribed
//! -> Live -> Closing`, grounded in the teacher's `actions/fixes.rs`
//! `handle_websocket` split-socket/`select!`-teardown shape, collapsed
//! to a single task since the subscription index already does the
//! region-routing that the teacher built per-connection broadcast
//! fan-out for.

use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth;
use crate::model::geo::GeoPoint;
use crate::web::AppState;

const PROTOCOL_VERSION: &str = "1";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTag {
    Welcome = 0,
    SubscribeResponse = 1,
    Ping = 2,
    Pong = 3,
    EntityUpdate = 4,
}

#[derive(Debug, Serialize)]
pub struct Welcome {
    pub server_time: DateTime<Utc>,
    pub sequence: u64,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub geohashes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp: DateTime<Utc>,
}

/// Prefixes `tag` to the JSON encoding of `payload`. Used both here and by
/// [`crate::ingest`] to build the frames the broadcaster fans out.
pub fn encode_frame<T: Serialize>(tag: FrameTag, payload: &T) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.push(tag as u8);
    match serde_json::to_vec(payload) {
        Ok(body) => buf.extend_from_slice(&body),
        Err(err) => tracing::error!(error = %err, "failed to encode ws frame body"),
    }
    buf
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub lat: f64,
    pub lon: f64,
    pub radius: Option<f64>,
    pub token: Option<String>,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn handle_socket(socket: WebSocket, params: ConnectParams, state: AppState) {
    // Authenticated?: a token is only required when the caller supplies
    // one; anonymous read-only subscriptions are allowed per §6 (the
    // bracketed `[&token]` query param).
    if let Some(token) = params.token.as_deref() {
        if auth::resolve_token(&state, token).await.is_err() {
            let _ = socket.close().await;
            return;
        }
    }

    let client_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let center = GeoPoint::new(params.lat, params.lon);
    let radius_km = params
        .radius
        .unwrap_or(state.config.default_radius_km)
        .min(state.config.max_radius_km)
        .max(0.1);

    // Subscribed(region)
    let geohashes = state.pipeline.subscriptions.register(client_id, center, radius_km);
    let mut updates = state.pipeline.broadcaster.register_client(client_id);
    metrics::gauge!("websocket_connections").increment(1.0);

    let welcome = Welcome {
        server_time: Utc::now(),
        sequence: state.pipeline.broadcaster.current_sequence(),
        version: PROTOCOL_VERSION,
    };
    let subscribe_response = SubscribeResponse {
        success: true,
        geohashes,
    };

    let handshake_ok = sender
        .send(Message::Binary(
            encode_frame(FrameTag::Welcome, &welcome).into(),
        ))
        .await
        .is_ok()
        && sender
            .send(Message::Binary(
                encode_frame(FrameTag::SubscribeResponse, &subscribe_response).into(),
            ))
            .await
            .is_ok();

    if handshake_ok {
        run_live(&mut sender, &mut receiver, &mut updates, &state).await;
    }

    // Closing
    metrics::gauge!("websocket_connections").decrement(1.0);
    state.pipeline.broadcaster.unregister_client(&client_id);
    state.pipeline.subscriptions.unregister(client_id);
}

async fn run_live(
    sender: &mut (impl futures_util::Sink<Message> + Unpin),
    receiver: &mut (impl futures_util::Stream<Item = Result<Message, axum::Error>> + Unpin),
    updates: &mut tokio::sync::mpsc::Receiver<crate::broadcaster::OutboundFrame>,
    state: &AppState,
) {
    let mut last_pong = Instant::now();
    let mut ping_ticker = tokio::time::interval(state.config.websocket_ping_interval);
    ping_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = ping_ticker.tick() => {
                if last_pong.elapsed() > state.config.websocket_pong_timeout {
                    tracing::debug!("websocket client missed pong deadline, closing");
                    break;
                }
                let ping = Ping { timestamp: Utc::now() };
                if sender.send(Message::Binary(encode_frame(FrameTag::Ping, &ping).into())).await.is_err() {
                    break;
                }
            }
            frame = updates.recv() => {
                match frame {
                    Some(frame) => {
                        if sender.send(Message::Binary((*frame).clone().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Binary(bytes))) => {
                        if bytes.first() == Some(&(FrameTag::Pong as u8)) {
                            last_pong = Instant::now();
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
