//! WebSocket endpoint for client connections.
//!
//! Flow:
//! 1. Client connects to `/ws?token=<pre-shared-token>` (token optional in
//!    dev mode).
//! 2. The first envelope's `sessionId` binds the connection; envelopes
//!    naming a different session are rejected.
//! 3. Inbound frames run through limiter → codec → binding → conductor;
//!    outbound envelopes are serialized by a single writer task in
//!    emission order.

use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

use vx_protocol::{codes, Envelope};

use crate::conductor::Conductor;
use crate::state::AppState;

/// Constant-time token comparison via SHA-256 digest.
/// Hashing normalizes lengths so ct_eq always compares 32 bytes.
fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Pre-shared client token. Checked against `VOX_CLIENT_TOKEN` when
    /// that is set; unset = open access (dev mode).
    pub token: Option<String>,
}

/// GET /ws — upgrade to WebSocket.
pub async fn client_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    if let Ok(expected) = std::env::var("VOX_CLIENT_TOKEN") {
        let provided = query.token.as_deref().unwrap_or("");
        if !token_eq(provided, &expected) {
            return (
                axum::http::StatusCode::UNAUTHORIZED,
                "invalid or missing client token",
            )
                .into_response();
        }
    }

    let max_bytes = state.config.limits.max_event_bytes;
    ws.max_message_size(max_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(64);

    // Writer task: serializes outbound envelopes in emission order.
    let writer = tokio::spawn(async move {
        while let Some(env) = outbound_rx.recv().await {
            let json = match env.to_json() {
                Ok(j) => j,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unserializable envelope");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let conductor = Conductor::new(state.clone());
    let mut limiter = state.sessions.create_rate_limiter();
    let mut bound: Option<String> = None;
    let max_bytes = state.config.limits.max_event_bytes;

    while let Some(Ok(msg)) = ws_stream.next().await {
        let data = match msg {
            Message::Text(t) => t.into_bytes(),
            Message::Binary(b) => b,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        // 1. Admission.
        if !limiter.allow(Instant::now()) {
            match &bound {
                Some(sid) => {
                    let _ = outbound_tx
                        .send(Envelope::error(
                            sid,
                            codes::RATE_LIMITED,
                            "rate limit exceeded for this connection",
                        ))
                        .await;
                }
                None => tracing::warn!("rate limited before session binding"),
            }
            continue;
        }

        // 2. Codec.
        let env = match Envelope::parse(&data, max_bytes) {
            Ok(env) => env,
            Err(e) => {
                let sid = bound.as_deref().unwrap_or("");
                let _ = outbound_tx
                    .send(Envelope::error(sid, e.code(), &e.to_string()))
                    .await;
                continue;
            }
        };

        // 3. Session binding.
        match bind_session(&mut bound, &env.session_id) {
            Binding::Mismatch => {
                let sid = bound.as_deref().unwrap_or("");
                let _ = outbound_tx
                    .send(Envelope::error(
                        sid,
                        codes::SESSION_MISMATCH,
                        &format!("connection is bound to session {sid}"),
                    ))
                    .await;
                continue;
            }
            Binding::NewlyBound => {
                state.connections.connect(&env.session_id);
                tracing::info!(session_id = %env.session_id, "connection bound");
            }
            Binding::Bound => {}
        }

        // 4. Conductor.
        conductor.handle_event(env, &outbound_tx).await;
    }

    // Disconnect: the session persists; an in-flight turn is cancelled
    // only when this was the session's last live connection.
    if let Some(sid) = &bound {
        let remaining = state.connections.disconnect(sid);
        if remaining == 0 && state.cancel_map.cancel(sid) {
            tracing::info!(session_id = %sid, "cancelled in-flight turn on disconnect");
        }
        tracing::info!(session_id = %sid, remaining, "client disconnected");
    }
    writer.abort();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Binding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, PartialEq, Eq)]
enum Binding {
    /// First envelope: the connection is now bound to this session.
    NewlyBound,
    /// Envelope matches the existing binding.
    Bound,
    /// Envelope names a different session; reject it.
    Mismatch,
}

fn bind_session(bound: &mut Option<String>, session_id: &str) -> Binding {
    match bound {
        Some(sid) if sid != session_id => Binding::Mismatch,
        Some(_) => Binding::Bound,
        None => {
            *bound = Some(session_id.to_owned());
            Binding::NewlyBound
        }
    }
}
