use axum::{
    extract::{
        Extension, Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    routes::member::Member,
    routes::schedule::{Capability, require_attendee, require_capability},
    utils::{Claims, success_to_api_response, verify_token},
};

use super::model::{ChatMessage, validate_content};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<Uuid>,
    pub limit: Option<i64>,
}

/// Frames a client may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Join { schedule_id: Uuid },
    Send { schedule_id: Uuid, content: String },
}

/// Frames the server emits. Errors are addressed to the offending socket
/// only; they never reach the topic.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Joined { schedule_id: Uuid },
    Message { message: ChatMessage },
    Error { code: i32, message: String },
}

impl ServerFrame {
    fn error(e: &AppError) -> Self {
        ServerFrame::Error {
            code: e.code(),
            message: e.message(),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","code":5000,"message":"serialization failed"}"#.into()
        })
    }
}

/// The upgrade request bypasses the HTTP auth middleware, so the bearer token
/// is checked here: Authorization header first, `?token=` as a fallback for
/// browser clients that cannot set handshake headers.
#[axum::debug_handler]
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = bearer
        .map(|TypedHeader(auth)| auth.token().to_string())
        .or(query.token)
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_token(&token, &state.config)?;
    if claims.is_refresh {
        return Err(AppError::Unauthorized);
    }

    let member_id = claims.sub;
    Ok(ws.on_upgrade(move |socket| handle_socket(state, member_id, socket)))
}

async fn handle_socket(state: AppState, member_id: Uuid, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    // Everything written to this socket, broadcasts and per-socket errors
    // alike, funnels through one outbox task.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let mut outbox = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut subscription: Option<(Uuid, JoinHandle<()>)> = None;

    loop {
        tokio::select! {
            _ = &mut outbox => break,
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break };
                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let frame = match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(frame) => frame,
                    Err(_) => {
                        let err = AppError::Validation("Malformed chat frame".into());
                        let _ = out_tx.send(ServerFrame::error(&err).to_json()).await;
                        continue;
                    }
                };

                if let Err(e) =
                    handle_frame(&state, member_id, frame, &out_tx, &mut subscription).await
                {
                    let _ = out_tx.send(ServerFrame::error(&e).to_json()).await;
                }
            }
        }
    }

    if let Some((schedule_id, task)) = subscription.take() {
        task.abort();
        // The receiver must be dropped before the hub decides whether the
        // topic is empty; abort alone does not guarantee that.
        let _ = task.await;
        state.hub.release(schedule_id).await;
    }
    outbox.abort();
    tracing::debug!("chat socket for member {} closed", member_id);
}

async fn handle_frame(
    state: &AppState,
    member_id: Uuid,
    frame: ClientFrame,
    out_tx: &mpsc::Sender<String>,
    subscription: &mut Option<(Uuid, JoinHandle<()>)>,
) -> Result<(), AppError> {
    match frame {
        ClientFrame::Join { schedule_id } => {
            // Any attendee may read the room, regardless of permission.
            require_attendee(&state.pool, schedule_id, member_id).await?;

            if let Some((previous, task)) = subscription.take() {
                task.abort();
                let _ = task.await;
                state.hub.release(previous).await;
            }

            let mut rx = state.hub.subscribe(schedule_id).await;
            let forward_tx = out_tx.clone();
            let task = tokio::spawn(async move {
                // Lagged receivers skip ahead rather than closing the socket.
                loop {
                    match rx.recv().await {
                        Ok(frame) => {
                            if forward_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("chat subscriber lagged by {} frames", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            *subscription = Some((schedule_id, task));

            let _ = out_tx
                .send(ServerFrame::Joined { schedule_id }.to_json())
                .await;
            Ok(())
        }
        ClientFrame::Send {
            schedule_id,
            content,
        } => {
            validate_content(&content)?;
            require_capability(&state.pool, schedule_id, member_id, Capability::Chat).await?;

            let member = Member::find_by_id(&state.pool, member_id)
                .await?
                .ok_or(AppError::MemberNotFound)?;

            let message = ChatMessage::create(
                &state.pool,
                &state.redis,
                schedule_id,
                member_id,
                &member.nickname,
                content.trim(),
            )
            .await?;

            state
                .hub
                .publish(schedule_id, ServerFrame::Message { message }.to_json())
                .await;
            Ok(())
        }
    }
}

/// REST view of the same append-only log, for loading history on room entry.
#[axum::debug_handler]
pub async fn get_messages(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_attendee(&state.pool, schedule_id, claims.sub).await?;

    let messages = ChatMessage::history(
        &state.pool,
        &state.redis,
        schedule_id,
        query.before,
        query.limit,
    )
    .await?;

    Ok((StatusCode::OK, success_to_api_response(messages)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_deserialize_by_tag() {
        let join: ClientFrame = serde_json::from_str(
            r#"{"type":"join","schedule_id":"8c0f8f6e-2a37-4a4e-9a39-1d54a1a2b3c4"}"#,
        )
        .unwrap();
        assert!(matches!(join, ClientFrame::Join { .. }));

        let send: ClientFrame = serde_json::from_str(
            r#"{"type":"send","schedule_id":"8c0f8f6e-2a37-4a4e-9a39-1d54a1a2b3c4","content":"hi"}"#,
        )
        .unwrap();
        assert!(matches!(send, ClientFrame::Send { .. }));
    }

    #[test]
    fn error_frames_carry_the_business_code() {
        let frame = ServerFrame::error(&AppError::MessageTooLong).to_json();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], crate::utils::error_codes::MESSAGE_TOO_LONG);
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"nope"}"#).is_err());
    }
}
