//! C6: stream server. HTTP surface and the duplex `/ws/game2` channel
//! (spec.md §4.6, §6).
//!
//! Grounded on the teacher's `strand-cam` / `http-video-streaming` HTTP
//! wiring (axum router, per-client broadcast subscription) but retargeted
//! from the teacher's SSE-only transport onto the two transports spec.md
//! requires: a hand-rolled `multipart/x-mixed-replace` body for
//! `/video_feed`, and axum's native `axum::extract::ws` for the duplex
//! channel (the idiomatic choice already in the same web-framework stack,
//! since nothing in the teacher's workspace implements a bidirectional
//! JSON channel).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use http::{header, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::pipeline::{MetricsSnapshot, PipelineEvent, PipelineHandle};
use crate::session::{ClientCommand, SessionRecord};

/// One JSON object sent over `/ws/game2`, tagged by `type` (spec.md
/// §4.6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum OutboundMessage {
    Frame { data: String },
    Metrics(Arc<MetricsSnapshot>),
    SessionComplete(Arc<SessionRecord>),
    Connected,
    Error { message: String },
}

/// Builds the HTTP/duplex router (spec.md §6). Every request passes
/// through `tower_http`'s request-span tracing layer, matching the
/// teacher's convention of wrapping axum routers in a `ServiceBuilder`
/// with `TraceLayer` rather than logging ad hoc inside handlers.
pub fn router(handle: Arc<PipelineHandle>) -> Router {
    Router::new()
        .route("/video_feed", get(video_feed))
        .route("/tracking_data", get(tracking_data))
        .route("/api/sessions", get(api_sessions))
        .route("/session/start", post(session_start))
        .route("/session/stop", post(session_stop))
        .route("/hsv", post(hsv_update))
        .route("/ws/game2", get(ws_game2))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(handle)
}

async fn video_feed(State(handle): State<Arc<PipelineHandle>>) -> Response {
    let rx = handle.subscribe();
    let body_stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(PipelineEvent::Frame(jpeg)) => Some(Ok::<_, std::io::Error>(mjpeg_part(&jpeg))),
            _ => None,
        }
    });
    use futures::StreamExt;
    let body = axum::body::Body::from_stream(body_stream);
    Response::builder()
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .body(body)
        .expect("static headers/body are always a valid response")
}

fn mjpeg_part(jpeg: &[u8]) -> bytes::Bytes {
    let mut out = Vec::with_capacity(jpeg.len() + 64);
    out.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: ");
    out.extend_from_slice(jpeg.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n\r\n");
    out.extend_from_slice(jpeg);
    out.extend_from_slice(b"\r\n");
    bytes::Bytes::from(out)
}

async fn tracking_data(State(handle): State<Arc<PipelineHandle>>) -> impl IntoResponse {
    match handle.latest_metrics.read().clone() {
        Some(metrics) => Json(metrics.as_ref().clone()).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SessionsQueryParams {
    limit: Option<usize>,
}

async fn api_sessions(
    State(handle): State<Arc<PipelineHandle>>,
    Query(params): Query<SessionsQueryParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(20);
    match handle.store.query(limit) {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::error!("session query failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Dispatches a command to the pipeline task and maps the outcome to an
/// HTTP response: `202 ACCEPTED` on success, `409 CONFLICT` with a JSON
/// error body when the command is rejected (spec.md §7 `InvalidControl`).
async fn respond_to_command(handle: &PipelineHandle, cmd: ClientCommand) -> Response {
    match handle.dispatch_command(cmd).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(error) => (StatusCode::CONFLICT, Json(ErrorBody { error })).into_response(),
    }
}

async fn session_start(State(handle): State<Arc<PipelineHandle>>) -> Response {
    respond_to_command(&handle, ClientCommand::SessionStart).await
}

async fn session_stop(State(handle): State<Arc<PipelineHandle>>) -> Response {
    respond_to_command(&handle, ClientCommand::SessionStop).await
}

#[derive(Debug, Deserialize)]
struct HsvBody {
    lower: (u8, u8, u8),
    upper: (u8, u8, u8),
}

async fn hsv_update(
    State(handle): State<Arc<PipelineHandle>>,
    Json(body): Json<HsvBody>,
) -> Response {
    respond_to_command(
        &handle,
        ClientCommand::HsvUpdate {
            lower: body.lower,
            upper: body.upper,
        },
    )
    .await
}

async fn ws_game2(
    ws: WebSocketUpgrade,
    State(handle): State<Arc<PipelineHandle>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, handle))
}

/// Drives one client's duplex channel (spec.md §4.6, §5 "client tasks").
/// Disconnection (`ClientTransportError`, spec.md §7) simply ends this
/// task; the pipeline is unaffected.
async fn handle_socket(socket: WebSocket, handle: Arc<PipelineHandle>) {
    let (mut sender, mut receiver) = socket.split();
    use futures::{SinkExt, StreamExt};

    let connected = serde_json::to_string(&OutboundMessage::Connected).unwrap_or_default();
    if sender.send(Message::Text(connected.into())).await.is_err() {
        return;
    }

    let mut events = handle.subscribe();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = forward_command(&text, &handle).await {
                            let err_msg = OutboundMessage::Error { message: e };
                            if let Ok(json) = serde_json::to_string(&err_msg) {
                                let _ = sender.send(Message::Text(json.into())).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(PipelineEvent::Frame(jpeg)) => {
                        // Frames are consumed as fast as they're produced; a
                        // client that falls behind the broadcast channel's
                        // internal ring buffer (spec.md §5 "queue depth 2")
                        // receives `Lagged` below and simply skips ahead,
                        // which is this channel's equivalent of "drop the
                        // oldest frame".
                        let b64 = base64::engine::general_purpose::STANDARD.encode(jpeg.as_slice());
                        let msg = OutboundMessage::Frame { data: b64 };
                        if send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(PipelineEvent::Metrics(metrics)) => {
                        if send_json(&mut sender, &OutboundMessage::Metrics(metrics)).await.is_err() {
                            break;
                        }
                    }
                    Ok(PipelineEvent::SessionComplete(record)) => {
                        if send_json(&mut sender, &OutboundMessage::SessionComplete(record)).await.is_err() {
                            break;
                        }
                    }
                    Ok(PipelineEvent::Error(message)) => {
                        if send_json(&mut sender, &OutboundMessage::Error { message }).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("client lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &OutboundMessage,
) -> Result<(), axum::Error> {
    use futures::SinkExt;
    let json = serde_json::to_string(msg).unwrap_or_default();
    sender.send(Message::Text(json.into())).await
}

/// Parses one inbound duplex message and forwards it as a command,
/// surfacing both malformed JSON (spec.md §7 `MalformedMessage`) and
/// semantically-rejected commands (spec.md §7 `InvalidControl`: "Reply
/// with `error` message on the duplex channel; state unchanged") back to
/// this specific client -- never fatal to the connection.
async fn forward_command(text: &str, handle: &PipelineHandle) -> Result<(), String> {
    match serde_json::from_str::<ClientCommand>(text) {
        Ok(cmd) => handle.dispatch_command(cmd).await,
        Err(e) => {
            tracing::warn!("malformed duplex message, ignoring: {e}");
            Err(format!("malformed message: {e}"))
        }
    }
}

