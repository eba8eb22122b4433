use crate::display::DisplayReadout;
use crate::export::{self, Export, ExportFormat, ExportKind, PrimarySnapshot, PRIMARY_RECENT};
use crate::link::{LinkFlags, LinkState};
use crate::map::TrackMsg;
use crate::pipeline::RawTelemetry;
use crate::sequences::IgnitionStatus;
use crate::state::{lock, AppState, TelemetryInput};
use axum::http::{header, StatusCode};
use axum::{
    extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{Sink, SinkExt, StreamExt};
use mission_control_shared::{
    ChartChannel, ChartPoint, LogEntry, MissionCommand, MissionSummary, StampedSample,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tower_http::compression::CompressionLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/telemetry", post(post_telemetry))
        .route("/api/command", post(post_command))
        .route("/api/mission", get(get_mission))
        .route("/api/history", get(get_history))
        .route("/api/charts", get(get_charts))
        .route("/api/log", get(get_log))
        .route("/api/display", get(get_display))
        .route("/api/map", get(get_map))
        .route("/api/link", get(get_link))
        .route("/api/ignition", get(get_ignition))
        .route("/api/export", get(get_export))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Outgoing WebSocket messages:
///   { "ty": "display", "data": { ...DisplayReadout... } }
///   { "ty": "charts",  "data": { "reset": false, "series": [...] } }
///   { "ty": "log",     "data": { ...LogEntry... } }
///   { "ty": "log_cleared" }
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "ty", content = "data", rename_all = "snake_case")]
pub enum WsOutMsg {
    Display(DisplayReadout),
    Charts(ChartsMsg),
    Map(TrackMsg),
    Log(LogEntry),
    LogCleared,
    Mission(MissionSummary),
    Link(LinkMsg),
    Ignition(IgnitionStatus),
}

#[derive(Clone, Debug, Serialize)]
pub struct ChartsMsg {
    /// Clients drop everything they hold before applying `series`.
    pub reset: bool,
    pub series: Vec<SeriesMsg>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SeriesMsg {
    pub channel: ChartChannel,
    pub points: Vec<ChartPoint>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LinkMsg {
    #[serde(flatten)]
    pub state: LinkState,
    #[serde(flatten)]
    pub flags: LinkFlags,
}

/// Shape of operator commands over HTTP and WebSocket:
/// { "cmd": "Connect" } or { "cmd": "StartCountdown" }
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub cmd: MissionCommand,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}

async fn post_telemetry(State(state): State<Arc<AppState>>, body: String) -> impl IntoResponse {
    let (reply_tx, reply_rx) = oneshot::channel();
    let input = TelemetryInput {
        raw: RawTelemetry::Text(body),
        reply: Some(reply_tx),
    };
    if state.input_tx.send(input).await.is_err() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "telemetry task stopped");
    }
    match reply_rx.await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => {
            let status = match e {
                crate::error::IngestError::GateClosed { .. } => StatusCode::CONFLICT,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            error_response(status, e)
        }
        Err(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, "telemetry task stopped"),
    }
}

async fn post_command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    match state.cmd_tx.send(req.cmd).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, "telemetry task stopped"),
    }
}

async fn get_mission(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(lock(&state.pipeline).summary())
}

#[derive(Deserialize)]
struct HistoryParams {
    // /api/history?limit=50  (everything retained if not provided)
    limit: Option<usize>,
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let pipeline = lock(&state.pipeline);
    let history = pipeline.mission().history();
    let limit = params.limit.unwrap_or(history.len());
    let rows: Vec<StampedSample> = history.tail(limit).cloned().collect();
    Json(rows)
}

async fn get_charts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pipeline = lock(&state.pipeline);
    let series: Vec<SeriesMsg> = ChartChannel::ALL
        .iter()
        .map(|&channel| SeriesMsg {
            channel,
            points: pipeline.charts().series(channel).iter().copied().collect(),
        })
        .collect();
    Json(ChartsMsg {
        reset: true,
        series,
    })
}

async fn get_log(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(lock(&state.event_log).snapshot())
}

async fn get_display(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(lock(&state.readout).clone())
}

async fn get_map(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(lock(&state.track).snapshot())
}

async fn get_link(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.link_msg())
}

async fn get_ignition(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(*state.ignition_rx.borrow())
}

#[derive(Deserialize)]
struct ExportParams {
    kind: ExportKind,
    #[serde(default)]
    format: ExportFormat,
}

async fn get_export(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> impl IntoResponse {
    match build_export(&state, params.kind, params.format) {
        Ok(export) => (
            [
                (header::CONTENT_TYPE, export.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", export.filename),
                ),
            ],
            export.body,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, format!("{e:#}")),
    }
}

fn build_export(
    state: &AppState,
    kind: ExportKind,
    format: ExportFormat,
) -> anyhow::Result<Export> {
    match kind {
        ExportKind::Primary => {
            let readout = lock(&state.readout).clone();
            let pipeline = lock(&state.pipeline);
            let now_ms = pipeline.now_ms();
            let summary = pipeline.summary();
            let recent: Vec<StampedSample> = pipeline
                .mission()
                .history()
                .tail(PRIMARY_RECENT)
                .cloned()
                .collect();
            export::primary(
                &PrimarySnapshot {
                    readout: &readout,
                    summary: &summary,
                    recent: &recent,
                    now_ms,
                },
                format,
            )
        }
        ExportKind::History => {
            let pipeline = lock(&state.pipeline);
            export::history(pipeline.mission().history().iter(), format, pipeline.now_ms())
        }
        ExportKind::Charts => {
            let pipeline = lock(&state.pipeline);
            export::charts(pipeline.charts(), format, pipeline.now_ms())
        }
        ExportKind::Log => {
            let now_ms = lock(&state.pipeline).now_ms();
            let log = lock(&state.event_log);
            export::log(log.entries(), format, now_ms)
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Messages a client gets on connect, before the live stream.
fn initial_snapshot(state: &AppState) -> Vec<WsOutMsg> {
    let display = lock(&state.readout).clone();
    let map = lock(&state.track).snapshot();
    let mission = lock(&state.pipeline).summary();
    vec![
        WsOutMsg::Display(display),
        WsOutMsg::Map(map),
        WsOutMsg::Mission(mission),
        WsOutMsg::Link(state.link_msg()),
        WsOutMsg::Ignition(*state.ignition_rx.borrow()),
    ]
}

#[derive(Debug)]
enum Inbound {
    Command(MissionCommand),
    BadCommand(serde_json::Error),
    Telemetry(RawTelemetry),
}

/// Inbound text with a `cmd` key is an operator command, anything else is
/// handed to the pipeline as telemetry.
fn route_inbound(text: &str) -> Inbound {
    let value = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => value,
        Err(_) => return Inbound::Telemetry(RawTelemetry::Text(text.to_string())),
    };
    if value.get("cmd").is_none() {
        return Inbound::Telemetry(RawTelemetry::Json(value));
    }
    match serde_json::from_value::<CommandRequest>(value) {
        Ok(req) => Inbound::Command(req.cmd),
        Err(e) => Inbound::BadCommand(e),
    }
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let mut ws_rx = state.ws_tx.subscribe();
    let snapshot = initial_snapshot(&state);

    let cmd_tx = state.cmd_tx.clone();
    let input_tx = state.input_tx.clone();
    let (mut sender, mut receiver) = socket.split();

    // server -> client
    let send_task = async move {
        for msg in snapshot {
            if send_json(&mut sender, &msg).await.is_err() {
                return;
            }
        }
        loop {
            match ws_rx.recv().await {
                Ok(msg) => {
                    if send_json(&mut sender, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("ws client lagged by {n} messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    // client -> server
    let recv_task = async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            match route_inbound(text.as_str()) {
                Inbound::Command(cmd) => {
                    if let Err(e) = cmd_tx.send(cmd).await {
                        tracing::warn!("Failed to forward WS command: {e}");
                    }
                }
                Inbound::BadCommand(e) => {
                    tracing::warn!("Invalid WS command {text:?}: {e}");
                }
                Inbound::Telemetry(raw) => {
                    let input = TelemetryInput { raw, reply: None };
                    if let Err(e) = input_tx.send(input).await {
                        tracing::warn!("Failed to forward WS telemetry: {e}");
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }
}

async fn send_json<S>(sender: &mut S, msg: &WsOutMsg) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(msg).unwrap_or_default();
    sender.send(Message::Text(Utf8Bytes::from(text))).await
}
