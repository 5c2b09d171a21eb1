use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use align_core::{AlignmentLogger, AlignmentRecord, UnitTiming};
use highlight_core::{HighlightEngine, TimedText, TranscriptSnapshot};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{self, MetricsResponse};
use crate::validation::{validate_session_id, validate_transcription_event};

#[derive(Clone)]
pub struct AppState {
    pub engine: HighlightEngine,
    pub alignments: Arc<AlignmentLogger>,
    pub session_id: Arc<Mutex<Option<Uuid>>>,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

/// One transcription event as the external voice agent publishes it.
#[derive(Deserialize)]
pub struct TranscriptionRequest {
    /// Discriminator on the producer's wire format; always "transcription".
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub text: String,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct TranscriptionAck {
    pub session_id: Uuid,
    pub index: usize,
}

#[derive(Serialize)]
pub struct SessionStartResponse {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SessionStopResponse {
    pub session_id: Option<Uuid>,
    pub units: usize,
    pub alignment_file: Option<String>,
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn start_session(
    State(state): State<AppState>,
) -> Result<Json<SessionStartResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    // Reset scheduler state before the external assistant is started so no
    // stale highlight survives into the new session.
    state.engine.begin_session().await?;

    let session_id = Uuid::new_v4();
    *state.session_id.lock().unwrap() = Some(session_id);

    info!(%session_id, "session started");
    Ok(Json(SessionStartResponse {
        session_id,
        started_at: Utc::now(),
    }))
}

pub async fn stop_session(
    State(state): State<AppState>,
) -> Result<Json<SessionStopResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    let session_id = state.session_id.lock().unwrap().take();
    let snapshot = state.engine.transcript();

    // Persist the alignment record before the reset wipes the transcript.
    let alignment_file = if snapshot.units.is_empty() {
        None
    } else {
        let record = build_alignment_record(&snapshot);
        let alignments = state.alignments.clone();
        let path = tokio::task::spawn_blocking(move || alignments.save(&record))
            .await
            .map_err(|e| ApiError::InternalError(format!("Task join error: {e}")))??;
        Some(path.display().to_string())
    };

    state.engine.end_session().await?;

    info!(units = snapshot.units.len(), "session stopped");
    Ok(Json(SessionStopResponse {
        session_id,
        units: snapshot.units.len(),
        alignment_file,
    }))
}

pub async fn ingest_transcription(
    State(state): State<AppState>,
    Json(req): Json<TranscriptionRequest>,
) -> Result<Json<TranscriptionAck>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    validate_transcription_event(&req.text)?;
    if let Some(ref id) = req.session_id {
        validate_session_id(id)?;
    }

    let session_id = {
        let mut current = state.session_id.lock().unwrap();
        match (*current, req.session_id.as_deref()) {
            (Some(active), Some(claimed))
                if Uuid::parse_str(claimed).map_or(true, |c| c != active) =>
            {
                // A producer still streaming an old utterance must not
                // pollute the session that superseded it.
                return Err(ApiError::SessionMismatch(format!(
                    "event targets session {claimed}, active session is {active}"
                )));
            }
            (Some(active), _) => active,
            (None, Some(claimed)) => {
                return Err(ApiError::SessionMismatch(format!(
                    "event targets session {claimed}, but no session is active"
                )));
            }
            (None, None) => {
                // First unit of a new utterance opens a session implicitly.
                let id = Uuid::new_v4();
                *current = Some(id);
                info!(session_id = %id, "session opened by first transcription event");
                id
            }
        }
    };

    let index = state
        .engine
        .push(TimedText {
            text: req.text,
            start_time: req.start_time,
            end_time: req.end_time,
        })
        .await?;

    Ok(Json(TranscriptionAck { session_id, index }))
}

pub async fn get_transcript(State(state): State<AppState>) -> Json<TranscriptSnapshot> {
    Json(state.engine.transcript())
}

pub async fn latest_alignment(
    State(state): State<AppState>,
) -> Result<Json<AlignmentRecord>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    let alignments = state.alignments.clone();
    let record = tokio::task::spawn_blocking(move || alignments.latest_alignment())
        .await
        .map_err(|e| ApiError::InternalError(format!("Task join error: {e}")))??;

    record
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No alignment saved yet".to_string()))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let system = metrics::collect_system(state.request_count.load(Ordering::Relaxed));
    Json(MetricsResponse {
        timestamp: Utc::now(),
        system,
        scheduler: state.engine.stats(),
    })
}

pub async fn events_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| events_socket(socket, state))
}

async fn events_socket(socket: WebSocket, state: AppState) {
    // Subscribe before the initial snapshot so nothing falls in between.
    let mut events = state.engine.subscribe();
    let (mut sender, mut receiver) = socket.split();

    if send_snapshot(&mut sender, &state).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Failed to encode event: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged, resyncing with snapshot");
                    if send_snapshot(&mut sender, &state).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                // Subscribers only listen; ignore anything they send.
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
) -> Result<(), axum::Error> {
    let snapshot = state.engine.transcript();
    let msg = serde_json::json!({
        "type": "snapshot",
        "units": snapshot.units,
        "highlighted": snapshot.highlighted,
    });
    sender.send(Message::Text(msg.to_string().into())).await
}

fn build_alignment_record(snapshot: &TranscriptSnapshot) -> AlignmentRecord {
    let text: String = snapshot.units.iter().map(|u| u.text.as_str()).collect();
    let units = snapshot
        .units
        .iter()
        .map(|u| UnitTiming {
            index: u.index,
            text: u.text.clone(),
            start_ms: u.start_time.map(secs_to_ms),
            end_ms: u.end_time.map(secs_to_ms),
        })
        .collect();
    AlignmentRecord::new(text, units)
}

fn secs_to_ms(seconds: f64) -> u64 {
    (seconds * 1000.0).round() as u64
}

/// All routes, mounted both at the root and under `/api`. Middleware is
/// attached by the binary; tests drive this router directly.
pub fn app(state: AppState) -> Router {
    let public_api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/session/start", post(start_session))
        .route("/session/stop", post(stop_session))
        .route("/transcription", post(ingest_transcription))
        .route("/transcript", get(get_transcript))
        .route("/events/ws", get(events_ws))
        .route("/alignment/latest", get(latest_alignment));

    // Metrics endpoint - consider adding authentication in production
    let metrics_api = Router::new().route("/metrics", get(metrics_endpoint));

    let api = Router::new().merge(public_api).merge(metrics_api);

    Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .with_state(state)
}
