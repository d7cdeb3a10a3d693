// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only JSON export of the latest cycle.  All endpoints live under
// `/api/v1/`:
//
//   GET /api/v1/health             uptime, version, recent cycle errors
//   GET /api/v1/config             active engine configuration
//   GET /api/v1/snapshot           full latest snapshot
//   GET /api/v1/instruments/:name  one instrument's columns and events
//   GET /api/v1/events             all events, time ordered
//
// Snapshot endpoints return 404 until the first cycle completes.  CORS is
// permissive so any dashboard origin can poll.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

use crate::app_state::AppState;
use crate::engine::{CycleSnapshot, InstrumentSummary, TaggedEvent};
use crate::frame::Frame;

// =============================================================================
// Router construction
// =============================================================================

/// Build the API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/config", get(config))
        .route("/api/v1/snapshot", get(snapshot))
        .route("/api/v1/instruments/:name", get(instrument))
        .route("/api/v1/events", get(events))
        .layer(cors)
        .with_state(state)
}

fn not_found(message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

fn no_cycle_yet() -> Response {
    not_found("no refresh cycle has completed yet")
}

// =============================================================================
// Health / config
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health())
}

async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.read().clone();
    Json(config)
}

// =============================================================================
// Snapshot
// =============================================================================

async fn snapshot(State(state): State<Arc<AppState>>) -> Response {
    match state.latest() {
        Some(snapshot) => Json(snapshot.as_ref()).into_response(),
        None => no_cycle_yet(),
    }
}

// =============================================================================
// Instrument detail
// =============================================================================

#[derive(Serialize)]
struct InstrumentResponse<'a> {
    cycle_id: &'a str,
    last_updated: String,
    #[serde(flatten)]
    summary: &'a InstrumentSummary,
    frame: Frame,
}

async fn instrument(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    let Some(snapshot) = state.latest() else {
        return no_cycle_yet();
    };
    let Some(summary) = snapshot.instrument(&name) else {
        debug!(instrument = %name, "Unknown instrument requested");
        return not_found(format!("unknown instrument '{name}'"));
    };

    let body = InstrumentResponse {
        cycle_id: &snapshot.cycle_id,
        last_updated: snapshot.last_updated.to_rfc3339(),
        summary,
        frame: snapshot.instrument_frame(&summary.instrument),
    };
    Json(body).into_response()
}

// =============================================================================
// Events
// =============================================================================

#[derive(Serialize)]
struct EventsResponse<'a> {
    cycle_id: &'a str,
    session_date: String,
    events: Vec<TaggedEvent<'a>>,
}

fn events_body(snapshot: &CycleSnapshot) -> EventsResponse<'_> {
    EventsResponse {
        cycle_id: &snapshot.cycle_id,
        session_date: snapshot.session_date.to_string(),
        events: snapshot.all_events(),
    }
}

async fn events(State(state): State<Arc<AppState>>) -> Response {
    match state.latest() {
        Some(snapshot) => Json(events_body(&snapshot)).into_response(),
        None => no_cycle_yet(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    use crate::engine::run_cycle;
    use crate::feed::FeedTable;
    use crate::runtime_config::EngineConfig;
    use crate::session::SessionConfig;

    fn published_state() -> Arc<AppState> {
        let mut csv = String::from("Timestamp,Nifty_ISS,Nifty_Price_Action\n");
        for i in 0..50 {
            let minutes = 15 + i;
            let v = if i < 25 { 0.3 + 0.025 * i as f64 } else { 0.9 - 0.025 * (i - 25) as f64 };
            csv.push_str(&format!("2024-03-04 {:02}:{:02}:00,{v},{v}\n", 9 + minutes / 60, minutes % 60));
        }
        let table = FeedTable::from_csv_str(&csv).unwrap();
        let session = SessionConfig::default().window_for(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let config = EngineConfig::default();
        let snapshot = run_cycle(&config, &table, &session).unwrap();

        let state = Arc::new(AppState::new(config));
        state.publish(snapshot);
        state
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_always_available() {
        let state = Arc::new(AppState::new(EngineConfig::default()));
        let (status, body) = get_json(state, "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "warming_up");
    }

    #[tokio::test]
    async fn snapshot_404_before_first_cycle() {
        let state = Arc::new(AppState::new(EngineConfig::default()));
        let (status, body) = get_json(state.clone(), "/api/v1/snapshot").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().is_some());

        let (status, _) = get_json(state, "/api/v1/events").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn snapshot_after_publish() {
        let (status, body) = get_json(published_state(), "/api/v1/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"], 50);
        assert_eq!(body["plot_columns"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn instrument_detail_and_unknown() {
        let state = published_state();

        let (status, body) = get_json(state.clone(), "/api/v1/instruments/nifty").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["instrument"]["name"], "NIFTY");
        assert!(body["frame"]["columns"]["Nifty_Composite"].is_array());
        assert!(body["frame"]["columns"].get("Bank_ISS").is_none());
        assert_eq!(body["events"][0]["kind"], "EnterLong");
        assert_eq!(body["events"][0]["color"], "green");

        let (status, _) = get_json(state, "/api/v1/instruments/SENSEX").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn events_are_tagged_with_instrument() {
        let (status, body) = get_json(published_state(), "/api/v1/events").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_date"], "2024-03-04");
        let events = body["events"].as_array().unwrap();
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e["instrument"] == "NIFTY"));
    }

    #[tokio::test]
    async fn config_is_exported() {
        let (status, body) = get_json(published_state(), "/api/v1/config").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["refresh_interval_secs"], 300);
        assert_eq!(body["pipeline"]["mode"], "blended");
    }
}
