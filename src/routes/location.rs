//! REST location endpoint.
//!
//! Map clients that have not opened a socket yet (or prefer one-shot
//! reporting) post here; the update flows through the same hub path as the
//! WebSocket variant, so connected viewers still receive their deltas.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::hub;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DetectLocationRequest {
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub auto_detect: bool,
}

/// `POST /location/detect` — report a position outside the socket.
pub async fn detect_location(State(state): State<AppState>, Json(req): Json<DetectLocationRequest>) -> Response {
    match hub::apply_location_update(&state, &req.user_id, req.latitude, req.longitude, req.auto_detect).await {
        Ok(presence) => Json(json!({
            "user_id": presence.user_id,
            "latitude": presence.latitude,
            "longitude": presence.longitude,
            "status": presence.status,
            "timestamp": presence.last_update_at,
        }))
        .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_helpers::test_app_state;
    use crate::store::Status;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn accepts_valid_position() {
        let state = test_app_state();
        let req = DetectLocationRequest { user_id: "alice".into(), latitude: 40.0, longitude: -73.0, auto_detect: true };
        let response = detect_location(State(state.clone()), Json(req)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let presence = state.store.get("alice").await.unwrap();
        assert_eq!(presence.status, Status::Online);
    }

    #[tokio::test]
    async fn rejects_invalid_position() {
        let state = test_app_state();
        let req = DetectLocationRequest { user_id: "alice".into(), latitude: 91.0, longitude: 0.0, auto_detect: false };
        let response = detect_location(State(state.clone()), Json(req)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.is_empty().await);
    }
}
