use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use parley_core::negotiation::registry::SessionRegistry;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    registry: Arc<SessionRegistry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub registry: HealthCheck,
    pub live_sessions: usize,
    pub checked_at: String,
}

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { registry })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let live_sessions = state.registry.len();

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "parley-server runtime initialized".to_string(),
        },
        registry: HealthCheck {
            status: "ready",
            detail: format!("{live_sessions} live negotiation session(s)"),
        },
        live_sessions,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use parley_core::negotiation::driver::TurnSettings;
    use parley_core::negotiation::registry::SessionRegistry;
    use parley_core::transport::NoopTransport;

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_reports_ready_with_live_session_count() {
        let registry = Arc::new(SessionRegistry::new(TurnSettings::default(), Arc::new(NoopTransport)));

        let (status, Json(payload)) = health(State(HealthState { registry })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.live_sessions, 0);
        assert_eq!(payload.registry.detail, "0 live negotiation session(s)");
        assert_eq!(payload.service.status, "ready");
    }
}
