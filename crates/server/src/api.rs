use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parley_core::config::NegotiationConfig;
use parley_core::domain::session::SessionId;
use parley_core::domain::turn::Turn;
use parley_core::errors::{ApplicationError, InterfaceError, RegistryError};
use parley_core::negotiation::agreement::Agreement;
use parley_core::negotiation::registry::SessionRegistry;
use parley_core::negotiation::request::SessionRequest;
use parley_core::negotiation::session::SessionSnapshot;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::health;

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub negotiation: NegotiationConfig,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct TurnPlayed {
    pub turn: Turn,
    pub session: SessionSnapshot,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdvanceParams {
    /// `false` answers 409 instead of queueing behind a turn already in flight.
    #[serde(default)]
    pub wait: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: String,
    user_message: &'static str,
    correlation_id: &'a str,
}

/// Interface error carried out of a handler.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_registry(error: RegistryError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        Self(ApplicationError::from(error).into_interface(correlation_id))
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self(InterfaceError::Conflict {
            message: message.into(),
            correlation_id: Uuid::new_v4().to_string(),
        })
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: Uuid::new_v4().to_string(),
        })
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        Self::from_registry(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        warn!(
            event_name = "system.api.request_failed",
            correlation_id = %self.0.correlation_id(),
            status = status.as_u16(),
            error = %self.0,
            "negotiation api request failed"
        );

        let body = ErrorBody {
            error: code,
            message: self.0.to_string(),
            user_message: self.0.user_message(),
            correlation_id: self.0.correlation_id(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    let health = health::router(Arc::clone(&state.registry));
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{session_id}", get(get_session).delete(close_session))
        .route("/sessions/{session_id}/advance", post(advance_session))
        .route("/sessions/{session_id}/run", post(run_session))
        .route("/sessions/{session_id}/agreement", get(get_agreement))
        .with_state(state)
        .merge(health)
}

pub async fn create_session(
    State(state): State<ApiState>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let constraints = request.constraints.resolve(&state.negotiation);
    let policies = request.policies.build(&state.negotiation);

    let session_id = state.registry.create(request.parties, constraints, policies)?;
    let session = state.registry.get(&session_id)?;
    info!(
        event_name = "system.api.session_created",
        session_id = %session_id,
        "negotiation session created via api"
    );
    Ok((StatusCode::CREATED, Json(SessionCreated { session_id, session })))
}

pub async fn get_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.registry.get(&SessionId(session_id))?))
}

pub async fn advance_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Query(params): Query<AdvanceParams>,
) -> Result<Json<TurnPlayed>, ApiError> {
    let session_id = SessionId(session_id);
    let turn = if params.wait.unwrap_or(true) {
        state.registry.advance_turn(&session_id).await?
    } else {
        state.registry.try_advance_turn(&session_id).await?
    };
    let session = state.registry.get(&session_id)?;
    Ok(Json(TurnPlayed { turn, session }))
}

pub async fn run_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.registry.run_to_completion(&SessionId(session_id)).await?))
}

pub async fn get_agreement(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<Agreement>, ApiError> {
    let snapshot = state.registry.get(&SessionId(session_id))?;
    match snapshot.agreement {
        Some(agreement) => Ok(Json(agreement)),
        None => Err(ApiError::conflict(format!(
            "session `{}` has no agreement (status {:?})",
            snapshot.session_id, snapshot.status
        ))),
    }
}

pub async fn close_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.registry.close(&SessionId(session_id)).await?))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use parley_core::config::AppConfig;
    use parley_core::negotiation::driver::TurnSettings;
    use parley_core::negotiation::registry::SessionRegistry;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, ApiState};
    use crate::transport::ChannelTransport;

    fn app(transport: ChannelTransport) -> Router {
        let registry = Arc::new(SessionRegistry::new(TurnSettings::default(), Arc::new(transport)));
        router(ApiState { registry, negotiation: AppConfig::default().negotiation })
    }

    fn party(id: &str, role: &str, reservation: &str, availability: Value) -> Value {
        json!({"id": id, "role": role, "reservation_value": reservation, "availability": availability})
    }

    fn session_body(policies: Value) -> Value {
        json!({
            "parties": [
                party("buyer-1", "BUYER", "300.00", json!([
                    {"day": "Tue", "start": "09:00", "end": "12:00"},
                    {"day": "Fri", "start": "13:00", "end": "17:00"}
                ])),
                party("provider-1", "PROVIDER", "250.00", json!([
                    {"day": "Tue", "start": "10:00", "end": "16:00"},
                    {"day": "Fri", "start": "08:00", "end": "18:00"}
                ]))
            ],
            "constraints": {
                "latest_completion": "2025-10-03T23:59:00Z",
                "budget": {"min": "150.00", "target": "250.00", "max": "300.00"},
                "calendar": {"week_of": "2025-09-29"}
            },
            "policies": policies
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json") };
        (status, value)
    }

    async fn create(app: &Router, policies: Value) -> String {
        let (status, body) = send(app, "POST", "/sessions", Some(session_body(policies))).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["session_id"].as_str().expect("session id").to_string()
    }

    #[tokio::test]
    async fn concession_session_runs_to_an_agreement() {
        let transport = ChannelTransport::default();
        let mut events = transport.subscribe();
        let app = app(transport);
        let session_id = create(&app, json!({})).await;

        let (status, snapshot) = send(&app, "POST", &format!("/sessions/{session_id}/run"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["status"], "ACCEPTED");
        assert_eq!(snapshot["termination"], "AGREEMENT");

        let (status, agreement) = send(&app, "GET", &format!("/sessions/{session_id}/agreement"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(agreement["agreement_id"], format!("agr_{session_id}"));
        assert_eq!(agreement["buyer_id"], "buyer-1");

        let first = events.recv().await.expect("broadcast");
        assert_eq!(first.session_id.0, session_id);
        assert_eq!(first.turn.round_index, 1);
    }

    #[tokio::test]
    async fn advance_plays_one_turn_at_a_time() {
        let app = app(ChannelTransport::default());
        let session_id = create(&app, json!({})).await;

        let (status, played) = send(&app, "POST", &format!("/sessions/{session_id}/advance"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(played["turn"]["actor_role"], "BUYER");
        assert_eq!(played["turn"]["intent"], "COUNTER");
        assert_eq!(played["session"]["active_role"], "PROVIDER");

        let (status, played) =
            send(&app, "POST", &format!("/sessions/{session_id}/advance?wait=false"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(played["turn"]["round_index"], 2);

        let (status, snapshot) = send(&app, "GET", &format!("/sessions/{session_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["transcript"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn rejected_session_has_no_agreement_and_refuses_more_turns() {
        let app = app(ChannelTransport::default());
        let policies = json!({
            "buyer": {"kind": "scripted", "decisions": [{"intent": "REJECT", "rationale": "not today"}]}
        });
        let session_id = create(&app, policies).await;

        let (_, played) = send(&app, "POST", &format!("/sessions/{session_id}/advance"), None).await;
        assert_eq!(played["session"]["status"], "REJECTED");

        let (status, error) = send(&app, "POST", &format!("/sessions/{session_id}/advance"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["error"], "conflict");

        let (status, error) = send(&app, "GET", &format!("/sessions/{session_id}/agreement"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(error["message"].as_str().expect("message").contains("has no agreement"));
    }

    #[tokio::test]
    async fn close_expires_and_forgets_the_session() {
        let app = app(ChannelTransport::default());
        let session_id = create(&app, json!({})).await;

        let (status, snapshot) = send(&app, "DELETE", &format!("/sessions/{session_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["status"], "EXPIRED");
        assert_eq!(snapshot["termination"], "CLOSED");

        let (status, error) = send(&app, "GET", &format!("/sessions/{session_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!error["correlation_id"].as_str().expect("correlation id").is_empty());
    }

    #[tokio::test]
    async fn invalid_requests_are_bad_requests() {
        let app = app(ChannelTransport::default());

        let mut duplicate = session_body(json!({}));
        duplicate["parties"][1]["role"] = json!("BUYER");
        let (status, error) = send(&app, "POST", "/sessions", Some(duplicate)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error["message"].as_str().expect("message").contains("BUYER"));

        let mut inverted = session_body(json!({}));
        inverted["constraints"]["budget"]["min"] = json!("400.00");
        let (status, _) = send(&app, "POST", "/sessions", Some(inverted)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, error) = send(&app, "POST", "/sessions", Some(json!({"parties": "nope"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], "bad_request");
    }

    #[tokio::test]
    async fn per_session_limits_stay_within_configured_ranges() {
        let app = app(ChannelTransport::default());

        let mut endless = session_body(json!({}));
        endless["constraints"]["max_rounds"] = json!(1_000_000);
        let (status, error) = send(&app, "POST", "/sessions", Some(endless)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error["message"].as_str().expect("message").contains("max_rounds"));

        let mut wide = session_body(json!({}));
        wide["constraints"]["stall_window"] = json!(1_000_000);
        let (status, error) = send(&app, "POST", "/sessions", Some(wide)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error["message"].as_str().expect("message").contains("stall_window"));

        let (_, health) = send(&app, "GET", "/health", None).await;
        assert_eq!(health["live_sessions"], 0);
    }

    #[tokio::test]
    async fn health_counts_live_sessions() {
        let app = app(ChannelTransport::default());
        create(&app, json!({})).await;

        let (status, health) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["live_sessions"], 1);
    }
}
