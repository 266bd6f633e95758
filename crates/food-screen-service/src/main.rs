use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use clap::Parser;
use food_screen_api::{
    field_catalog, AnalysisReport, FieldCatalogEntry, FoodScreenApi, HistoryView, Session,
    SessionId, SessionInfo, API_CONTRACT_VERSION,
};
use food_screen_artifacts::{ArtifactCache, ArtifactPaths, ArtifactSummary};
use food_screen_core::{KernelError, SampleRecord};
use parking_lot::Mutex;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";

/// Artifact source for the whole process. A load that failed is retried on the next
/// request; a bad manifest is not.
#[derive(Debug)]
enum Availability {
    Configured(ArtifactCache),
    Misconfigured(String),
}

#[derive(Debug)]
struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

/// Live sessions. Each ledger sits behind its own lock; the map lock is only
/// held long enough to find a session. Sessions idle for longer than
/// `idle_timeout` are dropped together with their ledger.
#[derive(Debug)]
struct SessionRegistry {
    idle_timeout: Duration,
    sessions: Mutex<HashMap<SessionId, SessionSlot>>,
}

impl SessionRegistry {
    fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout, sessions: Mutex::new(HashMap::new()) }
    }

    fn insert(&self, session: Session, now: Instant) -> SessionInfo {
        let info = SessionInfo::from(&session);
        let mut sessions = self.sessions.lock();
        Self::sweep(&mut sessions, self.idle_timeout, now);
        sessions.insert(
            session.id(),
            SessionSlot { session: Arc::new(Mutex::new(session)), last_seen: now },
        );
        info
    }

    fn get(&self, id: SessionId, now: Instant) -> Option<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.lock();
        Self::sweep(&mut sessions, self.idle_timeout, now);
        let slot = sessions.get_mut(&id)?;
        slot.last_seen = now;
        Some(Arc::clone(&slot.session))
    }

    fn remove(&self, id: SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.lock().remove(&id).map(|slot| slot.session)
    }

    fn evict_idle(&self, now: Instant) -> usize {
        Self::sweep(&mut self.sessions.lock(), self.idle_timeout, now)
    }

    fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    fn sweep(
        sessions: &mut HashMap<SessionId, SessionSlot>,
        idle_timeout: Duration,
        now: Instant,
    ) -> usize {
        let before = sessions.len();
        sessions.retain(|id, slot| {
            let keep = now.saturating_duration_since(slot.last_seen) <= idle_timeout;
            if !keep {
                tracing::debug!(session = %id, "expired idle session");
            }
            keep
        });
        before - sessions.len()
    }
}

#[derive(Debug, Clone)]
struct ServiceState {
    availability: Arc<Availability>,
    sessions: Arc<SessionRegistry>,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Parser)]
#[command(name = "food-screen-service")]
#[command(about = "Local HTTP service for food adulteration screening")]
struct Args {
    #[arg(long, env = "FOOD_SCREEN_ARTIFACTS", default_value = "./artifacts")]
    artifacts: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    /// Seconds a session may sit unused before its history is discarded.
    #[arg(long, default_value_t = 3600)]
    session_idle_secs: u64,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl ServiceState {
    fn new(availability: Availability, idle_timeout: Duration) -> Self {
        Self {
            availability: Arc::new(availability),
            sessions: Arc::new(SessionRegistry::new(idle_timeout)),
        }
    }

    fn error(status: StatusCode, message: impl Into<String>) -> ServiceError {
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: message.into(),
        }
    }

    fn load_api(&self) -> Result<FoodScreenApi, String> {
        match self.availability.as_ref() {
            Availability::Configured(cache) => {
                FoodScreenApi::from_cache(cache).map_err(|err| err.to_string())
            }
            Availability::Misconfigured(reason) => Err(reason.clone()),
        }
    }

    fn api(&self) -> Result<FoodScreenApi, ServiceError> {
        self.load_api().map_err(|reason| {
            Self::error(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("screening models are unavailable: {reason}"),
            )
        })
    }

    fn session(&self, raw_id: &str) -> Result<(SessionId, Arc<Mutex<Session>>), ServiceError> {
        let not_found =
            || Self::error(StatusCode::NOT_FOUND, format!("session not found: {raw_id}"));
        let id = raw_id.parse::<SessionId>().map_err(|_| not_found())?;
        let session = self.sessions.get(id, Instant::now()).ok_or_else(not_found)?;
        Ok((id, session))
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

/// Resolve the artifact directory and attempt the first load so failures surface at startup.
fn load_availability(artifacts_dir: &FsPath) -> Availability {
    let cache = match ArtifactPaths::in_dir(artifacts_dir) {
        Ok(paths) => ArtifactCache::new(paths),
        Err(err) => {
            tracing::error!(
                artifacts = %artifacts_dir.display(),
                error = %err,
                "invalid artifact manifest; analysis disabled"
            );
            return Availability::Misconfigured(err.to_string());
        }
    };
    if let Err(err) = cache.get_or_load() {
        tracing::error!(
            artifacts = %artifacts_dir.display(),
            error = %err,
            "failed to load screening artifacts; analysis disabled until they load"
        );
    }
    Availability::Configured(cache)
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/fields", get(fields))
        .route("/v1/artifacts", get(artifacts))
        .route("/v1/sessions", post(session_create))
        .route("/v1/sessions/:session_id", delete(session_close))
        .route("/v1/sessions/:session_id/analyze", post(session_analyze))
        .route("/v1/sessions/:session_id/history", get(session_history))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let idle_timeout = Duration::from_secs(args.session_idle_secs);
    let state = ServiceState::new(load_availability(&args.artifacts), idle_timeout);

    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(idle_timeout.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle(Instant::now());
            if evicted > 0 {
                tracing::info!(evicted, remaining = sessions.len(), "expired idle sessions");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, "food screening service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health(State(state): State<ServiceState>) -> Json<ServiceEnvelope<HealthResponse>> {
    let response = match state.load_api() {
        Ok(_) => HealthResponse { status: "ok", error: None },
        Err(reason) => HealthResponse { status: "unavailable", error: Some(reason) },
    };
    Json(envelope(response))
}

async fn fields(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<Vec<FieldCatalogEntry>>>, ServiceError> {
    state.api()?;
    Ok(Json(envelope(field_catalog())))
}

async fn artifacts(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<ArtifactSummary>>, ServiceError> {
    let api = state.api()?;
    Ok(Json(envelope(api.artifact_summary())))
}

async fn session_create(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<SessionInfo>>, ServiceError> {
    let api = state.api()?;
    let info = state.sessions.insert(api.open_session(), Instant::now());
    Ok(Json(envelope(info)))
}

async fn session_close(
    State(state): State<ServiceState>,
    Path(session_id): Path<String>,
) -> Result<Json<ServiceEnvelope<SessionInfo>>, ServiceError> {
    let (id, _) = state.session(&session_id)?;
    let session = state.sessions.remove(id).ok_or_else(|| {
        ServiceState::error(StatusCode::NOT_FOUND, format!("session not found: {session_id}"))
    })?;
    let info = SessionInfo::from(&*session.lock());
    tracing::debug!(session = %id, history_len = info.history_len, "closed session");
    Ok(Json(envelope(info)))
}

async fn session_analyze(
    State(state): State<ServiceState>,
    Path(session_id): Path<String>,
    payload: Result<Json<SampleRecord>, JsonRejection>,
) -> Result<Json<ServiceEnvelope<AnalysisReport>>, ServiceError> {
    let api = state.api()?;
    let (_, session) = state.session(&session_id)?;
    let Json(record) = payload.map_err(|rejection| {
        ServiceState::error(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;
    let mut session = session.lock();

    let report = api.analyze(&mut session, &record).map_err(|err| {
        // Inference failures mean the loaded artifacts disagree, not that the caller erred.
        let status = if err.downcast_ref::<KernelError>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ServiceState::error(status, format!("{err:#}"))
    })?;
    Ok(Json(envelope(report)))
}

async fn session_history(
    State(state): State<ServiceState>,
    Path(session_id): Path<String>,
) -> Result<Json<ServiceEnvelope<HistoryView>>, ServiceError> {
    let api = state.api()?;
    let (_, session) = state.session(&session_id)?;
    let view = api.history(&session.lock());
    Ok(Json(envelope(view)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use http::Request;
    use tower::ServiceExt;

    fn fixture_dir() -> PathBuf {
        FsPath::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/artifacts")
    }

    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    fn ready_router() -> Router {
        let state = ServiceState::new(load_availability(&fixture_dir()), IDLE_TIMEOUT);
        if let Err(reason) = state.load_api() {
            panic!("fixture artifacts should load: {reason}");
        }
        app(state)
    }

    fn empty_dir(prefix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("{prefix}-{}", ulid::Ulid::new()));
        std::fs::create_dir_all(&dir)
            .unwrap_or_else(|err| panic!("failed to create {}: {err}", dir.display()));
        dir
    }

    fn unavailable_router() -> Router {
        let missing = empty_dir("food-screen-service-missing");
        app(ServiceState::new(load_availability(&missing), IDLE_TIMEOUT))
    }

    fn milk_payload() -> serde_json::Value {
        serde_json::json!({
            "food_item": "Milk",
            "source_type": "Vendor",
            "storage_type": "Open",
            "color": "Faded",
            "smell": "Chemical",
            "texture": "Sticky",
            "foreign_particles": "None",
            "appearance": "Clumpy",
            "float_or_settle_test": "Floats",
            "dissolves_in_water": "Leaves Residue",
            "foam_after_mixing": "Excessive Foam",
            "burn_test_result": "Plastic Smell",
            "taste": "Bitter"
        })
    }

    fn rice_payload() -> serde_json::Value {
        serde_json::json!({
            "food_item": "Rice",
            "source_type": "Farmer",
            "storage_type": "Covered",
            "color": "Normal",
            "smell": "Normal",
            "texture": "Smooth",
            "foreign_particles": "None",
            "appearance": "Uniform",
            "float_or_settle_test": "Sinks",
            "dissolves_in_water": "Fully Dissolves",
            "foam_after_mixing": "No Foam",
            "burn_test_result": "Burns Cleanly",
            "taste": "Bland"
        })
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().uri(uri).method(method);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body.to_string())),
            None => builder.body(axum::body::Body::empty()),
        }
        .unwrap_or_else(|err| panic!("failed to build {method} {uri} request: {err}"));

        let response = match router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("router request failed: {err}"),
        };
        let status = response.status();
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}"),
        };
        (status, value)
    }

    fn data_str<'a>(value: &'a serde_json::Value, pointer: &str) -> &'a str {
        value
            .pointer(pointer)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_else(|| panic!("missing string at {pointer} in response: {value}"))
    }

    async fn create_session(router: &Router) -> String {
        let (status, value) = send(router, "POST", "/v1/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        data_str(&value, "/data/session_id").to_string()
    }

    // Test IDs: TSVC-001
    #[tokio::test]
    async fn health_reports_ok_when_artifacts_load() {
        let router = ready_router();
        let (status, value) = send(&router, "GET", "/v1/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(data_str(&value, "/service_contract_version"), SERVICE_CONTRACT_VERSION);
        assert_eq!(data_str(&value, "/data/status"), "ok");
    }

    // Test IDs: TSVC-002
    #[tokio::test]
    async fn missing_artifacts_disable_sessions_and_analysis() {
        let router = unavailable_router();

        let (status, value) = send(&router, "GET", "/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data_str(&value, "/data/status"), "unavailable");
        assert!(data_str(&value, "/data/error").contains("adulteration_model"));

        let (status, value) = send(&router, "POST", "/v1/sessions", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(data_str(&value, "/error").contains("unavailable"));

        let (status, _) = send(&router, "GET", "/v1/artifacts", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, value) = send(&router, "GET", "/v1/fields", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(data_str(&value, "/service_contract_version"), SERVICE_CONTRACT_VERSION);
        assert!(value.get("data").is_none());
    }

    // Test IDs: TSVC-003
    #[tokio::test]
    async fn analyses_accumulate_newest_first_per_session() {
        let router = ready_router();
        let session = create_session(&router).await;
        let other = create_session(&router).await;

        let (status, milk) =
            send(&router, "POST", &format!("/v1/sessions/{session}/analyze"), Some(milk_payload()))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data_str(&milk, "/data/result/adulteration_status"), "Yes");
        assert_eq!(data_str(&milk, "/data/result/risk_level"), "Toxic");
        assert_eq!(data_str(&milk, "/data/verdict/indicator"), "adulterated");
        assert_eq!(data_str(&milk, "/data/verdict/gauge/color"), "#8c564b");

        let (status, _) =
            send(&router, "POST", &format!("/v1/sessions/{session}/analyze"), Some(rice_payload()))
                .await;
        assert_eq!(status, StatusCode::OK);

        let (status, history) =
            send(&router, "GET", &format!("/v1/sessions/{session}/history"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data_str(&history, "/data/state"), "non_empty");
        assert_eq!(data_str(&history, "/data/entries/0/food_item"), "Rice");
        assert_eq!(data_str(&history, "/data/entries/1/food_item"), "Milk");

        let (status, other_history) =
            send(&router, "GET", &format!("/v1/sessions/{other}/history"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data_str(&other_history, "/data/state"), "empty");
        assert_eq!(
            other_history.pointer("/data/entries").and_then(serde_json::Value::as_array).map(Vec::len),
            Some(0)
        );
    }

    // Test IDs: TSVC-004
    #[tokio::test]
    async fn invalid_records_and_unknown_sessions_are_rejected() {
        let router = ready_router();
        let session = create_session(&router).await;

        let mut blank = milk_payload();
        blank["taste"] = serde_json::json!("");
        let (status, value) =
            send(&router, "POST", &format!("/v1/sessions/{session}/analyze"), Some(blank)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(data_str(&value, "/error").contains("Taste"));

        let unknown = ulid::Ulid::new();
        let (status, _) =
            send(&router, "POST", &format!("/v1/sessions/{unknown}/analyze"), Some(milk_payload()))
                .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&router, "GET", "/v1/sessions/not-a-session/history", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // Test IDs: TSVC-005
    #[tokio::test]
    async fn closing_a_session_discards_its_history() {
        let router = ready_router();
        let session = create_session(&router).await;
        let (status, _) =
            send(&router, "POST", &format!("/v1/sessions/{session}/analyze"), Some(milk_payload()))
                .await;
        assert_eq!(status, StatusCode::OK);

        let (status, closed) = send(&router, "DELETE", &format!("/v1/sessions/{session}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed.pointer("/data/history_len").and_then(serde_json::Value::as_u64), Some(1));

        let (status, _) =
            send(&router, "GET", &format!("/v1/sessions/{session}/history"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // Test IDs: TSVC-006
    #[tokio::test]
    async fn fields_and_artifacts_describe_the_inputs() {
        let router = ready_router();

        let (status, fields) = send(&router, "GET", "/v1/fields", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            fields.pointer("/data").and_then(serde_json::Value::as_array).map(Vec::len),
            Some(13)
        );
        assert_eq!(data_str(&fields, "/data/8/column_prefix"), "Float_or_Settle_Test");

        let (status, artifacts) = send(&router, "GET", "/v1/artifacts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            artifacts.pointer("/data/feature_columns").and_then(serde_json::Value::as_u64),
            Some(59)
        );
        assert_eq!(data_str(&artifacts, "/data/risk/kind"), "random_forest");
    }

    // Test IDs: TSVC-007
    #[tokio::test]
    async fn incomplete_records_are_rejected_inside_the_envelope() {
        let router = ready_router();
        let session = create_session(&router).await;

        let partial = serde_json::json!({ "food_item": "Milk" });
        let (status, value) =
            send(&router, "POST", &format!("/v1/sessions/{session}/analyze"), Some(partial)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(data_str(&value, "/service_contract_version"), SERVICE_CONTRACT_VERSION);
        assert!(data_str(&value, "/error").contains("source_type"));

        let (status, history) =
            send(&router, "GET", &format!("/v1/sessions/{session}/history"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data_str(&history, "/data/state"), "empty");
    }

    // Test IDs: TSVC-008
    #[test]
    fn idle_sessions_expire_and_active_ones_are_kept() {
        let registry = SessionRegistry::new(IDLE_TIMEOUT);
        let start = Instant::now();
        let info = registry.insert(Session::new(), start);
        let idle = registry.insert(Session::new(), start);

        let touched = start + Duration::from_secs(50);
        assert!(registry.get(info.session_id, touched).is_some());

        assert_eq!(registry.evict_idle(start + Duration::from_secs(100)), 1);
        assert!(registry.get(idle.session_id, start + Duration::from_secs(100)).is_none());
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.evict_idle(touched + IDLE_TIMEOUT + Duration::from_secs(1)), 1);
        assert_eq!(registry.len(), 0);
    }

    // Test IDs: TSVC-009
    #[tokio::test]
    async fn artifacts_deployed_after_startup_are_loaded_once() {
        let dir = empty_dir("food-screen-service-late");
        let state = ServiceState::new(load_availability(&dir), IDLE_TIMEOUT);
        let router = app(state.clone());

        let (_, value) = send(&router, "GET", "/v1/health", None).await;
        assert_eq!(data_str(&value, "/data/status"), "unavailable");

        for entry in std::fs::read_dir(fixture_dir())
            .unwrap_or_else(|err| panic!("failed to list fixtures: {err}"))
        {
            let entry = entry.unwrap_or_else(|err| panic!("failed to read fixture entry: {err}"));
            std::fs::copy(entry.path(), dir.join(entry.file_name()))
                .unwrap_or_else(|err| panic!("failed to copy fixture: {err}"));
        }

        let (_, value) = send(&router, "GET", "/v1/health", None).await;
        assert_eq!(data_str(&value, "/data/status"), "ok");
        let session = create_session(&router).await;
        let (status, _) =
            send(&router, "POST", &format!("/v1/sessions/{session}/analyze"), Some(milk_payload()))
                .await;
        assert_eq!(status, StatusCode::OK);

        match state.availability.as_ref() {
            Availability::Configured(cache) => {
                assert!(cache.is_loaded());
                assert_eq!(cache.loads(), 1);
            }
            Availability::Misconfigured(reason) => panic!("unexpected misconfiguration: {reason}"),
        }
    }
}
