//! API route handlers for the gateway.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use gourdwatch_core::{EvidenceImage, EvidenceKind, GourdType, GourdWatchError, MonitoringRecord};
use serde::Deserialize;

use super::server::{AppState, Principal};

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

/// Error response: `{"ok": false, "error": ...}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized: missing X-User-Id")
    }
}

impl From<GourdWatchError> for ApiError {
    fn from(e: GourdWatchError) -> Self {
        let status = match &e {
            GourdWatchError::NotFound(_) => StatusCode::NOT_FOUND,
            GourdWatchError::Forbidden(_) => StatusCode::FORBIDDEN,
            GourdWatchError::Conflict(_) => StatusCode::CONFLICT,
            GourdWatchError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => {
                tracing::error!("API error: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({"ok": false, "error": self.message})),
        )
            .into_response()
    }
}

/// Record plus the derived counts the app shows.
fn record_json(record: &MonitoringRecord) -> serde_json::Value {
    serde_json::json!({
        "record": record,
        "expected_harvest": record.expected_harvest(),
        "actual_harvest": record.actual_harvest(),
    })
}

fn require_admin(principal: &Principal) -> Result<(), GourdWatchError> {
    if principal.is_admin {
        Ok(())
    } else {
        Err(GourdWatchError::Forbidden("admin role required".into()))
    }
}

fn invalid(message: impl Into<String>) -> ApiError {
    GourdWatchError::InvalidInput(message.into()).into()
}

/// Load a record the caller may act on: its owner, or an admin.
async fn load_owned(
    state: &AppState,
    id: &str,
    principal: &Principal,
) -> Result<MonitoringRecord, GourdWatchError> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| GourdWatchError::NotFound(format!("monitoring record {id}")))?;
    if record.owner_id != principal.user_id && !principal.is_admin {
        return Err(GourdWatchError::Forbidden(format!(
            "not the owner of monitoring record {id}"
        )));
    }
    Ok(record)
}

fn check_images(images: &[EvidenceImage]) -> Result<(), ApiError> {
    if let Some(bad) = images
        .iter()
        .find(|img| img.id.trim().is_empty() || img.url.trim().is_empty())
    {
        return Err(invalid(format!(
            "evidence image needs both id and url (got id '{}')",
            bad.id
        )));
    }
    Ok(())
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

// ─── Gourd types ──────────────────────────────────────

pub async fn list_gourd_types(State(state): State<Arc<AppState>>) -> ApiResult {
    let types = state.store.list_gourd_types().await?;
    Ok(Json(serde_json::json!({"ok": true, "gourd_types": types})))
}

#[derive(Debug, Deserialize)]
pub struct CreateGourdType {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

pub async fn create_gourd_type(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateGourdType>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    require_admin(&principal)?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(invalid("gourd type name is required"));
    }
    let gourd_type = GourdType {
        id: body
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        name: name.to_string(),
    };
    state.store.upsert_gourd_type(&gourd_type).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"ok": true, "gourd_type": gourd_type})),
    ))
}

// ─── Push registration ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterPushToken {
    pub push_token: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Register (or replace) the caller's push destination.
pub async fn register_push_token(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<RegisterPushToken>,
) -> ApiResult {
    let token = body.push_token.trim();
    if !state.push.validate_token(token) {
        return Err(invalid(format!("invalid push token: {token}")));
    }

    let display_name = body
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let user = state
        .store
        .set_push_token(&principal.user_id, token, display_name)
        .await?;
    tracing::info!("📱 Push destination registered for user {}", user.id);
    Ok(Json(serde_json::json!({"ok": true, "user": user})))
}

// ─── Monitoring records ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateMonitoring {
    pub gourd_type_id: String,
    pub pollination_date: NaiveDate,
    #[serde(default)]
    pub plot_label: Option<String>,
    #[serde(default)]
    pub pollinated_flower_evidence: Vec<EvidenceImage>,
}

pub async fn create_monitoring(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateMonitoring>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if state.store.gourd_type(&body.gourd_type_id).await?.is_none() {
        return Err(invalid(format!("unknown gourd type: {}", body.gourd_type_id)));
    }
    check_images(&body.pollinated_flower_evidence)?;

    let mut record =
        MonitoringRecord::try_new(&principal.user_id, &body.gourd_type_id, body.pollination_date)?
            .with_plot_label(body.plot_label);
    if !body.pollinated_flower_evidence.is_empty() {
        record.add_evidence(EvidenceKind::PollinatedFlower, body.pollinated_flower_evidence);
    }
    state.store.insert(&record).await?;

    tracing::info!(
        "🌼 Monitoring {} created for user {} (harvest {} → {})",
        record.id,
        record.owner_id,
        record.harvest_window.first_date(),
        record.harvest_window.last_date()
    );
    let mut payload = record_json(&record);
    payload["ok"] = serde_json::Value::Bool(true);
    Ok((StatusCode::CREATED, Json(payload)))
}

pub async fn list_monitoring(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    let records = state.store.list_by_owner(&principal.user_id).await?;
    let items: Vec<_> = records.iter().map(record_json).collect();
    Ok(Json(serde_json::json!({"ok": true, "records": items})))
}

pub async fn get_monitoring(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult {
    let record = load_owned(&state, &id, &principal).await?;
    let mut payload = record_json(&record);
    payload["ok"] = serde_json::Value::Bool(true);
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
pub struct AddEvidence {
    pub kind: EvidenceKind,
    pub images: Vec<EvidenceImage>,
}

/// Append already-uploaded images to one of the evidence lists.
pub async fn add_evidence(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<AddEvidence>,
) -> ApiResult {
    if body.images.is_empty() {
        return Err(invalid("no images supplied"));
    }
    check_images(&body.images)?;

    let _guard = state.locks.acquire(&id).await;
    let mut record = load_owned(&state, &id, &principal).await?;
    record.add_evidence(body.kind, body.images);
    state.store.save(&record).await?;

    let mut payload = record_json(&record);
    payload["ok"] = serde_json::Value::Bool(true);
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
pub struct CorrectPollinationDate {
    pub pollination_date: NaiveDate,
}

/// Fix a mistyped pollination date. The harvest window is rebuilt from scratch.
pub async fn correct_pollination_date(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<CorrectPollinationDate>,
) -> ApiResult {
    let _guard = state.locks.acquire(&id).await;
    let mut record = load_owned(&state, &id, &principal).await?;
    record.correct_pollination_date(body.pollination_date)?;
    state.store.save(&record).await?;

    let mut payload = record_json(&record);
    payload["ok"] = serde_json::Value::Bool(true);
    Ok(Json(payload))
}

pub async fn delete_monitoring(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult {
    let _guard = state.locks.acquire(&id).await;
    load_owned(&state, &id, &principal).await?;
    state.store.delete(&id).await?;
    Ok(Json(serde_json::json!({"ok": true, "message": format!("Monitoring {id} deleted")})))
}

// ─── Scheduler ──────────────────────────────────────

pub async fn scheduler_status(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    require_admin(&principal)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "today": state.clock.today(),
        "last_tick": state.engine.last_tick(),
        "history": state.engine.history(),
    })))
}

/// Run one tick now instead of waiting for the interval. Shares the
/// single-flight guard with the periodic scheduler.
pub async fn scheduler_run(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    require_admin(&principal)?;
    let report = state
        .engine
        .tick(state.clock.today())
        .await
        .ok_or_else(|| GourdWatchError::Conflict("a scheduler tick is already running".into()))?;
    Ok(Json(serde_json::json!({"ok": true, "report": report})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use gourdwatch_core::config::{GourdWatchConfig, PushConfig};
    use gourdwatch_core::MonitoringStatus;
    use gourdwatch_core::traits::{
        DispatchOutcome, FixedClock, MonitoringStore, PushGateway, PushMessage,
    };
    use gourdwatch_scheduler::{ExpoPushGateway, LogPushGateway, MemoryStore, RecordLocks, SchedulerEngine};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Accepts every message after a fixed delay.
    struct SlowGateway(Duration);

    #[async_trait::async_trait]
    impl PushGateway for SlowGateway {
        fn name(&self) -> &str {
            "slow"
        }

        async fn send(&self, _message: &PushMessage) -> DispatchOutcome {
            tokio::time::sleep(self.0).await;
            DispatchOutcome::Delivered {
                ticket: "slow-ticket".into(),
            }
        }
    }

    struct Harness {
        router: axum::Router,
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
        engine: Arc<SchedulerEngine>,
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(LogPushGateway)).await
    }

    async fn harness_with(reminders: Arc<dyn PushGateway>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_gourd_type(&GourdType {
                id: "g1".into(),
                name: "Bottle gourd".into(),
            })
            .await
            .unwrap();
        let locks = RecordLocks::new();
        let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let engine = Arc::new(SchedulerEngine::new(
            store.clone(),
            reminders,
            locks.clone(),
            &GourdWatchConfig::default(),
        ));
        let state = AppState {
            store: store.clone(),
            // validation only; nothing is sent through it in these tests
            push: Arc::new(ExpoPushGateway::new(&PushConfig {
                endpoint: "http://127.0.0.1:1/push".into(),
                access_token: String::new(),
                timeout_secs: 1,
            })),
            locks,
            engine: engine.clone(),
            clock: clock.clone(),
            start_time: std::time::Instant::now(),
        };
        Harness {
            router: crate::build_router(state),
            store,
            clock,
            engine,
        }
    }

    async fn call(
        router: &axum::Router,
        method: &str,
        uri: &str,
        user: Option<(&str, bool)>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some((id, admin)) = user {
            req = req.header("X-User-Id", id);
            if admin {
                req = req.header("X-User-Role", "admin");
            }
        }
        let req = match body {
            Some(json) => req
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn create(h: &Harness, user: &str) -> String {
        let (status, json) = call(
            &h.router,
            "POST",
            "/api/v1/monitoring",
            Some((user, false)),
            Some(serde_json::json!({
                "gourd_type_id": "g1",
                "pollination_date": "2024-01-01",
                "plot_label": "Bed 3",
                "pollinated_flower_evidence": [{"id": "p1", "url": "https://cdn.example.com/p1.jpg"}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json["record"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let h = harness().await;
        let (status, json) = call(&h.router, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_principal_is_unauthorized() {
        let h = harness().await;
        let (status, json) = call(&h.router, "GET", "/api/v1/monitoring", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["ok"], false);
    }

    #[tokio::test]
    async fn test_create_derives_window() {
        let h = harness().await;
        let id = create(&h, "u1").await;

        let (status, json) =
            call(&h.router, "GET", &format!("/api/v1/monitoring/{id}"), Some(("u1", false)), None)
                .await;
        assert_eq!(status, StatusCode::OK);
        let window = json["record"]["harvest_window"].as_array().unwrap();
        assert_eq!(window.len(), 7);
        assert_eq!(window[0]["date"], "2024-01-08");
        assert_eq!(window[6]["date"], "2024-01-14");
        assert_eq!(json["record"]["status"], "in_progress");
        assert_eq!(json["expected_harvest"], 1);

        let (_, list) = call(&h.router, "GET", "/api/v1/monitoring", Some(("u1", false)), None).await;
        assert_eq!(list["records"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_gourd_type_rejected() {
        let h = harness().await;
        let (status, _) = call(
            &h.router,
            "POST",
            "/api/v1/monitoring",
            Some(("u1", false)),
            Some(serde_json::json!({"gourd_type_id": "nope", "pollination_date": "2024-01-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_other_users_record_is_forbidden() {
        let h = harness().await;
        let id = create(&h, "u1").await;
        let uri = format!("/api/v1/monitoring/{id}");

        let (status, _) = call(&h.router, "GET", &uri, Some(("u2", false)), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&h.router, "GET", &uri, Some(("admin", true)), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) =
            call(&h.router, "GET", "/api/v1/monitoring/missing", Some(("u1", false)), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_add_harvest_evidence() {
        let h = harness().await;
        let id = create(&h, "u1").await;
        let (status, json) = call(
            &h.router,
            "POST",
            &format!("/api/v1/monitoring/{id}/evidence"),
            Some(("u1", false)),
            Some(serde_json::json!({
                "kind": "harvested_fruit",
                "images": [
                    {"id": "f1", "url": "https://cdn.example.com/f1.jpg"},
                    {"id": "f2", "url": "https://cdn.example.com/f2.jpg"}
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["actual_harvest"], 2);
        assert_eq!(h.store.get(&id).await.unwrap().unwrap().actual_harvest(), 2);

        let (status, _) = call(
            &h.router,
            "POST",
            &format!("/api/v1/monitoring/{id}/evidence"),
            Some(("u1", false)),
            Some(serde_json::json!({"kind": "harvested_fruit", "images": [{"id": "x", "url": ""}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_correction_rebuilds_window_until_terminal() {
        let h = harness().await;
        let id = create(&h, "u1").await;
        let uri = format!("/api/v1/monitoring/{id}/pollination-date");

        let (status, json) = call(
            &h.router,
            "PUT",
            &uri,
            Some(("u1", false)),
            Some(serde_json::json!({"pollination_date": "2024-01-03"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["record"]["harvest_window"][0]["date"], "2024-01-10");

        // window closes 2024-01-16 with no harvest evidence
        h.clock.set(NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());
        let (status, json) =
            call(&h.router, "POST", "/api/v1/scheduler/run", Some(("admin", true)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["report"]["evaluation"]["failed"], 1);
        assert_eq!(
            h.store.get(&id).await.unwrap().unwrap().status,
            MonitoringStatus::Failed
        );

        let (status, _) = call(
            &h.router,
            "PUT",
            &uri,
            Some(("u1", false)),
            Some(serde_json::json!({"pollination_date": "2024-01-05"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_push_token_registration() {
        let h = harness().await;
        let (status, _) = call(
            &h.router,
            "PUT",
            "/api/v1/me/push-token",
            Some(("u1", false)),
            Some(serde_json::json!({"push_token": "not-a-token"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = call(
            &h.router,
            "PUT",
            "/api/v1/me/push-token",
            Some(("u1", false)),
            Some(serde_json::json!({"push_token": "ExponentPushToken[abc]", "display_name": "Lee"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["display_name"], "Lee");
        let user = h.store.user("u1").await.unwrap().unwrap();
        assert_eq!(user.push_token.as_deref(), Some("ExponentPushToken[abc]"));
    }

    #[tokio::test]
    async fn test_scheduler_endpoints_need_admin() {
        let h = harness().await;
        let (status, _) =
            call(&h.router, "POST", "/api/v1/scheduler/run", Some(("u1", false)), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) =
            call(&h.router, "GET", "/api/v1/scheduler/status", Some(("u1", false)), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) =
            call(&h.router, "GET", "/api/v1/scheduler/status", Some(("ops", true)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["last_tick"].is_null());
    }

    #[tokio::test]
    async fn test_delete_record() {
        let h = harness().await;
        let id = create(&h, "u1").await;
        let uri = format!("/api/v1/monitoring/{id}");
        let (status, _) = call(&h.router, "DELETE", &uri, Some(("u2", false)), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&h.router, "DELETE", &uri, Some(("u1", false)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(h.store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gourd_type_admin_only() {
        let h = harness().await;
        let body = serde_json::json!({"name": "Sponge gourd"});
        let (status, _) =
            call(&h.router, "POST", "/api/v1/gourd-types", Some(("u1", false)), Some(body.clone()))
                .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) =
            call(&h.router, "POST", "/api/v1/gourd-types", Some(("ops", true)), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, json) = call(&h.router, "GET", "/api/v1/gourd-types", Some(("u1", false)), None).await;
        assert_eq!(json["gourd_types"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pollination_date_past_calendar_end_rejected() {
        let h = harness().await;
        let (status, json) = call(
            &h.router,
            "POST",
            "/api/v1/monitoring",
            Some(("u1", false)),
            Some(serde_json::json!({
                "gourd_type_id": "g1",
                "pollination_date": NaiveDate::MAX.to_string()
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["ok"], false);
        assert!(h.store.list_by_owner("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_refresh_keeps_display_name() {
        let h = harness().await;
        let register = |body: serde_json::Value| {
            let router = h.router.clone();
            async move {
                call(&router, "PUT", "/api/v1/me/push-token", Some(("u1", false)), Some(body)).await
            }
        };
        register(serde_json::json!({"push_token": "ExponentPushToken[a]", "display_name": "Lee"}))
            .await;
        let (status, json) = register(serde_json::json!({"push_token": "ExponentPushToken[b]"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["display_name"], "Lee");
        assert_eq!(json["user"]["push_token"], "ExponentPushToken[b]");
    }

    #[tokio::test]
    async fn test_manual_run_during_tick_is_conflict() {
        let h = harness_with(Arc::new(SlowGateway(Duration::from_millis(300)))).await;
        h.store
            .set_push_token("u1", "ExponentPushToken[abc]", None)
            .await
            .unwrap();
        create(&h, "u1").await;
        h.clock.set(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());

        let background = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.tick(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (status, json) =
            call(&h.router, "POST", "/api/v1/scheduler/run", Some(("admin", true)), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["ok"], false);

        let report = background.await.unwrap().unwrap();
        assert_eq!(report.sweep.unwrap().delivered, 1);
    }
}
