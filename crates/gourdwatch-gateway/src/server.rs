//! HTTP server implementation using Axum.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    response::IntoResponse,
    routing::{get, post, put},
};
use gourdwatch_core::traits::{Clock, MonitoringStore, PushGateway};
use gourdwatch_scheduler::{RecordLocks, SchedulerEngine};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MonitoringStore>,
    /// Used to validate push tokens at registration time.
    pub push: Arc<dyn PushGateway>,
    /// Shared with the scheduler so API writes and sweeps never interleave on a record.
    pub locks: RecordLocks,
    pub engine: Arc<SchedulerEngine>,
    pub clock: Arc<dyn Clock>,
    pub start_time: std::time::Instant,
}

/// Authenticated caller, as asserted by the upstream auth proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub is_admin: bool,
}

/// Principal middleware. Requires `X-User-Id`, reads the admin flag from `X-User-Role`.
async fn require_principal(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let (user_id, role) = {
        let headers = req.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        (header("X-User-Id"), header("X-User-Role"))
    };

    let Some(user_id) = user_id else {
        return super::routes::ApiError::unauthorized().into_response();
    };
    let is_admin = role.is_some_and(|role| role.eq_ignore_ascii_case("admin"));

    req.extensions_mut().insert(Principal { user_id, is_admin });
    next.run(req).await
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    // Protected routes require an authenticated principal
    let protected = Router::new()
        .route(
            "/api/v1/gourd-types",
            get(super::routes::list_gourd_types).post(super::routes::create_gourd_type),
        )
        .route("/api/v1/me/push-token", put(super::routes::register_push_token))
        .route(
            "/api/v1/monitoring",
            get(super::routes::list_monitoring).post(super::routes::create_monitoring),
        )
        .route(
            "/api/v1/monitoring/{id}",
            get(super::routes::get_monitoring).delete(super::routes::delete_monitoring),
        )
        .route(
            "/api/v1/monitoring/{id}/evidence",
            post(super::routes::add_evidence),
        )
        .route(
            "/api/v1/monitoring/{id}/pollination-date",
            put(super::routes::correct_pollination_date),
        )
        .route("/api/v1/scheduler/status", get(super::routes::scheduler_status))
        .route("/api/v1/scheduler/run", post(super::routes::scheduler_run))
        .layer(axum::middleware::from_fn(require_principal));

    Router::new()
        .route("/health", get(super::routes::health_check))
        .merge(protected)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, host: &str, port: u16, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("🌐 Gateway listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Extension;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn whoami(Extension(principal): Extension<Principal>) -> String {
        format!("{}:{}", principal.user_id, principal.is_admin)
    }

    fn router() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(axum::middleware::from_fn(require_principal))
    }

    async fn call(headers: &[(&str, &str)]) -> (StatusCode, String) {
        let mut req = Request::builder().uri("/whoami");
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let resp = router()
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_principal_from_headers() {
        let (status, body) = call(&[("X-User-Id", " u1 "), ("X-User-Role", "Admin")]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "u1:true");

        let (_, body) = call(&[("X-User-Id", "u2"), ("X-User-Role", "grower")]).await;
        assert_eq!(body, "u2:false");
    }

    #[tokio::test]
    async fn test_blank_user_id_is_unauthorized() {
        let (status, body) = call(&[("X-User-Id", "   ")]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("\"ok\":false"));
    }
}
