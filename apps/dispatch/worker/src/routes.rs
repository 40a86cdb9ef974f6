//! Admin HTTP endpoints for operators.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Duration, Utc};
use email_dispatch::{
    DeliveryStats, DispatchError, DrainSummary, EmailDispatcher, EmailLogEntry, HealthReport,
    LogFilter,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics::render_metrics;

const DEFAULT_STATS_HOURS: i64 = 24;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<EmailDispatcher>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Maps dispatch errors onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError(DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            DispatchError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            DispatchError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            err if err.is_configuration() => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        if status.is_server_error() {
            error!(error = %self.0, "Admin request failed");
        }
        let body = ErrorResponse {
            error: code.to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/logs", get(list_logs))
        .route("/logs/{id}", get(get_log))
        .route("/logs/{id}/requeue", post(requeue))
        .route("/drain", post(drain))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.dispatcher.health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    hours: Option<i64>,
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<DeliveryStats>> {
    let hours = query.hours.unwrap_or(DEFAULT_STATS_HOURS);
    if hours <= 0 {
        return Err(DispatchError::InvalidInput("hours must be positive".to_string()).into());
    }
    let since = Duration::try_hours(hours)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| DispatchError::InvalidInput(format!("hours out of range: {}", hours)))?;
    Ok(Json(state.dispatcher.stats(since).await?))
}

async fn list_logs(
    State(state): State<AppState>,
    Query(filter): Query<LogFilter>,
) -> ApiResult<Json<Vec<EmailLogEntry>>> {
    Ok(Json(state.dispatcher.log().list(&filter).await?))
}

async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EmailLogEntry>> {
    state
        .dispatcher
        .log()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| DispatchError::NotFound(id).into())
}

async fn requeue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EmailLogEntry>> {
    let entry = state.dispatcher.requeue(id).await?;
    info!(%id, "Entry requeued by operator");
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
struct DrainQuery {
    batch_size: Option<usize>,
}

async fn drain(
    State(state): State<AppState>,
    Query(query): Query<DrainQuery>,
) -> ApiResult<Json<DrainSummary>> {
    Ok(Json(state.dispatcher.drain_queue(query.batch_size).await?))
}

async fn metrics() -> String {
    render_metrics()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use email_dispatch::{
        DeliveryLog, DeliveryStatus, EmailSettings, InMemoryCounterStore, InMemoryDeliveryLog,
        MockProvider, SendEmailRequest, StaticSettingsStore,
    };
    use serde_json::Value;
    use tower::ServiceExt; // For oneshot()

    struct TestApp {
        router: Router,
        dispatcher: Arc<EmailDispatcher>,
        provider: Arc<MockProvider>,
    }

    fn app_with(settings: EmailSettings) -> TestApp {
        let provider = Arc::new(MockProvider::new());
        let dispatcher = Arc::new(EmailDispatcher::new(
            Arc::new(StaticSettingsStore::new(settings)),
            Arc::new(InMemoryCounterStore::new()),
            Arc::new(InMemoryDeliveryLog::new()),
            provider.clone(),
        ));
        TestApp {
            router: router(AppState {
                dispatcher: dispatcher.clone(),
            }),
            dispatcher,
            provider,
        }
    }

    fn app() -> TestApp {
        app_with(EmailSettings::enabled())
    }

    async fn call(router: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn request() -> SendEmailRequest {
        SendEmailRequest::new("ops@example.com", "Report", "<p>Report</p>", "large_expense")
    }

    #[tokio::test]
    async fn test_health_ok_when_enabled() {
        let app = app();
        let (status, body) = call(app.router, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
        assert_eq!(body["queued"], 0);
    }

    #[tokio::test]
    async fn test_health_unavailable_when_disabled() {
        let app = app_with(EmailSettings::default());
        let (status, body) = call(app.router, "GET", "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["healthy"], false);
        assert_eq!(body["issues"][0], "Email system is disabled");
    }

    #[tokio::test]
    async fn test_drain_sends_queued_entries() {
        let app = app();
        app.dispatcher.queue_email(request()).await.unwrap();

        let (status, body) = call(app.router, "POST", "/drain?batch_size=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["processed"], 1);
        assert_eq!(body["remaining"], 0);
        assert_eq!(app.provider.sent_count().await, 1);
        assert!(app.provider.was_sent_to("ops@example.com").await);
    }

    #[tokio::test]
    async fn test_drain_rejects_zero_batch() {
        let app = app();
        let (status, body) = call(app.router, "POST", "/drain?batch_size=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_drain_unavailable_when_disabled() {
        let app = app_with(EmailSettings::default());
        let (status, body) = call(app.router, "POST", "/drain").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_list_logs_filters_by_status() {
        let app = app();
        app.dispatcher.send_email(request()).await.unwrap();
        app.dispatcher.queue_email(request()).await.unwrap();

        let (status, body) = call(app.router.clone(), "GET", "/logs?status=queued").await;
        assert_eq!(status, StatusCode::OK);
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["status"], "queued");

        let (_, body) = call(app.router, "GET", "/logs").await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_log_not_found() {
        let app = app();
        let uri = format!("/logs/{}", Uuid::new_v4());
        let (status, body) = call(app.router, "GET", &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_requeue_failed_entry() {
        let app = app();
        let entry = EmailLogEntry::from_request(&request(), DeliveryStatus::Failed)
            .with_error("Provider error: timeout");
        app.dispatcher.log().insert(&entry).await.unwrap();

        let uri = format!("/logs/{}/requeue", entry.id);
        let (status, body) = call(app.router.clone(), "POST", &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queued");

        let (status, _) = call(app.router, "POST", &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats_counts_recent_entries() {
        let app = app();
        app.dispatcher.send_email(request()).await.unwrap();

        let (status, body) = call(app.router.clone(), "GET", "/stats?hours=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["by_status"]["sent"], 1);

        let (status, _) = call(app.router, "GET", "/stats?hours=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats_rejects_huge_window() {
        let app = app();
        let uri = format!("/stats?hours={}", i64::MAX);
        let (status, body) = call(app.router.clone(), "GET", &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_INPUT");

        // ten years is still a valid window
        let (status, _) = call(app.router, "GET", "/stats?hours=87600").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_logs_caps_page_size() {
        let app = app();
        app.dispatcher.queue_email(request()).await.unwrap();

        let uri = format!("/logs?limit={}", u64::MAX);
        let (status, body) = call(app.router, "GET", &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_configuration_errors_are_unavailable() {
        let response = ApiError(DispatchError::MissingSenderIdentity("from_email".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = ApiError(DispatchError::NotFound(Uuid::new_v4())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
