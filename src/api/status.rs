//! Status endpoints

use axum::{
    Json,
    extract::{Path, Query, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::SharedState;
use crate::notify::store::NotificationStatus;

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Number of recent notifications to include (default: 10)
    pub limit: Option<usize>,
}

/// GET /status - server info and recent notifications
pub async fn status(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<StatusQuery>,
) -> impl IntoResponse {
    let store = state.store.lock().await;
    let recent = store.recent(params.limit.unwrap_or(DEFAULT_LIMIT));

    Json(json!({
        "server": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "notifications": {
            "total": store.len(),
            "queued": store.count_by_status(NotificationStatus::Queued),
            "waiting": store.count_by_status(NotificationStatus::Waiting),
            "delivered": store.count_by_status(NotificationStatus::Delivered),
            "failed": store.count_by_status(NotificationStatus::Failed),
            "recent": recent,
        },
        "config": {
            "signed_requests": state.config.signing_secret().is_some(),
            "alert_topic": state.config.sns_topic_arn,
        }
    }))
}

/// GET /notifications/{id} - a single notification
pub async fn get_notification(
    AxumState(state): AxumState<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.lock().await;
    match store.get(&id) {
        Some(notification) => Json(notification.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Notification not found"})),
        )
            .into_response(),
    }
}
