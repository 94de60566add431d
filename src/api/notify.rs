//! Notification endpoint called from the buildspec `finally` block

use axum::{
    Json,
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::SharedState;
use crate::notify::NotifyEvent;
use crate::notify::store::Notification;
use crate::utils::{SIGNATURE_HEADER, verify_signature};

fn rejection(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(json!({"error": message}))).into_response()
}

/// POST /notify - queue a completion notification for a build
pub async fn handle_notify(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = state.config.signing_secret() {
        let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            error!("Notification request without {} header", SIGNATURE_HEADER);
            return rejection(StatusCode::UNAUTHORIZED, "missing signature");
        };
        if !verify_signature(secret, &body, signature) {
            error!("Signature verification failed for notification request");
            return rejection(StatusCode::UNAUTHORIZED, "invalid signature");
        }
    }

    let event: NotifyEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            info!("Could not parse notification body: {:?}", e);
            return rejection(StatusCode::BAD_REQUEST, "invalid notification payload");
        }
    };

    if event.build_id.trim().is_empty() {
        warn!("Notification without build_id, skipping");
        return rejection(StatusCode::BAD_REQUEST, "build_id is required");
    }

    let notification = Notification::new(&event);
    let id = notification.id.clone();
    state.store.lock().await.add(notification);
    info!(
        "Queued notification {} for build {} ({})",
        id, event.build_id, event.trigger_branch_or_tag
    );

    let shared_state = state.clone();
    let notification_id = id.clone();
    tokio::spawn(async move {
        shared_state
            .store
            .lock()
            .await
            .update(&notification_id, |n| n.mark_waiting());

        match shared_state.notifier.deliver(&event).await {
            Ok(report) => {
                info!(
                    "Notification {} delivered, build {} {}",
                    notification_id, event.build_id, report.build_status
                );
                shared_state.store.lock().await.update(&notification_id, |n| {
                    n.mark_delivered(report.build_status, report.message)
                });
            }
            Err(e) => {
                error!("Notification {} failed: {}", notification_id, e);
                shared_state
                    .store
                    .lock()
                    .await
                    .update(&notification_id, |n| n.mark_failed(e.to_string()));
            }
        }
    });

    (StatusCode::ACCEPTED, Json(json!({"id": id}))).into_response()
}
