//! HTTP surface of the build notifier

pub mod notify;
pub mod status;

use axum::{Router, routing};

use crate::SharedState;
pub use notify::handle_notify;
pub use status::{get_notification, status};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/notify", routing::post(handle_notify))
        .route("/status", routing::get(status))
        .route("/notifications/{id}", routing::get(get_notification))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::notify::{BuildState, BuildStatusSource, Notifier};
    use crate::notify::store::NotificationStatus;
    use crate::notify::testing::{FakeBuilds, RecordingChat};
    use crate::utils::{SIGNATURE_HEADER, sign_payload};
    use crate::{AppState, NotifierConfig};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const BODY: &str = r#"{"build_id":"opencast-codebuild-build:1","build_url":"https://example.test/1","trigger_branch_or_tag":"develop"}"#;

    fn state(secret: Option<&str>) -> SharedState {
        let config = NotifierConfig {
            slack_notify_url: "https://hooks.slack.com/x".to_string(),
            notify_secret: secret.map(str::to_string),
            ..NotifierConfig::default()
        };
        let notifier = Notifier::new(
            Arc::new(FakeBuilds::completing_after(1, "SUCCEEDED")),
            Arc::new(RecordingChat::answering(200)),
        )
        .with_polling(Duration::ZERO, Duration::from_secs(5));
        Arc::new(AppState::new(config, notifier))
    }

    fn post(body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::post("/notify").header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    /// Builds of the `slow` project never finish, every other build is done at once.
    struct SlowProject;

    #[async_trait]
    impl BuildStatusSource for SlowProject {
        async fn build_state(&self, build_id: &str) -> Result<BuildState> {
            if build_id.starts_with("slow:") {
                Ok(BuildState::InProgress)
            } else {
                Ok(BuildState::Complete {
                    status: "SUCCEEDED".to_string(),
                })
            }
        }
    }

    async fn wait_for_status(state: &SharedState, id: &str, wanted: NotificationStatus) -> bool {
        for _ in 0..100 {
            if state.store.lock().await.get(id).map(|n| n.status) == Some(wanted) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn accepted_notification_is_delivered() {
        let state = state(None);
        let response = router(state.clone()).oneshot(post(BODY, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let id = json_body(response).await["id"].as_str().unwrap().to_string();

        assert!(wait_for_status(&state, &id, NotificationStatus::Delivered).await);

        let response = router(state)
            .oneshot(Request::get(format!("/notifications/{}", id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let notification = json_body(response).await;
        assert_eq!(notification["build_status"], "SUCCEEDED");
        assert_eq!(notification["status"], "delivered");
    }

    #[tokio::test]
    async fn running_build_does_not_hold_up_other_deliveries() {
        let config = NotifierConfig {
            slack_notify_url: "https://hooks.slack.com/x".to_string(),
            ..NotifierConfig::default()
        };
        let notifier = Notifier::new(Arc::new(SlowProject), Arc::new(RecordingChat::answering(200)))
            .with_polling(Duration::from_millis(10), Duration::from_secs(60));
        let state: SharedState = Arc::new(AppState::new(config, notifier));

        let slow = r#"{"build_id":"slow:1","build_url":"u","trigger_branch_or_tag":"develop"}"#;
        let fast = r#"{"build_id":"fast:1","build_url":"u","trigger_branch_or_tag":"develop"}"#;
        let response = router(state.clone()).oneshot(post(slow, None)).await.unwrap();
        let slow_id = json_body(response).await["id"].as_str().unwrap().to_string();
        let response = router(state.clone()).oneshot(post(fast, None)).await.unwrap();
        let fast_id = json_body(response).await["id"].as_str().unwrap().to_string();

        assert!(wait_for_status(&state, &fast_id, NotificationStatus::Delivered).await);
        assert_eq!(
            state.store.lock().await.get(&slow_id).map(|n| n.status),
            Some(NotificationStatus::Waiting)
        );
    }

    #[tokio::test]
    async fn signature_is_required_when_configured() {
        let state = state(Some("secret"));

        let response = router(state.clone()).oneshot(post(BODY, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bad = sign_payload("other", BODY.as_bytes());
        let response = router(state.clone()).oneshot(post(BODY, Some(bad))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let good = sign_payload("secret", BODY.as_bytes());
        let response = router(state).oneshot(post(BODY, Some(good))).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn malformed_payloads_are_rejected() {
        let state = state(None);
        let response = router(state.clone()).oneshot(post("{", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let empty_id = r#"{"build_id":"","build_url":"u","trigger_branch_or_tag":"t"}"#;
        let response = router(state.clone()).oneshot(post(empty_id, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_notification_is_not_found() {
        let response = router(state(None))
            .oneshot(Request::get("/notifications/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_reports_counts() {
        let response = router(state(Some("s")))
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["notifications"]["total"], 0);
        assert_eq!(body["config"]["signed_requests"], true);
        assert_eq!(body["server"]["name"], "opencast_codebuild");
    }
}
