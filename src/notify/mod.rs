//! Build completion notifications
//!
//! A build posts its id when it finishes its last phase. The build is not
//! complete at that point, so the notifier polls CodeBuild until it is, then
//! reports the final status to Slack and to the alert topic.

pub mod aws;
pub mod slack;
pub mod store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::{CodebuildError, Result};

pub const GREEN: &str = "#49C39E";
pub const RED: &str = "#e62727";
pub const SUCCEEDED: &str = "SUCCEEDED";

/// Payload posted by the buildspec `finally` block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyEvent {
    pub build_id: String,
    pub build_url: String,
    pub trigger_branch_or_tag: String,
}

impl NotifyEvent {
    /// Project name, the part of the build id before `:`
    pub fn build_project(&self) -> &str {
        self.build_id
            .split_once(':')
            .map(|(project, _)| project)
            .unwrap_or(&self.build_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    InProgress,
    Complete { status: String },
}

/// Looks up the state of a build
#[async_trait]
pub trait BuildStatusSource: Send + Sync {
    async fn build_state(&self, build_id: &str) -> Result<BuildState>;
}

/// Publishes an alert to subscribers
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> Result<()>;
}

/// Posts a JSON message to a chat incoming webhook
#[async_trait]
pub trait ChatWebhook: Send + Sync {
    /// Returns the HTTP status code of the webhook response.
    async fn post(&self, body: &Value) -> Result<u16>;
}

/// What was sent for one completed build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub build_status: String,
    pub message: String,
    pub chat_status: u16,
    pub published: bool,
}

pub fn status_color(build_status: &str) -> &'static str {
    if build_status == SUCCEEDED { GREEN } else { RED }
}

/// `Codebuild complete for <url|project@trigger>, status: STATUS`
pub fn completion_message(event: &NotifyEvent, build_status: &str) -> String {
    let build_link = format!(
        "<{}|{}@{}>",
        event.build_url,
        event.build_project(),
        event.trigger_branch_or_tag
    );
    format!(
        "Codebuild complete for {}, status: {}",
        build_link, build_status
    )
}

pub fn alert_subject(event: &NotifyEvent, build_status: &str) -> String {
    format!(
        "[codebuild] {} build {}!",
        event.build_project(),
        build_status
    )
}

/// Slack attachment body for `message`
pub fn chat_body(build_status: &str, message: &str) -> Value {
    json!({
        "attachments": [
            { "color": status_color(build_status), "text": message }
        ]
    })
}

#[derive(Clone)]
pub struct Notifier {
    builds: Arc<dyn BuildStatusSource>,
    chat: Arc<dyn ChatWebhook>,
    alerts: Option<Arc<dyn AlertPublisher>>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl Notifier {
    pub fn new(builds: Arc<dyn BuildStatusSource>, chat: Arc<dyn ChatWebhook>) -> Self {
        Self {
            builds,
            chat,
            alerts: None,
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(3 * 60 * 60),
        }
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertPublisher>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    /// Polls until the build completes and returns its final status.
    pub async fn wait_for_build(&self, build_id: &str) -> Result<String> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            match self.builds.build_state(build_id).await? {
                BuildState::Complete { status } => return Ok(status),
                BuildState::InProgress => debug!("Build {} still in progress", build_id),
            }
            if Instant::now() >= deadline {
                return Err(CodebuildError::Notify(format!(
                    "build {} did not complete within {}s",
                    build_id,
                    self.max_wait.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Waits for the build, then notifies chat and the alert topic.
    ///
    /// A failed alert publish is logged and reported in the result; a failed
    /// chat post fails the delivery.
    pub async fn deliver(&self, event: &NotifyEvent) -> Result<DeliveryReport> {
        let build_status = self.wait_for_build(&event.build_id).await?;
        let message = completion_message(event, &build_status);

        info!("Posting message: {}", message);
        let chat_result = self.chat.post(&chat_body(&build_status, &message)).await;
        if let Ok(code) = &chat_result {
            info!("Notify url status code: {}", code);
        }

        let published = match &self.alerts {
            Some(alerts) => {
                match alerts
                    .publish(&alert_subject(event, &build_status), &message)
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Error sending to alert topic: {}", e);
                        false
                    }
                }
            }
            None => false,
        };

        let chat_status = chat_result?;
        if !(200..300).contains(&chat_status) {
            return Err(CodebuildError::Notify(format!(
                "chat webhook answered with status {}",
                chat_status
            )));
        }

        Ok(DeliveryReport {
            build_status,
            message,
            chat_status,
            published,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports `InProgress` for the first `pending_polls` lookups
    pub struct FakeBuilds {
        pub pending_polls: usize,
        pub status: String,
        pub polls: AtomicUsize,
    }

    impl FakeBuilds {
        pub fn completing_after(pending_polls: usize, status: &str) -> Self {
            Self {
                pending_polls,
                status: status.to_string(),
                polls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BuildStatusSource for FakeBuilds {
        async fn build_state(&self, _build_id: &str) -> Result<BuildState> {
            let seen = self.polls.fetch_add(1, Ordering::SeqCst);
            if seen < self.pending_polls {
                Ok(BuildState::InProgress)
            } else {
                Ok(BuildState::Complete {
                    status: self.status.clone(),
                })
            }
        }
    }

    #[derive(Default)]
    pub struct RecordingChat {
        pub status: u16,
        pub bodies: Mutex<Vec<Value>>,
    }

    impl RecordingChat {
        pub fn answering(status: u16) -> Self {
            Self {
                status,
                bodies: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatWebhook for RecordingChat {
        async fn post(&self, body: &Value) -> Result<u16> {
            self.bodies.lock().unwrap().push(body.clone());
            Ok(self.status)
        }
    }

    #[derive(Default)]
    pub struct RecordingAlerts {
        pub fail: bool,
        pub sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl AlertPublisher for RecordingAlerts {
        async fn publish(&self, subject: &str, message: &str) -> Result<()> {
            if self.fail {
                return Err(CodebuildError::Notify("topic unavailable".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), message.to_string()));
            Ok(())
        }
    }
}
