use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use super::NotifyEvent;

/// Represents the status of a build notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Queued,
    Waiting,
    Delivered,
    Failed,
}

/// A notification request and what became of it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub build_id: String,
    pub build_url: String,
    pub trigger_branch_or_tag: String,
    pub status: NotificationStatus,
    pub received_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Final CodeBuild status, e.g. `SUCCEEDED`
    pub build_status: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl Notification {
    /// Create a new notification in Queued status
    pub fn new(event: &NotifyEvent) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            build_id: event.build_id.clone(),
            build_url: event.build_url.clone(),
            trigger_branch_or_tag: event.trigger_branch_or_tag.clone(),
            status: NotificationStatus::Queued,
            received_at: Utc::now(),
            completed_at: None,
            build_status: None,
            message: None,
            error: None,
        }
    }

    pub fn mark_waiting(&mut self) {
        self.status = NotificationStatus::Waiting;
    }

    pub fn mark_delivered(&mut self, build_status: String, message: String) {
        self.status = NotificationStatus::Delivered;
        self.completed_at = Some(Utc::now());
        self.build_status = Some(build_status);
        self.message = Some(message);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = NotificationStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// Bounded in-memory history, oldest entries are evicted first
pub struct NotificationStore {
    notifications: VecDeque<Notification>,
    max_notifications: usize,
}

impl NotificationStore {
    pub fn new(max_notifications: usize) -> Self {
        Self {
            notifications: VecDeque::new(),
            max_notifications: max_notifications.max(1),
        }
    }

    pub fn add(&mut self, notification: Notification) {
        while self.notifications.len() >= self.max_notifications {
            self.notifications.pop_front();
        }
        self.notifications.push_back(notification);
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    /// Applies `f` to the notification with `id`; returns false if it was evicted.
    pub fn update<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Notification),
    {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                f(notification);
                true
            }
            None => false,
        }
    }

    /// Most recent first
    pub fn recent(&self, limit: usize) -> Vec<Notification> {
        self.notifications.iter().rev().take(limit).cloned().collect()
    }

    pub fn count_by_status(&self, status: NotificationStatus) -> usize {
        self.notifications
            .iter()
            .filter(|n| n.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}
