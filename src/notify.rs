//! Notification dispatch
//!
//! "Video decision made" events fan out on a broadcast channel for
//! external consumers (the emailer lives outside this service). Delivery
//! is fire-and-forget: the core never observes delivery success or
//! failure, and publishing with no subscribers is not an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::moderation::submission::VideoStatus;

#[derive(Debug, Clone, Serialize)]
pub struct VideoDecisionEvent {
    pub video_id: Uuid,
    pub student_id: String,
    pub challenge_id: String,
    pub decision: VideoStatus,
    pub xp_applied: i64,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<VideoDecisionEvent>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VideoDecisionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: VideoDecisionEvent) {
        if self.sender.send(event).is_err() {
            debug!("No notification subscribers, decision event dropped");
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(256)
    }
}
