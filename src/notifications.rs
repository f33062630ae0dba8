//! Deadline notifications and the outgoing email queue.
//!
//! Nothing is delivered: notifications are stored for the user to read and
//! emails wait in the queue for an external sender.

use std::sync::Arc;

use time::{Date, Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{NewNotification, Notification, NotificationType, Task};
use crate::store::EntityStore;

pub const DEADLINE_WINDOW: Duration = Duration::hours(24);

/// True when `due` (taken as midnight UTC) lies within the next 24 hours.
pub fn is_due_soon(due: Date, now: OffsetDateTime) -> bool {
    let due_at = due.midnight().assume_utc();
    due_at > now && due_at <= now + DEADLINE_WINDOW
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn EntityStore>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn schedule_deadline_notification(
        &self,
        user_id: &str,
        task: &Task,
    ) -> Result<String, AppError> {
        let Some(due_date) = task.due_date else {
            return Err(AppError::validation("Task has no due date"));
        };
        let notification = NewNotification {
            user_id: user_id.to_string(),
            task_id: task.id.clone(),
            kind: NotificationType::Deadline,
            title: "Task Deadline Approaching".to_string(),
            message: format!("Task \"{}\" is due soon!", task.title),
            due_date: Some(due_date),
        };
        self.store
            .create_notification(notification)
            .await
            .map_err(|e| e.during("scheduling notification"))
    }

    pub async fn send_email_notification(
        &self,
        user_id: &str,
        subject: &str,
        message: &str,
    ) -> Result<String, AppError> {
        let id = self
            .store
            .enqueue_email(user_id, subject, message)
            .await
            .map_err(|e| e.during("queueing email"))?;
        info!(id = %id, user_id, "Queued email notification");
        Ok(id)
    }

    pub async fn get_user_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<Notification>, AppError> {
        self.store.list_unread_notifications(user_id).await
    }

    /// Schedules a notification for every task due within the next 24 hours.
    /// Failures are logged and skipped. Returns how many were scheduled.
    pub async fn check_upcoming_deadlines(
        &self,
        user_id: &str,
        tasks: &[Task],
        now: OffsetDateTime,
    ) -> usize {
        let mut scheduled = 0;
        for task in tasks {
            let Some(due) = task.due_date else {
                continue;
            };
            if !is_due_soon(due, now) {
                continue;
            }
            match self.schedule_deadline_notification(user_id, task).await {
                Ok(_) => scheduled += 1,
                Err(err) => warn!(task_id = %task.id, error = %err, "Could not schedule deadline notification"),
            }
        }
        info!(user_id, scheduled, "Checked upcoming deadlines");
        scheduled
    }
}
