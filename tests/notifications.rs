mod common;

use std::sync::Arc;

use time::macros::{date, datetime};

use common::{memory_store, task};
use taskboard::db;
use taskboard::error::AppError;
use taskboard::models::NotificationType;
use taskboard::notifications::{is_due_soon, NotificationService};

#[test]
fn test_due_soon_window() {
    let now = datetime!(2026-03-10 12:00 UTC);

    assert!(is_due_soon(date!(2026 - 03 - 11), now));
    assert!(!is_due_soon(date!(2026 - 03 - 10), now));
    assert!(!is_due_soon(date!(2026 - 03 - 12), now));

    let midnight = datetime!(2026-03-10 00:00 UTC);
    assert!(is_due_soon(date!(2026 - 03 - 11), midnight));
}

#[tokio::test]
async fn test_check_upcoming_deadlines_schedules_due_tasks() {
    let store = memory_store();
    let service = NotificationService::new(Arc::new(store.clone()));
    let now = datetime!(2026-03-10 12:00 UTC);

    let mut due = task("due", "todo", 0);
    due.title = "Ship it".to_string();
    due.due_date = Some(date!(2026 - 03 - 11));
    let mut later = task("later", "todo", 1);
    later.due_date = Some(date!(2026 - 04 - 01));
    let undated = task("undated", "todo", 2);

    let scheduled = service
        .check_upcoming_deadlines("user-1", &[due, later, undated], now)
        .await;
    assert_eq!(scheduled, 1);

    let notifications = service.get_user_notifications("user-1").await.unwrap();
    assert_eq!(notifications.len(), 1);
    let notification = &notifications[0];
    assert_eq!(notification.task_id, "due");
    assert_eq!(notification.kind, NotificationType::Deadline);
    assert_eq!(notification.title, "Task Deadline Approaching");
    assert_eq!(notification.message, "Task \"Ship it\" is due soon!");
    assert_eq!(notification.due_date, Some(date!(2026 - 03 - 11)));
    assert!(!notification.read);

    assert!(service
        .get_user_notifications("someone-else")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_deadline_notification_needs_due_date() {
    let service = NotificationService::new(Arc::new(memory_store()));

    let err = service
        .schedule_deadline_notification("user-1", &task("1", "todo", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_email_notifications_are_queued() {
    let store = memory_store();
    let service = NotificationService::new(Arc::new(store.clone()));

    service
        .send_email_notification("user-1", "Reminder", "Tasks are due")
        .await
        .unwrap();

    assert_eq!(db::count_queued_emails(store.db(), "user-1").unwrap(), 1);
}
