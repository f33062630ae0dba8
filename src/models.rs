use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

time::serde::format_description!(due_date_format, Date, "[year]-[month]-[day]");

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

pub fn parse_date(value: &str) -> Option<Date> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }

    /// Sort rank used by the priority view. Missing or unknown priorities sort last.
    pub fn rank(priority: Option<Priority>) -> u8 {
        match priority {
            Some(Priority::High) => 0,
            Some(Priority::Medium) => 1,
            Some(Priority::Low) => 2,
            None => 3,
        }
    }
}

/// A column embedded in its board's `lists` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub owner_user_id: String,
    pub title: String,
    pub lists: Vec<List>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub board_id: String,
    pub list_id: String,
    pub title: String,
    pub description: String,
    #[serde(with = "due_date_format::option", default)]
    pub due_date: Option<Date>,
    pub priority: Option<Priority>,
    pub completed: bool,
    pub order: i64,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl Task {
    pub fn is_overdue(&self, today: Date) -> bool {
        self.due_date.is_some_and(|due| due < today)
    }
}

/// Fields written when a task document is first created.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDocument {
    pub board_id: String,
    pub list_id: String,
    pub title: String,
    pub description: String,
    pub due_date: Option<Date>,
    pub priority: Priority,
    pub completed: bool,
    pub order: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "due_date_format::option", default)]
    pub due_date: Option<Date>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Partial task update. `due_date: Some(None)` clears the date.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "clearable_date")]
    pub due_date: Option<Option<Date>>,
    pub priority: Option<Priority>,
    pub completed: Option<bool>,
    pub list_id: Option<String>,
    pub order: Option<i64>,
}

impl TaskUpdate {
    pub fn move_to(list_id: impl Into<String>) -> Self {
        Self {
            list_id: Some(list_id.into()),
            ..Default::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn clearable_date<'de, D>(deserializer: D) -> Result<Option<Option<Date>>, D::Error>
where
    D: Deserializer<'de>,
{
    due_date_format::option::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !task.completed,
            Filter::Completed => task.completed,
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Filter::All),
            "active" => Ok(Filter::Active),
            "completed" => Ok(Filter::Completed),
            other => Err(format!("unknown filter: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Order,
    Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPrefs {
    pub email: bool,
    pub deadline: bool,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            email: true,
            deadline: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub username: String,
    pub photo_url: Option<String>,
    pub background_image: Option<String>,
    pub created_at: i64,
    pub notifications: NotificationPrefs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub photo_url: Option<String>,
    pub background_image: Option<String>,
    pub email_notifications: Option<bool>,
    pub deadline_notifications: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Deadline,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationChannel::Email => f.write_str("email"),
            NotificationChannel::Deadline => f.write_str("deadline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Deadline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(with = "due_date_format::option", default)]
    pub due_date: Option<Date>,
    pub read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub task_id: String,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub due_date: Option<Date>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ListTitle {
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTask {
    pub list_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteTask {
    pub completed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    pub filter: Option<Filter>,
    pub sort: Option<SortMode>,
}
