use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result, Row, ToSql};

use crate::error::AppError;
use crate::models::{
    format_date, now_millis, parse_date, AuthUser, Board, List, NewNotification, Notification,
    NotificationPrefs, NotificationType, Priority, ProfileUpdate, Session, Task, TaskDocument,
    TaskUpdate, UserProfile,
};

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        uid TEXT PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        username TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        photo_url TEXT,
        background_image TEXT,
        notify_email INTEGER DEFAULT 1,
        notify_deadline INTEGER DEFAULT 1,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS boards (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        lists TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER,
        updated_at INTEGER
    );
    CREATE INDEX IF NOT EXISTS boards_user_id ON boards (user_id);

    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        board_id TEXT NOT NULL,
        list_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        due_date TEXT,
        priority TEXT,
        completed INTEGER DEFAULT 0,
        position INTEGER DEFAULT 0,
        created_at INTEGER,
        updated_at INTEGER
    );
    CREATE INDEX IF NOT EXISTS tasks_board_id ON tasks (board_id);

    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        task_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        due_date TEXT,
        read INTEGER DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS email_queue (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        subject TEXT NOT NULL,
        message TEXT NOT NULL,
        sent INTEGER DEFAULT 0,
        created_at INTEGER NOT NULL
    );
";

const BOARD_COLUMNS: &str = "id, user_id, title, lists, created_at, updated_at";
const TASK_COLUMNS: &str = "id, board_id, list_id, title, description, due_date, priority, completed, position, created_at, updated_at";
const USER_COLUMNS: &str =
    "uid, email, username, photo_url, background_image, notify_email, notify_deadline, created_at";

pub fn init_db(path: impl AsRef<Path>) -> Result<DbPool> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_in_memory() -> Result<DbPool> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn lock(pool: &DbPool) -> Result<MutexGuard<'_, Connection>, AppError> {
    pool.lock()
        .map_err(|_| AppError::Database("database lock poisoned".to_string()))
}

fn board_from_row(row: &Row) -> Result<Board> {
    let lists: String = row.get(3)?;
    let lists: Vec<List> = serde_json::from_str(&lists)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(Board {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        title: row.get(2)?,
        lists,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn task_from_row(row: &Row) -> Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        board_id: row.get(1)?,
        list_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        due_date: row.get::<_, Option<String>>(5)?.as_deref().and_then(parse_date),
        priority: row.get::<_, Option<String>>(6)?.as_deref().and_then(Priority::parse),
        completed: row.get::<_, i32>(7)? != 0,
        order: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn profile_from_row(row: &Row) -> Result<UserProfile> {
    Ok(UserProfile {
        uid: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        photo_url: row.get(3)?,
        background_image: row.get(4)?,
        notifications: NotificationPrefs {
            email: row.get::<_, i32>(5)? != 0,
            deadline: row.get::<_, i32>(6)? != 0,
        },
        created_at: row.get(7)?,
    })
}

fn notification_from_row(row: &Row) -> Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_id: row.get(2)?,
        kind: NotificationType::Deadline,
        title: row.get(4)?,
        message: row.get(5)?,
        due_date: row.get::<_, Option<String>>(6)?.as_deref().and_then(parse_date),
        read: row.get::<_, i32>(7)? != 0,
        created_at: row.get(8)?,
    })
}

// User operations
pub struct Credentials {
    pub uid: String,
    pub email: String,
    pub password_hash: String,
}

pub fn create_user(
    pool: &DbPool,
    uid: &str,
    email: &str,
    username: &str,
    password_hash: &str,
) -> Result<UserProfile, AppError> {
    let conn = lock(pool)?;

    let taken: bool = conn
        .query_row("SELECT 1 FROM users WHERE email = ?1", [email], |_| Ok(true))
        .optional()?
        .unwrap_or(false);
    if taken {
        return Err(AppError::Auth("Email already in use".to_string()));
    }

    conn.execute(
        "INSERT INTO users (uid, email, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![uid, email, username, password_hash, now_millis()],
    )?;

    let profile = conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?1"),
        [uid],
        profile_from_row,
    )?;
    Ok(profile)
}

pub fn get_credentials(pool: &DbPool, email: &str) -> Result<Option<Credentials>, AppError> {
    let conn = lock(pool)?;
    let credentials = conn
        .query_row(
            "SELECT uid, email, password_hash FROM users WHERE email = ?1",
            [email],
            |row| {
                Ok(Credentials {
                    uid: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(credentials)
}

pub fn get_auth_user(pool: &DbPool, uid: &str) -> Result<Option<AuthUser>, AppError> {
    let conn = lock(pool)?;
    let user = conn
        .query_row("SELECT uid, email FROM users WHERE uid = ?1", [uid], |row| {
            Ok(AuthUser {
                uid: row.get(0)?,
                email: row.get(1)?,
            })
        })
        .optional()?;
    Ok(user)
}

pub fn get_user_profile(pool: &DbPool, uid: &str) -> Result<Option<UserProfile>, AppError> {
    let conn = lock(pool)?;
    let profile = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?1"),
            [uid],
            profile_from_row,
        )
        .optional()?;
    Ok(profile)
}

pub fn update_user_profile(
    pool: &DbPool,
    uid: &str,
    update: &ProfileUpdate,
) -> Result<bool, AppError> {
    let conn = lock(pool)?;

    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref url) = update.photo_url {
        updates.push("photo_url = ?");
        params.push(Box::new(url.clone()));
    }
    if let Some(ref url) = update.background_image {
        updates.push("background_image = ?");
        params.push(Box::new(url.clone()));
    }
    if let Some(enabled) = update.email_notifications {
        updates.push("notify_email = ?");
        params.push(Box::new(enabled as i32));
    }
    if let Some(enabled) = update.deadline_notifications {
        updates.push("notify_deadline = ?");
        params.push(Box::new(enabled as i32));
    }

    if updates.is_empty() {
        let exists = conn
            .query_row("SELECT 1 FROM users WHERE uid = ?1", [uid], |_| Ok(()))
            .optional()?;
        return Ok(exists.is_some());
    }

    params.push(Box::new(uid.to_string()));
    let query = format!("UPDATE users SET {} WHERE uid = ?", updates.join(", "));
    let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = conn.execute(&query, params_refs.as_slice())?;
    Ok(rows > 0)
}

// Session operations
pub fn create_session(pool: &DbPool, session: &Session) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![session.id, session.user_id, session.created_at, session.expires_at],
    )?;
    Ok(())
}

pub fn get_session(pool: &DbPool, id: &str) -> Result<Option<Session>, AppError> {
    let conn = lock(pool)?;
    let session = conn
        .query_row(
            "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = ?1",
            [id],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: row.get(2)?,
                    expires_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(session)
}

pub fn delete_session(pool: &DbPool, id: &str) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
    Ok(())
}

pub fn cleanup_expired_sessions(pool: &DbPool) -> Result<usize, AppError> {
    let conn = lock(pool)?;
    let removed = conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [now_millis()])?;
    Ok(removed)
}

// Board operations
pub fn insert_board(
    pool: &DbPool,
    id: &str,
    user_id: &str,
    title: &str,
    lists: &[List],
) -> Result<(), AppError> {
    let conn = lock(pool)?;
    let lists = serde_json::to_string(lists)?;
    let now = now_millis();
    conn.execute(
        "INSERT INTO boards (id, user_id, title, lists, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, user_id, title, lists, now],
    )?;
    Ok(())
}

/// Boards owned by `user_id`, in insertion order.
pub fn list_boards(pool: &DbPool, user_id: &str) -> Result<Vec<Board>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOARD_COLUMNS} FROM boards WHERE user_id = ?1 ORDER BY rowid ASC"
    ))?;
    let boards = stmt
        .query_map([user_id], board_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(boards)
}

pub fn get_board_owner(pool: &DbPool, board_id: &str) -> Result<Option<String>, AppError> {
    let conn = lock(pool)?;
    let owner = conn
        .query_row("SELECT user_id FROM boards WHERE id = ?1", [board_id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(owner)
}

/// Replaces the whole `lists` array of a board.
pub fn update_board_lists(pool: &DbPool, board_id: &str, lists: &[List]) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let lists = serde_json::to_string(lists)?;
    let rows = conn.execute(
        "UPDATE boards SET lists = ?1, updated_at = ?2 WHERE id = ?3",
        params![lists, now_millis(), board_id],
    )?;
    Ok(rows > 0)
}

// Task operations
pub fn insert_task(pool: &DbPool, id: &str, task: &TaskDocument) -> Result<(), AppError> {
    let conn = lock(pool)?;
    let now = now_millis();
    conn.execute(
        &format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)"
        ),
        params![
            id,
            task.board_id,
            task.list_id,
            task.title,
            task.description,
            task.due_date.map(format_date),
            task.priority.as_str(),
            task.completed as i32,
            task.order,
            now,
        ],
    )?;
    Ok(())
}

/// Tasks of a board, in insertion order.
pub fn list_tasks(pool: &DbPool, board_id: &str) -> Result<Vec<Task>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE board_id = ?1 ORDER BY rowid ASC"
    ))?;
    let tasks = stmt
        .query_map([board_id], task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

pub fn get_task(pool: &DbPool, id: &str) -> Result<Option<Task>, AppError> {
    let conn = lock(pool)?;
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            [id],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

pub fn update_task(pool: &DbPool, id: &str, update: &TaskUpdate) -> Result<bool, AppError> {
    let conn = lock(pool)?;

    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref title) = update.title {
        updates.push("title = ?");
        params.push(Box::new(title.clone()));
    }
    if let Some(ref description) = update.description {
        updates.push("description = ?");
        params.push(Box::new(description.clone()));
    }
    if let Some(due_date) = update.due_date {
        updates.push("due_date = ?");
        params.push(Box::new(due_date.map(format_date)));
    }
    if let Some(priority) = update.priority {
        updates.push("priority = ?");
        params.push(Box::new(priority.as_str()));
    }
    if let Some(completed) = update.completed {
        updates.push("completed = ?");
        params.push(Box::new(completed as i32));
    }
    if let Some(ref list_id) = update.list_id {
        updates.push("list_id = ?");
        params.push(Box::new(list_id.clone()));
    }
    if let Some(order) = update.order {
        updates.push("position = ?");
        params.push(Box::new(order));
    }

    updates.push("updated_at = ?");
    params.push(Box::new(now_millis()));
    params.push(Box::new(id.to_string()));

    let query = format!("UPDATE tasks SET {} WHERE id = ?", updates.join(", "));
    let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = conn.execute(&query, params_refs.as_slice())?;
    Ok(rows > 0)
}

pub fn delete_task(pool: &DbPool, id: &str) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let rows = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    Ok(rows > 0)
}

// Notification operations
pub fn insert_notification(
    pool: &DbPool,
    id: &str,
    notification: &NewNotification,
) -> Result<(), AppError> {
    let conn = lock(pool)?;
    let kind = match notification.kind {
        NotificationType::Deadline => "deadline",
    };
    conn.execute(
        "INSERT INTO notifications (id, user_id, task_id, kind, title, message, due_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            notification.user_id,
            notification.task_id,
            kind,
            notification.title,
            notification.message,
            notification.due_date.map(format_date),
            now_millis(),
        ],
    )?;
    Ok(())
}

pub fn list_unread_notifications(
    pool: &DbPool,
    user_id: &str,
) -> Result<Vec<Notification>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(
        "SELECT id, user_id, task_id, kind, title, message, due_date, read, created_at
         FROM notifications WHERE user_id = ?1 AND read = 0 ORDER BY rowid ASC",
    )?;
    let notifications = stmt
        .query_map([user_id], notification_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notifications)
}

pub fn enqueue_email(
    pool: &DbPool,
    id: &str,
    user_id: &str,
    subject: &str,
    message: &str,
) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO email_queue (id, user_id, subject, message, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, subject, message, now_millis()],
    )?;
    Ok(())
}

pub fn count_queued_emails(pool: &DbPool, user_id: &str) -> Result<i64, AppError> {
    let conn = lock(pool)?;
    let count = conn.query_row(
        "SELECT COUNT(*) FROM email_queue WHERE user_id = ?1 AND sent = 0",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
