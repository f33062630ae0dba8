//! Entity store contract and the SQLite-backed implementation.
//!
//! Every write publishes a [`Change`] on a broadcast feed. Live queries
//! listen on that feed and re-run their query on each relevant change, so
//! subscribers always receive complete snapshots, never diffs.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::auth::generate_document_id;
use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::models::{
    Board, List, NewNotification, Notification, ProfileUpdate, Task, TaskDocument, TaskUpdate,
    UserProfile,
};

const CHANGE_FEED_CAPACITY: usize = 256;

/// The backend operations the board core relies on.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_user_profile(&self, uid: &str) -> Result<UserProfile, AppError>;

    async fn update_user_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), AppError>;

    /// Returns the id of the new board.
    async fn create_board(
        &self,
        user_id: &str,
        title: &str,
        lists: Vec<List>,
    ) -> Result<String, AppError>;

    /// Overwrites the board's entire `lists` array. Last write wins.
    async fn update_board_lists(&self, board_id: &str, lists: Vec<List>) -> Result<(), AppError>;

    /// Returns the id of the new task.
    async fn create_task(&self, task: TaskDocument) -> Result<String, AppError>;

    async fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<(), AppError>;

    /// Hard delete. Deleting a task that does not exist succeeds.
    async fn delete_task(&self, task_id: &str) -> Result<(), AppError>;

    async fn create_notification(&self, notification: NewNotification)
        -> Result<String, AppError>;

    async fn list_unread_notifications(&self, user_id: &str)
        -> Result<Vec<Notification>, AppError>;

    async fn enqueue_email(
        &self,
        user_id: &str,
        subject: &str,
        message: &str,
    ) -> Result<String, AppError>;

    /// Live query over the boards owned by `user_id`.
    fn subscribe_boards(&self, user_id: &str) -> Subscription<Vec<Board>>;

    /// Live query over the tasks of `board_id`.
    fn subscribe_tasks(&self, board_id: &str) -> Subscription<Vec<Task>>;
}

/// Handle to a live query. Dropping it (or calling [`Subscription::unsubscribe`])
/// stops delivery.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Result<T, AppError>>,
    task: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<Result<T, AppError>>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// A subscription fed directly by the holder of the sender.
    pub fn from_receiver(rx: mpsc::UnboundedReceiver<Result<T, AppError>>) -> Self {
        Self { rx, task: None }
    }

    /// Next snapshot, or `None` once the feed has shut down.
    pub async fn next(&mut self) -> Option<Result<T, AppError>> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Boards { user_id: String },
    Tasks { board_id: String },
}

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
    changes: broadcast::Sender<Change>,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { db, changes }
    }

    pub fn into_shared(self) -> Arc<dyn EntityStore> {
        Arc::new(self)
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    fn publish(&self, change: Change) {
        debug!(?change, "Publishing change");
        // No receivers just means nobody is subscribed right now.
        let _ = self.changes.send(change);
    }

    fn live_query<T, M, Q>(&self, matches: M, query: Q) -> Subscription<T>
    where
        T: Send + 'static,
        M: Fn(&Change) -> bool + Send + 'static,
        Q: Fn(&DbPool) -> Result<T, AppError> + Send + 'static,
    {
        // Subscribe before the initial query so no write slips between them.
        let mut feed = self.changes.subscribe();
        let db = self.db.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            if tx.send(query(&db)).is_err() {
                return;
            }
            loop {
                match feed.recv().await {
                    Ok(change) if !matches(&change) => continue,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
                if tx.send(query(&db)).is_err() {
                    break;
                }
            }
        });

        Subscription::new(rx, task)
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get_user_profile(&self, uid: &str) -> Result<UserProfile, AppError> {
        db::get_user_profile(&self.db, uid)?.ok_or(AppError::NotFound("User"))
    }

    async fn update_user_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), AppError> {
        if db::update_user_profile(&self.db, uid, update)? {
            Ok(())
        } else {
            Err(AppError::NotFound("User"))
        }
    }

    async fn create_board(
        &self,
        user_id: &str,
        title: &str,
        lists: Vec<List>,
    ) -> Result<String, AppError> {
        let id = generate_document_id();
        db::insert_board(&self.db, &id, user_id, title, &lists)?;
        self.publish(Change::Boards {
            user_id: user_id.to_string(),
        });
        Ok(id)
    }

    async fn update_board_lists(&self, board_id: &str, lists: Vec<List>) -> Result<(), AppError> {
        let owner = db::get_board_owner(&self.db, board_id)?.ok_or(AppError::NotFound("Board"))?;
        db::update_board_lists(&self.db, board_id, &lists)?;
        self.publish(Change::Boards { user_id: owner });
        Ok(())
    }

    async fn create_task(&self, task: TaskDocument) -> Result<String, AppError> {
        let id = generate_document_id();
        db::insert_task(&self.db, &id, &task)?;
        self.publish(Change::Tasks {
            board_id: task.board_id,
        });
        Ok(id)
    }

    async fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<(), AppError> {
        let task = db::get_task(&self.db, task_id)?.ok_or(AppError::NotFound("Task"))?;
        db::update_task(&self.db, task_id, &update)?;
        self.publish(Change::Tasks {
            board_id: task.board_id,
        });
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), AppError> {
        let Some(task) = db::get_task(&self.db, task_id)? else {
            return Ok(());
        };
        db::delete_task(&self.db, task_id)?;
        self.publish(Change::Tasks {
            board_id: task.board_id,
        });
        Ok(())
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<String, AppError> {
        let id = generate_document_id();
        db::insert_notification(&self.db, &id, &notification)?;
        Ok(id)
    }

    async fn list_unread_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<Notification>, AppError> {
        db::list_unread_notifications(&self.db, user_id)
    }

    async fn enqueue_email(
        &self,
        user_id: &str,
        subject: &str,
        message: &str,
    ) -> Result<String, AppError> {
        let id = generate_document_id();
        db::enqueue_email(&self.db, &id, user_id, subject, message)?;
        Ok(id)
    }

    fn subscribe_boards(&self, user_id: &str) -> Subscription<Vec<Board>> {
        let user_id = user_id.to_string();
        let watched = user_id.clone();
        self.live_query(
            move |change| matches!(change, Change::Boards { user_id } if *user_id == watched),
            move |db| db::list_boards(db, &user_id),
        )
    }

    fn subscribe_tasks(&self, board_id: &str) -> Subscription<Vec<Task>> {
        let board_id = board_id.to_string();
        let watched = board_id.clone();
        self.live_query(
            move |change| matches!(change, Change::Tasks { board_id } if *board_id == watched),
            move |db| db::list_tasks(db, &board_id),
        )
    }
}
