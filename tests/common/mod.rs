#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use taskboard::board_state::BoardState;
use taskboard::db;
use taskboard::error::AppError;
use taskboard::models::{
    Board, List, NewNotification, Notification, Priority, ProfileUpdate, Task, TaskDocument,
    TaskUpdate, UserProfile,
};
use taskboard::store::{EntityStore, SqliteStore, Subscription};

pub type BoardsFeed = UnboundedSender<Result<Vec<Board>, AppError>>;

pub fn task(id: &str, list_id: &str, order: i64) -> Task {
    Task {
        id: id.to_string(),
        board_id: "board-1".to_string(),
        list_id: list_id.to_string(),
        title: format!("Task {id}"),
        description: String::new(),
        due_date: None,
        priority: Some(Priority::Medium),
        completed: false,
        order,
        created_at: Some(1),
        updated_at: Some(1),
    }
}

pub fn board(id: &str, created_at: Option<i64>, lists: &[(&str, &str)]) -> Board {
    Board {
        id: id.to_string(),
        owner_user_id: "user-1".to_string(),
        title: "My Board".to_string(),
        lists: lists
            .iter()
            .map(|(id, title)| List {
                id: id.to_string(),
                title: title.to_string(),
            })
            .collect(),
        created_at,
        updated_at: created_at,
    }
}

pub fn ids(tasks: &[&Task]) -> Vec<String> {
    tasks.iter().map(|t| t.id.clone()).collect()
}

/// Rebuilds a reducer from what the store currently holds for `user_id`,
/// the same way the live queries would deliver it.
pub fn reduce(store: &SqliteStore, user_id: &str) -> BoardState {
    let mut state = BoardState::new();
    let boards = db::list_boards(store.db(), user_id).expect("listing boards");
    state.apply_boards_snapshot(boards);
    if let Some(board_id) = state.current_board().map(|b| b.id.clone()) {
        let tasks = db::list_tasks(store.db(), &board_id).expect("listing tasks");
        state.apply_tasks_snapshot(tasks);
    }
    state
}

pub fn memory_store() -> SqliteStore {
    SqliteStore::new(db::init_in_memory().expect("in-memory database"))
}

/// Delegates to a real store, but starts failing task deletions after
/// `allowed_deletes` successful ones.
pub struct FlakyStore {
    pub inner: SqliteStore,
    allowed_deletes: usize,
    deletes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore, allowed_deletes: usize) -> Self {
        Self {
            inner,
            allowed_deletes,
            deletes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn get_user_profile(&self, uid: &str) -> Result<UserProfile, AppError> {
        self.inner.get_user_profile(uid).await
    }

    async fn update_user_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), AppError> {
        self.inner.update_user_profile(uid, update).await
    }

    async fn create_board(
        &self,
        user_id: &str,
        title: &str,
        lists: Vec<List>,
    ) -> Result<String, AppError> {
        self.inner.create_board(user_id, title, lists).await
    }

    async fn update_board_lists(&self, board_id: &str, lists: Vec<List>) -> Result<(), AppError> {
        self.inner.update_board_lists(board_id, lists).await
    }

    async fn create_task(&self, task: TaskDocument) -> Result<String, AppError> {
        self.inner.create_task(task).await
    }

    async fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<(), AppError> {
        self.inner.update_task(task_id, update).await
    }

    async fn delete_task(&self, task_id: &str) -> Result<(), AppError> {
        if self.deletes.fetch_add(1, Ordering::SeqCst) >= self.allowed_deletes {
            return Err(AppError::Database("permission denied".to_string()));
        }
        self.inner.delete_task(task_id).await
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<String, AppError> {
        self.inner.create_notification(notification).await
    }

    async fn list_unread_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<Notification>, AppError> {
        self.inner.list_unread_notifications(user_id).await
    }

    async fn enqueue_email(
        &self,
        user_id: &str,
        subject: &str,
        message: &str,
    ) -> Result<String, AppError> {
        self.inner.enqueue_email(user_id, subject, message).await
    }

    fn subscribe_boards(&self, user_id: &str) -> Subscription<Vec<Board>> {
        self.inner.subscribe_boards(user_id)
    }

    fn subscribe_tasks(&self, board_id: &str) -> Subscription<Vec<Task>> {
        self.inner.subscribe_tasks(board_id)
    }
}

/// A store whose board snapshots are pushed by the test itself.
pub struct ScriptedStore {
    boards: Mutex<Option<UnboundedReceiver<Result<Vec<Board>, AppError>>>>,
    task_feeds: Mutex<Vec<(String, UnboundedSender<Result<Vec<Task>, AppError>>)>>,
    creates: AtomicUsize,
    fail_create: bool,
}

impl ScriptedStore {
    pub fn new() -> (Arc<Self>, BoardsFeed) {
        Self::build(false)
    }

    pub fn failing_create() -> (Arc<Self>, BoardsFeed) {
        Self::build(true)
    }

    fn build(fail_create: bool) -> (Arc<Self>, BoardsFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::new(Self {
            boards: Mutex::new(Some(rx)),
            task_feeds: Mutex::new(Vec::new()),
            creates: AtomicUsize::new(0),
            fail_create,
        });
        (store, tx)
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Board ids that had a tasks subscription opened, in order.
    pub fn task_subscriptions(&self) -> Vec<String> {
        self.task_feeds
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Pushes a tasks snapshot to the most recent subscription for `board_id`.
    pub fn push_tasks(&self, board_id: &str, tasks: Vec<Task>) -> bool {
        let feeds = self.task_feeds.lock().unwrap();
        feeds
            .iter()
            .rev()
            .find(|(id, _)| id == board_id)
            .is_some_and(|(_, tx)| tx.send(Ok(tasks)).is_ok())
    }
}

fn not_scripted<T>() -> Result<T, AppError> {
    Err(AppError::Database("not scripted".to_string()))
}

#[async_trait]
impl EntityStore for ScriptedStore {
    async fn get_user_profile(&self, _uid: &str) -> Result<UserProfile, AppError> {
        not_scripted()
    }

    async fn update_user_profile(&self, _uid: &str, _update: &ProfileUpdate) -> Result<(), AppError> {
        not_scripted()
    }

    async fn create_board(
        &self,
        _user_id: &str,
        _title: &str,
        _lists: Vec<List>,
    ) -> Result<String, AppError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_create {
            return Err(AppError::Database("store offline".to_string()));
        }
        Ok(format!("board-{n}"))
    }

    async fn update_board_lists(&self, _board_id: &str, _lists: Vec<List>) -> Result<(), AppError> {
        not_scripted()
    }

    async fn create_task(&self, _task: TaskDocument) -> Result<String, AppError> {
        not_scripted()
    }

    async fn update_task(&self, _task_id: &str, _update: TaskUpdate) -> Result<(), AppError> {
        not_scripted()
    }

    async fn delete_task(&self, _task_id: &str) -> Result<(), AppError> {
        not_scripted()
    }

    async fn create_notification(
        &self,
        _notification: NewNotification,
    ) -> Result<String, AppError> {
        not_scripted()
    }

    async fn list_unread_notifications(
        &self,
        _user_id: &str,
    ) -> Result<Vec<Notification>, AppError> {
        not_scripted()
    }

    async fn enqueue_email(
        &self,
        _user_id: &str,
        _subject: &str,
        _message: &str,
    ) -> Result<String, AppError> {
        not_scripted()
    }

    fn subscribe_boards(&self, _user_id: &str) -> Subscription<Vec<Board>> {
        let rx = self.boards.lock().unwrap().take().unwrap_or_else(|| {
            let (_, rx) = mpsc::unbounded_channel();
            rx
        });
        Subscription::from_receiver(rx)
    }

    fn subscribe_tasks(&self, board_id: &str) -> Subscription<Vec<Task>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.task_feeds
            .lock()
            .unwrap()
            .push((board_id.to_string(), tx));
        Subscription::from_receiver(rx)
    }
}
