//! Drives a [`BoardState`] from the store's live queries for one user.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::board_state::{BoardState, BoardsOutcome, DEFAULT_BOARD_TITLE};
use crate::error::AppError;
use crate::models::Task;
use crate::store::{EntityStore, Subscription};

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Owns the boards and tasks subscriptions of one user. Dropping the
/// controller tears both down.
pub struct BoardController {
    state: watch::Receiver<BoardState>,
    mounted: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl BoardController {
    pub fn mount(
        store: Arc<dyn EntityStore>,
        user_id: impl Into<String>,
        init_timeout: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(BoardState::new());
        let mounted = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run(
            store,
            user_id.into(),
            init_timeout,
            tx,
            mounted.clone(),
        ));
        Self {
            state: rx,
            mounted,
            task,
        }
    }

    /// Copy of the latest reducer state.
    pub fn state(&self) -> BoardState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<BoardState> {
        self.state.clone()
    }

    /// Waits until `predicate` holds for the reducer state.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&BoardState) -> bool,
    ) -> Result<BoardState, AppError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(predicate)
            .await
            .map_err(|_| AppError::Connectivity("board subscription stopped".to_string()))?;
        Ok(state.clone())
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn dispose(self) {}
}

impl Drop for BoardController {
    fn drop(&mut self) {
        self.mounted.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

async fn next_snapshot<T>(subscription: &mut Option<Subscription<T>>) -> Option<Result<T, AppError>> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

async fn run(
    store: Arc<dyn EntityStore>,
    user_id: String,
    init_timeout: Duration,
    state: watch::Sender<BoardState>,
    mounted: Arc<AtomicBool>,
) {
    info!(user_id = %user_id, "Mounting board subscriptions");

    let mut boards = store.subscribe_boards(&user_id);
    let mut tasks: Option<Subscription<Vec<Task>>> = None;

    let deadline = tokio::time::sleep(init_timeout);
    tokio::pin!(deadline);
    let mut deadline_armed = true;

    loop {
        tokio::select! {
            () = &mut deadline, if deadline_armed => {
                deadline_armed = false;
                let mut fired = false;
                state.send_modify(|s| fired = s.init_timed_out());
                if fired {
                    warn!(user_id = %user_id, ?init_timeout, "Board initialization timed out");
                }
            }
            snapshot = boards.next() => {
                let Some(snapshot) = snapshot else {
                    break;
                };
                match snapshot {
                    Ok(snapshot) => {
                        info!(user_id = %user_id, count = snapshot.len(), "Boards received");
                        let mut outcome = BoardsOutcome::CreationPending;
                        state.send_modify(|s| outcome = s.apply_boards_snapshot(snapshot));
                        match outcome {
                            BoardsOutcome::CreateDefaultBoard => {
                                create_default_board(store.as_ref(), &user_id, &state, &mounted)
                                    .await;
                            }
                            BoardsOutcome::Adopted { board_id, changed: true } => {
                                info!(board_id = %board_id, "Subscribing to tasks");
                                tasks = Some(store.subscribe_tasks(&board_id));
                            }
                            BoardsOutcome::Adopted { .. } | BoardsOutcome::CreationPending => {}
                        }
                    }
                    Err(err) => {
                        warn!(user_id = %user_id, error = %err, "Boards subscription failed");
                        state.send_modify(|s| s.subscription_failed(&err.to_string()));
                    }
                }
            }
            snapshot = next_snapshot(&mut tasks) => {
                match snapshot {
                    Some(Ok(snapshot)) => {
                        state.send_modify(|s| s.apply_tasks_snapshot(snapshot));
                    }
                    Some(Err(err)) => {
                        warn!(user_id = %user_id, error = %err, "Tasks subscription failed");
                        state.send_modify(|s| s.subscription_failed(&err.to_string()));
                    }
                    None => tasks = None,
                }
            }
        }
    }

    info!(user_id = %user_id, "Board subscriptions closed");
}

async fn create_default_board(
    store: &dyn EntityStore,
    user_id: &str,
    state: &watch::Sender<BoardState>,
    mounted: &AtomicBool,
) {
    if !mounted.load(Ordering::SeqCst) {
        return;
    }
    info!(user_id = %user_id, "No boards found, creating one");
    match store
        .create_board(user_id, DEFAULT_BOARD_TITLE, Vec::new())
        .await
    {
        Ok(board_id) => info!(board_id = %board_id, "Created default board"),
        Err(err) => {
            warn!(user_id = %user_id, error = %err, "Failed to create board");
            state.send_modify(|s| s.board_creation_failed(&err.to_string()));
        }
    }
}
