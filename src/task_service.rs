//! Translates user intents into store writes.
//!
//! None of these operations touch local state. Their effect reaches the
//! [`BoardState`] only through the next snapshot pushed by the live queries.

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::generate_list_id;
use crate::board_state::BoardState;
use crate::error::AppError;
use crate::models::{Board, List, NewTask, Task, TaskDocument, TaskUpdate};
use crate::store::EntityStore;

pub const MAX_LIST_TITLE_LEN: usize = 50;
pub const BOARD_NOT_READY: &str = "Board not ready. Please try again.";

/// Outcome of a completed list deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDeletion {
    pub list_id: String,
    pub tasks_deleted: usize,
}

pub fn validate_list_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("List title cannot be empty"));
    }
    if title.chars().count() > MAX_LIST_TITLE_LEN {
        return Err(AppError::validation(format!(
            "List title cannot exceed {MAX_LIST_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

pub fn validate_task_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("Title cannot be empty"));
    }
    Ok(title.to_string())
}

fn require_board(state: &BoardState) -> Result<&Board, AppError> {
    state
        .current_board()
        .ok_or_else(|| AppError::validation(BOARD_NOT_READY))
}

/// The task only counts as the caller's when it is on their current board.
fn require_task<'a>(state: &'a BoardState, task_id: &str) -> Result<&'a Task, AppError> {
    let board = require_board(state)?;
    state
        .find_task(task_id)
        .filter(|t| t.board_id == board.id)
        .ok_or(AppError::NotFound("Task"))
}

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn EntityStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Creates a task at the end of `list_id`. Its `order` is the number of
    /// tasks the caller currently sees in that list, so two writers racing on
    /// the same list may produce equal orders.
    pub async fn create_task(
        &self,
        state: &BoardState,
        list_id: &str,
        input: NewTask,
    ) -> Result<String, AppError> {
        let board = require_board(state)?;
        let title = validate_task_title(&input.title)?;
        if state.find_list(list_id).is_none() {
            return Err(AppError::NotFound("List"));
        }

        let order = state.task_count(list_id) as i64;
        let document = TaskDocument {
            board_id: board.id.clone(),
            list_id: list_id.to_string(),
            title,
            description: input.description.unwrap_or_default(),
            due_date: input.due_date,
            priority: input.priority.unwrap_or_default(),
            completed: false,
            order,
        };

        let id = self
            .store
            .create_task(document)
            .await
            .map_err(|e| e.during("saving task"))?;
        info!(id = %id, list_id, order, "Created task");
        Ok(id)
    }

    /// Merges `update` into the task. Writing only `list_id` moves the task and
    /// leaves its `order` untouched.
    pub async fn update_task(
        &self,
        state: &BoardState,
        task_id: &str,
        update: TaskUpdate,
    ) -> Result<(), AppError> {
        require_task(state, task_id)?;
        if let Some(ref list_id) = update.list_id {
            if state.find_list(list_id).is_none() {
                return Err(AppError::NotFound("List"));
            }
        }
        let mut update = update;
        if let Some(ref title) = update.title {
            update.title = Some(validate_task_title(title)?);
        }
        self.store
            .update_task(task_id, update)
            .await
            .map_err(|e| e.during("saving task"))?;
        info!(id = task_id, "Updated task");
        Ok(())
    }

    pub async fn move_task(
        &self,
        state: &BoardState,
        task_id: &str,
        list_id: &str,
    ) -> Result<(), AppError> {
        require_task(state, task_id)?;
        if state.find_list(list_id).is_none() {
            return Err(AppError::NotFound("List"));
        }
        self.store
            .update_task(task_id, TaskUpdate::move_to(list_id))
            .await
            .map_err(|e| e.during("moving task"))?;
        info!(id = task_id, list_id, "Moved task");
        Ok(())
    }

    pub async fn set_completed(
        &self,
        state: &BoardState,
        task_id: &str,
        completed: bool,
    ) -> Result<(), AppError> {
        require_task(state, task_id)?;
        self.store
            .update_task(task_id, TaskUpdate::completed(completed))
            .await
            .map_err(|e| e.during("toggling task completion"))?;
        info!(id = task_id, completed, "Toggled task completion");
        Ok(())
    }

    /// Hard delete of a task on the current board. The store write itself is
    /// unconditional, so a task already gone from the store still succeeds.
    pub async fn delete_task(&self, state: &BoardState, task_id: &str) -> Result<(), AppError> {
        require_task(state, task_id)?;
        self.store
            .delete_task(task_id)
            .await
            .map_err(|e| e.during("deleting task"))?;
        info!(id = task_id, "Deleted task");
        Ok(())
    }

    /// Appends a list and writes the whole `lists` array back to the board.
    pub async fn create_list(&self, state: &BoardState, title: &str) -> Result<List, AppError> {
        let board = require_board(state)?;
        let list = List {
            id: generate_list_id(),
            title: validate_list_title(title)?,
        };

        let mut lists = state.lists().to_vec();
        lists.push(list.clone());
        self.store
            .update_board_lists(&board.id, lists)
            .await
            .map_err(|e| e.during("saving list"))?;
        info!(id = %list.id, title = %list.title, "Created list");
        Ok(list)
    }

    pub async fn rename_list(
        &self,
        state: &BoardState,
        list_id: &str,
        title: &str,
    ) -> Result<(), AppError> {
        let board = require_board(state)?;
        let title = validate_list_title(title)?;
        if state.find_list(list_id).is_none() {
            return Err(AppError::NotFound("List"));
        }

        let lists = state
            .lists()
            .iter()
            .map(|l| {
                if l.id == list_id {
                    List {
                        id: l.id.clone(),
                        title: title.clone(),
                    }
                } else {
                    l.clone()
                }
            })
            .collect();
        self.store
            .update_board_lists(&board.id, lists)
            .await
            .map_err(|e| e.during("saving list"))?;
        info!(id = list_id, title = %title, "Renamed list");
        Ok(())
    }

    /// Deletes every task of the list one at a time, then removes the list
    /// from the board. The first failed task deletion aborts the operation and
    /// the list stays on the board with whatever tasks were not yet deleted.
    pub async fn delete_list(
        &self,
        state: &BoardState,
        list_id: &str,
    ) -> Result<ListDeletion, AppError> {
        let board = require_board(state)?;
        if state.find_list(list_id).is_none() {
            return Err(AppError::NotFound("List"));
        }

        let task_ids: Vec<String> = state
            .tasks_in_list(list_id)
            .into_iter()
            .map(|t| t.id.clone())
            .collect();
        let total = task_ids.len();
        for (deleted, task_id) in task_ids.iter().enumerate() {
            if let Err(err) = self.store.delete_task(task_id).await {
                warn!(list_id, task_id = %task_id, deleted, total, error = %err, "List deletion aborted");
                return Err(AppError::Mutation {
                    operation: "deleting list",
                    message: format!(
                        "{err} ({deleted} of {total} tasks deleted, list was kept)"
                    ),
                });
            }
        }

        let lists = state
            .lists()
            .iter()
            .filter(|l| l.id != list_id)
            .cloned()
            .collect();
        self.store
            .update_board_lists(&board.id, lists)
            .await
            .map_err(|e| e.during("deleting list"))?;
        info!(id = list_id, tasks_deleted = total, "Deleted list");

        Ok(ListDeletion {
            list_id: list_id.to_string(),
            tasks_deleted: total,
        })
    }
}
