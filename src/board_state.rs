//! In-memory view of the current user's board.
//!
//! The reducer never writes to the store. It only reconciles complete
//! snapshots pushed by the live queries and answers derived-view questions
//! (which tasks does list L show under filter F).

use std::cmp::Reverse;

use serde::Serialize;
use time::Date;

use crate::models::{Board, Filter, List, Priority, SortMode, Task};

pub const DEFAULT_BOARD_TITLE: &str = "My Board";
pub const INIT_TIMEOUT_MESSAGE: &str = "Could not connect to the board store. Please retry.";

/// What the controller has to do after a boards snapshot was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardsOutcome {
    /// The user has no board and none has been requested yet.
    CreateDefaultBoard,
    /// The user has no board, but a creation is already in flight.
    CreationPending,
    /// `board_id` is now the current board. `changed` is true when it differs
    /// from the previous current board.
    Adopted { board_id: String, changed: bool },
}

#[derive(Debug, Clone)]
pub struct BoardState {
    current_board: Option<Board>,
    lists: Vec<List>,
    tasks: Vec<Task>,
    loading: bool,
    error: Option<String>,
    create_requested: bool,
    timed_out: bool,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    pub fn new() -> Self {
        Self {
            current_board: None,
            lists: Vec::new(),
            tasks: Vec::new(),
            loading: true,
            error: None,
            create_requested: false,
            timed_out: false,
        }
    }

    pub fn current_board(&self) -> Option<&Board> {
        self.current_board.as_ref()
    }

    pub fn lists(&self) -> &[List] {
        &self.lists
    }

    /// All tasks of the current board, sorted by `order`.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn apply_boards_snapshot(&mut self, boards: Vec<Board>) -> BoardsOutcome {
        if boards.is_empty() {
            if self.create_requested {
                return BoardsOutcome::CreationPending;
            }
            self.create_requested = true;
            return BoardsOutcome::CreateDefaultBoard;
        }

        let mut boards = boards;
        // Stable: boards without a timestamp keep their delivery order.
        boards.sort_by_key(|b| Reverse(b.created_at.unwrap_or(0)));
        let Some(board) = boards.into_iter().next() else {
            return BoardsOutcome::CreationPending;
        };

        let changed = self
            .current_board
            .as_ref()
            .is_none_or(|current| current.id != board.id);
        if changed {
            self.tasks.clear();
        }

        let board_id = board.id.clone();
        self.lists = board.lists.clone();
        self.current_board = Some(board);
        self.loading = false;
        if !self.timed_out {
            self.error = None;
        }

        BoardsOutcome::Adopted { board_id, changed }
    }

    /// Replaces the local tasks wholesale. Ties on `order` keep snapshot order.
    pub fn apply_tasks_snapshot(&mut self, tasks: Vec<Task>) {
        let mut tasks = tasks;
        tasks.sort_by_key(|t| t.order);
        self.tasks = tasks;
    }

    pub fn board_creation_failed(&mut self, message: &str) {
        self.error = Some(format!("Failed to create board: {message}"));
        self.loading = false;
    }

    pub fn subscription_failed(&mut self, message: &str) {
        self.error = Some(message.to_string());
        self.loading = false;
    }

    /// Called when the initialization timer fires. Returns true when the
    /// timeout took effect, i.e. no board had resolved yet.
    pub fn init_timed_out(&mut self) -> bool {
        if !self.loading {
            return false;
        }
        self.loading = false;
        if self.current_board.is_some() {
            return false;
        }
        self.timed_out = true;
        self.error = Some(INIT_TIMEOUT_MESSAGE.to_string());
        true
    }

    pub fn find_list(&self, list_id: &str) -> Option<&List> {
        self.lists.iter().find(|l| l.id == list_id)
    }

    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn tasks_in_list(&self, list_id: &str) -> Vec<&Task> {
        self.visible_tasks(list_id, Filter::All)
    }

    pub fn task_count(&self, list_id: &str) -> usize {
        self.tasks.iter().filter(|t| t.list_id == list_id).count()
    }

    /// Tasks of `list_id` that pass `filter`, in `order` order.
    pub fn visible_tasks(&self, list_id: &str, filter: Filter) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.list_id == list_id && filter.matches(t))
            .collect()
    }

    /// Like [`BoardState::visible_tasks`], optionally re-sorted by priority.
    /// The priority sort is stable, so equal priorities keep `order` order.
    pub fn sorted_tasks(&self, list_id: &str, filter: Filter, sort: SortMode) -> Vec<&Task> {
        let mut tasks = self.visible_tasks(list_id, filter);
        if sort == SortMode::Priority {
            tasks.sort_by_key(|t| Priority::rank(t.priority));
        }
        tasks
    }

    pub fn view(&self, filter: Filter, sort: SortMode, today: Date) -> BoardView {
        BoardView {
            loading: self.loading,
            error: self.error.clone(),
            board: self.current_board.as_ref().map(|b| BoardSummary {
                id: b.id.clone(),
                title: b.title.clone(),
            }),
            filter,
            sort,
            lists: self
                .lists
                .iter()
                .map(|list| ListView {
                    id: list.id.clone(),
                    title: list.title.clone(),
                    task_count: self.task_count(&list.id),
                    tasks: self
                        .sorted_tasks(&list.id, filter, sort)
                        .into_iter()
                        .map(|task| TaskView {
                            overdue: task.is_overdue(today),
                            task: task.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub loading: bool,
    pub error: Option<String>,
    pub board: Option<BoardSummary>,
    pub filter: Filter,
    pub sort: SortMode,
    pub lists: Vec<ListView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardSummary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    pub id: String,
    pub title: String,
    /// Unfiltered number of tasks in the list.
    pub task_count: usize,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub overdue: bool,
}
