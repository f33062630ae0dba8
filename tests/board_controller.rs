mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{board, memory_store, task, ScriptedStore};
use taskboard::board_controller::{BoardController, DEFAULT_INIT_TIMEOUT};
use taskboard::board_state::{DEFAULT_BOARD_TITLE, INIT_TIMEOUT_MESSAGE};
use taskboard::db;
use taskboard::models::{Filter, NewTask};
use taskboard::store::EntityStore;
use taskboard::task_service::TaskService;

const WAIT: Duration = Duration::from_secs(2);

async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, fut)
        .await
        .expect("timed out waiting for board state")
}

#[tokio::test]
async fn test_first_mount_creates_default_board() {
    let store = memory_store();
    let shared: Arc<dyn EntityStore> = Arc::new(store.clone());
    let controller = BoardController::mount(shared, "user-1", DEFAULT_INIT_TIMEOUT);

    let state = within(controller.wait_for(|s| s.current_board().is_some()))
        .await
        .unwrap();

    let current = state.current_board().unwrap();
    assert_eq!(current.title, DEFAULT_BOARD_TITLE);
    assert!(current.lists.is_empty());
    assert!(!state.is_loading());
    assert_eq!(state.error(), None);
    assert_eq!(db::list_boards(store.db(), "user-1").unwrap().len(), 1);
}

#[tokio::test]
async fn test_existing_board_is_reused() {
    let store = memory_store();
    let existing = store
        .create_board("user-1", "Work", Vec::new())
        .await
        .unwrap();
    let shared: Arc<dyn EntityStore> = Arc::new(store.clone());
    let controller = BoardController::mount(shared, "user-1", DEFAULT_INIT_TIMEOUT);

    let state = within(controller.wait_for(|s| s.current_board().is_some()))
        .await
        .unwrap();

    assert_eq!(state.current_board().unwrap().id, existing);
    assert_eq!(db::list_boards(store.db(), "user-1").unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_empty_snapshots_create_one_board() {
    let (store, boards) = ScriptedStore::new();
    boards.send(Ok(Vec::new())).unwrap();
    boards.send(Ok(Vec::new())).unwrap();

    let shared: Arc<dyn EntityStore> = store.clone();
    let controller = BoardController::mount(shared, "user-1", DEFAULT_INIT_TIMEOUT);

    boards
        .send(Ok(vec![board("board-1", Some(1), &[])]))
        .unwrap();
    within(controller.wait_for(|s| s.current_board().is_some()))
        .await
        .unwrap();

    assert_eq!(store.create_calls(), 1);
}

#[tokio::test]
async fn test_failed_board_creation_surfaces_error() {
    let (store, boards) = ScriptedStore::failing_create();
    boards.send(Ok(Vec::new())).unwrap();

    let shared: Arc<dyn EntityStore> = store.clone();
    let controller = BoardController::mount(shared, "user-1", DEFAULT_INIT_TIMEOUT);

    let state = within(controller.wait_for(|s| s.error().is_some()))
        .await
        .unwrap();

    assert!(!state.is_loading());
    assert_eq!(
        state.error(),
        Some("Failed to create board: store offline")
    );

    // No automatic retry on redelivery.
    boards.send(Ok(Vec::new())).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.create_calls(), 1);
}

#[tokio::test]
async fn test_tasks_follow_the_current_board() {
    let (store, boards) = ScriptedStore::new();
    let shared: Arc<dyn EntityStore> = store.clone();
    let controller = BoardController::mount(shared, "user-1", DEFAULT_INIT_TIMEOUT);

    boards
        .send(Ok(vec![board("board-1", Some(1), &[("todo", "Todo")])]))
        .unwrap();
    within(controller.wait_for(|s| s.current_board().is_some()))
        .await
        .unwrap();
    assert!(store.push_tasks("board-1", vec![task("1", "todo", 0)]));
    within(controller.wait_for(|s| s.tasks().len() == 1))
        .await
        .unwrap();

    // Re-delivering the same board does not reopen the tasks query.
    boards
        .send(Ok(vec![board("board-1", Some(1), &[("todo", "Todo")])]))
        .unwrap();
    boards
        .send(Ok(vec![
            board("board-1", Some(1), &[("todo", "Todo")]),
            board("board-2", Some(2), &[]),
        ]))
        .unwrap();
    let state = within(controller.wait_for(|s| {
        s.current_board().is_some_and(|b| b.id == "board-2")
    }))
    .await
    .unwrap();

    assert!(state.tasks().is_empty());
    assert_eq!(store.task_subscriptions(), ["board-1", "board-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_initialization_times_out_without_board() {
    let (store, boards) = ScriptedStore::new();
    let shared: Arc<dyn EntityStore> = store.clone();
    let controller = BoardController::mount(shared, "user-1", Duration::from_secs(3));

    let state = controller.wait_for(|s| !s.is_loading()).await.unwrap();
    assert_eq!(state.error(), Some(INIT_TIMEOUT_MESSAGE));
    assert!(state.current_board().is_none());

    // A late board is still adopted quietly.
    boards
        .send(Ok(vec![board("board-1", Some(1), &[])]))
        .unwrap();
    let state = controller
        .wait_for(|s| s.current_board().is_some())
        .await
        .unwrap();
    assert_eq!(state.error(), Some(INIT_TIMEOUT_MESSAGE));
}

#[tokio::test(start_paused = true)]
async fn test_timer_is_harmless_once_board_resolved() {
    let (store, boards) = ScriptedStore::new();
    boards
        .send(Ok(vec![board("board-1", Some(1), &[])]))
        .unwrap();
    let shared: Arc<dyn EntityStore> = store.clone();
    let controller = BoardController::mount(shared, "user-1", Duration::from_secs(3));

    controller
        .wait_for(|s| s.current_board().is_some())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(controller.state().error(), None);
}

#[tokio::test]
async fn test_mutations_reach_the_reducer_through_the_push() {
    let store = memory_store();
    let shared: Arc<dyn EntityStore> = Arc::new(store.clone());
    let controller = BoardController::mount(shared.clone(), "user-1", DEFAULT_INIT_TIMEOUT);
    let service = TaskService::new(shared);

    let state = within(controller.wait_for(|s| s.current_board().is_some()))
        .await
        .unwrap();
    let list = service.create_list(&state, "Todo").await.unwrap();

    let state = within(controller.wait_for(|s| s.lists().len() == 1))
        .await
        .unwrap();
    let id = service
        .create_task(
            &state,
            &list.id,
            NewTask {
                title: "Write spec".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = within(controller.wait_for(|s| s.find_task(&id).is_some()))
        .await
        .unwrap();
    assert_eq!(state.visible_tasks(&list.id, Filter::Active).len(), 1);

    service.set_completed(&state, &id, true).await.unwrap();
    let state = within(
        controller.wait_for(|s| s.find_task(&id).is_some_and(|t| t.completed)),
    )
    .await
    .unwrap();
    assert_eq!(state.visible_tasks(&list.id, Filter::Completed).len(), 1);
    assert!(state.visible_tasks(&list.id, Filter::Active).is_empty());
}

#[tokio::test]
async fn test_dropping_controller_stops_updates() {
    let store = memory_store();
    let shared: Arc<dyn EntityStore> = Arc::new(store.clone());
    let controller = BoardController::mount(shared, "user-1", DEFAULT_INIT_TIMEOUT);
    within(controller.wait_for(|s| s.current_board().is_some()))
        .await
        .unwrap();
    assert!(controller.is_mounted());

    let mut rx = controller.watch();
    controller.dispose();

    // The sender goes away with the aborted loop.
    within(async {
        while rx.changed().await.is_ok() {}
    })
    .await;
}
