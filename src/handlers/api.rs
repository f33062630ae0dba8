use axum::extract::{Path, Query};
use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::info;

use crate::board_state::BoardView;
use crate::error::AppError;
use crate::middleware::Auth;
use crate::models::{BoardQuery, CompleteTask, ListTitle, MoveTask, NewTask, Notification, TaskUpdate};

pub async fn get_board(
    auth: Auth,
    Query(query): Query<BoardQuery>,
) -> Result<Json<BoardView>, AppError> {
    let state = auth.session.board().state();
    let today = OffsetDateTime::now_utc().date();
    let view = state.view(
        query.filter.unwrap_or_default(),
        query.sort.unwrap_or_default(),
        today,
    );
    Ok(Json(view))
}

pub async fn create_list(
    auth: Auth,
    Json(req): Json<ListTitle>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let state = auth.session.board().state();
    let list = auth.session.tasks().create_list(&state, &req.title).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "list": list })),
    ))
}

pub async fn rename_list(
    auth: Auth,
    Path(id): Path<String>,
    Json(req): Json<ListTitle>,
) -> Result<Json<Value>, AppError> {
    let state = auth.session.board().state();
    auth.session
        .tasks()
        .rename_list(&state, &id, &req.title)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_list(auth: Auth, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let state = auth.session.board().state();
    let deletion = auth.session.tasks().delete_list(&state, &id).await?;
    Ok(Json(json!({
        "success": true,
        "tasksDeleted": deletion.tasks_deleted,
    })))
}

pub async fn create_task(
    auth: Auth,
    Path(list_id): Path<String>,
    Json(req): Json<NewTask>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let state = auth.session.board().state();
    let id = auth
        .session
        .tasks()
        .create_task(&state, &list_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "id": id }))))
}

pub async fn update_task(
    auth: Auth,
    Path(id): Path<String>,
    Json(req): Json<TaskUpdate>,
) -> Result<Json<Value>, AppError> {
    let state = auth.session.board().state();
    auth.session.tasks().update_task(&state, &id, req).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn move_task(
    auth: Auth,
    Path(id): Path<String>,
    Json(req): Json<MoveTask>,
) -> Result<Json<Value>, AppError> {
    let state = auth.session.board().state();
    auth.session
        .tasks()
        .move_task(&state, &id, &req.list_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn complete_task(
    auth: Auth,
    Path(id): Path<String>,
    Json(req): Json<CompleteTask>,
) -> Result<Json<Value>, AppError> {
    let state = auth.session.board().state();
    auth.session
        .tasks()
        .set_completed(&state, &id, req.completed)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_task(auth: Auth, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let state = auth.session.board().state();
    auth.session.tasks().delete_task(&state, &id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn list_notifications(auth: Auth) -> Result<Json<Vec<Notification>>, AppError> {
    let uid = auth.session.user().uid.clone();
    let notifications = auth.session.notifications().get_user_notifications(&uid).await?;
    info!(count = notifications.len(), "Listed notifications");
    Ok(Json(notifications))
}

pub async fn check_deadlines(auth: Auth) -> Result<Json<Value>, AppError> {
    let uid = auth.session.user().uid.clone();
    let state = auth.session.board().state();
    let scheduled = auth
        .session
        .notifications()
        .check_upcoming_deadlines(&uid, state.tasks(), OffsetDateTime::now_utc())
        .await;
    Ok(Json(json!({ "success": true, "scheduled": scheduled })))
}
