use axum::extract::{Path, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{
    generate_document_id, generate_session_id, hash_password, validate_registration,
    verify_password,
};
use crate::db::{create_session, create_user, delete_session, get_credentials};
use crate::error::AppError;
use crate::middleware::{Auth, SESSION_COOKIE};
use crate::models::{
    now_millis, LoginRequest, NotificationChannel, ProfileUpdate, RegisterRequest, Session,
    UserProfile,
};
use crate::AppState;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

fn start_session(state: &AppState, jar: CookieJar, user_id: &str) -> Result<CookieJar, AppError> {
    let session_id = generate_session_id();
    let now = now_millis();
    let session = Session {
        id: session_id.clone(),
        user_id: user_id.to_string(),
        created_at: now,
        expires_at: now + state.config.session_days * MILLIS_PER_DAY,
    };
    create_session(&state.db, &session)?;

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::days(state.config.session_days));
    Ok(jar.add(cookie))
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, impl IntoResponse), AppError> {
    validate_registration(&req.email, &req.password, &req.username)?;

    let uid = generate_document_id();
    let password_hash = hash_password(&req.password)?;
    let profile = create_user(
        &state.db,
        &uid,
        req.email.trim(),
        req.username.trim(),
        &password_hash,
    )?;
    let jar = start_session(&state, jar, &profile.uid)?;
    info!(uid = %profile.uid, "User registered");

    Ok((
        StatusCode::CREATED,
        jar,
        Json(json!({ "success": true, "user": profile })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    let credentials = get_credentials(&state.db, req.email.trim())?;
    let Some(credentials) = credentials
        .filter(|c| verify_password(&req.password, &c.password_hash))
    else {
        warn!("Failed login attempt");
        return Err(AppError::Auth("Invalid email or password".to_string()));
    };

    let jar = start_session(&state, jar, &credentials.uid)?;
    info!(uid = %credentials.uid, email = %credentials.email, "User logged in");

    Ok((jar, Json(json!({ "success": true, "uid": credentials.uid }))))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        delete_session(&state.db, session_cookie.value())?;
        state.sessions.end(session_cookie.value()).await;
    }
    info!("User logged out");

    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(0));

    Ok((jar.remove(cookie), Json(json!({ "success": true }))))
}

pub async fn get_profile(auth: Auth) -> Result<Json<UserProfile>, AppError> {
    let profile = auth.session.refresh_profile().await?;
    Ok(Json(profile))
}

pub async fn update_profile(
    auth: Auth,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, AppError> {
    for url in [&req.photo_url, &req.background_image].into_iter().flatten() {
        if url.trim().is_empty() {
            return Err(AppError::validation("Please enter a valid image URL"));
        }
    }

    let update = ProfileUpdate {
        photo_url: req.photo_url.map(|u| u.trim().to_string()),
        background_image: req.background_image.map(|u| u.trim().to_string()),
        ..req
    };
    let uid = auth.session.user().uid.clone();
    auth.session
        .store()
        .update_user_profile(&uid, &update)
        .await
        .map_err(|e| e.during("updating profile"))?;
    info!(uid = %uid, "Updated profile");

    let profile = auth.session.refresh_profile().await?;
    Ok(Json(profile))
}

pub async fn toggle_notification(
    auth: Auth,
    Path(channel): Path<NotificationChannel>,
) -> Result<Json<UserProfile>, AppError> {
    let current = auth.session.refresh_profile().await?;
    let update = match channel {
        NotificationChannel::Email => ProfileUpdate {
            email_notifications: Some(!current.notifications.email),
            ..Default::default()
        },
        NotificationChannel::Deadline => ProfileUpdate {
            deadline_notifications: Some(!current.notifications.deadline),
            ..Default::default()
        },
    };
    auth.session
        .store()
        .update_user_profile(&current.uid, &update)
        .await
        .map_err(|e| e.during("updating notification settings"))?;
    info!(uid = %current.uid, %channel, "Toggled notification preference");

    let profile = auth.session.refresh_profile().await?;
    Ok(Json(profile))
}
