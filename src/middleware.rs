use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use tracing::warn;

use crate::db::{get_auth_user, get_session};
use crate::error::AppError;
use crate::models::now_millis;
use crate::session::SessionContext;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";

/// An authenticated request, carrying the session's context.
pub struct Auth {
    pub token: String,
    pub session: Arc<SessionContext>,
}

impl FromRequestParts<AppState> for Auth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
            warn!("Unauthorized API access attempt");
            return Err(AppError::Unauthorized);
        };

        let session = match get_session(&state.db, &token)? {
            Some(session) if session.expires_at > now_millis() => session,
            Some(_) => {
                state.sessions.end(&token).await;
                warn!("Expired session used");
                return Err(AppError::Unauthorized);
            }
            None => {
                warn!("Unknown session used");
                return Err(AppError::Unauthorized);
            }
        };

        let Some(user) = get_auth_user(&state.db, &session.user_id)? else {
            warn!(user_id = %session.user_id, "Session references a missing user");
            return Err(AppError::Unauthorized);
        };

        let context = state
            .sessions
            .resume(&token, user, session.expires_at)
            .await;
        Ok(Auth {
            token,
            session: context,
        })
    }
}
