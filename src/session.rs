//! Per-login session context.
//!
//! Each session token owns its own [`SessionContext`]; there is no global
//! "current user". The registry publishes sign-in and sign-out events for
//! anyone who needs to follow auth state.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::board_controller::BoardController;
use crate::error::AppError;
use crate::models::{AuthUser, UserProfile};
use crate::notifications::NotificationService;
use crate::store::EntityStore;
use crate::task_service::TaskService;

const AUTH_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { uid: String },
    SignedOut { uid: String },
}

pub struct SessionContext {
    user: AuthUser,
    store: Arc<dyn EntityStore>,
    profile: RwLock<Option<UserProfile>>,
    board: BoardController,
}

impl SessionContext {
    /// Mounts the user's board subscriptions and loads their profile.
    pub async fn start(store: Arc<dyn EntityStore>, user: AuthUser, init_timeout: Duration) -> Self {
        let board = BoardController::mount(store.clone(), user.uid.clone(), init_timeout);
        let context = Self {
            user,
            store,
            profile: RwLock::new(None),
            board,
        };
        if let Err(err) = context.refresh_profile().await {
            warn!(uid = %context.user.uid, error = %err, "Could not load user profile");
        }
        context
    }

    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.read().ok().and_then(|p| p.clone())
    }

    /// Re-reads the profile. On failure the cached profile is kept.
    pub async fn refresh_profile(&self) -> Result<UserProfile, AppError> {
        let profile = self.store.get_user_profile(&self.user.uid).await?;
        if let Ok(mut cached) = self.profile.write() {
            *cached = Some(profile.clone());
        }
        Ok(profile)
    }

    pub fn board(&self) -> &BoardController {
        &self.board
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn tasks(&self) -> TaskService {
        TaskService::new(self.store.clone())
    }

    pub fn notifications(&self) -> NotificationService {
        NotificationService::new(self.store.clone())
    }
}

struct LiveSession {
    context: Arc<SessionContext>,
    expires_at: i64,
}

pub struct SessionRegistry {
    store: Arc<dyn EntityStore>,
    init_timeout: Duration,
    sessions: Mutex<HashMap<String, LiveSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn EntityStore>, init_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            store,
            init_timeout,
            sessions: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn auth_state_changed(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Returns the context for `token`, starting one for `user` if the token
    /// has none yet. `expires_at` (unix millis) is when the sweep may evict it.
    pub async fn resume(&self, token: &str, user: AuthUser, expires_at: i64) -> Arc<SessionContext> {
        if let Some(live) = self.sessions.lock().await.get(token) {
            return live.context.clone();
        }

        let uid = user.uid.clone();
        let started = Arc::new(SessionContext::start(self.store.clone(), user, self.init_timeout).await);

        let mut sessions = self.sessions.lock().await;
        match sessions.entry(token.to_string()) {
            // A concurrent request won the race; ours is dropped and unmounts.
            Entry::Occupied(live) => live.get().context.clone(),
            Entry::Vacant(slot) => {
                slot.insert(LiveSession {
                    context: started.clone(),
                    expires_at,
                });
                info!(uid = %uid, "Session started");
                let _ = self.events.send(AuthEvent::SignedIn { uid });
                started
            }
        }
    }

    pub async fn get(&self, token: &str) -> Option<Arc<SessionContext>> {
        self.sessions
            .lock()
            .await
            .get(token)
            .map(|live| live.context.clone())
    }

    /// Tears down the context for `token`. Its board subscriptions stop once
    /// the last handle to it is dropped.
    pub async fn end(&self, token: &str) -> bool {
        let Some(live) = self.sessions.lock().await.remove(token) else {
            return false;
        };
        self.signed_out(&live.context);
        true
    }

    /// Drops every context whose session expired at or before `now` (unix
    /// millis). Returns how many were evicted.
    pub async fn evict_expired(&self, now: i64) -> usize {
        let expired: Vec<LiveSession> = {
            let mut sessions = self.sessions.lock().await;
            let tokens: Vec<String> = sessions
                .iter()
                .filter(|(_, live)| live.expires_at <= now)
                .map(|(token, _)| token.clone())
                .collect();
            tokens
                .iter()
                .filter_map(|token| sessions.remove(token))
                .collect()
        };
        for live in &expired {
            self.signed_out(&live.context);
        }
        if !expired.is_empty() {
            info!(evicted = expired.len(), "Evicted expired sessions");
        }
        expired.len()
    }

    fn signed_out(&self, context: &SessionContext) {
        let uid = context.user().uid.clone();
        info!(uid = %uid, "Session ended");
        let _ = self.events.send(AuthEvent::SignedOut { uid });
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
