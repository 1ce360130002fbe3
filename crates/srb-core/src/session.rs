//! Session registry: source of truth for per-user dialog state and the
//! admin's current focus.
//!
//! All mutations go through the state store behind a per-user lock, so
//! concurrent deliveries for the same user serialize and `start_dialog`
//! stays idempotent under races.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{SessionId, UserId},
    store::{KeyedLocks, StateStore},
    Error, Result,
};

const SESSION_PREFIX: &str = "session:";
const DIALOGS_TOTAL_KEY: &str = "stats:dialogs_total";
const MESSAGES_TOTAL_KEY: &str = "stats:messages_total";

fn session_key(user: UserId) -> String {
    format!("{SESSION_PREFIX}{user}")
}

fn user_state_key(user: UserId) -> String {
    format!("state:user:{user}")
}

fn admin_state_key(admin: UserId) -> String {
    format!("state:admin:{admin}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Ended,
}

/// A bounded conversation between one user and the admin. Ended sessions
/// stay in the store as soft history; at most one `Active` session exists
/// per user at any time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogSession {
    pub id: SessionId,
    pub user: UserId,
    pub admin: UserId,
    /// Unix seconds.
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub message_count: u64,
    pub status: SessionStatus,
}

/// Per-user conversational state: Idle ⇄ InDialog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserState {
    #[default]
    Idle,
    InDialog,
}

/// The admin's single control register. `InDialogWith` doubles as the
/// focus: the one user the admin's free text is currently routed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminState {
    #[default]
    Idle,
    InDialogWith(UserId),
    Broadcasting,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartOutcome {
    pub session: SessionId,
    /// False when an active session already existed and was returned as-is.
    pub created: bool,
}

pub struct SessionRegistry {
    store: Arc<dyn StateStore>,
    locks: KeyedLocks,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
        }
    }

    /// Open a dialog for `user`, or return the already-active one.
    ///
    /// Idempotent: racing callers all observe the same session id, and the
    /// total-dialogs counter moves only on actual creation.
    pub async fn start_dialog(&self, user: UserId, admin: UserId, now: i64) -> Result<StartOutcome> {
        let key = session_key(user);
        let _guard = self.locks.lock(&key).await;

        if let Some(existing) = self.load_session(&key).await? {
            if existing.status == SessionStatus::Active {
                return Ok(StartOutcome {
                    session: existing.id,
                    created: false,
                });
            }
        }

        let session = DialogSession {
            id: SessionId(Uuid::new_v4().to_string()),
            user,
            admin,
            started_at: now,
            ended_at: None,
            message_count: 0,
            status: SessionStatus::Active,
        };
        self.store
            .set(&key, &serde_json::to_string(&session)?)
            .await?;
        self.set_user_state(user, UserState::InDialog).await?;
        self.store.increment(DIALOGS_TOTAL_KEY).await?;

        tracing::info!(user = %user, session = %session.id, "dialog started");
        Ok(StartOutcome {
            session: session.id,
            created: true,
        })
    }

    /// Close the user's active dialog, clearing the admin focus when it
    /// pointed at this user. A no-op when nothing is active.
    pub async fn end_dialog(&self, user: UserId, now: i64) -> Result<Option<DialogSession>> {
        let key = session_key(user);
        let _guard = self.locks.lock(&key).await;

        let Some(mut session) = self.load_session(&key).await? else {
            return Ok(None);
        };
        if session.status != SessionStatus::Active {
            return Ok(None);
        }

        session.status = SessionStatus::Ended;
        session.ended_at = Some(now);
        self.store
            .set(&key, &serde_json::to_string(&session)?)
            .await?;
        self.set_user_state(user, UserState::Idle).await?;

        if self.admin_state(session.admin).await? == AdminState::InDialogWith(user) {
            self.set_admin_state(session.admin, AdminState::Idle).await?;
        }

        tracing::info!(user = %user, session = %session.id, "dialog ended");
        Ok(Some(session))
    }

    pub async fn active_session(&self, user: UserId) -> Result<Option<DialogSession>> {
        Ok(self
            .load_session(&session_key(user)).await?
            .filter(|s| s.status == SessionStatus::Active))
    }

    /// Count a routed message against the user's active session.
    pub async fn record_message(&self, user: UserId, from_admin: bool) -> Result<u64> {
        let key = session_key(user);
        let _guard = self.locks.lock(&key).await;

        let Some(mut session) = self
            .load_session(&key).await?
            .filter(|s| s.status == SessionStatus::Active)
        else {
            return Err(Error::NoActiveSession);
        };

        session.message_count += 1;
        self.store
            .set(&key, &serde_json::to_string(&session)?)
            .await?;
        self.store.increment(MESSAGES_TOTAL_KEY).await?;

        tracing::debug!(user = %user, from_admin, count = session.message_count, "message recorded");
        Ok(session.message_count)
    }

    /// Point the admin at `user`. Requires an active session for `user`.
    pub async fn set_admin_focus(&self, admin: UserId, user: UserId) -> Result<()> {
        let key = session_key(user);
        let _guard = self.locks.lock(&key).await;

        let active = self
            .load_session(&key).await?
            .is_some_and(|s| s.status == SessionStatus::Active);
        if !active {
            return Err(Error::NoActiveSession);
        }

        self.set_admin_state(admin, AdminState::InDialogWith(user)).await
    }

    pub async fn admin_focus(&self, admin: UserId) -> Result<Option<UserId>> {
        Ok(match self.admin_state(admin).await? {
            AdminState::InDialogWith(user) => Some(user),
            _ => None,
        })
    }

    pub async fn admin_state(&self, admin: UserId) -> Result<AdminState> {
        match self.store.get(&admin_state_key(admin)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(AdminState::default()),
        }
    }

    pub async fn set_admin_state(&self, admin: UserId, state: AdminState) -> Result<()> {
        self.store
            .set(&admin_state_key(admin), &serde_json::to_string(&state)?)
            .await
    }

    pub async fn user_state(&self, user: UserId) -> Result<UserState> {
        match self.store.get(&user_state_key(user)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(UserState::default()),
        }
    }

    async fn set_user_state(&self, user: UserId, state: UserState) -> Result<()> {
        self.store
            .set(&user_state_key(user), &serde_json::to_string(&state)?)
            .await
    }

    /// All currently active sessions, most recently started first.
    pub async fn active_sessions(&self) -> Result<Vec<DialogSession>> {
        let mut sessions = Vec::new();
        for key in self.store.scan_by_prefix(SESSION_PREFIX).await? {
            if let Some(session) = self.load_session(&key).await? {
                if session.status == SessionStatus::Active {
                    sessions.push(session);
                }
            }
        }
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    pub async fn total_dialogs(&self) -> Result<i64> {
        self.read_counter(DIALOGS_TOTAL_KEY).await
    }

    pub async fn total_messages(&self) -> Result<i64> {
        self.read_counter(MESSAGES_TOTAL_KEY).await
    }

    async fn read_counter(&self, key: &str) -> Result<i64> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0))
    }

    async fn load_session(&self, key: &str) -> Result<Option<DialogSession>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const ADMIN: UserId = UserId(1);
    const USER: UserId = UserId(42);

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let reg = registry();
        let first = reg.start_dialog(USER, ADMIN, 10).await.unwrap();
        let second = reg.start_dialog(USER, ADMIN, 20).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.session, second.session);
        assert_eq!(reg.total_dialogs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_starts_yield_one_session() {
        let reg = registry();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                reg.start_dialog(USER, ADMIN, 10).await.unwrap().session
            }));
        }

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "all racers must observe the same session id");
        assert_eq!(reg.total_dialogs().await.unwrap(), 1);
        assert_eq!(reg.active_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn end_dialog_clears_matching_admin_focus() {
        let reg = registry();
        reg.start_dialog(USER, ADMIN, 10).await.unwrap();
        reg.set_admin_focus(ADMIN, USER).await.unwrap();
        assert_eq!(reg.admin_focus(ADMIN).await.unwrap(), Some(USER));

        reg.end_dialog(USER, 20).await.unwrap();
        assert_eq!(reg.admin_focus(ADMIN).await.unwrap(), None);
        assert_eq!(reg.user_state(USER).await.unwrap(), UserState::Idle);
    }

    #[tokio::test]
    async fn ending_someone_else_keeps_focus() {
        let reg = registry();
        let other = UserId(43);
        reg.start_dialog(USER, ADMIN, 10).await.unwrap();
        reg.start_dialog(other, ADMIN, 11).await.unwrap();
        reg.set_admin_focus(ADMIN, USER).await.unwrap();

        reg.end_dialog(other, 20).await.unwrap();
        assert_eq!(reg.admin_focus(ADMIN).await.unwrap(), Some(USER));
    }

    #[tokio::test]
    async fn double_end_is_a_noop() {
        let reg = registry();
        reg.start_dialog(USER, ADMIN, 10).await.unwrap();

        let first = reg.end_dialog(USER, 20).await.unwrap();
        assert!(first.is_some());
        let second = reg.end_dialog(USER, 21).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn restart_after_end_creates_a_new_session() {
        let reg = registry();
        let first = reg.start_dialog(USER, ADMIN, 10).await.unwrap();
        reg.end_dialog(USER, 20).await.unwrap();
        let second = reg.start_dialog(USER, ADMIN, 30).await.unwrap();

        assert!(second.created);
        assert_ne!(first.session, second.session);
        assert_eq!(reg.total_dialogs().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn record_message_requires_an_active_session() {
        let reg = registry();
        let err = reg.record_message(USER, false).await.unwrap_err();
        assert!(matches!(err, Error::NoActiveSession));

        reg.start_dialog(USER, ADMIN, 10).await.unwrap();
        assert_eq!(reg.record_message(USER, false).await.unwrap(), 1);
        assert_eq!(reg.record_message(USER, true).await.unwrap(), 2);
        assert_eq!(reg.total_messages().await.unwrap(), 2);

        let session = reg.active_session(USER).await.unwrap().unwrap();
        assert_eq!(session.message_count, 2);
    }

    #[tokio::test]
    async fn focus_requires_an_active_session() {
        let reg = registry();
        let err = reg.set_admin_focus(ADMIN, USER).await.unwrap_err();
        assert!(matches!(err, Error::NoActiveSession));
    }

    #[tokio::test]
    async fn broadcasting_state_roundtrips() {
        let reg = registry();
        assert_eq!(reg.admin_state(ADMIN).await.unwrap(), AdminState::Idle);

        reg.set_admin_state(ADMIN, AdminState::Broadcasting).await.unwrap();
        assert_eq!(reg.admin_state(ADMIN).await.unwrap(), AdminState::Broadcasting);
        // Broadcasting is not a focus.
        assert_eq!(reg.admin_focus(ADMIN).await.unwrap(), None);
    }
}
