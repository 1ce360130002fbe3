use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    domain::UserId,
    store::{KeyedLocks, StateStore},
    Result,
};

const KEY_PREFIX: &str = "user:";

fn user_key(id: UserId) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// A known user. Created on first contact, updated on every inbound
/// message, never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub display_name: String,
    pub handle: Option<String>,
    /// Unix seconds.
    pub first_seen_at: i64,
    /// Unix seconds.
    pub last_activity_at: i64,
    pub total_messages: u64,
}

/// Directory of everyone the bot has ever heard from.
pub struct UserDirectory {
    store: Arc<dyn StateStore>,
    locks: KeyedLocks,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
        }
    }

    /// Save or update a user from an inbound contact.
    pub async fn save_contact(
        &self,
        id: UserId,
        display_name: &str,
        handle: Option<&str>,
        now: i64,
    ) -> Result<UserRecord> {
        let key = user_key(id);
        let _guard = self.locks.lock(&key).await;

        let record = match self.load(&key).await? {
            Some(mut existing) => {
                existing.display_name = display_name.to_string();
                existing.handle = handle.map(|h| h.to_string());
                existing.last_activity_at = now;
                existing.total_messages += 1;
                existing
            }
            None => {
                tracing::info!(user = %id, name = display_name, "new user registered");
                UserRecord {
                    id,
                    display_name: display_name.to_string(),
                    handle: handle.map(|h| h.to_string()),
                    first_seen_at: now,
                    last_activity_at: now,
                    total_messages: 1,
                }
            }
        };

        self.store
            .set(&key, &serde_json::to_string(&record)?)
            .await?;
        Ok(record)
    }

    pub async fn get(&self, id: UserId) -> Result<Option<UserRecord>> {
        self.load(&user_key(id)).await
    }

    /// All known users except `excluded` (the admin), most recently active
    /// first.
    pub async fn all_except(&self, excluded: UserId) -> Result<Vec<UserRecord>> {
        let mut users = Vec::new();
        for key in self.store.scan_by_prefix(KEY_PREFIX).await? {
            if let Some(record) = self.load(&key).await? {
                if record.id != excluded {
                    users.push(record);
                }
            }
        }
        users.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(users)
    }

    pub async fn count_except(&self, excluded: UserId) -> Result<usize> {
        Ok(self.all_except(excluded).await?.len())
    }

    async fn load(&self, key: &str) -> Result<Option<UserRecord>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
