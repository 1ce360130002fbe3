use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{domain::UserId, session::SessionRegistry, users::UserDirectory, Result};

/// Point-in-time operational numbers for the admin panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_users: usize,
    pub active_dialogs: usize,
    pub total_dialogs: i64,
    pub total_messages: i64,
    pub uptime: Duration,
}

pub struct StatsCollector {
    users: Arc<UserDirectory>,
    registry: Arc<SessionRegistry>,
    admin: UserId,
    started_at: Instant,
}

impl StatsCollector {
    pub fn new(users: Arc<UserDirectory>, registry: Arc<SessionRegistry>, admin: UserId) -> Self {
        Self {
            users,
            registry,
            admin,
            started_at: Instant::now(),
        }
    }

    pub async fn snapshot(&self) -> Result<StatsSnapshot> {
        Ok(StatsSnapshot {
            total_users: self.users.count_except(self.admin).await?,
            active_dialogs: self.registry.active_sessions().await?.len(),
            total_dialogs: self.registry.total_dialogs().await?,
            total_messages: self.registry.total_messages().await?,
            uptime: self.started_at.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn snapshot_reflects_directory_and_registry() {
        let store = Arc::new(MemoryStore::new());
        let users = Arc::new(UserDirectory::new(store.clone()));
        let registry = Arc::new(SessionRegistry::new(store));
        let admin = UserId(1);

        users.save_contact(admin, "Admin", None, 10).await.unwrap();
        users.save_contact(UserId(2), "A", None, 11).await.unwrap();
        users.save_contact(UserId(3), "B", None, 12).await.unwrap();

        registry.start_dialog(UserId(2), admin, 20).await.unwrap();
        registry.start_dialog(UserId(3), admin, 21).await.unwrap();
        registry.record_message(UserId(2), false).await.unwrap();
        registry.end_dialog(UserId(3), 30).await.unwrap();

        let stats = StatsCollector::new(users, registry, admin)
            .snapshot()
            .await
            .unwrap();

        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_dialogs, 1);
        assert_eq!(stats.total_dialogs, 2);
        assert_eq!(stats.total_messages, 1);
    }
}
