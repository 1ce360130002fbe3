//! Mass broadcast with delivery accounting.
//!
//! Partial failure is the steady state here: a blocked or vanished
//! recipient increments `failed` and the loop keeps going.

use std::{sync::Arc, time::Duration};

use crate::{
    domain::UserId, formatting, messaging::port::Transport, users::UserDirectory, Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
    pub total: usize,
}

pub struct BroadcastDispatcher {
    users: Arc<UserDirectory>,
    transport: Arc<dyn Transport>,
    admin: UserId,
    /// Pause after every this-many sends; 0 disables pacing.
    pause_every: usize,
    pause: Duration,
}

impl BroadcastDispatcher {
    pub fn new(
        users: Arc<UserDirectory>,
        transport: Arc<dyn Transport>,
        admin: UserId,
        pause_every: usize,
        pause: Duration,
    ) -> Self {
        Self {
            users,
            transport,
            admin,
            pause_every,
            pause,
        }
    }

    /// Send `text` to every known user except the admin.
    ///
    /// The recipient list is snapshotted up front, so no registry or
    /// directory state is held while sends are in flight. Errs only on a
    /// store failure; per-recipient delivery failures are accounted, not
    /// propagated.
    pub async fn broadcast(&self, text: &str) -> Result<BroadcastReport> {
        let recipients = self.users.all_except(self.admin).await?;
        let body = formatting::tag_broadcast(text);

        let mut report = BroadcastReport {
            total: recipients.len(),
            ..BroadcastReport::default()
        };

        for (i, user) in recipients.iter().enumerate() {
            if self.pause_every > 0 && i > 0 && i % self.pause_every == 0 {
                tokio::time::sleep(self.pause).await;
            }

            match self.transport.send(user.id, &body).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(recipient = %user.id, error = %e, "broadcast delivery failed");
                }
            }
        }

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            total = report.total,
            "broadcast finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::port::TransportError;
    use crate::store::{MemoryStore, StateStore};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use tokio::sync::Mutex;

    const ADMIN: UserId = UserId(1);

    #[derive(Default)]
    struct FakeTransport {
        sent_to: Mutex<Vec<UserId>>,
        unreachable: Mutex<HashSet<i64>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(
            &self,
            recipient: UserId,
            _text: &str,
        ) -> std::result::Result<(), TransportError> {
            if self.unreachable.lock().await.contains(&recipient.0) {
                return Err(TransportError::Unreachable {
                    recipient,
                    reason: "bot was blocked".to_string(),
                });
            }
            self.sent_to.lock().await.push(recipient);
            Ok(())
        }
    }

    async fn directory_with_users(n: i64) -> Arc<UserDirectory> {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let users = Arc::new(UserDirectory::new(store));
        users.save_contact(ADMIN, "Admin", None, 0).await.unwrap();
        for i in 0..n {
            users
                .save_contact(UserId(100 + i), &format!("user{i}"), None, i)
                .await
                .unwrap();
        }
        users
    }

    #[tokio::test]
    async fn accounting_adds_up_with_a_failure_subset() {
        let users = directory_with_users(6).await;
        let transport = Arc::new(FakeTransport::default());
        {
            let mut unreachable = transport.unreachable.lock().await;
            unreachable.insert(101);
            unreachable.insert(104);
        }

        let dispatcher =
            BroadcastDispatcher::new(users, transport.clone(), ADMIN, 0, Duration::ZERO);
        let report = dispatcher.broadcast("studio news").await.unwrap();

        assert_eq!(report.total, 6);
        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 4);
        assert_eq!(report.delivered + report.failed, report.total);

        // The loop never aborted: everyone reachable got the message.
        let sent = transport.sent_to.lock().await;
        assert_eq!(sent.len(), 4);
        assert!(!sent.contains(&ADMIN));
    }

    #[tokio::test]
    async fn empty_directory_reports_zeroes() {
        let users = directory_with_users(0).await;
        let dispatcher = BroadcastDispatcher::new(
            users,
            Arc::new(FakeTransport::default()),
            ADMIN,
            0,
            Duration::ZERO,
        );

        let report = dispatcher.broadcast("anyone?").await.unwrap();
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn pacing_does_not_change_accounting() {
        let users = directory_with_users(5).await;
        let transport = Arc::new(FakeTransport::default());
        let dispatcher = BroadcastDispatcher::new(
            users,
            transport.clone(),
            ADMIN,
            2,
            Duration::from_millis(1),
        );

        let report = dispatcher.broadcast("paced").await.unwrap();
        assert_eq!(report.delivered, 5);
        assert_eq!(report.failed, 0);
        assert_eq!(report.total, 5);
    }
}
