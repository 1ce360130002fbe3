//! Fixed-window inbound rate limiter.
//!
//! Admission control only: checked by the router before any session
//! registry mutation, never inspects message content.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    domain::UserId,
    store::{KeyedLocks, StateStore},
    Result,
};

fn window_key(user: UserId) -> String {
    format!("rate:{user}")
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct Window {
    /// Unix seconds.
    started_at: i64,
    count: u32,
}

pub struct RateLimiter {
    store: Arc<dyn StateStore>,
    locks: KeyedLocks,
    max_messages: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn StateStore>, max_messages: u32, window: Duration) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
            max_messages,
            window,
        }
    }

    pub async fn admit(&self, user: UserId) -> Result<bool> {
        self.admit_at(user, chrono::Utc::now().timestamp()).await
    }

    /// Admission check with an injectable clock.
    ///
    /// A fresh or elapsed window resets the count to 1 and admits; below
    /// the ceiling the count increments and admits; at the ceiling the
    /// message is rejected without further mutation, so the N-th message
    /// inside a window is the last one admitted.
    pub async fn admit_at(&self, user: UserId, now: i64) -> Result<bool> {
        let key = window_key(user);
        let _guard = self.locks.lock(&key).await;

        let window = match self.load(&key).await? {
            Some(w) if now - w.started_at <= self.window.as_secs() as i64 => w,
            _ => {
                self.save(&key, Window {
                    started_at: now,
                    count: 1,
                })
                .await?;
                return Ok(true);
            }
        };

        if window.count < self.max_messages {
            self.save(&key, Window {
                count: window.count + 1,
                ..window
            })
            .await?;
            return Ok(true);
        }

        tracing::warn!(user = %user, count = window.count, "rate limit hit");
        Ok(false)
    }

    /// Time until the user's current window elapses. Zero when no window
    /// is open.
    pub async fn retry_after(&self, user: UserId, now: i64) -> Result<Duration> {
        let Some(window) = self.load(&window_key(user)).await? else {
            return Ok(Duration::ZERO);
        };
        let window_end = window.started_at + self.window.as_secs() as i64;
        Ok(Duration::from_secs(window_end.saturating_sub(now).max(0) as u64))
    }

    async fn load(&self, key: &str) -> Result<Option<Window>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, window: Window) -> Result<()> {
        self.store
            .set(key, &serde_json::to_string(&window)?)
            .await?;
        // Housekeeping only — admission decisions come from the stored
        // timestamp, the TTL just lets stale windows age out of the store.
        self.store
            .expire_after(key, self.window.saturating_mul(2))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter(max: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryStore::new()),
            max,
            Duration::from_secs(window_secs),
        )
    }

    const U: UserId = UserId(7);

    #[tokio::test]
    async fn ceiling_is_the_last_admitted_message() {
        let rl = limiter(5, 60);

        for i in 0..5 {
            assert!(rl.admit_at(U, i).await.unwrap(), "message {i} within ceiling");
        }
        assert!(!rl.admit_at(U, 5).await.unwrap(), "6th message rejected");
        // Rejection mutates nothing: still rejected on retry.
        assert!(!rl.admit_at(U, 6).await.unwrap());
    }

    #[tokio::test]
    async fn window_elapse_resets_the_count() {
        let rl = limiter(5, 60);

        for i in 0..5 {
            assert!(rl.admit_at(U, i).await.unwrap());
        }
        assert!(!rl.admit_at(U, 30).await.unwrap());

        // Exactly at the window edge the old window still applies.
        assert!(!rl.admit_at(U, 60).await.unwrap());
        // Strictly past it, counting starts over.
        assert!(rl.admit_at(U, 61).await.unwrap());
        assert!(rl.admit_at(U, 62).await.unwrap());
    }

    #[tokio::test]
    async fn users_are_limited_independently() {
        let rl = limiter(1, 60);
        assert!(rl.admit_at(UserId(1), 0).await.unwrap());
        assert!(!rl.admit_at(UserId(1), 1).await.unwrap());
        assert!(rl.admit_at(UserId(2), 1).await.unwrap());
    }

    #[tokio::test]
    async fn retry_after_reports_the_window_remainder() {
        let rl = limiter(1, 60);
        assert_eq!(rl.retry_after(U, 0).await.unwrap(), Duration::ZERO);

        rl.admit_at(U, 10).await.unwrap();
        assert_eq!(rl.retry_after(U, 30).await.unwrap(), Duration::from_secs(40));
        assert_eq!(rl.retry_after(U, 200).await.unwrap(), Duration::ZERO);
    }
}
