//! Referral ledger + one-time promo rewards.
//!
//! Each referrer accumulates a set of unique referees; crossing the
//! configured threshold mints exactly one promo code, at that transition
//! and never again.

use std::{collections::BTreeSet, sync::Arc};

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    domain::UserId,
    store::{KeyedLocks, StateStore},
    Result,
};

fn ledger_key(referrer: UserId) -> String {
    format!("referral:{referrer}")
}

fn promo_key(owner: UserId) -> String {
    format!("promo:{owner}")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    pub owner: UserId,
    pub code: String,
    /// Unix seconds.
    pub issued_at: i64,
}

pub struct ReferralEngine {
    store: Arc<dyn StateStore>,
    locks: KeyedLocks,
    threshold: usize,
}

impl ReferralEngine {
    pub fn new(store: Arc<dyn StateStore>, threshold: usize) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
            threshold,
        }
    }

    /// Record `referee` as invited by `referrer`.
    ///
    /// Self-referrals and repeat referees change nothing. Returns the
    /// freshly minted promo code when this add is the one that reaches
    /// the threshold; `None` in every other case.
    pub async fn add_referral(
        &self,
        referrer: UserId,
        referee: UserId,
        now: i64,
    ) -> Result<Option<PromoCode>> {
        if referrer == referee {
            return Ok(None);
        }

        let key = ledger_key(referrer);
        let _guard = self.locks.lock(&key).await;

        let mut referees = self.load_ledger(&key).await?;
        if referees.insert(referee.0) {
            self.store
                .set(&key, &serde_json::to_string(&referees)?)
                .await?;
            tracing::info!(
                referrer = %referrer,
                referee = %referee,
                total = referees.len(),
                "referral recorded"
            );
        }

        if referees.len() != self.threshold || self.promo_code(referrer).await?.is_some() {
            return Ok(None);
        }

        let promo = PromoCode {
            owner: referrer,
            code: generate_code(),
            issued_at: now,
        };
        self.store
            .set(&promo_key(referrer), &serde_json::to_string(&promo)?)
            .await?;
        tracing::info!(referrer = %referrer, code = %promo.code, "promo code issued");
        Ok(Some(promo))
    }

    pub async fn promo_code(&self, user: UserId) -> Result<Option<PromoCode>> {
        match self.store.get(&promo_key(user)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn referee_count(&self, referrer: UserId) -> Result<usize> {
        Ok(self.load_ledger(&ledger_key(referrer)).await?.len())
    }

    async fn load_ledger(&self, key: &str) -> Result<BTreeSet<i64>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(BTreeSet::new()),
        }
    }
}

fn generate_code() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("STUDIO-{}", suffix.to_uppercase())
}
