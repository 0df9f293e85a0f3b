//! Entitlement gate — per-subscriber, per-feature access decisions.
//!
//! Decides whether a (subscriber, feature) pair may proceed, based on the
//! effective tier and an append-only daily usage ledger, and records usage
//! after a gated action succeeds. The gate itself has no side effects on a
//! denial beyond reading prior usage.
//!
//! Counting is best-effort: two near-simultaneous checks at `limit - 1` can
//! both be admitted and overshoot the quota by the in-flight race window.
//! That is accepted — the quota is a monetization nudge, not a hard resource
//! limiter — so no locks or transactions guard the read-then-write.

pub mod limits;
pub mod store;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entitlements::limits::{limit_for, Feature, FeatureLimit, Tier};
use crate::entitlements::store::{EntitlementStore, StoreError};

/// Why a check was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenialReason {
    /// Boolean feature not included in the subscriber's tier.
    TierRestricted,
    /// Daily quota for a metered feature is used up.
    QuotaExhausted,
}

/// Outcome of an access check.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub allowed: bool,
    /// Uses left today. `None` for unlimited and boolean features.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    /// The daily quota that applied, when the feature is metered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
}

impl Decision {
    pub fn allow_unmetered() -> Self {
        Decision {
            allowed: true,
            remaining: None,
            limit: None,
            reason: None,
        }
    }

    /// Whether a successful action should consume quota. Unlimited and
    /// boolean grants never touch the ledger.
    pub fn metered(&self) -> bool {
        self.limit.is_some()
    }
}

/// The subscriber's effective tier plus the full limit table, for UI display.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementSnapshot {
    pub tier: Tier,
    pub limits: BTreeMap<&'static str, FeatureLimit>,
}

/// The entitlement gate service. Holds only the persistence port; one value
/// is shared across all requests and carries no per-subscriber state.
#[derive(Clone)]
pub struct EntitlementGate {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementGate {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    /// Day buckets are UTC calendar dates. The ledger stores date-only values,
    /// so truncation must be anchored to one zone to be unambiguous.
    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Resolves the subscriber's effective tier, lazily creating a default
    /// `free` row on first sight.
    async fn effective_tier(&self, user_id: Uuid) -> Result<Tier, StoreError> {
        match self.store.subscription(user_id).await? {
            Some(row) => Ok(row.effective_tier(Utc::now())),
            None => {
                self.store.create_default_subscription(user_id).await?;
                Ok(Tier::Free)
            }
        }
    }

    /// Checks whether `user_id` may use `feature` right now.
    pub async fn check_access(
        &self,
        user_id: Uuid,
        feature: Feature,
    ) -> Result<Decision, StoreError> {
        let tier = self.effective_tier(user_id).await?;

        let limit = match limit_for(tier, feature) {
            FeatureLimit::Disabled => {
                return Ok(Decision {
                    allowed: false,
                    remaining: None,
                    limit: None,
                    reason: Some(DenialReason::TierRestricted),
                })
            }
            FeatureLimit::Enabled | FeatureLimit::Unlimited => {
                return Ok(Decision::allow_unmetered())
            }
            FeatureLimit::Daily(limit) => limit,
        };

        let used = self.store.usage_count(user_id, feature, Self::today()).await?;
        if used >= i64::from(limit) {
            return Ok(Decision {
                allowed: false,
                remaining: Some(0),
                limit: Some(limit),
                reason: Some(DenialReason::QuotaExhausted),
            });
        }

        Ok(Decision {
            allowed: true,
            remaining: Some(limit - used as u32),
            limit: Some(limit),
            reason: None,
        })
    }

    /// Appends one usage event for today. Call at most once per successful
    /// gated action, and only after the downstream call succeeded — a failed
    /// dispatch must not consume quota.
    pub async fn record_usage(&self, user_id: Uuid, feature: Feature) -> Result<(), StoreError> {
        self.store.append_usage(user_id, feature, Self::today()).await
    }

    /// Today's usage count for UI display. Same race caveats as `check_access`.
    pub async fn current_usage(&self, user_id: Uuid, feature: Feature) -> Result<i64, StoreError> {
        self.store.usage_count(user_id, feature, Self::today()).await
    }

    /// Effective tier plus the complete limit table for that tier.
    pub async fn snapshot(&self, user_id: Uuid) -> Result<EntitlementSnapshot, StoreError> {
        let tier = self.effective_tier(user_id).await?;
        let limits = Feature::ALL
            .iter()
            .map(|&f| (f.key(), limit_for(tier, f)))
            .collect();
        Ok(EntitlementSnapshot { tier, limits })
    }
}
