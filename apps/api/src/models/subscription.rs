use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::entitlements::limits::Tier;

/// One row of `user_subscriptions`. Created lazily (tier `free`) on a
/// subscriber's first entitlement check; the tier is changed only by billing
/// events outside this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRow {
    pub user_id: Uuid,
    pub tier: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionRow {
    /// The tier this row grants at `now`.
    ///
    /// An expired `pro` row reads as `free` — recomputed on every access,
    /// never trusting the stored value past its expiry. Unrecognized tier
    /// strings also read as `free`.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> Tier {
        if let Some(expires_at) = self.expires_at {
            if expires_at < now {
                return Tier::Free;
            }
        }
        match self.tier.as_str() {
            "pro" => Tier::Pro,
            _ => Tier::Free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(tier: &str, expires_at: Option<DateTime<Utc>>) -> SubscriptionRow {
        SubscriptionRow {
            user_id: Uuid::new_v4(),
            tier: tier.to_string(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_pro_without_expiry() {
        assert_eq!(row("pro", None).effective_tier(Utc::now()), Tier::Pro);
    }

    #[test]
    fn test_pro_expired_reads_as_free() {
        let now = Utc::now();
        let expired = row("pro", Some(now - Duration::hours(1)));
        assert_eq!(expired.effective_tier(now), Tier::Free);
    }

    #[test]
    fn test_pro_with_future_expiry() {
        let now = Utc::now();
        let active = row("pro", Some(now + Duration::days(30)));
        assert_eq!(active.effective_tier(now), Tier::Pro);
    }

    #[test]
    fn test_unknown_tier_reads_as_free() {
        assert_eq!(row("enterprise", None).effective_tier(Utc::now()), Tier::Free);
    }
}
