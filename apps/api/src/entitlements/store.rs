//! Persistence port for the entitlement gate.
//!
//! The gate talks to storage through `EntitlementStore` so the decision logic
//! can be tested against an in-memory fake (the `FitScorer`-style seam:
//! `Arc<dyn EntitlementStore>` carried in the gate, swapped at construction).
//!
//! The usage ledger is append-only. Rows are never updated or deleted; the
//! daily count *is* the row count for (user, feature, day). Concurrent writers
//! need no coordination because no read-modify-write is involved.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::entitlements::limits::Feature;
use crate::models::subscription::SubscriptionRow;

/// Storage-layer failure. Deliberately opaque: the gate surfaces it unchanged
/// and the calling handler decides the fail-open/fail-closed policy.
#[derive(Debug, Error)]
#[error("entitlement storage error: {0}")]
pub struct StoreError(pub String);

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError(e.to_string())
    }
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Point lookup of a subscriber's tier row.
    async fn subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionRow>, StoreError>;

    /// Inserts a default `free` row for a subscriber seen for the first time.
    /// Must tolerate a concurrent insert of the same row.
    async fn create_default_subscription(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// Counts ledger rows for (user, feature, day).
    async fn usage_count(
        &self,
        user_id: Uuid,
        feature: Feature,
        day: NaiveDate,
    ) -> Result<i64, StoreError>;

    /// Appends one ledger row. Not idempotent by design: every successful
    /// gated action writes exactly one row.
    async fn append_usage(
        &self,
        user_id: Uuid,
        feature: Feature,
        day: NaiveDate,
    ) -> Result<(), StoreError>;
}

/// PostgreSQL-backed store over `user_subscriptions` and `usage_tracking`.
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionRow>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT user_id, tier, expires_at, created_at
             FROM user_subscriptions
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_default_subscription(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_subscriptions (user_id, tier)
             VALUES ($1, 'free')
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn usage_count(
        &self,
        user_id: Uuid,
        feature: Feature,
        day: NaiveDate,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage_tracking
             WHERE user_id = $1 AND feature = $2 AND day = $3",
        )
        .bind(user_id)
        .bind(feature.key())
        .bind(day)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn append_usage(
        &self,
        user_id: Uuid,
        feature: Feature,
        day: NaiveDate,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO usage_tracking (user_id, feature, day)
             VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(feature.key())
        .bind(day)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
