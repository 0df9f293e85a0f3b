//! Gated feature handlers.
//!
//! Every AI feature follows the same composition, owned here and not by the
//! gate or the dispatcher: check access → build prompt → dispatch → record
//! usage on success. Usage is recorded only after a successful dispatch, so a
//! failed provider call never consumes quota.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::dispatch::{CompletionRequest, Payload, DEFAULT_MAX_RETRIES};
use crate::entitlements::limits::{limit_for, Feature, FeatureLimit};
use crate::entitlements::{Decision, DenialReason, EntitlementSnapshot};
use crate::errors::AppError;
use crate::features::prompts;
use crate::state::AppState;

/// Runs one gated action end to end.
///
/// Entitlement storage failures fail *open* with a warning: the gate is a
/// monetization control, and a ledger outage must not take the product down.
async fn run_gated(
    state: &AppState,
    user_id: Uuid,
    feature: Feature,
    prompt: String,
) -> Result<Json<Payload>, AppError> {
    let decision = match state.gate.check_access(user_id, feature).await {
        Ok(decision) => decision,
        Err(e) => {
            warn!("Entitlement check failed for {}, failing open: {e}", feature.key());
            Decision::allow_unmetered()
        }
    };

    if !decision.allowed {
        return Err(denial_error(feature, &decision));
    }

    let payload = state
        .dispatcher
        .send(&CompletionRequest::new(prompt), DEFAULT_MAX_RETRIES)
        .await?;

    // Unlimited and boolean grants never touch the ledger.
    if decision.metered() {
        if let Err(e) = state.gate.record_usage(user_id, feature).await {
            warn!("Failed to record usage for {}: {e}", feature.key());
        }
    }

    Ok(Json(payload))
}

fn denial_error(feature: Feature, decision: &Decision) -> AppError {
    match decision.reason {
        Some(DenialReason::TierRestricted) => AppError::ProRequired {
            feature: feature.display_name().to_string(),
        },
        _ => AppError::QuotaExhausted {
            feature: feature.display_name().to_string(),
            limit: decision.limit.unwrap_or(0),
        },
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("'{field}' must not be empty")));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct CareerAnalyzeRequest {
    pub user_id: Uuid,
    pub career_path: String,
}

/// POST /api/v1/career/analyze
pub async fn handle_career_analyze(
    State(state): State<AppState>,
    Json(req): Json<CareerAnalyzeRequest>,
) -> Result<Json<Payload>, AppError> {
    require_non_empty(&req.career_path, "career_path")?;
    let prompt = prompts::career_analysis(req.career_path.trim());
    run_gated(&state, req.user_id, Feature::CareerAnalysis, prompt).await
}

#[derive(Deserialize)]
pub struct ProjectIdeasRequest {
    pub user_id: Uuid,
    pub topic: String,
    pub category: Option<String>,
}

/// POST /api/v1/projects/ideas
pub async fn handle_project_ideas(
    State(state): State<AppState>,
    Json(req): Json<ProjectIdeasRequest>,
) -> Result<Json<Payload>, AppError> {
    require_non_empty(&req.topic, "topic")?;
    let prompt = prompts::project_ideas(req.topic.trim(), req.category.as_deref());
    run_gated(&state, req.user_id, Feature::ProjectIdeas, prompt).await
}

#[derive(Deserialize)]
pub struct JobSearchRequest {
    pub user_id: Uuid,
    pub role: String,
    #[serde(default)]
    pub skills: Vec<String>,
    pub location: Option<String>,
}

/// POST /api/v1/jobs/search
pub async fn handle_job_search(
    State(state): State<AppState>,
    Json(req): Json<JobSearchRequest>,
) -> Result<Json<Payload>, AppError> {
    require_non_empty(&req.role, "role")?;
    let prompt = prompts::job_search(req.role.trim(), &req.skills, req.location.as_deref());
    run_gated(&state, req.user_id, Feature::JobSearch, prompt).await
}

#[derive(Deserialize)]
pub struct AiSearchRequest {
    pub user_id: Uuid,
    pub query: String,
}

/// POST /api/v1/search
pub async fn handle_ai_search(
    State(state): State<AppState>,
    Json(req): Json<AiSearchRequest>,
) -> Result<Json<Payload>, AppError> {
    require_non_empty(&req.query, "query")?;
    let prompt = prompts::ai_search(req.query.trim());
    run_gated(&state, req.user_id, Feature::AiSearch, prompt).await
}

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

/// GET /api/v1/entitlements
/// Effective tier plus the full limit table, for UI display.
pub async fn handle_entitlements(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<EntitlementSnapshot>, AppError> {
    Ok(Json(state.gate.snapshot(params.user_id).await?))
}

#[derive(Deserialize)]
pub struct UsageQuery {
    pub user_id: Uuid,
    pub feature: String,
}

#[derive(Serialize)]
pub struct UsageResponse {
    pub feature: &'static str,
    pub used: i64,
    pub limit: FeatureLimit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

/// GET /api/v1/usage
/// Today's count for one feature. Same race caveats as the gate itself.
pub async fn handle_usage(
    State(state): State<AppState>,
    Query(params): Query<UsageQuery>,
) -> Result<Json<UsageResponse>, AppError> {
    let feature = Feature::from_key(&params.feature)
        .ok_or_else(|| AppError::UnknownFeature(params.feature.clone()))?;

    let snapshot = state.gate.snapshot(params.user_id).await?;
    let used = state.gate.current_usage(params.user_id, feature).await?;

    let limit = limit_for(snapshot.tier, feature);
    let remaining = match limit {
        FeatureLimit::Daily(n) => Some(n.saturating_sub(used as u32)),
        _ => None,
    };

    Ok(Json(UsageResponse {
        feature: feature.key(),
        used,
        limit,
        remaining,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{CompletionBackend, DispatchError, Dispatcher, ProviderReply};
    use crate::entitlements::store::testing::MemoryStore;
    use crate::entitlements::EntitlementGate;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted backend: pops one reply per call, counts calls.
    struct ScriptedBackend {
        replies: Mutex<VecDeque<ProviderReply>>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<ProviderReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn execute(
            &self,
            _request: &CompletionRequest,
        ) -> Result<ProviderReply, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| DispatchError::Transport("stub script exhausted".to_string()))
        }

        fn completion_text(&self, body: &str) -> Option<String> {
            Some(body.to_string())
        }
    }

    fn reply(status: u16, body: &str) -> ProviderReply {
        ProviderReply {
            status,
            retry_after: None,
            body: body.to_string(),
        }
    }

    fn state(store: Arc<MemoryStore>, backend: Arc<ScriptedBackend>) -> AppState {
        AppState {
            gate: EntitlementGate::new(store),
            dispatcher: Dispatcher::new(backend),
        }
    }

    #[tokio::test]
    async fn test_successful_dispatch_consumes_one_usage_row() {
        let store = Arc::new(MemoryStore::default());
        let backend = ScriptedBackend::new(vec![reply(200, "{\"a\":1}")]);
        let state = state(store.clone(), backend);
        let user = Uuid::new_v4();

        let Json(payload) = run_gated(
            &state,
            user,
            Feature::CareerAnalysis,
            "prompt".to_string(),
        )
        .await
        .unwrap();

        assert_eq!(payload, json!({"a": 1}));
        assert_eq!(store.usage_rows(), 1);
    }

    #[tokio::test]
    async fn test_failed_dispatch_never_consumes_quota() {
        let user = Uuid::new_v4();

        for status in [402, 500] {
            let store = Arc::new(MemoryStore::default());
            let backend = ScriptedBackend::new(vec![reply(status, "")]);
            let state = state(store.clone(), backend);

            let result = run_gated(
                &state,
                user,
                Feature::CareerAnalysis,
                "prompt".to_string(),
            )
            .await;

            assert!(matches!(result, Err(AppError::Dispatch(_))));
            assert_eq!(store.usage_rows(), 0, "status {status} wrote to the ledger");
        }
    }

    #[tokio::test]
    async fn test_unlimited_tier_never_touches_the_ledger() {
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryStore::with_tier(user, "pro", None));
        let backend = ScriptedBackend::new(vec![reply(200, "{\"a\":1}")]);
        let state = state(store.clone(), backend);

        run_gated(&state, user, Feature::CareerAnalysis, "prompt".to_string())
            .await
            .unwrap();

        assert_eq!(store.usage_rows(), 0);
    }

    #[tokio::test]
    async fn test_denied_request_never_reaches_the_provider() {
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryStore::default());
        store.push_usage(user, Feature::CareerAnalysis, Utc::now().date_naive(), 3);
        let backend = ScriptedBackend::new(vec![]);
        let state = state(store.clone(), backend.clone());

        let result = run_gated(
            &state,
            user,
            Feature::CareerAnalysis,
            "prompt".to_string(),
        )
        .await;

        assert!(matches!(result, Err(AppError::QuotaExhausted { limit: 3, .. })));
        assert_eq!(backend.calls(), 0);
        assert_eq!(store.usage_rows(), 3);
    }

    #[tokio::test]
    async fn test_tier_restricted_maps_to_pro_required() {
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryStore::default());
        let backend = ScriptedBackend::new(vec![]);
        let state = state(store, backend.clone());

        let result = run_gated(&state, user, Feature::Export, "prompt".to_string()).await;

        assert!(matches!(result, Err(AppError::ProRequired { .. })));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_storage_outage_fails_open() {
        let user = Uuid::new_v4();
        let store = Arc::new(MemoryStore::default());
        store.fail.store(true, Ordering::SeqCst);
        let backend = ScriptedBackend::new(vec![reply(200, "{\"a\":1}")]);
        let state = state(store.clone(), backend.clone());

        // The entitlement check errors and the gate fails open; the request
        // is still served. The fail-open grant is unmetered, so no ledger
        // write is attempted against the broken store.
        let Json(payload) = run_gated(
            &state,
            user,
            Feature::CareerAnalysis,
            "prompt".to_string(),
        )
        .await
        .unwrap();

        assert_eq!(payload, json!({"a": 1}));
        assert_eq!(backend.calls(), 1);
        assert_eq!(store.usage_rows(), 0);
    }
}
