use crate::dispatch::Dispatcher;
use crate::entitlements::EntitlementGate;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Entitlement gate over the Postgres-backed subscription + usage ledger.
    pub gate: EntitlementGate,
    /// Retry-wrapped completion dispatcher over the Gemini backend.
    pub dispatcher: Dispatcher,
}
