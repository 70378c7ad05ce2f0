// ============================
// relay-lib/src/lib.rs
// ============================
//! Core functionality for the BugTrail realtime relay: authenticated
//! WebSocket connections grouped into per-project rooms with best-effort
//! event fan-out.

pub mod auth;
pub mod config;
pub mod error;
pub mod membership;
pub mod metrics;
pub mod middleware;
pub mod registry;
pub mod router;
pub mod session;
pub mod ws_router;

use crate::auth::TokenVerifier;
use crate::config::Settings;
use crate::membership::MembershipStore;
use crate::metrics::RelayMetrics;
use crate::middleware::RateLimitEntry;
use crate::registry::RoomRegistry;
use crate::router::EventRouter;
use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Application state shared across all handlers.
///
/// Constructed once at process start; every session receives the same
/// registry, router, and metrics through this state; no ambient globals.
pub struct AppState {
    /// Settings
    pub settings: Arc<Settings>,
    /// Credential verifier
    pub verifier: Arc<TokenVerifier>,
    /// Project-membership source
    pub memberships: Arc<dyn MembershipStore>,
    /// Room membership registry
    pub registry: Arc<RoomRegistry>,
    /// Inbound event router
    pub router: Arc<EventRouter>,
    /// Connection/message metrics
    pub metrics: Arc<RelayMetrics>,
    /// Renders the `/metrics` endpoint
    pub prometheus: PrometheusHandle,
    /// Fixed-window rate limit state per client IP
    pub rate_limits: Arc<DashMap<String, RateLimitEntry>>,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        settings: Settings,
        memberships: Arc<dyn MembershipStore>,
        prometheus: PrometheusHandle,
    ) -> Self {
        let verifier = Arc::new(TokenVerifier::new(&settings.auth));
        let registry = Arc::new(RoomRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());
        let router = Arc::new(EventRouter::new(registry.clone(), metrics.clone()));

        Self {
            settings: Arc::new(settings),
            verifier,
            memberships,
            registry,
            router,
            metrics,
            prometheus,
            rate_limits: Arc::new(DashMap::new()),
        }
    }
}
