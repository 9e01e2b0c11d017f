//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Per-client-IP limits on the prediction service via tower_governor. Off by
//! default; enabled with `RATE_LIMIT_ENABLED`.

use governor::middleware::StateInformationMiddleware;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

use crate::config::ServiceConfig;

/// Governor config keyed on peer IP, with X-RateLimit-* headers
pub type PeerGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request of quota
    pub replenish_secs: u64,
    /// Burst size (max requests that can be made immediately)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            replenish_secs: 1,
            burst_size: 10,
        }
    }
}

impl RateLimitConfig {
    /// Limits from the service configuration, or `None` when disabled
    pub fn from_service(config: &ServiceConfig) -> Option<Self> {
        config.rate_limit_enabled.then(|| Self {
            replenish_secs: config.rate_limit_replenish_secs,
            burst_size: config.rate_limit_burst,
        })
    }
}

/// Build the governor config for `GovernorLayer`.
///
/// Returns `None` for a zero period or zero burst. Peer IPs are only visible
/// when the app is served with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<PeerGovernorConfig>> {
    GovernorConfigBuilder::default()
        .per_second(config.replenish_secs)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}
