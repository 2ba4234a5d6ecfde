use crate::domain::Point;

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Database connection string.
    pub database_url: String,

    /// Base URL of the external driving-directions provider.
    pub routing_base_url: String,

    /// API key for the routing provider. Empty string disables the
    /// live client entirely and forces every call onto its fallback.
    pub routing_api_key: String,

    /// Timeout for a single routing-client call, per §4.3.
    pub routing_timeout_ms: u64,

    /// Base point used for Step 5 stop ordering when a tenant has no
    /// configured restaurant coordinate.
    pub default_base_point: Point,

    // =========================
    // Dispatcher clustering constants (§4.4)
    // =========================
    /// Orders within this distance are always the same stop.
    pub same_address_km: f64,

    /// Groups within this centroid distance may be merged.
    pub cluster_radius_km: f64,

    /// Target group size before splitting.
    pub preferred_per_courier: usize,

    /// Hard ceiling on a batch's order count, including orphan absorption.
    pub max_per_batch: usize,

    // =========================
    // Predictor background refresh
    // =========================
    /// Interval between automatic `refresh_patterns` sweeps across all
    /// tenants. `None` disables the background job (tests call
    /// `refresh_patterns` directly instead).
    pub pattern_refresh_interval_ms: Option<u64>,
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://motodispatch_dev.db".to_string());

        let routing_base_url = std::env::var("ROUTING_BASE_URL")
            .unwrap_or_else(|_| "https://routing.invalid".to_string());

        let routing_api_key = std::env::var("ROUTING_API_KEY").unwrap_or_default();

        let default_base_point = Point {
            lat: std::env::var("DEFAULT_BASE_LAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(-21.2020),
            lng: std::env::var("DEFAULT_BASE_LNG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(-47.8130),
        };

        Self {
            database_url,
            routing_base_url,
            routing_api_key,
            routing_timeout_ms: 10_000,
            default_base_point,

            // Clustering defaults mirror the spec's constants; kept as
            // config fields rather than literals so a deployment can
            // tune them without a recompile.
            same_address_km: 0.05,
            cluster_radius_km: 3.0,
            preferred_per_courier: 4,
            max_per_batch: 6,

            pattern_refresh_interval_ms: Some(6 * 60 * 60 * 1000),
        }
    }
}
