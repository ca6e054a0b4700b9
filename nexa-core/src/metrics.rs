//! Prometheus metrics for the playback core.
//!
//! All metrics register against one registry exposed via the /metrics
//! endpoint for scraping.

use prometheus::{Encoder, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Playback session metrics
pub mod playback {
    use super::REGISTRY;
    use prometheus::{
        register_int_counter_vec_with_registry, register_int_counter_with_registry,
        register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Opts,
    };

    /// Live (unexpired, unended) playback sessions.
    pub static SESSIONS_ACTIVE: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "playback_sessions_active",
            "Number of live playback sessions",
            REGISTRY.clone()
        )
        .expect("Failed to register SESSIONS_ACTIVE")
    });

    /// Total sessions started.
    pub static SESSIONS_STARTED_TOTAL: std::sync::LazyLock<IntCounter> =
        std::sync::LazyLock::new(|| {
            register_int_counter_with_registry!(
                "playback_sessions_started_total",
                "Total playback sessions started",
                REGISTRY.clone()
            )
            .expect("Failed to register SESSIONS_STARTED_TOTAL")
        });

    /// Stream plans produced, labeled by play method.
    pub static PLANS_TOTAL: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            Opts::new("playback_plans_total", "Stream plans produced"),
            &["method"],
            REGISTRY.clone()
        )
        .expect("Failed to register PLANS_TOTAL")
    });
}

/// Transcode manager metrics
pub mod transcode {
    use super::REGISTRY;
    use prometheus::{
        register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter,
        IntGauge,
    };

    /// Jobs currently held by the manager (any state).
    pub static JOBS_ACTIVE: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "transcode_jobs_active",
            "Transcode jobs currently cached by the manager",
            REGISTRY.clone()
        )
        .expect("Failed to register JOBS_ACTIVE")
    });

    /// Worker restarts triggered by the smart-segment policy or seeks.
    pub static WORKER_RESTARTS_TOTAL: std::sync::LazyLock<IntCounter> =
        std::sync::LazyLock::new(|| {
            register_int_counter_with_registry!(
                "transcode_worker_restarts_total",
                "Encoder worker restarts",
                REGISTRY.clone()
            )
            .expect("Failed to register WORKER_RESTARTS_TOTAL")
        });

    /// Segment requests that had to wait for the encoder.
    pub static SEGMENT_WAITS_TOTAL: std::sync::LazyLock<IntCounter> =
        std::sync::LazyLock::new(|| {
            register_int_counter_with_registry!(
                "transcode_segment_waits_total",
                "Segment requests that waited for the encoder",
                REGISTRY.clone()
            )
            .expect("Failed to register SEGMENT_WAITS_TOTAL")
        });

    /// Segment waits that hit the deadline.
    pub static SEGMENT_WAIT_TIMEOUTS_TOTAL: std::sync::LazyLock<IntCounter> =
        std::sync::LazyLock::new(|| {
            register_int_counter_with_registry!(
                "transcode_segment_wait_timeouts_total",
                "Segment waits that exceeded the deadline",
                REGISTRY.clone()
            )
            .expect("Failed to register SEGMENT_WAIT_TIMEOUTS_TOTAL")
        });

    /// Jobs evicted by the LRU.
    pub static JOBS_EVICTED_TOTAL: std::sync::LazyLock<IntCounter> =
        std::sync::LazyLock::new(|| {
            register_int_counter_with_registry!(
                "transcode_jobs_evicted_total",
                "Transcode jobs evicted from the cache",
                REGISTRY.clone()
            )
            .expect("Failed to register JOBS_EVICTED_TOTAL")
        });
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
