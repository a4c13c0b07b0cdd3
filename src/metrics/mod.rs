// Private module declaration
mod server;

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::models::EntityKind;
use crate::utils::CircuitState;

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Cache effectiveness per entity kind (hits, misses, absorbed errors)
// - Order placement outcomes, labelled by the failing stage
// - Promo validation verdicts and authoritative source reads
// - Cache transport circuit breaker state
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub cache_hits: IntCounterVec,
    pub cache_misses: IntCounterVec,
    pub cache_errors: IntCounterVec,

    pub orders_placed: IntCounter,
    pub order_placement_failures: IntCounterVec,

    pub promo_validations: IntCounterVec,
    pub promo_source_reads: IntCounterVec,

    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cache_hits = IntCounterVec::new(
            Opts::new("cache_hits_total", "Cache lookups answered from the cache"),
            &["entity"],
        )?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_misses = IntCounterVec::new(
            Opts::new("cache_misses_total", "Cache lookups that fell back to the store"),
            &["entity"],
        )?;
        registry.register(Box::new(cache_misses.clone()))?;

        let cache_errors = IntCounterVec::new(
            Opts::new("cache_errors_total", "Cache failures absorbed by the repositories"),
            &["entity", "operation"],
        )?;
        registry.register(Box::new(cache_errors.clone()))?;

        let orders_placed = IntCounter::new("orders_placed_total", "Orders committed")?;
        registry.register(Box::new(orders_placed.clone()))?;

        let order_placement_failures = IntCounterVec::new(
            Opts::new(
                "order_placement_failures_total",
                "Order placements rolled back, by failing stage",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(order_placement_failures.clone()))?;

        let promo_validations = IntCounterVec::new(
            Opts::new("promo_validations_total", "Promo code validations by verdict"),
            &["verdict"],
        )?;
        registry.register(Box::new(promo_validations.clone()))?;

        let promo_source_reads = IntCounterVec::new(
            Opts::new("promo_source_reads_total", "Scans of authoritative promo sources"),
            &["source"],
        )?;
        registry.register(Box::new(promo_source_reads.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Cache circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            cache_hits,
            cache_misses,
            cache_errors,
            orders_placed,
            order_placement_failures,
            promo_validations,
            promo_source_reads,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_cache_hit(&self, entity: EntityKind) {
        self.cache_hits.with_label_values(&[entity.as_str()]).inc();
    }

    pub fn record_cache_miss(&self, entity: EntityKind) {
        self.cache_misses.with_label_values(&[entity.as_str()]).inc();
    }

    pub fn record_cache_error(&self, entity: EntityKind, operation: &str) {
        self.cache_errors
            .with_label_values(&[entity.as_str(), operation])
            .inc();
    }

    pub fn record_order_placed(&self) {
        self.orders_placed.inc();
    }

    pub fn record_placement_failure(&self, stage: &str) {
        self.order_placement_failures.with_label_values(&[stage]).inc();
    }

    pub fn record_promo_verdict(&self, verdict: &str) {
        self.promo_validations.with_label_values(&[verdict]).inc();
    }

    pub fn record_promo_source_read(&self, source: &str) {
        self.promo_source_reads.with_label_values(&[source]).inc();
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.circuit_breaker_state.set(value);
    }
}
