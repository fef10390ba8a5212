//! Prometheus metrics and tracing span helpers.
//!
//! Metrics live in a private registry (not the prometheus default one) so
//! `GET /metrics` only reports what this service records.

#[cfg(feature = "metrics")]
pub use self::prom::{StockroomMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prom {
    use once_cell::sync::Lazy;
    use prometheus::{
        Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
    };
    use std::time::Duration;

    pub static METRICS: Lazy<StockroomMetrics> = Lazy::new(StockroomMetrics::init);

    pub struct StockroomMetrics {
        pub registry: Registry,
        pub queries_total: IntCounter,
        pub query_errors_total: IntCounter,
        pub query_duration: Histogram,
        pub connection_wait_duration: Histogram,
        pub assets_created_total: IntCounter,
        pub stock_transactions_total: IntCounterVec,
        pub intake_conflicts_total: IntCounter,
        pub http_responses_total: IntCounterVec,
    }

    // Registration only fails on duplicate names, which are fixed below.
    fn register<C: prometheus::core::Collector + Clone + 'static>(registry: &Registry, c: C) -> C {
        registry
            .register(Box::new(c.clone()))
            .expect("metric names are unique");
        c
    }

    impl StockroomMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();

            let queries_total = register(
                &registry,
                IntCounter::new("stockroom_queries_total", "Total queries executed")
                    .expect("valid metric"),
            );
            let query_errors_total = register(
                &registry,
                IntCounter::new("stockroom_query_errors_total", "Queries that returned an error")
                    .expect("valid metric"),
            );
            let query_duration = register(
                &registry,
                Histogram::with_opts(HistogramOpts::new(
                    "stockroom_query_duration_seconds",
                    "Duration of queries",
                ))
                .expect("valid metric"),
            );
            let connection_wait_duration = register(
                &registry,
                Histogram::with_opts(HistogramOpts::new(
                    "stockroom_connection_wait_seconds",
                    "Time spent opening or checking out a database connection",
                ))
                .expect("valid metric"),
            );
            let assets_created_total = register(
                &registry,
                IntCounter::new("stockroom_assets_created_total", "Assets registered by intake")
                    .expect("valid metric"),
            );
            let stock_transactions_total = register(
                &registry,
                IntCounterVec::new(
                    Opts::new("stockroom_stock_transactions_total", "Ledger entries appended"),
                    &["type"],
                )
                .expect("valid metric"),
            );
            let intake_conflicts_total = register(
                &registry,
                IntCounter::new(
                    "stockroom_intake_conflicts_total",
                    "Intake requests aborted by an ambiguous owner name",
                )
                .expect("valid metric"),
            );
            let http_responses_total = register(
                &registry,
                IntCounterVec::new(
                    Opts::new("stockroom_http_responses_total", "HTTP responses by status class"),
                    &["method", "class"],
                )
                .expect("valid metric"),
            );

            Self {
                registry,
                queries_total,
                query_errors_total,
                query_duration,
                connection_wait_duration,
                assets_created_total,
                stock_transactions_total,
                intake_conflicts_total,
                http_responses_total,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.inc();
            self.query_duration.observe(elapsed.as_secs_f64());
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.inc();
        }

        pub fn record_connection_wait(&self, elapsed: Duration) {
            self.connection_wait_duration.observe(elapsed.as_secs_f64());
        }

        pub fn record_asset_created(&self) {
            self.assets_created_total.inc();
        }

        pub fn record_stock_transaction(&self, kind: &str) {
            self.stock_transactions_total.with_label_values(&[kind]).inc();
        }

        pub fn record_intake_conflict(&self) {
            self.intake_conflicts_total.inc();
        }

        pub fn record_http_response(&self, method: &str, status: u16) {
            let class = match status {
                200..=299 => "2xx",
                400..=499 => "4xx",
                500..=599 => "5xx",
                _ => "other",
            };
            self.http_responses_total
                .with_label_values(&[method, class])
                .inc();
        }

        /// Text exposition of every registered metric.
        pub fn render(&self) -> Vec<u8> {
            let mut buffer = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::error!("failed to encode metrics: {e}");
            }
            buffer
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn acquire_connection_span() -> Span {
        info_span!("stockroom.acquire_connection")
    }

    pub fn execute_query_span(query: &str) -> Span {
        // First line is enough to identify the statement.
        let head = query.trim().lines().next().unwrap_or_default();
        info_span!("stockroom.execute_query", db.statement = head)
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("stockroom.begin_transaction")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("stockroom.commit_transaction")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("stockroom.rollback_transaction")
    }

    pub fn intake_span(source: &str, entries: usize) -> Span {
        info_span!("stockroom.intake", source, entries)
    }

    pub fn stock_transaction_span(asset_tag: &str, kind: &str) -> Span {
        info_span!("stockroom.stock_transaction", asset_tag, kind)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        METRICS.record_stock_transaction("OUT");
        METRICS.record_http_response("GET", 404);
        let text = String::from_utf8(METRICS.render()).unwrap();
        assert!(text.contains("stockroom_stock_transactions_total"));
        assert!(text.contains("type=\"OUT\""));
        assert!(text.contains("class=\"4xx\""));
    }
}
