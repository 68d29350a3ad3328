/*!
Observability infrastructure for Persistor.

- Structured logging through `tracing`, installed with [`init_observability`]
- Prometheus counters for container operations (`metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{PersistError, Result};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<PersistMetrics> = OnceLock::new();

/// Metrics collection for container operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct PersistMetrics {
    pub saves_total: Counter,
    pub loads_total: Counter,
    pub purges_total: Counter,
    pub errors_total: Counter,
    pub operation_latency_seconds: Histogram,
    pub store_size_bytes: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| PersistError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| PersistError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
fn histogram(registry: &Registry, name: &str, help: &str, buckets: Vec<f64>) -> Result<Histogram> {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))
        .map_err(|e| PersistError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| PersistError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(histogram)
}

#[cfg(feature = "metrics")]
impl PersistMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            saves_total: counter(&registry, "persistor_saves_total", "Container saves written")?,
            loads_total: counter(&registry, "persistor_loads_total", "Container stores loaded")?,
            purges_total: counter(&registry, "persistor_purges_total", "Container stores purged")?,
            errors_total: counter(&registry, "persistor_errors_total", "Failed backend writes")?,
            operation_latency_seconds: histogram(
                &registry,
                "persistor_operation_latency_seconds",
                "Duration of timed operations in seconds",
                prometheus::DEFAULT_BUCKETS.to_vec(),
            )?,
            store_size_bytes: histogram(
                &registry,
                "persistor_store_size_bytes",
                "Size of stored blobs in bytes",
                prometheus::exponential_buckets(64.0, 4.0, 10)
                    .map_err(|e| PersistError::storage(format!("Invalid buckets: {e}")))?,
            )?,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static PersistMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize Persistor metrics"))
    }

    pub fn record_save(&self) {
        self.saves_total.inc();
    }

    pub fn record_load(&self) {
        self.loads_total.inc();
    }

    pub fn record_purge(&self) {
        self.purges_total.inc();
    }

    pub fn record_error(&self) {
        self.errors_total.inc();
    }

    pub fn record_store_size(&self, size_bytes: usize) {
        self.store_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| PersistError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| PersistError::storage(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Measures how long an operation takes
#[cfg(feature = "metrics")]
pub struct OperationTimer {
    start: Instant,
}

#[cfg(feature = "metrics")]
impl OperationTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record the elapsed time
    pub fn finish(self) {
        PersistMetrics::global()
            .operation_latency_seconds
            .observe(self.start.elapsed().as_secs_f64());
    }

    /// Record the elapsed time, counting an error if `result` failed
    pub fn observe<T>(self, result: &Result<T>) {
        match result {
            Ok(_) => self.finish(),
            Err(_) => self.finish_with_error(),
        }
    }

    /// Record the elapsed time and count an error
    pub fn finish_with_error(self) {
        let metrics = PersistMetrics::global();
        metrics
            .operation_latency_seconds
            .observe(self.start.elapsed().as_secs_f64());
        metrics.record_error();
    }
}

/// Initialize the global tracing subscriber
///
/// Honours `RUST_LOG`, defaulting to `persistor=info`. With `json` set, events
/// are written as JSON lines, otherwise in the human-readable format.
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    PersistMetrics::global();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("persistor=info"));

    let result = if json {
        let subscriber = TracingRegistry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(false),
        );
        set_global_default(subscriber)
    } else {
        let subscriber = TracingRegistry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));
        set_global_default(subscriber)
    };

    result.map_err(|e| PersistError::storage(format!("Failed to set global tracing subscriber: {e}")))?;

    tracing::info!("Persistor observability initialized");
    Ok(())
}

/// Initialize observability with JSON output
pub fn init_default_observability() -> Result<()> {
    init_observability(true)
}
