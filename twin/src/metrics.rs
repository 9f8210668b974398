use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "twin_readings_total",
        "Total state updates received"
    ))
    .unwrap();
    pub static ref VALID_READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "twin_valid_readings_total",
        "Total state updates accepted after validation"
    ))
    .unwrap();
    pub static ref INVALID_READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "twin_invalid_readings_total",
        "Total state updates rejected by validation"
    ))
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "twin_db_failures_total",
        "Total database insert failures"
    ))
    .unwrap();
    pub static ref PREDICTIONS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "twin_predictions_total",
        "Total maintenance predictions served"
    ))
    .unwrap();
    pub static ref MAINTENANCE_FLAGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "twin_maintenance_flags_total",
        "Total predictions that reported maintenance needed"
    ))
    .unwrap();
    pub static ref MODEL_FIT_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "twin_model_fit_seconds",
            "Time taken to fit the anomaly model on a machine history"
        )
        .buckets(vec![
            0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5
        ])
    )
    .unwrap();
}

pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VALID_READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INVALID_READINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DB_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PREDICTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MAINTENANCE_FLAGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MODEL_FIT_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
