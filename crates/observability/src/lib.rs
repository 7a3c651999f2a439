//! # adaptive-opus-observability
//!
//! Observability-Crate fuer Adaptive Opus:
//! - Structured Logging via tracing-subscriber (Text oder JSON, auf stderr)
//! - Prometheus-kompatible Sweep-Metriken, exportierbar als Textdatei

pub mod logging;
pub mod metrics;

pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
pub use metrics::SweepMetrics;
