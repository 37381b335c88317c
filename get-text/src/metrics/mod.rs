//! Prometheus metrics for the conversion pipeline
//!
//! HTTP-level metrics (request counts, latencies per route) come from `axum-prometheus` when
//! `enable_metrics` is set; the per-stage instruments here live in their own registry owned by
//! [`crate::AppState`], so tests and multiple applications in one process never share state.

mod conversion;

pub use conversion::{ConversionMetrics, Outcome, Stage};
