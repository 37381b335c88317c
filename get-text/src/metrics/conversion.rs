use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Pipeline step timed by [`ConversionMetrics::observe_stage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Save,
    Extract,
    Read,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Save => "save",
            Stage::Extract => "extract",
            Stage::Read => "read",
        }
    }
}

/// Terminal state of one `/text` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    BadRequest,
    SaveError,
    ExtractError,
    ReadError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::BadRequest => "bad_request",
            Outcome::SaveError => "save_error",
            Outcome::ExtractError => "extract_error",
            Outcome::ReadError => "read_error",
        }
    }
}

/// Conversion pipeline instruments using Prometheus
#[derive(Clone)]
pub struct ConversionMetrics {
    stage_duration: HistogramVec,
    conversions: IntCounterVec,
    registry: Registry,
}

impl ConversionMetrics {
    /// Create the instruments and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        // ebook-convert takes anywhere from a second to several minutes
        let duration_buckets = vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];
        let stage_duration = HistogramVec::new(
            HistogramOpts::new("get_text_stage_duration_seconds", "Duration of a conversion pipeline stage").buckets(duration_buckets),
            &["stage"],
        )?;
        registry.register(Box::new(stage_duration.clone()))?;

        let conversions = IntCounterVec::new(
            Opts::new("get_text_conversions_total", "Text extraction requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(conversions.clone()))?;

        Ok(Self {
            stage_duration,
            conversions,
            registry: registry.clone(),
        })
    }

    pub fn observe_stage(&self, stage: Stage, elapsed: Duration) {
        self.stage_duration.with_label_values(&[stage.as_str()]).observe(elapsed.as_secs_f64());
    }

    pub fn record_outcome(&self, outcome: Outcome) {
        self.conversions.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn outcome_count(&self, outcome: Outcome) -> u64 {
        self.conversions.with_label_values(&[outcome.as_str()]).get()
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = vec![];
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
