//! Tracing setup: console logging plus optional OpenTelemetry export.
//!
//! Log verbosity follows `RUST_LOG` (default `info`). OTLP export is off unless
//! `enable_otel_export` is set, and is then configured through the standard variables:
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` - collector URL (default `http://localhost:4318`)
//! - `OTEL_EXPORTER_OTLP_PROTOCOL` - `http/protobuf` (default) or `http/json`
//! - `OTEL_EXPORTER_OTLP_HEADERS` - comma-separated `key=value` pairs, `%20` decodes to a space
//! - `OTEL_SERVICE_NAME` - defaults to `get-text`
//!
//! The tracer provider is kept in a `OnceLock` so [`shutdown_telemetry`] can flush pending spans;
//! `tracing-opentelemetry` only holds the tracer.

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Install the global subscriber. Fails only if one is already installed.
pub fn init_telemetry(enable_otel_export: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (tracer, otel_status) = if enable_otel_export {
        match create_otlp_tracer() {
            Ok(tracer) => (Some(tracer), "OTLP export enabled".to_string()),
            // Misconfigured export shouldn't keep the service from starting
            Err(e) => (None, format!("OTLP export unavailable: {e}")),
        }
    } else {
        (None, "OTLP export disabled".to_string())
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer)))
        .try_init()?;

    info!("Telemetry initialized ({otel_status})");
    Ok(())
}

fn create_otlp_tracer() -> anyhow::Result<opentelemetry_sdk::trace::Tracer> {
    let service_name = std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "get-text".to_string());
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| "http://localhost:4318".to_string());
    let headers = std::env::var("OTEL_EXPORTER_OTLP_HEADERS")
        .map(|raw| parse_headers(&raw))
        .unwrap_or_default();
    let protocol = match std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
        Ok("http/json") => Protocol::HttpJson,
        _ => Protocol::HttpBinary,
    };

    // The subscriber isn't installed yet, so this goes straight to stderr
    eprintln!(
        "[OTLP] service={service_name} endpoint={endpoint} headers={}",
        headers.len()
    );

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(&endpoint)
        .with_protocol(protocol)
        .with_headers(headers)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_attribute(KeyValue::new("service.name", service_name.clone()))
                .build(),
        )
        .build();

    let tracer = tracer_provider.tracer(service_name);
    let _ = TRACER_PROVIDER.set(tracer_provider);

    Ok(tracer)
}

/// Parse `OTEL_EXPORTER_OTLP_HEADERS`; pairs without `=` are skipped
fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.replace("%20", " ")
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Flush and stop the OTLP exporter, if one was started
pub fn shutdown_telemetry() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        tracing::error!("Failed to shutdown tracer provider: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers("Authorization=Basic%20abc123, x-team = books,broken");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Authorization"], "Basic abc123");
        assert_eq!(headers["x-team"], "books");
    }

    #[test]
    fn test_parse_headers_empty() {
        assert!(parse_headers("").is_empty());
        assert!(parse_headers("=value").is_empty());
    }

    #[test]
    fn test_shutdown_without_exporter_is_noop() {
        shutdown_telemetry();
    }
}
