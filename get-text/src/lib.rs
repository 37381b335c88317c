//! # get-text: e-book text extraction service
//!
//! `get-text` is a small HTTP service that turns e-books into plain text. A client uploads one
//! `.epub`, `.mobi` or `.docx` file as a multipart form, the service stages it on local disk, runs
//! an external converter (calibre's `ebook-convert` by default) to produce a `.txt` file, and
//! answers with the extracted text as JSON.
//!
//! ## Request Flow
//!
//! `POST /text` is handled by [`api::handlers::text::extract_text`]:
//!
//! 1. The multipart form is read in memory, bounded by `max_upload_size`.
//! 2. Exactly one part named `file` with an allowed extension must be present, anything else is a
//!    400 with a short reason.
//! 3. The upload is written to `temp_dir` as `<uuid><ext>` through a [`storage::FileSaver`].
//! 4. The [`converter::Extractor`] converts it into `<uuid>_out.txt` next to it.
//! 5. The output is read back (invalid UTF-8 is replaced) and returned as `{"text": "..."}`.
//!
//! Both staged files are removed before the response is sent, whatever the outcome. Requests are
//! independent; concurrent conversions never share files.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use get_text::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = get_text::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     get_text::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod converter;
pub mod errors;
pub mod metrics;
mod openapi;
pub mod storage;
pub mod telemetry;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    converter::{EbookConverter, Extractor},
    metrics::ConversionMetrics,
    openapi::ApiDoc,
    storage::{FileSaver, LocalFileSaver},
};

/// Application state shared across all request handlers.
///
/// The saver and extractor are trait objects so tests can swap in doubles without touching the
/// disk or spawning processes.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub saver: Arc<dyn FileSaver>,
    pub extractor: Arc<dyn Extractor>,
    pub metrics: ConversionMetrics,
}

/// Build the application router with all endpoints and middleware
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    // Validated at load time, but the state can be built by hand
    let body_limit = usize::try_from(state.config.max_upload_size)?;

    let mut router = Router::new()
        .route(
            "/text",
            post(api::handlers::text::extract_text).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/live", get(api::handlers::health::live))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        let conversion_metrics = state.metrics.clone();

        // HTTP metrics from axum-prometheus followed by the conversion pipeline metrics
        router = router
            .route(
                "/metrics",
                get(move || async move {
                    let mut body = metric_handle.render();
                    let pipeline = conversion_metrics
                        .render()
                        .map_err(|e| errors::Error::Other(anyhow::Error::from(e).context("render conversion metrics")))?;
                    body.push_str(&pipeline);
                    Ok::<_, errors::Error>(body)
                }),
            )
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    info!(
        metrics = state.config.enable_metrics,
        upload_limit = body_limit,
        "Routes: POST /text, GET /live, GET /openapi.json, GET /docs{}",
        if state.config.enable_metrics { ", GET /metrics" } else { "" }
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create the staging directory, wire the converter and build the router
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting get-text with configuration: {:#?}", config);

        let saver = LocalFileSaver::create(&config.temp_dir)
            .await
            .map_err(|e| anyhow::Error::from(e).context("can't init file saver"))?;
        let extractor = EbookConverter::from(&config.converter);
        let metrics = ConversionMetrics::new(&prometheus::Registry::new())?;

        info!(
            command = %config.converter.command,
            timeout = ?config.converter.timeout,
            "Using external converter"
        );

        let state = AppState::builder()
            .config(config.clone())
            .saver(Arc::new(saver))
            .extractor(Arc::new(extractor))
            .metrics(metrics)
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "get-text {} listening on http://{}, available at http://localhost:{}",
            env!("CARGO_PKG_VERSION"),
            bind_addr,
            self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
