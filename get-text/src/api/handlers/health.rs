//! Liveness probe.

use axum::Json;

use crate::api::models::text::LiveResponse;

#[utoipa::path(
    get,
    path = "/live",
    tag = "health",
    summary = "Liveness probe",
    description = "Always answers 200 while the process is serving requests. Does not check the converter or the temp directory.",
    responses(
        (status = 200, description = "Service is up", body = LiveResponse),
    )
)]
pub async fn live() -> Json<LiveResponse> {
    Json(LiveResponse::ok())
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode, routing::get};
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_live_returns_fixed_body() {
        let server = TestServer::new(Router::new().route("/live", get(super::live))).unwrap();

        let response = server.get("/live").await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.text(), r#"{"service":"OK"}"#);
        assert_eq!(response.header("content-type"), "application/json");
    }
}
