use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Extracted document text
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TextResponse {
    /// Plain text produced by the converter
    pub text: String,
}

/// Liveness probe body, always `{"service":"OK"}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LiveResponse {
    #[schema(example = "OK")]
    pub service: String,
}

impl LiveResponse {
    pub fn ok() -> Self {
        Self {
            service: "OK".to_string(),
        }
    }
}
