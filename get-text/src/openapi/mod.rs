//! OpenAPI documentation for the HTTP surface.
//!
//! Served as JSON at `/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::text::extract_text,
        api::handlers::health::live,
    ),
    components(
        schemas(
            api::models::text::TextResponse,
            api::models::text::LiveResponse,
        )
    ),
    tags(
        (name = "text", description = "Extract plain text from e-books.

Supported formats: `.epub`, `.mobi` and `.docx` (matched case-insensitively on the uploaded file name).
Conversion runs synchronously; large books can take a while."),
        (name = "health", description = "Process liveness."),
    ),
    info(
        title = "get-text API",
        description = "Upload an e-book, get its text back.

## Errors

Client errors (400, 413) answer with a short plain-text reason such as `no file` or `wrong file type: .pdf`.
Server-side failures answer 500 with `Internal server error`; details are only logged.",
    ),
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_doc_lists_endpoints() {
        let doc = ApiDoc::openapi();

        assert!(doc.paths.paths.contains_key("/text"));
        assert!(doc.paths.paths.contains_key("/live"));

        let json = doc.to_json().unwrap();
        assert!(json.contains("get-text API"));
        assert!(json.contains("multipart/form-data"));
        assert!(json.contains("TextResponse"));
    }
}
