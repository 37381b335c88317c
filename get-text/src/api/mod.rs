//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Response bodies
//!
//! # Endpoints
//!
//! - `POST /text`: multipart upload of a single e-book under the `file` field, answered with the
//!   extracted plain text
//! - `GET /live`: liveness probe
//!
//! Both are documented with `utoipa`; the rendered reference lives at `/docs`.

pub mod handlers;
pub mod models;
