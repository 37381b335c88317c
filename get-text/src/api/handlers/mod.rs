//! HTTP request handlers.
//!
//! - [`text`]: upload validation, staging, conversion and cleanup for `POST /text`
//! - [`health`]: liveness probe
//!
//! Handlers return [`crate::errors::Error`], which converts into the matching status code and a
//! user-safe message.

pub mod health;
pub mod text;
