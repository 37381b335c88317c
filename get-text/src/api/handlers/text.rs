//! Text extraction endpoint.
//!
//! A request runs strictly in order: read the multipart upload, check there is exactly one file
//! under `file` with an allowed extension, stage it as `<uuid><ext>`, run the converter into
//! `<uuid>_out.txt`, read that back and answer with its content.
//!
//! Both staged files are owned by scope guards from the moment they are named, so they are
//! removed on every exit path: success, any failure after staging, or the request future being
//! dropped mid-conversion.

use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::AppState;
use crate::api::models::text::TextResponse;
use crate::errors::{Error, Result};
use crate::metrics::{Outcome, Stage};

/// Upload extensions the converter is trusted with, lower-case with the leading dot
pub const ALLOWED_EXTENSIONS: [&str; 3] = [".epub", ".mobi", ".docx"];

const FILE_FIELD: &str = "file";

/// The single file part of a validated upload
#[derive(Debug)]
struct Upload {
    file_name: String,
    extension: String,
    content: Bytes,
}

#[utoipa::path(
    post,
    path = "/text",
    tag = "text",
    summary = "Extract text",
    description = "Upload one e-book (epub, mobi or docx) under the multipart field `file` and get its plain text back.
Uploaded and converted files are deleted before the response is sent.",
    request_body(
        content_type = "multipart/form-data",
        description = "Form with exactly one file part named `file`"
    ),
    responses(
        (status = 200, description = "Text extracted", body = TextResponse),
        (status = 400, description = "Not a multipart form, no file, several files, or unsupported extension"),
        (status = 413, description = "Payload too large"),
        (status = 500, description = "Saving, converting or reading the file failed")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn extract_text(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<TextResponse>> {
    let metrics = &state.metrics;

    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            metrics.record_outcome(Outcome::BadRequest);
            return Err(e);
        }
    };

    let id = Uuid::new_v4();
    let staged_name = format!("{id}{}", upload.extension);

    tracing::info!(
        upload_id = %id,
        file_name = %upload.file_name,
        bytes = upload.content.len(),
        "Received upload"
    );

    let started = Instant::now();
    let mut content: &[u8] = &upload.content;
    let input_path = match state.saver.save(&staged_name, &mut content).await {
        Ok(path) => path,
        Err(e) => {
            tracing::error!(upload_id = %id, error = %e, "Failed to stage upload");
            metrics.record_outcome(Outcome::SaveError);
            return Err(Error::internal("save file"));
        }
    };
    let input_path = scopeguard::guard(input_path, remove_staged_file);
    let output_path = scopeguard::guard(derive_output_path(&input_path), remove_staged_file);
    metrics.observe_stage(Stage::Save, started.elapsed());
    tracing::debug!(upload_id = %id, elapsed = ?started.elapsed(), input = ?*input_path, "Saved");

    let started = Instant::now();
    if let Err(e) = state.extractor.extract(&input_path, &output_path).await {
        tracing::error!(upload_id = %id, error = %e, "Conversion failed");
        metrics.record_outcome(Outcome::ExtractError);
        return Err(Error::internal("extract txt"));
    }
    metrics.observe_stage(Stage::Extract, started.elapsed());
    tracing::debug!(upload_id = %id, elapsed = ?started.elapsed(), "Extracted");

    let started = Instant::now();
    let raw = match tokio::fs::read(&*output_path).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(upload_id = %id, output = ?*output_path, error = %e, "Failed to read conversion result");
            metrics.record_outcome(Outcome::ReadError);
            return Err(Error::internal("read file"));
        }
    };
    metrics.observe_stage(Stage::Read, started.elapsed());
    tracing::debug!(upload_id = %id, elapsed = ?started.elapsed(), bytes = raw.len(), "Read");

    metrics.record_outcome(Outcome::Success);

    Ok(Json(TextResponse {
        text: String::from_utf8_lossy(&raw).into_owned(),
    }))
}

/// Pull the single `file` part out of the form and validate it
async fn read_upload(multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Upload> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "Rejected non-multipart request");
        Error::bad_request("no multipart form data")
    })?;

    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A `file` part without a file name is a plain form value, not an upload
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if upload.is_some() {
            return Err(Error::bad_request("multiple files"));
        }

        let content = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, content));
    }

    let (file_name, content) = upload.ok_or_else(|| Error::bad_request("no file"))?;

    let extension = file_extension(&file_name);
    if !is_allowed_extension(&extension) {
        return Err(Error::bad_request(format!("wrong file type: {extension}")));
    }

    Ok(Upload {
        file_name,
        extension,
        content,
    })
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Error::PayloadTooLarge { message: e.body_text() };
    }
    Error::bad_request(format!("Failed to parse multipart data: {}", e.body_text()))
}

/// Final dot-suffix of the base name, lower-cased, or "" when there is none
pub fn file_extension(file_name: &str) -> String {
    let base = file_name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(file_name);
    base.rfind('.').map(|i| base[i..].to_lowercase()).unwrap_or_default()
}

pub fn is_allowed_extension(extension: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&extension)
}

/// `/a/b.docx` -> `/a/b_out.txt`; only the last extension is stripped
pub fn derive_output_path(input: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push("_out.txt");
    input.with_file_name(name)
}

fn remove_staged_file(path: PathBuf) {
    match std::fs::remove_file(&path) {
        Ok(()) => tracing::trace!(path = ?path, "Removed staged file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to remove staged file"),
    }
}
