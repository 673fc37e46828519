//! Print submission handlers.
//!
//! Both endpoints answer as soon as the job is queued; the print itself
//! happens later on the service worker.

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Local};
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use crate::printer::line_buffer::filter_ascii;
use crate::protocol::commands::MAX_CONCENTRATION;
use crate::service::PrintTask;

use super::super::state::AppState;

/// Query parameters shared by both print endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PrintQuery {
    pub secret: Option<String>,
    pub print_date: Option<String>,
    pub print_break: Option<String>,
    pub print_concentration: Option<String>,
}

impl PrintQuery {
    fn print_date(&self) -> bool {
        is_flag_set(self.print_date.as_deref())
    }

    fn print_break(&self) -> bool {
        is_flag_set(self.print_break.as_deref())
    }

    /// Requested heat level, clamped to the device range. Unparseable is 0.
    fn concentration(&self) -> u8 {
        self.print_concentration
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|level| level.clamp(0, i64::from(MAX_CONCENTRATION)) as u8)
            .unwrap_or(0)
    }
}

fn is_flag_set(value: Option<&str>) -> bool {
    matches!(value, Some("true") | Some("1"))
}

/// POST /print_ascii - print the request body as text.
pub async fn print_ascii(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PrintQuery>,
    body: Bytes,
) -> Response {
    if !state.authorized(query.secret.as_deref()) {
        return error_response(StatusCode::FORBIDDEN, "missing secret key");
    }
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "missing request body");
    }

    let text = String::from_utf8_lossy(&body).replace('\t', "    ");
    let ascii_text = filter_ascii(&text).trim().to_string();
    if ascii_text.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "empty ascii string");
    }

    let now = Local::now();
    tracing::info!(length = ascii_text.len(), "Received ASCII job");

    if let Some(dir) = &state.config.receive_dir {
        archive(dir, &archive_name(&now, "ascii.txt"), ascii_text.as_bytes().to_vec()).await;
    }

    let print_text = if query.print_date() {
        format!("{}\n{}", format_date(&now), ascii_text)
    } else {
        ascii_text.clone()
    };

    let task = PrintTask::ascii(print_text).with_concentration(query.concentration());
    state.service.enqueue(task, true);
    enqueue_break(&state, &query);

    result_response(ascii_text.len())
}

/// POST /print_image - print the multipart `image` field.
pub async fn print_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PrintQuery>,
    mut multipart: Multipart,
) -> Response {
    if !state.authorized(query.secret.as_deref()) {
        return error_response(StatusCode::FORBIDDEN, "missing secret key");
    }

    let mut image_data: Option<Bytes> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("image") {
                    continue;
                }
                match field.bytes().await {
                    Ok(bytes) => {
                        image_data = Some(bytes);
                        break;
                    }
                    Err(e) => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            &format!("Failed to read image: {}", e),
                        );
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &format!("Multipart error: {}", e));
            }
        }
    }

    let Some(image_bytes) = image_data.filter(|bytes| !bytes.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "missing request image");
    };
    let length = image_bytes.len();

    // Decoding is CPU-bound
    let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&image_bytes)).await;
    let img = match decoded {
        Ok(Ok(img)) => img,
        Ok(Err(e)) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("invalid request image: {}", e));
        }
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("Task error: {}", e));
        }
    };

    let now = Local::now();
    tracing::info!(length, width = img.width(), height = img.height(), "Received image job");

    if let Some(dir) = &state.config.receive_dir {
        match encode_png(&img) {
            Ok(png) => archive(dir, &archive_name(&now, "image.png"), png).await,
            Err(e) => tracing::warn!(error = %e, "Failed to encode image for archiving"),
        }
    }

    let task = PrintTask::image(img).with_concentration(query.concentration());
    state.service.enqueue(task, false);
    enqueue_break(&state, &query);

    result_response(length)
}

fn enqueue_break(state: &AppState, query: &PrintQuery) {
    if query.print_break() {
        state
            .service
            .enqueue(PrintTask::feed(state.config.break_size), false);
    }
}

fn format_date(now: &DateTime<Local>) -> String {
    now.format("%d.%m.%Y %H:%M:%S").to_string()
}

fn archive_name(now: &DateTime<Local>, suffix: &str) -> String {
    format!("{}_{}", now.timestamp_millis(), suffix)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Archiving is best effort; the job is printed either way.
async fn archive(dir: &Path, name: &str, data: Vec<u8>) {
    let path = dir.join(name);
    match tokio::fs::write(&path, data).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Archived job"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to archive job"),
    }
}

fn result_response(length: usize) -> Response {
    (StatusCode::OK, Json(json!({ "status": "result", "length": length }))).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

// ============================================================================
// TESTS
// ============================================================================
