//! Public canvas routes: board size, whole-board and single-cell reads,
//! and placing a pixel.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use pixels_cache::Freshness;
use pixels_core::{PixelEdit, Timestamp};
use serde::{Deserialize, Serialize};

use crate::constants::HEADER_CANVAS_FRESHNESS;
use crate::error::ApiResult;
use crate::middleware::AuthIdentity;
use crate::state::CanvasManager;
use crate::telemetry::metrics::with_metrics;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeResponse {
    pub width: u16,
    pub height: u16,
}

/// `?x=&y=` on single-cell routes.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CoordinatesQuery {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixelResponse {
    pub x: i16,
    pub y: i16,
    pub rgb: String,
    pub freshness: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPixelRequest {
    pub x: i64,
    pub y: i64,
    /// Six hex digits, no `#`.
    pub rgb: String,
}

/// Result of any ledger append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResponse {
    pub message: String,
    pub x: i16,
    pub y: i16,
    pub rgb: String,
    pub user_id: i64,
    pub created_at: Timestamp,
}

impl EditResponse {
    pub(crate) fn from_edit(edit: &PixelEdit) -> Self {
        let (verb, preposition) = if edit.deleted {
            ("Removed", "from")
        } else {
            ("Added", "at")
        };
        Self {
            message: format!(
                "{} pixel {} x={}, y={} of color {}",
                verb,
                preposition,
                edit.coords.x,
                edit.coords.y,
                edit.color.to_hex()
            ),
            x: edit.coords.x,
            y: edit.coords.y,
            rgb: edit.color.to_hex(),
            user_id: edit.author.0,
            created_at: edit.created_at,
        }
    }
}

fn freshness_header(freshness: Freshness) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(HEADER_CANVAS_FRESHNESS),
        HeaderValue::from_static(freshness.as_str()),
    )
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn get_size(State(cache): State<Arc<CanvasManager>>) -> Json<SizeResponse> {
    let size = cache.board_size();
    Json(SizeResponse {
        width: size.width,
        height: size.height,
    })
}

/// The whole board as packed RGB bytes, row major.
pub async fn get_pixels(State(cache): State<Arc<CanvasManager>>) -> ApiResult<Response> {
    let read = cache.get_snapshot().await?;
    let freshness = read.freshness;
    with_metrics(|m| m.record_snapshot_read(freshness.as_str()));

    Ok((
        [
            (
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            freshness_header(freshness),
        ],
        read.into_bytes(),
    )
        .into_response())
}

pub async fn get_pixel(
    State(cache): State<Arc<CanvasManager>>,
    Query(query): Query<CoordinatesQuery>,
) -> ApiResult<Response> {
    let read = cache.get_pixel(query.x, query.y).await?;
    with_metrics(|m| m.record_snapshot_read(read.freshness.as_str()));

    let body = PixelResponse {
        x: read.coords.x,
        y: read.coords.y,
        rgb: read.color.to_hex(),
        freshness: read.freshness.as_str().to_string(),
    };
    Ok(([freshness_header(read.freshness)], Json(body)).into_response())
}

pub async fn set_pixel(
    State(cache): State<Arc<CanvasManager>>,
    AuthIdentity(identity): AuthIdentity,
    Json(request): Json<SetPixelRequest>,
) -> ApiResult<Json<EditResponse>> {
    let edit = cache
        .set_pixel(request.x, request.y, &request.rgb, identity.user_id)
        .await?;
    tracing::debug!(
        x = edit.coords.x,
        y = edit.coords.y,
        user_id = identity.user_id.0,
        "pixel placed"
    );
    Ok(Json(EditResponse::from_edit(&edit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pixels_core::{Coordinates, Rgb, UserId};

    fn edit(deleted: bool) -> PixelEdit {
        PixelEdit {
            id: 1,
            coords: Coordinates { x: 3, y: 4 },
            color: Rgb([0x12, 0xAB, 0x00]),
            author: UserId(42),
            created_at: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            deleted,
        }
    }

    #[test]
    fn test_edit_response_message() {
        let placed = EditResponse::from_edit(&edit(false));
        assert_eq!(placed.message, "Added pixel at x=3, y=4 of color 12AB00");
        assert_eq!(placed.user_id, 42);

        let removed = EditResponse::from_edit(&edit(true));
        assert_eq!(removed.message, "Removed pixel from x=3, y=4 of color 12AB00");
    }

    #[test]
    fn test_freshness_header_values() {
        let (name, value) = freshness_header(Freshness::Degraded);
        assert_eq!(name.as_str(), "canvas-freshness");
        assert_eq!(value, "degraded");
    }
}
