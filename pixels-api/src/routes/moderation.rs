//! Moderation routes. Every handler requires a privileged token.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use pixels_cache::SyncOutcome;
use pixels_core::Timestamp;
use serde::{Deserialize, Serialize};

use super::canvas::{CoordinatesQuery, EditResponse};
use crate::error::ApiResult;
use crate::middleware::ModeratorIdentity;
use crate::state::CanvasManager;
use crate::telemetry::metrics::with_metrics;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeletePixelRequest {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// False when another worker already holds the sync lock.
    pub refreshed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_since: Option<Timestamp>,
}

impl From<&SyncOutcome> for RefreshResponse {
    fn from(outcome: &SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Refreshed { started_at, .. } => Self {
                refreshed: true,
                started_at: Some(*started_at),
                held_since: None,
            },
            SyncOutcome::Contended { held_since } => Self {
                refreshed: false,
                started_at: None,
                held_since: Some(*held_since),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedBy {
    pub rgb: String,
    pub user_id: i64,
    pub placed_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixelHistoryResponse {
    pub x: i64,
    pub y: i64,
    /// None when the cell shows the background.
    pub current: Option<PlacedBy>,
}

pub async fn delete_pixel(
    State(cache): State<Arc<CanvasManager>>,
    ModeratorIdentity(moderator): ModeratorIdentity,
    Json(request): Json<DeletePixelRequest>,
) -> ApiResult<Json<EditResponse>> {
    let deletion = cache
        .delete_pixel(request.x, request.y, moderator.user_id)
        .await?;
    tracing::info!(
        x = deletion.coords.x,
        y = deletion.coords.y,
        moderator = moderator.user_id.0,
        "pixel removed by moderator"
    );
    Ok(Json(EditResponse::from_edit(&deletion)))
}

pub async fn refresh_cache(
    State(cache): State<Arc<CanvasManager>>,
    ModeratorIdentity(moderator): ModeratorIdentity,
) -> ApiResult<Json<RefreshResponse>> {
    let outcome = match cache.force_refresh().await {
        Ok(outcome) => outcome,
        Err(err) => {
            with_metrics(|m| m.record_refresh("error"));
            return Err(err.into());
        }
    };
    let label = if outcome.refreshed() {
        "refreshed"
    } else {
        "contended"
    };
    with_metrics(|m| m.record_refresh(label));
    tracing::info!(moderator = moderator.user_id.0, outcome = label, "cache refresh requested");

    Ok(Json(RefreshResponse::from(&outcome)))
}

pub async fn pixel_history(
    State(cache): State<Arc<CanvasManager>>,
    ModeratorIdentity(_): ModeratorIdentity,
    Query(query): Query<CoordinatesQuery>,
) -> ApiResult<Json<PixelHistoryResponse>> {
    let current = cache.pixel_author(query.x, query.y).await?;
    Ok(Json(PixelHistoryResponse {
        x: query.x,
        y: query.y,
        current: current.map(|pixel| PlacedBy {
            rgb: pixel.color.to_hex(),
            user_id: pixel.author.0,
            placed_at: pixel.placed_at,
        }),
    }))
}
