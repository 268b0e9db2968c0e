//! Canvas routes end to end over the in-memory stores.

mod support;

use axum::http::StatusCode;
use pixels_core::{BoardSnapshot, Coordinates, Rgb};
use pixels_test_utils::fixtures::{cell, small_board, user};
use serde_json::json;
use support::{body_bytes, body_json, header, Harness};

#[tokio::test]
async fn test_get_size_reports_board() {
    let harness = Harness::new();
    let response = harness.get("/get_size", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "width": 8, "height": 6 }));
}

#[tokio::test]
async fn test_get_pixels_returns_packed_background() {
    let harness = Harness::new();
    let response = harness.get("/get_pixels", Some(user(1))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "content-type"),
        Some("application/octet-stream")
    );
    assert_eq!(header(&response, "canvas-freshness"), Some("fresh"));

    let bytes = body_bytes(response).await;
    assert_eq!(bytes.len(), BoardSnapshot::expected_len(small_board()));
    assert!(bytes.iter().all(|b| *b == 0xFF));
}

#[tokio::test]
async fn test_board_reads_require_identity() {
    let harness = Harness::new();
    assert_eq!(
        harness.get("/get_pixels", None).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        harness.get("/get_pixel?x=0&y=0", None).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_set_pixel_is_visible_to_reads() {
    let harness = Harness::new();

    let placed = harness
        .post_json(
            "/set_pixel",
            Some(user(7)),
            json!({ "x": 2, "y": 3, "rgb": "00ff7f" }),
        )
        .await;
    assert_eq!(placed.status(), StatusCode::OK);
    let body = body_json(placed).await;
    assert_eq!(body["rgb"], "00FF7F");
    assert_eq!(body["user_id"], 7);
    assert_eq!(body["message"], "Added pixel at x=2, y=3 of color 00FF7F");

    let pixel = harness.get("/get_pixel?x=2&y=3", Some(user(8))).await;
    assert_eq!(pixel.status(), StatusCode::OK);
    assert_eq!(header(&pixel, "canvas-freshness"), Some("fresh"));
    let body = body_json(pixel).await;
    assert_eq!(body["rgb"], "00FF7F");
    assert_eq!(body["freshness"], "fresh");

    let board = body_bytes(harness.get("/get_pixels", Some(user(8))).await).await;
    assert_eq!(
        cell(&board, small_board(), Coordinates { x: 2, y: 3 }),
        Rgb([0x00, 0xFF, 0x7F])
    );
    assert_eq!(
        cell(&board, small_board(), Coordinates { x: 0, y: 0 }),
        Rgb::WHITE
    );
}

#[tokio::test]
async fn test_set_pixel_requires_identity() {
    let harness = Harness::new();
    let response = harness
        .post_json("/set_pixel", None, json!({ "x": 0, "y": 0, "rgb": "000000" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.history.edits().await.is_empty());
}

#[tokio::test]
async fn test_invalid_edits_are_rejected_before_the_ledger() {
    let harness = Harness::new();

    let out_of_bounds = harness
        .post_json(
            "/set_pixel",
            Some(user(1)),
            json!({ "x": 8, "y": 0, "rgb": "000000" }),
        )
        .await;
    assert_eq!(out_of_bounds.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(out_of_bounds).await["code"], "INVALID_RANGE");

    let bad_color = harness
        .post_json(
            "/set_pixel",
            Some(user(1)),
            json!({ "x": 1, "y": 1, "rgb": "#12345" }),
        )
        .await;
    assert_eq!(bad_color.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(bad_color).await["code"], "INVALID_FORMAT");

    assert!(harness.history.edits().await.is_empty());
}

#[tokio::test]
async fn test_get_pixel_out_of_bounds() {
    let harness = Harness::new();
    let response = harness.get("/get_pixel?x=-1&y=2", Some(user(1))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_outage_serves_degraded_snapshot() {
    let harness = Harness::new();
    let warm = harness.get("/get_pixels", Some(user(1))).await;
    assert_eq!(header(&warm, "canvas-freshness"), Some("fresh"));

    harness.history.set_available(false);

    let response = harness.get("/get_pixels", Some(user(1))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "canvas-freshness"), Some("degraded"));
    assert_eq!(
        body_bytes(response).await.len(),
        BoardSnapshot::expected_len(small_board())
    );
}

#[tokio::test]
async fn test_cold_start_without_history_is_unavailable() {
    let harness = Harness::new();
    harness.history.set_available(false);

    let response = harness.get("/get_pixels", Some(user(1))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
