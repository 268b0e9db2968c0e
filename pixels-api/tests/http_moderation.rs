//! Moderator routes: privilege checks, stack deletes, forced refresh.

mod support;

use axum::http::StatusCode;
use pixels_test_utils::fixtures::{moderator, user};
use serde_json::json;
use support::{body_json, Harness};

#[tokio::test]
async fn test_refresh_requires_privilege() {
    let harness = Harness::new();

    let anonymous = harness
        .post_json("/mod/refresh_cache", None, json!({}))
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let regular = harness
        .post_json("/mod/refresh_cache", Some(user(1)), json!({}))
        .await;
    assert_eq!(regular.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(regular).await["code"], "FORBIDDEN");

    let privileged = harness
        .post_json("/mod/refresh_cache", Some(moderator(100)), json!({}))
        .await;
    assert_eq!(privileged.status(), StatusCode::OK);
    let body = body_json(privileged).await;
    assert_eq!(body["refreshed"], true);
    assert!(body["started_at"].is_string());
}

#[tokio::test]
async fn test_refresh_reports_contention() {
    let harness = Harness::new();
    harness.history.seize_sync_lock().await;

    let response = harness
        .post_json("/mod/refresh_cache", Some(moderator(100)), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["refreshed"], false);
    assert!(body["held_since"].is_string());
}

#[tokio::test]
async fn test_delete_unwinds_the_stack() {
    let harness = Harness::new();
    let mod_id = moderator(100);

    for (author, rgb) in [(user(1), "FF0000"), (user(2), "00FF00")] {
        let placed = harness
            .post_json("/set_pixel", Some(author), json!({ "x": 4, "y": 2, "rgb": rgb }))
            .await;
        assert_eq!(placed.status(), StatusCode::OK);
    }

    let history = body_json(harness.get("/mod/pixel_history?x=4&y=2", Some(mod_id)).await).await;
    assert_eq!(history["current"]["user_id"], 2);
    assert_eq!(history["current"]["rgb"], "00FF00");

    let removed = harness
        .post_json("/mod/delete_pixel", Some(mod_id), json!({ "x": 4, "y": 2 }))
        .await;
    assert_eq!(removed.status(), StatusCode::OK);
    let body = body_json(removed).await;
    assert_eq!(body["message"], "Removed pixel from x=4, y=2 of color 00FF00");
    assert_eq!(body["user_id"], 100);

    let pixel = body_json(harness.get("/get_pixel?x=4&y=2", Some(user(3))).await).await;
    assert_eq!(pixel["rgb"], "FF0000");

    let history = body_json(harness.get("/mod/pixel_history?x=4&y=2", Some(mod_id)).await).await;
    assert_eq!(history["current"]["user_id"], 1);

    let second = harness
        .post_json("/mod/delete_pixel", Some(mod_id), json!({ "x": 4, "y": 2 }))
        .await;
    assert_eq!(second.status(), StatusCode::OK);

    let pixel = body_json(harness.get("/get_pixel?x=4&y=2", Some(user(3))).await).await;
    assert_eq!(pixel["rgb"], "FFFFFF");
    let history = body_json(harness.get("/mod/pixel_history?x=4&y=2", Some(mod_id)).await).await;
    assert!(history["current"].is_null());

    let nothing = harness
        .post_json("/mod/delete_pixel", Some(mod_id), json!({ "x": 4, "y": 2 }))
        .await;
    assert_eq!(nothing.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(nothing).await["code"], "ENTITY_NOT_FOUND");
}

#[tokio::test]
async fn test_pixel_history_requires_privilege() {
    let harness = Harness::new();
    let response = harness.get("/mod/pixel_history?x=0&y=0", Some(user(1))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
