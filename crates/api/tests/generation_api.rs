//! Image and video generation: charging, GPU submission, webhook completion
//! and refunds.

mod common;

use axum::http::StatusCode;
use base64::Engine;
use common::{
    delete_auth, expect_json, get_auth, grant_nuts, nuts_of, patch_json_auth, post_json,
    post_json_auth, spawn_app, user_with_token, TestApp,
};
use muse_api::background::job_reconciler::reconcile_once;
use muse_providers::GpuInput;
use sqlx::PgPool;
use std::sync::atomic::Ordering;

/// Path and query of the webhook URL the fake GPU was last given.
fn last_webhook_path(test: &TestApp) -> String {
    test.gpu
        .last_webhook_url()
        .strip_prefix("http://api.test")
        .expect("webhook URL uses the public base URL")
        .to_string()
}

fn png_data_uri() -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"\x89PNG fake image bytes");
    format!("data:image/png;base64,{encoded}")
}

async fn generate_image(test: &TestApp, token: &str) -> serde_json::Value {
    let body = serde_json::json!({ "prompt": "a red fox in the snow", "style": "anime" });
    let json = expect_json(
        post_json_auth(test.router(), "/api/v1/images/generate", body, token).await,
        StatusCode::CREATED,
    )
    .await;
    json["data"].clone()
}

async fn complete_last_job(test: &TestApp) {
    let body = serde_json::json!({
        "id": format!("job-{}", test.gpu.submission_count()),
        "status": "COMPLETED",
        "output": { "image": png_data_uri() },
    });
    let response = post_json(test.router(), &last_webhook_path(test), body).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn generate_charges_and_submits(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "painter", "user").await;
    grant_nuts(&pool, user.id, 5).await;

    let image = generate_image(&test, &token).await;

    assert_eq!(image["status"], "pending");
    assert_eq!(image["nuts_cost"], 1);
    assert_eq!(image["width"], 768);
    assert_eq!(nuts_of(&pool, user.id).await, 4);

    let submissions = test.gpu.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    match &submissions[0].0 {
        GpuInput::Txt2Img { prompt, .. } => assert!(prompt.contains("a red fox in the snow")),
        other => panic!("expected txt2img, got {other:?}"),
    }
    assert!(submissions[0].1.contains(&format!("kind=image&id={}", image["id"])));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn generate_without_nuts_is_402(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (_user, token) = user_with_token(&test, "broke", "user").await;

    let body = serde_json::json!({ "prompt": "anything" });
    let json = expect_json(
        post_json_auth(test.router(), "/api/v1/images/generate", body, &token).await,
        StatusCode::PAYMENT_REQUIRED,
    )
    .await;
    assert_eq!(json["code"], "INSUFFICIENT_NUTS");
    assert_eq!(test.gpu.submission_count(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn free_tier_daily_image_limit(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "prolific", "user").await;
    grant_nuts(&pool, user.id, 20).await;

    for _ in 0..5 {
        generate_image(&test, &token).await;
    }

    let body = serde_json::json!({ "prompt": "one too many" });
    let json = expect_json(
        post_json_auth(test.router(), "/api/v1/images/generate", body, &token).await,
        StatusCode::TOO_MANY_REQUESTS,
    )
    .await;
    assert_eq!(json["code"], "DAILY_LIMIT_REACHED");
    assert_eq!(nuts_of(&pool, user.id).await, 15);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_dimensions_are_rejected(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "odd", "user").await;
    grant_nuts(&pool, user.id, 5).await;

    let body = serde_json::json!({ "prompt": "x", "width": 1000, "height": 3 });
    let response = post_json_auth(test.router(), "/api/v1/images/generate", body, &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(nuts_of(&pool, user.id).await, 5);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn webhook_with_inline_output_completes_image(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "finisher", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    let image = generate_image(&test, &token).await;
    let id = image["id"].as_i64().unwrap();

    complete_last_job(&test).await;

    let json = expect_json(
        get_auth(test.router(), &format!("/api/v1/images/{id}"), &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(
        json["data"]["image_url"],
        format!("https://cdn.test/images/{}/{id}.png", user.id)
    );

    let uploads = test.storage.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, b"\x89PNG fake image bytes");
    assert_eq!(uploads[0].2, "image/png");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn webhook_with_bad_signature_is_401(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "forged", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    let image = generate_image(&test, &token).await;

    let uri = format!("/api/v1/webhooks/gpu?kind=image&id={}&sig=deadbeef", image["id"]);
    let body = serde_json::json!({ "id": "job-1", "status": "FAILED" });
    let response = post_json(test.router(), &uri, body).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(nuts_of(&pool, user.id).await, 4);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failed_job_refunds_exactly_once(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "unlucky", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    let image = generate_image(&test, &token).await;
    let path = last_webhook_path(&test);

    let body = serde_json::json!({ "id": "job-1", "status": "FAILED", "error": "OOM" });
    for _ in 0..2 {
        let response = post_json(test.router(), &path, body.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(nuts_of(&pool, user.id).await, 5);
    let json = expect_json(
        get_auth(test.router(), &format!("/api/v1/images/{}", image["id"]), &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["status"], "failed");
    assert_eq!(json["data"]["error_message"], "OOM");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn completed_image_ignores_late_failure(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "steady", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    let image = generate_image(&test, &token).await;
    complete_last_job(&test).await;

    let body = serde_json::json!({ "id": "job-1", "status": "FAILED" });
    post_json(test.router(), &last_webhook_path(&test), body).await;

    assert_eq!(nuts_of(&pool, user.id).await, 4);
    let json = expect_json(
        get_auth(test.router(), &format!("/api/v1/images/{}", image["id"]), &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["status"], "completed");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn submission_failure_refunds(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "stranded", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    test.gpu.fail_submit.store(true, Ordering::SeqCst);

    let body = serde_json::json!({ "prompt": "a lighthouse" });
    let response = post_json_auth(test.router(), "/api/v1/images/generate", body, &token).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(nuts_of(&pool, user.id).await, 5);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn private_image_is_hidden_from_others(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, owner_token) = user_with_token(&test, "owner", "user").await;
    let (_other, other_token) = user_with_token(&test, "snoop", "user").await;
    grant_nuts(&pool, owner.id, 5).await;
    let image = generate_image(&test, &owner_token).await;
    complete_last_job(&test).await;

    let uri = format!("/api/v1/images/{}", image["id"]);
    let response = get_auth(test.router(), &uri, &other_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = delete_auth(test.router(), &uri, &other_token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = delete_auth(test.router(), &uri, &owner_token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(test.storage.deleted.lock().unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn publishing_sends_image_to_moderation(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "exhibitor", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    let image = generate_image(&test, &token).await;
    complete_last_job(&test).await;

    let uri = format!("/api/v1/images/{}", image["id"]);
    let json = expect_json(
        patch_json_auth(test.router(), &uri, serde_json::json!({ "is_public": true }), &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["is_public"], true);
    assert_eq!(json["data"]["moderation_status"], "pending");

    let gallery = expect_json(
        common::get(test.router(), "/api/v1/gallery/images").await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(gallery["data"].as_array().unwrap().len(), 0);

    let json = expect_json(
        patch_json_auth(test.router(), &uri, serde_json::json!({ "is_public": false }), &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["moderation_status"], "private");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn upscale_requires_completed_source(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "enlarger", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    let image = generate_image(&test, &token).await;
    let uri = format!("/api/v1/images/{}/upscale", image["id"]);

    let response = post_json_auth(test.router(), &uri, serde_json::json!({ "scale": 2 }), &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    complete_last_job(&test).await;
    let json = expect_json(
        post_json_auth(test.router(), &uri, serde_json::json!({ "scale": 2 }), &token).await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(json["data"]["kind"], "upscale");
    assert_eq!(json["data"]["parent_image_id"], image["id"]);
    assert_eq!(json["data"]["width"], 1536);
    assert_eq!(nuts_of(&pool, user.id).await, 3);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn oversized_upscale_is_rejected_before_charging(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "zoomer", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    let image = generate_image(&test, &token).await;
    complete_last_job(&test).await;
    // Stand-in for an image that has already been upscaled twice.
    sqlx::query("UPDATE generated_images SET width = 6144, height = 6144 WHERE id = $1")
        .bind(image["id"].as_i64().unwrap())
        .execute(&pool)
        .await
        .unwrap();
    let nuts_before = nuts_of(&pool, user.id).await;

    let json = expect_json(
        post_json_auth(
            test.router(),
            &format!("/api/v1/images/{}/upscale", image["id"]),
            serde_json::json!({ "scale": 4 }),
            &token,
        )
        .await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(nuts_of(&pool, user.id).await, nuts_before);
}

// ---------------------------------------------------------------------------
// Videos
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn video_from_completed_image(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "director", "user").await;
    grant_nuts(&pool, user.id, 10).await;
    let image = generate_image(&test, &token).await;
    complete_last_job(&test).await;

    let body = serde_json::json!({ "image_id": image["id"], "prompt": "slow pan" });
    let json = expect_json(
        post_json_auth(test.router(), "/api/v1/videos/generate", body.clone(), &token).await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(json["data"]["kind"], "img2video");
    assert_eq!(json["data"]["status"], "pending");
    assert_eq!(nuts_of(&pool, user.id).await, 4);

    match &test.gpu.submissions.lock().unwrap().last().unwrap().0 {
        GpuInput::Img2Video { image_url, .. } => {
            assert!(image_url.starts_with("https://cdn.test/images/"));
        }
        other => panic!("expected img2video, got {other:?}"),
    }

    // Free tier: one video a day.
    let response = post_json_auth(test.router(), "/api/v1/videos/generate", body, &token).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn reconciler_polls_jobs_without_webhook(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "patient", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    let image = generate_image(&test, &token).await;

    // Fresh jobs are left to their webhook.
    reconcile_once(&test.state).await;
    let status: String = sqlx::query_scalar("SELECT status FROM generated_images WHERE id = $1")
        .bind(image["id"].as_i64().unwrap())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "pending");

    sqlx::query("UPDATE generated_images SET created_at = NOW() - INTERVAL '5 minutes' WHERE id = $1")
        .bind(image["id"].as_i64().unwrap())
        .execute(&pool)
        .await
        .unwrap();
    reconcile_once(&test.state).await;
    let status: String = sqlx::query_scalar("SELECT status FROM generated_images WHERE id = $1")
        .bind(image["id"].as_i64().unwrap())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "processing");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reconciler_fails_timed_out_jobs(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "abandoned", "user").await;
    grant_nuts(&pool, user.id, 5).await;
    let image = generate_image(&test, &token).await;
    assert_eq!(nuts_of(&pool, user.id).await, 4);

    sqlx::query("UPDATE generated_images SET created_at = NOW() - INTERVAL '2 hours' WHERE id = $1")
        .bind(image["id"].as_i64().unwrap())
        .execute(&pool)
        .await
        .unwrap();
    reconcile_once(&test.state).await;

    let json = expect_json(
        get_auth(test.router(), &format!("/api/v1/images/{}", image["id"]), &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["status"], "failed");
    assert_eq!(json["data"]["error_message"], "Generation timed out");
    assert_eq!(nuts_of(&pool, user.id).await, 5);
}
