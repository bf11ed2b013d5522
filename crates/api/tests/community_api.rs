//! Votes, comments, the gallery and the moderation queue.

mod common;

use axum::http::StatusCode;
use common::{
    delete_auth, expect_json, get, get_auth, patch_json_auth, post_json_auth, spawn_app,
    user_with_token,
};
use muse_core::types::DbId;
use muse_db::models::image::{CreateImage, GeneratedImage};
use muse_db::repositories::ImageRepo;
use sqlx::PgPool;

/// Insert a completed image for `user_id`, optionally published and
/// approved.
async fn completed_image(pool: &PgPool, user_id: DbId, approved: bool) -> GeneratedImage {
    let image = ImageRepo::create(
        pool,
        &CreateImage {
            user_id,
            category_id: None,
            character_id: None,
            parent_image_id: None,
            kind: "generation".into(),
            prompt: "a quiet harbour at dusk".into(),
            negative_prompt: None,
            full_prompt: "a quiet harbour at dusk".into(),
            style: None,
            width: 768,
            height: 1024,
            seed: None,
            nuts_cost: 1,
            is_public: false,
        },
    )
    .await
    .unwrap();
    let path = format!("images/{user_id}/{}.png", image.id);
    let image = ImageRepo::mark_completed(pool, image.id, &format!("https://cdn.test/{path}"), &path)
        .await
        .unwrap()
        .unwrap();
    if !approved {
        return image;
    }
    ImageRepo::set_visibility(pool, image.id, true, "approved")
        .await
        .unwrap()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn vote_toggle_and_switch(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, _) = user_with_token(&test, "artist", "user").await;
    let (_, voter) = user_with_token(&test, "fan", "user").await;
    let image = completed_image(&pool, owner.id, true).await;
    let uri = format!("/api/v1/images/{}/vote", image.id);

    let up = serde_json::json!({ "vote_type": "up" });
    let json = expect_json(post_json_auth(test.router(), &uri, up.clone(), &voter).await, StatusCode::OK).await;
    assert_eq!(json["data"]["upvotes"], 1);
    assert_eq!(json["data"]["downvotes"], 0);
    assert_eq!(json["data"]["user_vote"], "up");

    let down = serde_json::json!({ "vote_type": "down" });
    let json = expect_json(post_json_auth(test.router(), &uri, down, &voter).await, StatusCode::OK).await;
    assert_eq!(json["data"]["upvotes"], 0);
    assert_eq!(json["data"]["downvotes"], 1);
    assert_eq!(json["data"]["user_vote"], "down");

    // Repeating the current vote removes it.
    let down = serde_json::json!({ "vote_type": "down" });
    let json = expect_json(post_json_auth(test.router(), &uri, down, &voter).await, StatusCode::OK).await;
    assert_eq!(json["data"]["downvotes"], 0);
    assert!(json["data"]["user_vote"].is_null());

    post_json_auth(test.router(), &uri, up, &voter).await;
    let json = expect_json(get_auth(test.router(), &uri, &voter).await, StatusCode::OK).await;
    assert_eq!(json["data"]["upvotes"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_vote_type_is_400(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, _) = user_with_token(&test, "artist", "user").await;
    let (_, voter) = user_with_token(&test, "critic", "user").await;
    let image = completed_image(&pool, owner.id, true).await;

    let uri = format!("/api/v1/images/{}/vote", image.id);
    let body = serde_json::json!({ "vote_type": "sideways" });
    let response = post_json_auth(test.router(), &uri, body, &voter).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cannot_vote_on_unpublished_image(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, _) = user_with_token(&test, "hermit", "user").await;
    let (_, voter) = user_with_token(&test, "peeker", "user").await;
    let image = completed_image(&pool, owner.id, false).await;

    let uri = format!("/api/v1/images/{}/vote", image.id);
    let body = serde_json::json!({ "vote_type": "up" });
    let response = post_json_auth(test.router(), &uri, body, &voter).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn comment_lifecycle(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, _) = user_with_token(&test, "artist", "user").await;
    let (_, author) = user_with_token(&test, "chatty", "user").await;
    let (_, bystander) = user_with_token(&test, "bystander", "user").await;
    let image = completed_image(&pool, owner.id, true).await;
    let uri = format!("/api/v1/images/{}/comments", image.id);

    let body = serde_json::json!({ "body": "   Lovely light!  " });
    let json = expect_json(
        post_json_auth(test.router(), &uri, body, &author).await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(json["data"]["body"], "Lovely light!");
    let comment_id = json["data"]["id"].as_i64().unwrap();

    // Public listing, no token needed.
    let json = expect_json(get(test.router(), &uri).await, StatusCode::OK).await;
    assert_eq!(json["data"][0]["username"], "chatty");

    let comment_uri = format!("/api/v1/comments/{comment_id}");
    let response = delete_auth(test.router(), &comment_uri, &bystander).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = delete_auth(test.router(), &comment_uri, &author).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn blank_comment_is_rejected(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, _) = user_with_token(&test, "artist", "user").await;
    let (_, author) = user_with_token(&test, "mumbler", "user").await;
    let image = completed_image(&pool, owner.id, true).await;

    let uri = format!("/api/v1/images/{}/comments", image.id);
    let body = serde_json::json!({ "body": "    " });
    let response = post_json_auth(test.router(), &uri, body, &author).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn moderator_removes_comment(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, _) = user_with_token(&test, "artist", "user").await;
    let (_, author) = user_with_token(&test, "troll", "user").await;
    let (_, moderator) = user_with_token(&test, "mod", "moderator").await;
    let image = completed_image(&pool, owner.id, true).await;

    let uri = format!("/api/v1/images/{}/comments", image.id);
    let json = expect_json(
        post_json_auth(test.router(), &uri, serde_json::json!({ "body": "spam" }), &author).await,
        StatusCode::CREATED,
    )
    .await;
    let comment_id = json["data"]["id"].as_i64().unwrap();

    let response = delete_auth(test.router(), &format!("/api/v1/admin/comments/{comment_id}"), &author).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = delete_auth(test.router(), &format!("/api/v1/admin/comments/{comment_id}"), &moderator).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

// ---------------------------------------------------------------------------
// Moderation and gallery
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn approve_publishes_to_gallery(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, owner_token) = user_with_token(&test, "artist", "user").await;
    let (_, moderator) = user_with_token(&test, "mod", "moderator").await;
    let image = completed_image(&pool, owner.id, false).await;

    patch_json_auth(
        test.router(),
        &format!("/api/v1/images/{}", image.id),
        serde_json::json!({ "is_public": true }),
        &owner_token,
    )
    .await;

    let response = get_auth(test.router(), "/api/v1/admin/moderation/images", &owner_token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let queue = expect_json(
        get_auth(test.router(), "/api/v1/admin/moderation/images", &moderator).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(queue["total"], 1);
    assert_eq!(queue["data"][0]["id"], image.id);

    let body = serde_json::json!({ "action": "approve", "note": "  " });
    let json = expect_json(
        post_json_auth(
            test.router(),
            &format!("/api/v1/admin/moderation/images/{}", image.id),
            body,
            &moderator,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["moderation_status"], "approved");
    assert!(json["data"]["moderation_note"].is_null());

    let gallery = expect_json(get(test.router(), "/api/v1/gallery/images").await, StatusCode::OK).await;
    let items = gallery["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["username"], "artist");

    // Anonymous viewers can now open it.
    let response = get(test.router(), &format!("/api/v1/images/{}", image.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn rejected_image_stays_out_of_gallery(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, owner_token) = user_with_token(&test, "artist", "user").await;
    let (_, moderator) = user_with_token(&test, "mod", "moderator").await;
    let image = completed_image(&pool, owner.id, false).await;
    let image_uri = format!("/api/v1/images/{}", image.id);

    patch_json_auth(test.router(), &image_uri, serde_json::json!({ "is_public": true }), &owner_token).await;

    let body = serde_json::json!({ "action": "reject", "note": "Off-topic" });
    let json = expect_json(
        post_json_auth(
            test.router(),
            &format!("/api/v1/admin/moderation/images/{}", image.id),
            body,
            &moderator,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["moderation_status"], "rejected");
    assert_eq!(json["data"]["moderation_note"], "Off-topic");

    let gallery = expect_json(get(test.router(), "/api/v1/gallery/images").await, StatusCode::OK).await;
    assert!(gallery["data"].as_array().unwrap().is_empty());

    // Publishing again puts it back in the queue.
    let json = expect_json(
        patch_json_auth(test.router(), &image_uri, serde_json::json!({ "is_public": true }), &owner_token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["moderation_status"], "pending");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn private_media_cannot_be_moderated(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (owner, _) = user_with_token(&test, "artist", "user").await;
    let (_, moderator) = user_with_token(&test, "mod", "moderator").await;
    let image = completed_image(&pool, owner.id, false).await;

    let body = serde_json::json!({ "action": "approve" });
    let response = post_json_auth(
        test.router(),
        &format!("/api/v1/admin/moderation/images/{}", image.id),
        body,
        &moderator,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get_auth(
        test.router(),
        "/api/v1/admin/moderation/images?status=private",
        &moderator,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
