//! Plans, checkout, payment webhooks and the subscription lifecycle.

mod common;

use axum::http::StatusCode;
use common::{
    expect_json, get, get_auth, nuts_of, post_json_auth, post_raw, spawn_app, user_with_token,
    TestApp, FAKE_SIGNATURE_HEADER,
};
use muse_api::background::subscription_expiry::expire_due;
use muse_core::types::DbId;
use muse_db::models::plan::{CreatePlan, Plan};
use muse_db::repositories::{PlanRepo, SubscriptionRepo};
use sqlx::PgPool;

async fn create_plan(pool: &PgPool, code: &str, monthly_nuts: i32, sort_order: i32) -> Plan {
    PlanRepo::create(
        pool,
        &CreatePlan {
            code: code.to_string(),
            name: code.to_uppercase(),
            description: Some(format!("The {code} plan")),
            price_cents: 999,
            currency: None,
            billing_interval: None,
            monthly_nuts: Some(monthly_nuts),
            daily_image_limit: None,
            daily_video_limit: Some(10),
            daily_message_limit: None,
            stripe_price_id: Some(format!("price_{code}")),
            paypal_plan_id: None,
            sort_order: Some(sort_order),
        },
    )
    .await
    .unwrap()
}

async fn webhook(test: &TestApp, signature: &str, body: serde_json::Value) -> axum::response::Response {
    post_raw(
        test.router(),
        "/api/v1/webhooks/stripe",
        &[
            ("content-type", "application/json"),
            (FAKE_SIGNATURE_HEADER, signature),
        ],
        body.to_string(),
    )
    .await
}

async fn activate(test: &TestApp, event_id: &str, user_id: DbId, plan_id: DbId, reference: &str) {
    let response = webhook(
        test,
        "ok",
        serde_json::json!({
            "id": event_id,
            "type": "customer.subscription.created",
            "kind": "activated",
            "user_id": user_id,
            "plan_id": plan_id,
            "subscription_id": reference,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Plans and checkout
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn plans_are_public_and_ordered(pool: PgPool) {
    let test = spawn_app(pool.clone());
    create_plan(&pool, "premium", 500, 2).await;
    create_plan(&pool, "plus", 100, 1).await;

    let json = expect_json(get(test.router(), "/api/v1/plans").await, StatusCode::OK).await;
    let plans = json["data"].as_array().unwrap();
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0]["code"], "plus");
    assert_eq!(plans[1]["code"], "premium");
    assert!(plans[0].get("stripe_price_id").is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn checkout_opens_provider_session(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "buyer", "user").await;
    let plan = create_plan(&pool, "plus", 100, 1).await;

    let json = expect_json(
        post_json_auth(
            test.router(),
            "/api/v1/subscriptions/checkout",
            serde_json::json!({ "plan_id": plan.id, "provider": "stripe" }),
            &token,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["provider"], "stripe");
    assert!(json["data"]["checkout_url"].as_str().unwrap().starts_with("https://pay.test/"));

    let checkouts = test.payments.checkouts.lock().unwrap();
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].user_id, user.id);
    assert_eq!(checkouts[0].stripe_price_id.as_deref(), Some("price_plus"));
    assert_eq!(checkouts[0].success_url, "http://app.test/billing/success");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn checkout_rejects_unavailable_providers(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (_, token) = user_with_token(&test, "shopper", "user").await;
    let plan = create_plan(&pool, "plus", 100, 1).await;

    for provider in ["manual", "paypal"] {
        let response = post_json_auth(
            test.router(),
            "/api/v1/subscriptions/checkout",
            serde_json::json!({ "plan_id": plan.id, "provider": provider }),
            &token,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "provider {provider}");
    }

    let response = post_json_auth(
        test.router(),
        "/api/v1/subscriptions/checkout",
        serde_json::json!({ "plan_id": 999_999, "provider": "stripe" }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn activation_webhook_grants_plan_once(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "subscriber", "user").await;
    let plan = create_plan(&pool, "plus", 100, 1).await;

    activate(&test, "evt_1", user.id, plan.id, "sub_1").await;
    assert_eq!(nuts_of(&pool, user.id).await, 100);

    let current = expect_json(
        get_auth(test.router(), "/api/v1/subscriptions/current", &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(current["data"]["status"], "active");
    assert_eq!(current["data"]["plan"]["code"], "plus");

    // Redelivery of the same event is acknowledged and skipped.
    let body = serde_json::json!({
        "id": "evt_1",
        "kind": "activated",
        "user_id": user.id,
        "plan_id": plan.id,
        "subscription_id": "sub_1",
    });
    let json = expect_json(webhook(&test, "ok", body).await, StatusCode::OK).await;
    assert_eq!(json["duplicate"], true);
    assert_eq!(nuts_of(&pool, user.id).await, 100);

    // Plan limits now apply.
    let me = expect_json(get_auth(test.router(), "/api/v1/me", &token).await, StatusCode::OK).await;
    assert!(me["data"]["usage"]["images"]["limit"].is_null());
    assert_eq!(me["data"]["usage"]["videos"]["limit"], 10);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn webhook_with_bad_signature_is_401(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, _) = user_with_token(&test, "forged", "user").await;
    let plan = create_plan(&pool, "plus", 100, 1).await;

    let response = webhook(
        &test,
        "nope",
        serde_json::json!({
            "id": "evt_forged",
            "kind": "activated",
            "user_id": user.id,
            "plan_id": plan.id,
            "subscription_id": "sub_forged",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(nuts_of(&pool, user.id).await, 0);
    assert!(SubscriptionRepo::find_current_for_user(&pool, user.id)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn switching_plans_cancels_previous_at_provider(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, _) = user_with_token(&test, "upgrader", "user").await;
    let plus = create_plan(&pool, "plus", 100, 1).await;
    let premium = create_plan(&pool, "premium", 500, 2).await;

    activate(&test, "evt_a", user.id, plus.id, "sub_a").await;
    activate(&test, "evt_b", user.id, premium.id, "sub_b").await;

    let current = SubscriptionRepo::find_current_for_user(&pool, user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.plan_id, premium.id);
    assert_eq!(nuts_of(&pool, user.id).await, 600);
    assert_eq!(
        *test.payments.cancellations.lock().unwrap(),
        vec![("sub_a".to_string(), false)]
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn payment_failure_then_end(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "lapsed", "user").await;
    let plan = create_plan(&pool, "plus", 100, 1).await;
    activate(&test, "evt_1", user.id, plan.id, "sub_1").await;

    let failed = serde_json::json!({ "id": "evt_2", "kind": "payment_failed", "subscription_id": "sub_1" });
    expect_json(webhook(&test, "ok", failed).await, StatusCode::OK).await;
    let current = expect_json(
        get_auth(test.router(), "/api/v1/subscriptions/current", &token).await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(current["data"]["status"], "past_due");

    let ended = serde_json::json!({ "id": "evt_3", "kind": "ended", "subscription_id": "sub_1" });
    expect_json(webhook(&test, "ok", ended).await, StatusCode::OK).await;
    let current = expect_json(
        get_auth(test.router(), "/api/v1/subscriptions/current", &token).await,
        StatusCode::OK,
    )
    .await;
    assert!(current["data"].is_null());
}

// ---------------------------------------------------------------------------
// Cancellation and expiry
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_keeps_access_until_period_end(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, token) = user_with_token(&test, "leaver", "user").await;
    let plan = create_plan(&pool, "plus", 100, 1).await;

    let response = post_json_auth(
        test.router(),
        "/api/v1/subscriptions/cancel",
        serde_json::json!({}),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    activate(&test, "evt_1", user.id, plan.id, "sub_1").await;
    let json = expect_json(
        post_json_auth(
            test.router(),
            "/api/v1/subscriptions/cancel",
            serde_json::json!({}),
            &token,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(json["data"]["status"], "active");
    assert_eq!(json["data"]["cancel_at_period_end"], true);
    assert_eq!(
        *test.payments.cancellations.lock().unwrap(),
        vec![("sub_1".to_string(), true)]
    );

    // Period not over yet: nothing to expire.
    assert_eq!(expire_due(&test.state).await.unwrap(), 0);

    sqlx::query("UPDATE subscriptions SET current_period_end = NOW() - INTERVAL '1 hour' WHERE user_id = $1")
        .bind(user.id)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(expire_due(&test.state).await.unwrap(), 1);
    assert!(SubscriptionRepo::find_current_for_user(&pool, user.id)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn provider_renewals_are_not_expired_early(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (user, _) = user_with_token(&test, "renewer", "user").await;
    let plan = create_plan(&pool, "plus", 100, 1).await;
    activate(&test, "evt_1", user.id, plan.id, "sub_1").await;

    sqlx::query("UPDATE subscriptions SET current_period_end = NOW() - INTERVAL '1 hour' WHERE user_id = $1")
        .bind(user.id)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(expire_due(&test.state).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_grants_manual_subscription(pool: PgPool) {
    let test = spawn_app(pool.clone());
    let (_, admin) = user_with_token(&test, "boss", "admin").await;
    let (user, token) = user_with_token(&test, "lucky", "user").await;
    let plan = create_plan(&pool, "premium", 500, 1).await;
    let uri = format!("/api/v1/admin/users/{}/subscription", user.id);

    let response = post_json_auth(
        test.router(),
        &uri,
        serde_json::json!({ "plan_id": plan.id, "months": 25 }),
        &admin,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json_auth(
        test.router(),
        &uri,
        serde_json::json!({ "plan_id": plan.id, "months": 3 }),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let json = expect_json(
        post_json_auth(
            test.router(),
            &uri,
            serde_json::json!({ "plan_id": plan.id, "months": 3 }),
            &admin,
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(json["data"]["provider"], "manual");
    assert_eq!(json["data"]["status"], "active");
    assert_eq!(nuts_of(&pool, user.id).await, 500);

    // Manual grants lapse on their own once the period is over.
    sqlx::query("UPDATE subscriptions SET current_period_end = NOW() - INTERVAL '1 minute' WHERE user_id = $1")
        .bind(user.id)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(expire_due(&test.state).await.unwrap(), 1);
}
