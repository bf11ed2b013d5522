//! Integration tests for the subscription swap and lifecycle transitions.

use chrono::{Duration, Utc};
use muse_db::models::plan::CreatePlan;
use muse_db::models::subscription::ActivateSubscription;
use muse_db::models::user::CreateUser;
use muse_db::repositories::{PlanRepo, SubscriptionRepo, UserRepo, WebhookEventRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn new_user(pool: &PgPool, name: &str) -> i64 {
    let input = CreateUser {
        username: name.to_string(),
        email: format!("{name}@example.com"),
        password_hash: "hash".to_string(),
        role_id: 3,
    };
    UserRepo::create(pool, &input).await.unwrap().id
}

async fn new_plan(pool: &PgPool, code: &str, monthly_nuts: i32) -> i64 {
    let input = CreatePlan {
        code: code.to_string(),
        name: code.to_uppercase(),
        description: None,
        price_cents: 999,
        currency: None,
        billing_interval: None,
        monthly_nuts: Some(monthly_nuts),
        daily_image_limit: Some(50),
        daily_video_limit: None,
        daily_message_limit: None,
        stripe_price_id: None,
        paypal_plan_id: None,
        sort_order: None,
    };
    PlanRepo::create(pool, &input).await.unwrap().id
}

fn activation(user_id: i64, plan_id: i64, provider_ref: &str, nuts: i64) -> ActivateSubscription {
    let start = Utc::now();
    ActivateSubscription {
        user_id,
        plan_id,
        provider: "stripe".to_string(),
        provider_subscription_id: Some(provider_ref.to_string()),
        period_start: start,
        period_end: start + Duration::days(30),
        grant_nuts: nuts,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn activating_while_active_cancels_the_old_one_first(pool: PgPool) {
    let user_id = new_user(&pool, "swapper").await;
    let basic = new_plan(&pool, "basic", 100).await;
    let pro = new_plan(&pool, "pro", 500).await;

    let first = SubscriptionRepo::activate(&pool, &activation(user_id, basic, "sub_1", 100))
        .await
        .unwrap();
    assert!(first.created);
    assert!(first.replaced.is_empty());

    let second = SubscriptionRepo::activate(&pool, &activation(user_id, pro, "sub_2", 500))
        .await
        .unwrap();
    assert!(second.created);
    assert_eq!(second.replaced.len(), 1);
    assert_eq!(second.replaced[0].id, first.subscription.id);
    assert_eq!(second.replaced[0].status, "canceled");

    let current = SubscriptionRepo::find_current_for_user(&pool, user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.id, second.subscription.id);
    assert_eq!(current.plan_id, pro);

    let old = SubscriptionRepo::find_by_id(&pool, first.subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(old.status, "canceled");
    assert!(old.canceled_at.is_some());

    let user = UserRepo::find_by_id(&pool, user_id).await.unwrap().unwrap();
    assert_eq!(user.nuts, 600);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn replayed_activation_is_a_no_op(pool: PgPool) {
    let user_id = new_user(&pool, "replayer").await;
    let plan = new_plan(&pool, "basic", 100).await;

    let input = activation(user_id, plan, "sub_same", 100);
    SubscriptionRepo::activate(&pool, &input).await.unwrap();
    let replay = SubscriptionRepo::activate(&pool, &input).await.unwrap();

    assert!(!replay.created);
    let user = UserRepo::find_by_id(&pool, user_id).await.unwrap().unwrap();
    assert_eq!(user.nuts, 100);
    assert_eq!(SubscriptionRepo::list_for_user(&pool, user_id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn renewal_reactivates_past_due_and_grants(pool: PgPool) {
    let user_id = new_user(&pool, "renewer").await;
    let plan = new_plan(&pool, "basic", 100).await;
    let sub = SubscriptionRepo::activate(&pool, &activation(user_id, plan, "sub_r", 100))
        .await
        .unwrap()
        .subscription;

    let past_due = SubscriptionRepo::mark_past_due(&pool, sub.id).await.unwrap().unwrap();
    assert_eq!(past_due.status, "past_due");

    let start = sub.current_period_end;
    let renewed = SubscriptionRepo::renew(&pool, sub.id, start, start + Duration::days(30), 100)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renewed.status, "active");
    assert_eq!(renewed.current_period_start, start);

    let user = UserRepo::find_by_id(&pool, user_id).await.unwrap().unwrap();
    assert_eq!(user.nuts, 200);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn period_ended_rows_can_be_expired(pool: PgPool) {
    let user_id = new_user(&pool, "expirer").await;
    let plan = new_plan(&pool, "basic", 0).await;
    let past = Utc::now() - Duration::days(40);
    let input = ActivateSubscription {
        user_id,
        plan_id: plan,
        provider: "manual".to_string(),
        provider_subscription_id: None,
        period_start: past,
        period_end: past + Duration::days(30),
        grant_nuts: 0,
    };
    let sub = SubscriptionRepo::activate(&pool, &input).await.unwrap().subscription;

    let due = SubscriptionRepo::list_period_ended(&pool, Utc::now()).await.unwrap();
    assert_eq!(due.len(), 1);

    let expired = SubscriptionRepo::expire(&pool, sub.id).await.unwrap().unwrap();
    assert_eq!(expired.status, "expired");
    assert!(SubscriptionRepo::find_current_for_user(&pool, user_id)
        .await
        .unwrap()
        .is_none());
    // Expiring twice matches nothing.
    assert!(SubscriptionRepo::expire(&pool, sub.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn webhook_events_are_recorded_once(pool: PgPool) {
    assert!(WebhookEventRepo::record_once(&pool, "stripe", "evt_1", "invoice.paid")
        .await
        .unwrap());
    assert!(!WebhookEventRepo::record_once(&pool, "stripe", "evt_1", "invoice.paid")
        .await
        .unwrap());
    // Same id from another provider is a different event.
    assert!(WebhookEventRepo::record_once(&pool, "paypal", "evt_1", "PAYMENT.SALE.COMPLETED")
        .await
        .unwrap());

    WebhookEventRepo::forget(&pool, "stripe", "evt_1").await.unwrap();
    assert!(WebhookEventRepo::record_once(&pool, "stripe", "evt_1", "invoice.paid")
        .await
        .unwrap());
}
