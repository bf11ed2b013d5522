//! Integration tests for user lookup, profile edits and one-time tokens.

use chrono::{Duration, Utc};
use muse_db::models::user::{CreateUser, UpdateProfile};
use muse_db::repositories::{AuthTokenRepo, UserRepo};
use sqlx::PgPool;

async fn new_user(pool: &PgPool, name: &str) -> i64 {
    let input = CreateUser {
        username: name.to_string(),
        email: format!("{name}@Example.com"),
        password_hash: "hash".to_string(),
        role_id: 3,
    };
    UserRepo::create(pool, &input).await.unwrap().id
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn login_matches_username_or_email(pool: PgPool) {
    let id = new_user(&pool, "carol").await;

    let by_name = UserRepo::find_by_login(&pool, "carol").await.unwrap().unwrap();
    let by_email = UserRepo::find_by_login(&pool, "CAROL@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name.id, id);
    assert_eq!(by_email.id, id);
    assert!(UserRepo::find_by_login(&pool, "nobody").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_username_violates_named_constraint(pool: PgPool) {
    new_user(&pool, "dave").await;
    let input = CreateUser {
        username: "dave".to_string(),
        email: "other@example.com".to_string(),
        password_hash: "hash".to_string(),
        role_id: 3,
    };
    let err = UserRepo::create(&pool, &input).await.unwrap_err();
    let db_err = err.as_database_error().unwrap();
    assert_eq!(db_err.constraint(), Some("uq_users_username"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn email_change_clears_verification(pool: PgPool) {
    let id = new_user(&pool, "erin").await;
    UserRepo::mark_email_verified(&pool, id).await.unwrap();

    let same = UpdateProfile {
        username: None,
        email: Some("ERIN@example.com".to_string()),
    };
    let user = UserRepo::update_profile(&pool, id, &same).await.unwrap().unwrap();
    assert!(user.email_verified_at.is_some());

    let changed = UpdateProfile {
        username: None,
        email: Some("erin@new.example.com".to_string()),
    };
    let user = UserRepo::update_profile(&pool, id, &changed).await.unwrap().unwrap();
    assert!(user.email_verified_at.is_none());
    assert_eq!(user.email, "erin@new.example.com");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn tokens_are_single_use_and_expire(pool: PgPool) {
    let id = new_user(&pool, "frank").await;
    let in_an_hour = Utc::now() + Duration::hours(1);

    AuthTokenRepo::create(&pool, id, "verify_email", "h1", in_an_hour)
        .await
        .unwrap();
    // Wrong purpose does not consume it.
    assert!(AuthTokenRepo::consume(&pool, "reset_password", "h1")
        .await
        .unwrap()
        .is_none());
    assert!(AuthTokenRepo::consume(&pool, "verify_email", "h1")
        .await
        .unwrap()
        .is_some());
    assert!(AuthTokenRepo::consume(&pool, "verify_email", "h1")
        .await
        .unwrap()
        .is_none());

    AuthTokenRepo::create(&pool, id, "reset_password", "h2", Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    assert!(AuthTokenRepo::consume(&pool, "reset_password", "h2")
        .await
        .unwrap()
        .is_none());
}
