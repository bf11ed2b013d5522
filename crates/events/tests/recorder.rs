use muse_db::models::user::CreateUser;
use muse_db::repositories::{EventRepo, UserRepo};
use muse_events::{event_types, EventBus, EventRecorder, PlatformEvent};
use sqlx::PgPool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn recorder_stores_everything_published_before_close(pool: PgPool) {
    let bus = EventBus::default();
    let task = tokio::spawn(EventRecorder::new(pool.clone()).run(bus.subscribe()));

    for id in 1..=5 {
        bus.publish(PlatformEvent::new(event_types::IMAGE_COMPLETED).with_source("image", id));
    }
    drop(bus);

    let stats = task.await.unwrap();
    assert_eq!(stats.stored, 5);
    assert_eq!(stats.failed, 0);

    let rows = EventRepo::list_recent(&pool, 10, 0).await.unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.event_type == "image.completed"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn bad_row_does_not_sink_its_batch(pool: PgPool) {
    let user = UserRepo::create(
        &pool,
        &CreateUser {
            username: "ada".into(),
            email: "ada@example.com".into(),
            password_hash: "hash".into(),
            role_id: 3,
        },
    )
    .await
    .unwrap();

    let mut recorder = EventRecorder::new(pool.clone());
    let mut batch = vec![
        PlatformEvent::new(event_types::USER_REGISTERED).with_actor(user.id),
        // Unknown actor violates the users foreign key.
        PlatformEvent::new(event_types::NUTS_ADJUSTED).with_actor(999_999),
        PlatformEvent::new(event_types::NUTS_ADJUSTED).with_actor(user.id),
    ];
    recorder.flush(&mut batch).await;

    assert!(batch.is_empty());
    assert_eq!(recorder.stats().stored, 2);
    assert_eq!(recorder.stats().failed, 1);
    assert_eq!(EventRepo::list_recent(&pool, 10, 0).await.unwrap().len(), 2);
}
