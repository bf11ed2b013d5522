//! Integration tests for images, votes, comments and chat history.

use muse_core::voting::VoteType;
use muse_db::models::character::CreateCharacter;
use muse_db::models::image::{CreateImage, GallerySort};
use muse_db::models::user::CreateUser;
use muse_db::repositories::{
    CharacterRepo, ChatMessageRepo, CommentRepo, ImageRepo, UserRepo, VoteRepo,
};
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

fn new_image(user_id: i64, is_public: bool) -> CreateImage {
    CreateImage {
        user_id,
        category_id: None,
        character_id: None,
        parent_image_id: None,
        kind: "generation".to_string(),
        prompt: "a lighthouse at dusk".to_string(),
        negative_prompt: None,
        full_prompt: "a lighthouse at dusk".to_string(),
        style: None,
        width: 768,
        height: 1024,
        seed: None,
        nuts_cost: 1,
        is_public,
    }
}

fn new_character(name: &str) -> CreateCharacter {
    CreateCharacter {
        name: name.to_string(),
        tagline: None,
        personality: Some("Warm and curious".to_string()),
        appearance: None,
        scenario: None,
        greeting: Some("Hello!".to_string()),
        voice_id: None,
        avatar_url: None,
        is_public: None,
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn public_image_enters_moderation_queue(pool: PgPool) {
    let user_id = new_user(&pool, "artist").await;

    let public = ImageRepo::create(&pool, &new_image(user_id, true)).await.unwrap();
    let private = ImageRepo::create(&pool, &new_image(user_id, false)).await.unwrap();
    assert_eq!(public.status, "pending");
    assert_eq!(public.moderation_status, "pending");
    assert_eq!(private.moderation_status, "private");
    assert_eq!(public.upvotes, Some(0));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn terminal_status_is_final(pool: PgPool) {
    let user_id = new_user(&pool, "finisher").await;
    let image = ImageRepo::create(&pool, &new_image(user_id, false)).await.unwrap();

    let processing = ImageRepo::mark_processing(&pool, image.id).await.unwrap().unwrap();
    assert_eq!(processing.status, "processing");

    let done = ImageRepo::mark_completed(&pool, image.id, "https://cdn/x.png", "images/x.png")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, "completed");
    assert!(done.completed_at.is_some());

    // A late failure callback must not overwrite the completed row.
    assert!(ImageRepo::mark_failed(&pool, image.id, "late").await.unwrap().is_none());
    assert!(ImageRepo::mark_processing(&pool, image.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn gallery_shows_only_approved_completed_public(pool: PgPool) {
    let user_id = new_user(&pool, "curator").await;
    let moderator = new_user(&pool, "moderator1").await;

    let approved = ImageRepo::create(&pool, &new_image(user_id, true)).await.unwrap();
    ImageRepo::mark_completed(&pool, approved.id, "https://cdn/a.png", "images/a.png")
        .await
        .unwrap();
    ImageRepo::moderate(&pool, approved.id, "approved", None, moderator)
        .await
        .unwrap();

    let pending = ImageRepo::create(&pool, &new_image(user_id, true)).await.unwrap();
    ImageRepo::mark_completed(&pool, pending.id, "https://cdn/b.png", "images/b.png")
        .await
        .unwrap();

    let gallery = ImageRepo::gallery(&pool, None, None, GallerySort::New, 20, 0)
        .await
        .unwrap();
    assert_eq!(gallery.len(), 1);
    assert_eq!(gallery[0].id, approved.id);
    assert_eq!(gallery[0].username, "curator");

    let queue = ImageRepo::moderation_queue(&pool, "pending", 20, 0).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, pending.id);
}

// ---------------------------------------------------------------------------
// Voting
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn voting_twice_with_same_type_removes_the_vote(pool: PgPool) {
    let owner = new_user(&pool, "owner").await;
    let voter = new_user(&pool, "voter").await;
    let image = ImageRepo::create(&pool, &new_image(owner, true)).await.unwrap();

    let first = VoteRepo::cast(&pool, image.id, voter, VoteType::Up).await.unwrap().unwrap();
    assert_eq!((first.upvotes, first.downvotes), (1, 0));
    assert_eq!(first.user_vote, Some(VoteType::Up));

    let second = VoteRepo::cast(&pool, image.id, voter, VoteType::Up).await.unwrap().unwrap();
    assert_eq!((second.upvotes, second.downvotes), (0, 0));
    assert_eq!(second.user_vote, None);

    let tally = VoteRepo::tally(&pool, image.id, voter).await.unwrap().unwrap();
    assert_eq!(tally.user_vote, None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn opposite_vote_switches(pool: PgPool) {
    let owner = new_user(&pool, "owner").await;
    let voter = new_user(&pool, "voter").await;
    let image = ImageRepo::create(&pool, &new_image(owner, true)).await.unwrap();

    VoteRepo::cast(&pool, image.id, voter, VoteType::Up).await.unwrap();
    let switched = VoteRepo::cast(&pool, image.id, voter, VoteType::Down)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((switched.upvotes, switched.downvotes), (0, 1));
    assert_eq!(switched.user_vote, Some(VoteType::Down));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn null_counters_are_treated_as_zero(pool: PgPool) {
    let owner = new_user(&pool, "owner").await;
    let voter = new_user(&pool, "voter").await;
    let image = ImageRepo::create(&pool, &new_image(owner, true)).await.unwrap();
    sqlx::query("UPDATE generated_images SET upvotes = NULL, downvotes = NULL WHERE id = $1")
        .bind(image.id)
        .execute(&pool)
        .await
        .unwrap();

    let tally = VoteRepo::cast(&pool, image.id, voter, VoteType::Down)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((tally.upvotes, tally.downvotes), (0, 1));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn vote_on_missing_image_returns_none(pool: PgPool) {
    let voter = new_user(&pool, "voter").await;
    assert!(VoteRepo::cast(&pool, 9999, voter, VoteType::Up).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn comment_count_follows_comments(pool: PgPool) {
    let owner = new_user(&pool, "owner").await;
    let image = ImageRepo::create(&pool, &new_image(owner, true)).await.unwrap();

    let first = CommentRepo::create(&pool, image.id, owner, "first!").await.unwrap();
    CommentRepo::create(&pool, image.id, owner, "second").await.unwrap();

    let listed = CommentRepo::list_for_image(&pool, image.id, 10, 0).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].body, "first!");
    assert_eq!(listed[0].username, "owner");

    assert!(CommentRepo::delete(&pool, first.id).await.unwrap());
    assert!(!CommentRepo::delete(&pool, first.id).await.unwrap());

    let image = ImageRepo::find_by_id(&pool, image.id).await.unwrap().unwrap();
    assert_eq!(image.comment_count, Some(1));
}

// ---------------------------------------------------------------------------
// Companions & chat
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn companions_visibility(pool: PgPool) {
    let alice = new_user(&pool, "alice").await;
    let bob = new_user(&pool, "bob").await;

    CharacterRepo::create(&pool, None, &new_character("System")).await.unwrap();
    CharacterRepo::create(&pool, Some(alice), &new_character("Private")).await.unwrap();

    let for_alice = CharacterRepo::list_visible(&pool, alice, 20, 0).await.unwrap();
    let for_bob = CharacterRepo::list_visible(&pool, bob, 20, 0).await.unwrap();
    assert_eq!(for_alice.len(), 2);
    assert_eq!(for_bob.len(), 1);
    assert_eq!(for_bob[0].name, "System");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn chat_pages_are_oldest_first(pool: PgPool) {
    let user_id = new_user(&pool, "talker").await;
    let character = CharacterRepo::create(&pool, None, &new_character("Muse"))
        .await
        .unwrap();

    for i in 0..3 {
        ChatMessageRepo::create_exchange(
            &pool,
            user_id,
            character.id,
            &format!("q{i}"),
            &format!("a{i}"),
        )
        .await
        .unwrap();
    }

    let page = ChatMessageRepo::page(&pool, user_id, character.id, 4, None).await.unwrap();
    let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["q1", "a1", "q2", "a2"]);

    let older = ChatMessageRepo::page(&pool, user_id, character.id, 4, Some(page[0].id))
        .await
        .unwrap();
    let contents: Vec<&str> = older.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["q0", "a0"]);

    assert_eq!(ChatMessageRepo::clear(&pool, user_id, character.id).await.unwrap(), 6);
}
