//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod auth_token_repo;
pub mod category_repo;
pub mod character_repo;
pub mod chat_message_repo;
pub mod comment_repo;
pub mod credit_repo;
pub mod event_repo;
pub mod image_repo;
pub mod plan_repo;
pub mod role_repo;
pub mod session_repo;
pub mod subscription_repo;
pub mod user_repo;
pub mod video_repo;
pub mod vote_repo;
pub mod webhook_event_repo;

pub use auth_token_repo::AuthTokenRepo;
pub use category_repo::CategoryRepo;
pub use character_repo::CharacterRepo;
pub use chat_message_repo::ChatMessageRepo;
pub use comment_repo::CommentRepo;
pub use credit_repo::CreditRepo;
pub use event_repo::EventRepo;
pub use image_repo::ImageRepo;
pub use plan_repo::PlanRepo;
pub use role_repo::RoleRepo;
pub use session_repo::SessionRepo;
pub use subscription_repo::SubscriptionRepo;
pub use user_repo::UserRepo;
pub use video_repo::VideoRepo;
pub use vote_repo::VoteRepo;
pub use webhook_event_repo::WebhookEventRepo;
