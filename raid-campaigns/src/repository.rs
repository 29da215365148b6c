use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use eddybot_common::teloxide::types::{ChatId, UserId};

use crate::model::{CampaignState, Point, Post, Submission, UserProfile};

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn list_pending(&self, post_id: &str) -> Result<Vec<Submission>, anyhow::Error>;

    async fn count_pending(&self, post_id: &str) -> Result<usize, anyhow::Error>;

    async fn delete_all_pending(&self, post_id: &str) -> Result<(), anyhow::Error>;

    /// Stores the submission unless the user already has one for this post,
    /// or the same reply was already submitted for this post by anyone. The
    /// existing submission is kept as is.
    async fn create_submission(
        &self,
        submission: Submission,
    ) -> Result<SubmissionInsert, anyhow::Error>;

    /// Deletes one user's pending submission, if any.
    async fn delete_submission(&self, post_id: &str, user_id: UserId)
        -> Result<(), anyhow::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionInsert {
    Created,
    UserAlreadySubmitted,
    ReplyAlreadySubmitted,
}

#[async_trait]
pub trait PointRepository: Send + Sync {
    /// Adds `delta` to the user's total, starting from 0 if the user has no
    /// entry yet. Concurrent calls for the same user must not lose updates.
    async fn add_points(&self, user_id: UserId, delta: u64) -> Result<(), anyhow::Error>;

    async fn points_of(&self, user_id: UserId) -> Result<Option<u64>, anyhow::Error>;

    /// Highest totals first, ties broken by user id.
    async fn top_points(&self, limit: usize) -> Result<Vec<Point>, anyhow::Error>;

    async fn reset_points(&self) -> Result<(), anyhow::Error>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, anyhow::Error>;

    /// Inserts the post or overwrites the one with the same `post_id`.
    async fn upsert_post(&self, post: Post) -> Result<(), anyhow::Error>;

    async fn list_posts(&self) -> Result<Vec<Post>, anyhow::Error>;
}

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn get_campaign(&self, chat_id: ChatId) -> Result<Option<CampaignState>, anyhow::Error>;

    /// Sets the post of the chat's next campaign. Fails with `false` if a
    /// campaign is running.
    async fn set_campaign_post(&self, chat_id: ChatId, post_id: &str)
        -> Result<bool, anyhow::Error>;

    /// Inactive -> Active. Returns the new state, or `None` if the chat has
    /// no post or a campaign is already running.
    async fn activate_campaign(
        &self,
        chat_id: ChatId,
        ends_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<CampaignState>, anyhow::Error>;

    /// Active -> Inactive, only if `round` is the running round. Returns
    /// whether the campaign was deactivated by this call.
    async fn deactivate_campaign(&self, chat_id: ChatId, round: u64)
        -> Result<bool, anyhow::Error>;

    /// Sets the length of the chat's future raids. A running raid keeps its
    /// end time.
    async fn set_campaign_duration(
        &self,
        chat_id: ChatId,
        duration: Duration,
    ) -> Result<(), anyhow::Error>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Creates the user or updates their username, keeping the X handle.
    async fn register_user(
        &self,
        user_id: UserId,
        username: Option<String>,
    ) -> Result<(), anyhow::Error>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>, anyhow::Error>;

    /// Links an X handle to the user. A handle belongs to at most one user,
    /// compared case-insensitively and without `@`. Setting a new handle frees
    /// the previous one.
    async fn set_twitter_handle(
        &self,
        user_id: UserId,
        handle: &str,
    ) -> Result<HandleClaim, anyhow::Error>;

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<UserId>, anyhow::Error>;

    /// Returns `false` if the user is not registered.
    async fn set_wallet_address(&self, user_id: UserId, address: &str)
        -> Result<bool, anyhow::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleClaim {
    Claimed,
    NotRegistered,
    TakenBy(UserId),
}

/// All repositories the campaign logic needs, usually backed by the same
/// storage.
#[derive(Clone)]
pub struct Repositories {
    pub submissions: Arc<dyn SubmissionRepository>,
    pub points: Arc<dyn PointRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Repositories {
    pub fn from_storage<S>(storage: Arc<S>) -> Self
    where
        S: SubmissionRepository
            + PointRepository
            + PostRepository
            + CampaignRepository
            + UserRepository
            + 'static,
    {
        Self {
            submissions: Arc::clone(&storage) as Arc<dyn SubmissionRepository>,
            points: Arc::clone(&storage) as Arc<dyn PointRepository>,
            posts: Arc::clone(&storage) as Arc<dyn PostRepository>,
            campaigns: Arc::clone(&storage) as Arc<dyn CampaignRepository>,
            users: storage as Arc<dyn UserRepository>,
        }
    }
}
