use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eddybot_common::{
    mongodb::{
        bson::{doc, Document},
        Database,
    },
    teloxide::types::{ChatId, UserId},
    utils::store::PersistentStore,
};
use serde::{Deserialize, Serialize};

use crate::{
    links::normalize_handle,
    model::{CampaignState, Point, Post, Submission, UserProfile},
    repository::{
        CampaignRepository, HandleClaim, PointRepository, PostRepository, SubmissionInsert,
        SubmissionRepository, UserRepository,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
struct SubmissionKey {
    post_id: String,
    user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
struct ReplyKey {
    post_id: String,
    reference_id: String,
}

/// Storage backed by MongoDB collections, one per kind of record.
pub struct MongoStorage {
    submissions: PersistentStore<SubmissionKey, Submission>,
    /// Owner of each submitted reply, unique per post
    replies: PersistentStore<ReplyKey, UserId>,
    points: PersistentStore<UserId, u64>,
    posts: PersistentStore<String, Post>,
    campaigns: PersistentStore<ChatId, CampaignState>,
    users: PersistentStore<UserId, UserProfile>,
    /// Normalized X handle to its owner
    handles: PersistentStore<String, UserId>,
}

/// Matches a campaign that is in `round` with the given activity. Every
/// campaign transition is a compare-and-set on both fields.
fn campaign_condition(is_active: bool, round: u64) -> Result<Document, anyhow::Error> {
    Ok(doc! { "value.is_active": is_active, "value.round": i64::try_from(round)? })
}

/// Matches an entry whose value is `user_id`, for releasing claims.
fn owned_by(user_id: UserId) -> Result<Document, anyhow::Error> {
    Ok(doc! { "value": i64::try_from(user_id.0)? })
}

impl MongoStorage {
    pub async fn new(db: Database) -> Result<Self, anyhow::Error> {
        Ok(Self {
            submissions: PersistentStore::new(db.clone(), "raid_submissions").await?,
            points: PersistentStore::new(db.clone(), "raid_points").await?,
            posts: PersistentStore::new(db.clone(), "raid_posts").await?,
            campaigns: PersistentStore::new(db.clone(), "raid_campaigns").await?,
            replies: PersistentStore::new(db.clone(), "raid_submission_replies").await?,
            users: PersistentStore::new(db.clone(), "raid_users").await?,
            handles: PersistentStore::new(db, "raid_handles").await?,
        })
    }
}

#[async_trait]
impl SubmissionRepository for MongoStorage {
    async fn list_pending(&self, post_id: &str) -> Result<Vec<Submission>, anyhow::Error> {
        Ok(self
            .submissions
            .find_by_key_field("post_id", post_id)
            .await?
            .into_iter()
            .map(|(_, submission)| submission)
            .collect())
    }

    async fn count_pending(&self, post_id: &str) -> Result<usize, anyhow::Error> {
        Ok(self
            .submissions
            .count_by_key_field("post_id", post_id)
            .await? as usize)
    }

    async fn delete_all_pending(&self, post_id: &str) -> Result<(), anyhow::Error> {
        let deleted = self
            .submissions
            .delete_by_key_field("post_id", post_id)
            .await?;
        self.replies.delete_by_key_field("post_id", post_id).await?;
        log::debug!("Deleted {deleted} pending submissions of post {post_id}");
        Ok(())
    }

    async fn create_submission(
        &self,
        submission: Submission,
    ) -> Result<SubmissionInsert, anyhow::Error> {
        let user_id = submission.user_id;
        let reply_key = ReplyKey {
            post_id: submission.post_id.clone(),
            reference_id: submission.reference_id.clone(),
        };
        if !self
            .replies
            .insert_if_not_exists(reply_key.clone(), user_id)
            .await?
        {
            return Ok(match self.replies.get(&reply_key).await? {
                Some(owner) if owner != user_id => SubmissionInsert::ReplyAlreadySubmitted,
                _ => SubmissionInsert::UserAlreadySubmitted,
            });
        }

        let key = SubmissionKey {
            post_id: submission.post_id.clone(),
            user_id,
        };
        if self.submissions.insert_if_not_exists(key, submission).await? {
            Ok(SubmissionInsert::Created)
        } else {
            self.replies
                .delete_if(&reply_key, owned_by(user_id)?)
                .await?;
            Ok(SubmissionInsert::UserAlreadySubmitted)
        }
    }

    async fn delete_submission(
        &self,
        post_id: &str,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        let key = SubmissionKey {
            post_id: post_id.to_string(),
            user_id,
        };
        let Some(submission) = self.submissions.get(&key).await? else {
            return Ok(());
        };
        self.submissions.delete_if(&key, doc! {}).await?;
        self.replies
            .delete_if(
                &ReplyKey {
                    post_id: submission.post_id,
                    reference_id: submission.reference_id,
                },
                owned_by(user_id)?,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PointRepository for MongoStorage {
    async fn add_points(&self, user_id: UserId, delta: u64) -> Result<(), anyhow::Error> {
        self.points
            .increment(&user_id, i64::try_from(delta)?)
            .await
    }

    async fn points_of(&self, user_id: UserId) -> Result<Option<u64>, anyhow::Error> {
        self.points.get(&user_id).await
    }

    async fn top_points(&self, limit: usize) -> Result<Vec<Point>, anyhow::Error> {
        Ok(self
            .points
            .top_by_value(limit)
            .await?
            .into_iter()
            .map(|(user_id, points)| Point { user_id, points })
            .collect())
    }

    async fn reset_points(&self) -> Result<(), anyhow::Error> {
        let deleted = self.points.clear().await?;
        log::info!("Reset points of {deleted} users");
        Ok(())
    }
}

#[async_trait]
impl PostRepository for MongoStorage {
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, anyhow::Error> {
        self.posts.get(&post_id.to_string()).await
    }

    async fn upsert_post(&self, post: Post) -> Result<(), anyhow::Error> {
        self.posts.insert_or_update(post.post_id.clone(), post).await
    }

    async fn list_posts(&self) -> Result<Vec<Post>, anyhow::Error> {
        Ok(self
            .posts
            .values()
            .await?
            .into_iter()
            .map(|(_, post)| post)
            .collect())
    }
}

#[async_trait]
impl CampaignRepository for MongoStorage {
    async fn get_campaign(&self, chat_id: ChatId) -> Result<Option<CampaignState>, anyhow::Error> {
        self.campaigns.get(&chat_id).await
    }

    async fn set_campaign_post(
        &self,
        chat_id: ChatId,
        post_id: &str,
    ) -> Result<bool, anyhow::Error> {
        match self.campaigns.get(&chat_id).await? {
            Some(mut state) => {
                if state.is_active {
                    return Ok(false);
                }
                state.active_post_id = Some(post_id.to_string());
                let condition = campaign_condition(false, state.round)?;
                self.campaigns.replace_if(&chat_id, condition, state).await
            }
            None => {
                let mut state = CampaignState::new(chat_id);
                state.active_post_id = Some(post_id.to_string());
                self.campaigns.insert_if_not_exists(chat_id, state).await
            }
        }
    }

    async fn activate_campaign(
        &self,
        chat_id: ChatId,
        ends_at: DateTime<Utc>,
    ) -> Result<Option<CampaignState>, anyhow::Error> {
        let Some(mut state) = self.campaigns.get(&chat_id).await? else {
            return Ok(None);
        };
        if state.is_active || state.active_post_id.is_none() {
            return Ok(None);
        }
        let condition = campaign_condition(false, state.round)?;
        state.is_active = true;
        state.round += 1;
        state.ends_at = Some(ends_at);
        let activated = self
            .campaigns
            .replace_if(&chat_id, condition, state.clone())
            .await?;
        Ok(activated.then_some(state))
    }

    async fn deactivate_campaign(
        &self,
        chat_id: ChatId,
        round: u64,
    ) -> Result<bool, anyhow::Error> {
        let Some(mut state) = self.campaigns.get(&chat_id).await? else {
            return Ok(false);
        };
        if !state.is_active || state.round != round {
            return Ok(false);
        }
        state.is_active = false;
        state.ends_at = None;
        self.campaigns
            .replace_if(&chat_id, campaign_condition(true, round)?, state)
            .await
    }

    async fn set_campaign_duration(
        &self,
        chat_id: ChatId,
        duration: Duration,
    ) -> Result<(), anyhow::Error> {
        let secs = i64::try_from(duration.as_secs())?;
        if self
            .campaigns
            .set_value_field(&chat_id, "raid_duration_secs", secs)
            .await?
        {
            return Ok(());
        }
        let mut state = CampaignState::new(chat_id);
        state.raid_duration_secs = Some(duration.as_secs());
        if !self.campaigns.insert_if_not_exists(chat_id, state).await? {
            // created concurrently
            self.campaigns
                .set_value_field(&chat_id, "raid_duration_secs", secs)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MongoStorage {
    async fn register_user(
        &self,
        user_id: UserId,
        username: Option<String>,
    ) -> Result<(), anyhow::Error> {
        let user = match self.users.get(&user_id).await? {
            Some(user) => UserProfile { username, ..user },
            None => UserProfile {
                user_id,
                username,
                twitter_handle: None,
                wallet_address: None,
            },
        };
        self.users.insert_or_update(user_id, user).await
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>, anyhow::Error> {
        self.users.get(&user_id).await
    }

    async fn set_twitter_handle(
        &self,
        user_id: UserId,
        handle: &str,
    ) -> Result<HandleClaim, anyhow::Error> {
        let Some(mut user) = self.users.get(&user_id).await? else {
            return Ok(HandleClaim::NotRegistered);
        };
        let normalized = normalize_handle(handle);
        if !self
            .handles
            .insert_if_not_exists(normalized.clone(), user_id)
            .await?
        {
            match self.handles.get(&normalized).await? {
                Some(owner) if owner != user_id => return Ok(HandleClaim::TakenBy(owner)),
                Some(_) => {}
                // released in between, the caller can retry
                None => anyhow::bail!("Handle {normalized} changed owner while claiming it"),
            }
        }

        let previous = user.twitter_handle.replace(handle.to_string());
        self.users.insert_or_update(user_id, user).await?;
        if let Some(previous) = previous.map(|handle| normalize_handle(&handle)) {
            if previous != normalized {
                self.handles
                    .delete_if(&previous, owned_by(user_id)?)
                    .await?;
            }
        }
        Ok(HandleClaim::Claimed)
    }

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<UserId>, anyhow::Error> {
        self.handles.get(&normalize_handle(handle)).await
    }

    async fn set_wallet_address(
        &self,
        user_id: UserId,
        address: &str,
    ) -> Result<bool, anyhow::Error> {
        self.users
            .set_value_field(&user_id, "wallet_address", address)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_writes_are_conditioned_on_the_round() {
        assert_eq!(
            campaign_condition(false, 3).unwrap(),
            doc! { "value.is_active": false, "value.round": 3_i64 }
        );
        assert_eq!(
            campaign_condition(true, 0).unwrap(),
            doc! { "value.is_active": true, "value.round": 0_i64 }
        );
        assert!(campaign_condition(false, u64::MAX).is_err());
    }

    #[test]
    fn claims_are_released_by_their_owner_only() {
        assert_eq!(owned_by(UserId(42)).unwrap(), doc! { "value": 42_i64 });
    }
}
