use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use eddybot_common::teloxide::types::{ChatId, UserId};

use crate::{
    links::normalize_handle,
    model::{CampaignState, Point, Post, Submission, UserProfile},
    repository::{
        CampaignRepository, HandleClaim, PointRepository, PostRepository, SubmissionInsert,
        SubmissionRepository, UserRepository,
    },
};

/// Storage that lives in memory only, for tests and local runs. Every
/// read-modify-write happens under the shard lock of the entry.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    submissions: DashMap<(String, UserId), Submission>,
    /// (post id, reply id) of every pending submission
    replies: DashMap<(String, String), UserId>,
    points: DashMap<UserId, u64>,
    posts: DashMap<String, Post>,
    campaigns: DashMap<ChatId, CampaignState>,
    users: DashMap<UserId, UserProfile>,
    /// Normalized X handle to its owner
    handles: DashMap<String, UserId>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionRepository for MemoryStorage {
    async fn list_pending(&self, post_id: &str) -> Result<Vec<Submission>, anyhow::Error> {
        Ok(self
            .submissions
            .iter()
            .filter(|entry| entry.key().0 == post_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn count_pending(&self, post_id: &str) -> Result<usize, anyhow::Error> {
        Ok(self
            .submissions
            .iter()
            .filter(|entry| entry.key().0 == post_id)
            .count())
    }

    async fn delete_all_pending(&self, post_id: &str) -> Result<(), anyhow::Error> {
        self.submissions.retain(|(post, _), _| post != post_id);
        self.replies.retain(|(post, _), _| post != post_id);
        Ok(())
    }

    async fn create_submission(
        &self,
        submission: Submission,
    ) -> Result<SubmissionInsert, anyhow::Error> {
        let user_id = submission.user_id;
        let reply_key = (
            submission.post_id.clone(),
            submission.reference_id.clone(),
        );
        match self.replies.entry(reply_key.clone()) {
            Entry::Occupied(entry) if *entry.get() == user_id => {
                return Ok(SubmissionInsert::UserAlreadySubmitted)
            }
            Entry::Occupied(_) => return Ok(SubmissionInsert::ReplyAlreadySubmitted),
            Entry::Vacant(entry) => {
                entry.insert(user_id);
            }
        }
        match self
            .submissions
            .entry((submission.post_id.clone(), user_id))
        {
            Entry::Occupied(_) => {
                self.replies
                    .remove_if(&reply_key, |_, owner| *owner == user_id);
                Ok(SubmissionInsert::UserAlreadySubmitted)
            }
            Entry::Vacant(entry) => {
                entry.insert(submission);
                Ok(SubmissionInsert::Created)
            }
        }
    }

    async fn delete_submission(
        &self,
        post_id: &str,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        if let Some((_, submission)) = self.submissions.remove(&(post_id.to_string(), user_id)) {
            self.replies.remove_if(
                &(submission.post_id, submission.reference_id),
                |_, owner| *owner == user_id,
            );
        }
        Ok(())
    }
}

#[async_trait]
impl PointRepository for MemoryStorage {
    async fn add_points(&self, user_id: UserId, delta: u64) -> Result<(), anyhow::Error> {
        *self.points.entry(user_id).or_insert(0) += delta;
        Ok(())
    }

    async fn points_of(&self, user_id: UserId) -> Result<Option<u64>, anyhow::Error> {
        Ok(self.points.get(&user_id).map(|points| *points))
    }

    async fn top_points(&self, limit: usize) -> Result<Vec<Point>, anyhow::Error> {
        let mut points: Vec<Point> = self
            .points
            .iter()
            .map(|entry| Point {
                user_id: *entry.key(),
                points: *entry.value(),
            })
            .collect();
        points.sort_by(|a, b| b.points.cmp(&a.points).then(a.user_id.0.cmp(&b.user_id.0)));
        points.truncate(limit);
        Ok(points)
    }

    async fn reset_points(&self) -> Result<(), anyhow::Error> {
        self.points.clear();
        Ok(())
    }
}

#[async_trait]
impl PostRepository for MemoryStorage {
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, anyhow::Error> {
        Ok(self.posts.get(post_id).map(|post| post.clone()))
    }

    async fn upsert_post(&self, post: Post) -> Result<(), anyhow::Error> {
        self.posts.insert(post.post_id.clone(), post);
        Ok(())
    }

    async fn list_posts(&self) -> Result<Vec<Post>, anyhow::Error> {
        Ok(self.posts.iter().map(|post| post.value().clone()).collect())
    }
}

#[async_trait]
impl CampaignRepository for MemoryStorage {
    async fn get_campaign(&self, chat_id: ChatId) -> Result<Option<CampaignState>, anyhow::Error> {
        Ok(self.campaigns.get(&chat_id).map(|state| state.clone()))
    }

    async fn set_campaign_post(
        &self,
        chat_id: ChatId,
        post_id: &str,
    ) -> Result<bool, anyhow::Error> {
        let mut state = self
            .campaigns
            .entry(chat_id)
            .or_insert_with(|| CampaignState::new(chat_id));
        if state.is_active {
            return Ok(false);
        }
        state.active_post_id = Some(post_id.to_string());
        Ok(true)
    }

    async fn activate_campaign(
        &self,
        chat_id: ChatId,
        ends_at: DateTime<Utc>,
    ) -> Result<Option<CampaignState>, anyhow::Error> {
        let Some(mut state) = self.campaigns.get_mut(&chat_id) else {
            return Ok(None);
        };
        if state.is_active || state.active_post_id.is_none() {
            return Ok(None);
        }
        state.is_active = true;
        state.round += 1;
        state.ends_at = Some(ends_at);
        Ok(Some(state.clone()))
    }

    async fn deactivate_campaign(
        &self,
        chat_id: ChatId,
        round: u64,
    ) -> Result<bool, anyhow::Error> {
        let Some(mut state) = self.campaigns.get_mut(&chat_id) else {
            return Ok(false);
        };
        if !state.is_active || state.round != round {
            return Ok(false);
        }
        state.is_active = false;
        state.ends_at = None;
        Ok(true)
    }

    async fn set_campaign_duration(
        &self,
        chat_id: ChatId,
        duration: Duration,
    ) -> Result<(), anyhow::Error> {
        self.campaigns
            .entry(chat_id)
            .or_insert_with(|| CampaignState::new(chat_id))
            .raid_duration_secs = Some(duration.as_secs());
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStorage {
    async fn register_user(
        &self,
        user_id: UserId,
        username: Option<String>,
    ) -> Result<(), anyhow::Error> {
        self.users
            .entry(user_id)
            .and_modify(|user| user.username = username.clone())
            .or_insert_with(|| UserProfile {
                user_id,
                username: username.clone(),
                twitter_handle: None,
                wallet_address: None,
            });
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>, anyhow::Error> {
        Ok(self.users.get(&user_id).map(|user| user.clone()))
    }

    async fn set_twitter_handle(
        &self,
        user_id: UserId,
        handle: &str,
    ) -> Result<HandleClaim, anyhow::Error> {
        if !self.users.contains_key(&user_id) {
            return Ok(HandleClaim::NotRegistered);
        }
        let normalized = normalize_handle(handle);
        match self.handles.entry(normalized.clone()) {
            Entry::Occupied(entry) if *entry.get() != user_id => {
                return Ok(HandleClaim::TakenBy(*entry.get()))
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(entry) => {
                entry.insert(user_id);
            }
        }

        let previous = self
            .users
            .get_mut(&user_id)
            .and_then(|mut user| user.twitter_handle.replace(handle.to_string()));
        if let Some(previous) = previous {
            let previous = normalize_handle(&previous);
            if previous != normalized {
                self.handles
                    .remove_if(&previous, |_, owner| *owner == user_id);
            }
        }
        Ok(HandleClaim::Claimed)
    }

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<UserId>, anyhow::Error> {
        Ok(self
            .handles
            .get(&normalize_handle(handle))
            .map(|owner| *owner))
    }

    async fn set_wallet_address(
        &self,
        user_id: UserId,
        address: &str,
    ) -> Result<bool, anyhow::Error> {
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.wallet_address = Some(address.to_string());
        Ok(true)
    }
}
