use std::time::Duration;

use chrono::{DateTime, Utc};
use eddybot_common::teloxide::types::{ChatId, UserId};
use serde::{Deserialize, Serialize};

/// The tweet a campaign is run for, together with the criteria replies are
/// scored against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    /// Numeric status id taken from `post_link`, two posts with the same link
    /// are the same post.
    pub post_id: String,
    pub post_link: String,
    pub admin_id: UserId,
    #[serde(default)]
    pub full_text: String,
    pub entities: PostEntities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostEntities {
    pub keywords: Vec<String>,
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub comment_sample: String,
}

/// A reply link waiting for the end of the campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submission {
    /// Status id of the submitted reply
    pub reference_id: String,
    pub post_id: String,
    pub user_id: UserId,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Point {
    pub user_id: UserId,
    pub points: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignState {
    pub chat_id: ChatId,
    pub is_active: bool,
    /// The post the next (or the running) campaign targets.
    pub active_post_id: Option<String>,
    /// Incremented every time a campaign starts in this chat, so that a timer
    /// from an earlier campaign can't end a later one.
    #[serde(default)]
    pub round: u64,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Raid length set with `/set_duration`, overrides the configured default
    #[serde(default)]
    pub raid_duration_secs: Option<u64>,
}

impl CampaignState {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            is_active: false,
            active_post_id: None,
            round: 0,
            ends_at: None,
            raid_duration_secs: None,
        }
    }

    pub fn raid_duration(&self) -> Option<Duration> {
        self.raid_duration_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: Option<String>,
    /// X handle without the leading `@`, as the user typed it
    pub twitter_handle: Option<String>,
    /// Ethereum address for payouts, checksummed or all one case
    #[serde(default)]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub tweet_found: bool,
    pub total_hashtags: usize,
    pub total_keywords: usize,
    pub hashtags_found: usize,
    pub keywords_found: usize,
    pub points: u64,
    /// The budget a reply matching every criterion would get
    pub total_points: u64,
}

/// A tweet as returned by the content lookup API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: String,
    pub text: String,
    pub hashtags: Vec<String>,
    /// Id of the tweet this one directly replies to. Quotes and retweets
    /// don't set it.
    pub replied_to_id: Option<String>,
}

/// The part of a tweet that scoring looks at.
#[derive(Debug, Clone, Copy)]
pub struct CommentContent<'a> {
    pub text: &'a str,
    pub hashtags: &'a [String],
}

impl ContentItem {
    pub fn content(&self) -> CommentContent<'_> {
        CommentContent {
            text: &self.text,
            hashtags: &self.hashtags,
        }
    }

    pub fn is_direct_reply_to(&self, post_id: &str) -> bool {
        self.replied_to_id.as_deref() == Some(post_id)
    }
}
