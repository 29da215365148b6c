use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use eddybot_common::teloxide::types::{ChatId, UserId};
use futures_util::future::BoxFuture;

use crate::{
    analyzer::{settle, SettlementDeps, SettlementReport},
    comment::{comment_prompt, complete_comment, CommentGenerator},
    config::CampaignConfig,
    gate::{self, SubmissionError},
    links::{collect_words, parse_handle, parse_status_link},
    lookup::{ContentLookupClient, LookupError},
    model::{CampaignState, Point, Post, PostEntities, Submission, UserProfile},
    repository::{HandleClaim, Repositories},
    wallet::is_valid_eth_address,
};

/// Runs a task once after a delay. The campaign end timer goes through this.
pub trait Scheduler: Send + Sync {
    fn after(&self, delay: Duration, task: BoxFuture<'static, ()>);
}

/// Spawns a tokio task per timer. Timers don't survive a restart.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

/// Announcements in the campaign chat. Failures are logged and otherwise
/// ignored by [`RaidCampaigns`].
#[async_trait]
pub trait CampaignNotifier: Send + Sync {
    async fn campaign_started(
        &self,
        state: &CampaignState,
        post: Option<&Post>,
    ) -> Result<(), anyhow::Error>;

    async fn campaign_ended(
        &self,
        chat_id: ChatId,
        post_id: &str,
        participants: usize,
    ) -> Result<(), anyhow::Error>;

    async fn settlement_finished(
        &self,
        chat_id: ChatId,
        report: &SettlementReport,
    ) -> Result<(), anyhow::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("No post is set for this chat, use /set_post first")]
    NoPost,

    #[error("A raid is already running in this chat")]
    AlreadyActive,

    #[error("No raid is running in this chat")]
    NotActive,

    #[error("Not a valid X post link")]
    InvalidPostLink,

    #[error("Couldn't find this post on X, check that it exists and is public")]
    PostNotFound,

    #[error("Not a valid X handle")]
    InvalidHandle,

    #[error("This X handle is already linked to another account")]
    HandleTaken,

    #[error("Not a valid Ethereum address")]
    InvalidWallet,

    #[error("Comment suggestions are not enabled")]
    CommentsDisabled,

    #[error("X API request failed: {0}")]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct RaidCampaigns {
    repos: Repositories,
    lookup: Arc<dyn ContentLookupClient>,
    scheduler: Arc<dyn Scheduler>,
    notifier: Arc<dyn CampaignNotifier>,
    comments: Option<Arc<dyn CommentGenerator>>,
    config: CampaignConfig,
}

impl RaidCampaigns {
    pub fn new(
        repos: Repositories,
        lookup: Arc<dyn ContentLookupClient>,
        scheduler: Arc<dyn Scheduler>,
        notifier: Arc<dyn CampaignNotifier>,
        config: CampaignConfig,
    ) -> Self {
        Self {
            repos,
            lookup,
            scheduler,
            notifier,
            comments: None,
            config,
        }
    }

    pub fn with_comment_generator(mut self, comments: Arc<dyn CommentGenerator>) -> Self {
        self.comments = Some(comments);
        self
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Sets the post the next campaign of `chat_id` raids. `hashtags` and
    /// `keywords` are comma-separated lists. The post is looked up on X to
    /// make sure it exists and to keep its text.
    pub async fn set_post(
        &self,
        chat_id: ChatId,
        admin_id: UserId,
        link: &str,
        hashtags: &str,
        keywords: &str,
        comment_sample: &str,
    ) -> Result<Post, CampaignError> {
        let status = parse_status_link(link).ok_or(CampaignError::InvalidPostLink)?;
        if let Some(state) = self.repos.campaigns.get_campaign(chat_id).await? {
            if state.is_active {
                return Err(CampaignError::AlreadyActive);
            }
        }

        let root = self
            .lookup
            .fetch_by_ids(std::slice::from_ref(&status.status_id))
            .await?
            .into_iter()
            .find(|item| item.id == status.status_id)
            .ok_or(CampaignError::PostNotFound)?;

        let post = Post {
            post_id: status.status_id,
            post_link: link.trim().to_string(),
            admin_id,
            full_text: root.text,
            entities: PostEntities {
                keywords: collect_words(keywords),
                hashtags: collect_words(hashtags),
                comment_sample: comment_sample.trim().to_string(),
            },
        };
        self.repos.posts.upsert_post(post.clone()).await?;
        if !self
            .repos
            .campaigns
            .set_campaign_post(chat_id, &post.post_id)
            .await?
        {
            return Err(CampaignError::AlreadyActive);
        }
        log::info!(
            "Post {} set for chat {chat_id} by {admin_id}: {} hashtag(s), {} keyword(s)",
            post.post_id,
            post.entities.hashtags.len(),
            post.entities.keywords.len()
        );
        Ok(post)
    }

    pub async fn list_posts(&self) -> Result<Vec<Post>, anyhow::Error> {
        self.repos.posts.list_posts().await
    }

    pub async fn campaign_state(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<CampaignState>, anyhow::Error> {
        self.repos.campaigns.get_campaign(chat_id).await
    }

    /// Starts a campaign for the chat's post and schedules its end after
    /// `duration`. Without one, the chat's `/set_duration` value is used,
    /// then the configured default.
    pub async fn start_campaign(
        &self,
        chat_id: ChatId,
        duration: Option<Duration>,
    ) -> Result<CampaignState, CampaignError> {
        let duration = match duration {
            Some(duration) => duration,
            None => self
                .repos
                .campaigns
                .get_campaign(chat_id)
                .await?
                .and_then(|state| state.raid_duration())
                .unwrap_or(self.config.duration),
        };
        let ends_at = Utc::now()
            + chrono::Duration::from_std(duration).map_err(anyhow::Error::from)?;

        let Some(state) = self
            .repos
            .campaigns
            .activate_campaign(chat_id, ends_at)
            .await?
        else {
            return Err(match self.repos.campaigns.get_campaign(chat_id).await? {
                Some(state) if state.is_active => CampaignError::AlreadyActive,
                _ => CampaignError::NoPost,
            });
        };
        log::info!(
            "Raid round {} started in chat {chat_id} for post {:?}, ends at {ends_at}",
            state.round,
            state.active_post_id
        );

        let round = state.round;
        let this = self.clone();
        self.scheduler.after(
            duration,
            Box::pin(async move {
                if let Err(err) = this.end_campaign(chat_id, round).await {
                    log::error!("Failed to end raid round {round} in chat {chat_id}: {err:?}");
                }
            }),
        );

        let post = match &state.active_post_id {
            Some(post_id) => self.repos.posts.get_post(post_id).await?,
            None => None,
        };
        if let Err(err) = self.notifier.campaign_started(&state, post.as_ref()).await {
            log::warn!("Failed to announce raid in chat {chat_id}: {err:?}");
        }
        Ok(state)
    }

    /// Ends the running campaign now instead of waiting for its timer. The
    /// timer later finds a different round and does nothing.
    pub async fn stop_campaign(&self, chat_id: ChatId) -> Result<SettlementReport, CampaignError> {
        let state = match self.repos.campaigns.get_campaign(chat_id).await? {
            Some(state) if state.is_active => state,
            _ => return Err(CampaignError::NotActive),
        };
        self.end_campaign(chat_id, state.round)
            .await?
            .ok_or(CampaignError::NotActive)
    }

    /// Closes round `round` of the chat's campaign and settles its
    /// submissions. Returns `None` if that round is not running anymore.
    pub async fn end_campaign(
        &self,
        chat_id: ChatId,
        round: u64,
    ) -> Result<Option<SettlementReport>, anyhow::Error> {
        let Some(state) = self.repos.campaigns.get_campaign(chat_id).await? else {
            return Ok(None);
        };
        if !self
            .repos
            .campaigns
            .deactivate_campaign(chat_id, round)
            .await?
        {
            log::debug!("Raid round {round} in chat {chat_id} already ended");
            return Ok(None);
        }
        let Some(post_id) = state.active_post_id else {
            log::warn!("Raid round {round} in chat {chat_id} had no post");
            return Ok(None);
        };
        log::info!("Raid round {round} in chat {chat_id} ended");

        let participants = self.repos.submissions.count_pending(&post_id).await?;
        if let Err(err) = self
            .notifier
            .campaign_ended(chat_id, &post_id, participants)
            .await
        {
            log::warn!("Failed to announce end of raid in chat {chat_id}: {err:?}");
        }

        let deps = SettlementDeps {
            submissions: self.repos.submissions.as_ref(),
            points: self.repos.points.as_ref(),
            posts: self.repos.posts.as_ref(),
            lookup: self.lookup.as_ref(),
        };
        let report = settle(&post_id, deps, &self.config.settlement()).await?;

        if let Err(err) = self.notifier.settlement_finished(chat_id, &report).await {
            log::warn!("Failed to announce raid results in chat {chat_id}: {err:?}");
        }
        Ok(Some(report))
    }

    pub async fn submit(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        link: &str,
    ) -> Result<Submission, SubmissionError> {
        gate::submit(&self.repos, chat_id, user_id, link).await
    }

    /// Records the user and gives them a zero point balance.
    pub async fn register_user(
        &self,
        user_id: UserId,
        username: Option<String>,
    ) -> Result<(), anyhow::Error> {
        self.repos.users.register_user(user_id, username).await?;
        self.repos.points.add_points(user_id, 0).await
    }

    /// Returns the stored handle, without `@`.
    pub async fn set_twitter_handle(
        &self,
        user_id: UserId,
        username: Option<String>,
        handle: &str,
    ) -> Result<String, CampaignError> {
        let handle = parse_handle(handle).ok_or(CampaignError::InvalidHandle)?;
        let mut claim = self.repos.users.set_twitter_handle(user_id, &handle).await?;
        if claim == HandleClaim::NotRegistered {
            self.register_user(user_id, username).await?;
            claim = self.repos.users.set_twitter_handle(user_id, &handle).await?;
        }
        match claim {
            HandleClaim::Claimed => Ok(handle),
            HandleClaim::TakenBy(owner) => {
                log::info!("User {user_id} tried to claim @{handle}, owned by {owner}");
                Err(CampaignError::HandleTaken)
            }
            HandleClaim::NotRegistered => Err(CampaignError::Storage(anyhow::anyhow!(
                "User {user_id} disappeared while setting the handle"
            ))),
        }
    }

    /// Stores the user's Ethereum address for rewards.
    pub async fn set_wallet(
        &self,
        user_id: UserId,
        username: Option<String>,
        address: &str,
    ) -> Result<String, CampaignError> {
        let address = address.trim();
        if !is_valid_eth_address(address) {
            return Err(CampaignError::InvalidWallet);
        }
        if !self.repos.users.set_wallet_address(user_id, address).await? {
            self.register_user(user_id, username).await?;
            self.repos.users.set_wallet_address(user_id, address).await?;
        }
        log::info!("User {user_id} set wallet {address}");
        Ok(address.to_string())
    }

    /// Length of the chat's next raids when `/start_raid` has no duration.
    pub async fn set_campaign_duration(
        &self,
        chat_id: ChatId,
        duration: Duration,
    ) -> Result<(), anyhow::Error> {
        self.repos
            .campaigns
            .set_campaign_duration(chat_id, duration)
            .await?;
        log::info!("Raid duration of chat {chat_id} set to {duration:?}");
        Ok(())
    }

    /// Suggests a reply to the chat's current post that uses all of its
    /// hashtags.
    pub async fn generate_comment(&self, chat_id: ChatId) -> Result<String, CampaignError> {
        let comments = self
            .comments
            .as_ref()
            .ok_or(CampaignError::CommentsDisabled)?;
        let post_id = self
            .repos
            .campaigns
            .get_campaign(chat_id)
            .await?
            .and_then(|state| state.active_post_id)
            .ok_or(CampaignError::NoPost)?;
        let post = self
            .repos
            .posts
            .get_post(&post_id)
            .await?
            .ok_or(CampaignError::NoPost)?;
        let text = comments.generate(&comment_prompt(&post)).await?;
        Ok(complete_comment(&text, &post))
    }

    pub async fn user(&self, user_id: UserId) -> Result<Option<UserProfile>, anyhow::Error> {
        self.repos.users.get_user(user_id).await
    }

    pub async fn points_of(&self, user_id: UserId) -> Result<u64, anyhow::Error> {
        Ok(self.repos.points.points_of(user_id).await?.unwrap_or(0))
    }

    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<Point>, anyhow::Error> {
        self.repos.points.top_points(limit).await
    }

    pub async fn reset_points(&self) -> Result<(), anyhow::Error> {
        log::info!("Resetting all points");
        self.repos.points.reset_points().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        lookup::LookupError, memory::MemoryStorage, model::ContentItem,
        repository::{PointRepository, PostRepository, SubmissionRepository, UserRepository},
    };

    const CHAT: ChatId = ChatId(-1002);
    const ADMIN: UserId = UserId(1);
    const POST_LINK: &str = "https://x.com/eddy/status/900";

    /// Keeps the timers until the test fires them.
    #[derive(Default)]
    struct ManualScheduler {
        timers: Mutex<Vec<(Duration, BoxFuture<'static, ()>)>>,
    }

    impl ManualScheduler {
        fn take(&self) -> Vec<(Duration, BoxFuture<'static, ()>)> {
            std::mem::take(&mut *self.timers.lock().unwrap())
        }
    }

    impl Scheduler for ManualScheduler {
        fn after(&self, delay: Duration, task: BoxFuture<'static, ()>) {
            self.timers.lock().unwrap().push((delay, task));
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CampaignNotifier for RecordingNotifier {
        async fn campaign_started(
            &self,
            state: &CampaignState,
            post: Option<&Post>,
        ) -> Result<(), anyhow::Error> {
            self.events.lock().unwrap().push(format!(
                "started {} {}",
                state.round,
                post.map(|post| post.post_id.as_str()).unwrap_or("-")
            ));
            Ok(())
        }

        async fn campaign_ended(
            &self,
            _chat_id: ChatId,
            post_id: &str,
            participants: usize,
        ) -> Result<(), anyhow::Error> {
            self.events
                .lock()
                .unwrap()
                .push(format!("ended {post_id} {participants}"));
            anyhow::bail!("chat is gone")
        }

        async fn settlement_finished(
            &self,
            _chat_id: ChatId,
            report: &SettlementReport,
        ) -> Result<(), anyhow::Error> {
            self.events
                .lock()
                .unwrap()
                .push(format!("settled {}", report.points_awarded()));
            Ok(())
        }
    }

    struct RepliesToPost;

    #[async_trait]
    impl ContentLookupClient for RepliesToPost {
        async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ContentItem>, LookupError> {
            Ok(ids
                .iter()
                .filter(|id| *id != "404")
                .map(|id| match id.as_str() {
                    "900" | "910" => ContentItem {
                        id: id.clone(),
                        text: format!("Eddy post {id}"),
                        hashtags: vec![],
                        replied_to_id: None,
                    },
                    _ => ContentItem {
                        id: id.clone(),
                        text: "gm #eddy".to_string(),
                        hashtags: vec!["eddy".to_string()],
                        replied_to_id: Some("900".to_string()),
                    },
                })
                .collect())
        }
    }

    struct CannedComment;

    #[async_trait]
    impl CommentGenerator for CannedComment {
        async fn generate(&self, prompt: &str) -> Result<String, anyhow::Error> {
            assert!(prompt.contains("Eddy post 900"));
            Ok("gm to the moon #Eddy".to_string())
        }
    }

    struct Harness {
        storage: Arc<MemoryStorage>,
        scheduler: Arc<ManualScheduler>,
        notifier: Arc<RecordingNotifier>,
        campaigns: RaidCampaigns,
    }

    fn harness() -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let scheduler = Arc::new(ManualScheduler::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let campaigns = RaidCampaigns::new(
            Repositories::from_storage(Arc::clone(&storage)),
            Arc::new(RepliesToPost),
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            Arc::clone(&notifier) as Arc<dyn CampaignNotifier>,
            CampaignConfig {
                request_interval: Duration::ZERO,
                ..Default::default()
            },
        );
        Harness {
            storage,
            scheduler,
            notifier,
            campaigns,
        }
    }

    async fn join_with_handle(h: &Harness, user_id: u64, handle: &str) {
        let user_id = UserId(user_id);
        h.campaigns.register_user(user_id, None).await.unwrap();
        h.campaigns
            .set_twitter_handle(user_id, None, handle)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn full_round() {
        let h = harness();
        h.campaigns
            .set_post(CHAT, ADMIN, POST_LINK, "#eddy, #raid", "gm", "")
            .await
            .unwrap();
        join_with_handle(&h, 10, "@alice").await;
        assert_eq!(h.campaigns.points_of(UserId(10)).await.unwrap(), 0);

        let state = h.campaigns.start_campaign(CHAT, None).await.unwrap();
        assert_eq!(state.round, 1);
        h.campaigns
            .submit(CHAT, UserId(10), "https://x.com/alice/status/901")
            .await
            .unwrap();

        let mut timers = h.scheduler.take();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].0, Duration::from_secs(15 * 60));
        timers.remove(0).1.await;

        // gm + #eddy out of gm, #eddy, #raid
        assert_eq!(h.campaigns.points_of(UserId(10)).await.unwrap(), 67);
        assert_eq!(h.storage.count_pending("900").await.unwrap(), 0);
        assert_eq!(
            *h.notifier.events.lock().unwrap(),
            vec!["started 1 900", "ended 900 1", "settled 67"]
        );
        let state = h.campaigns.campaign_state(CHAT).await.unwrap().unwrap();
        assert!(!state.is_active);

        let err = h
            .campaigns
            .submit(CHAT, UserId(10), "https://x.com/alice/status/902")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::NoActiveCampaign));
    }

    #[tokio::test]
    async fn start_requires_a_post_and_no_running_campaign() {
        let h = harness();
        let err = h.campaigns.start_campaign(CHAT, None).await.unwrap_err();
        assert!(matches!(err, CampaignError::NoPost));

        h.campaigns
            .set_post(CHAT, ADMIN, POST_LINK, "#eddy", "", "")
            .await
            .unwrap();
        h.campaigns
            .start_campaign(CHAT, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        let err = h.campaigns.start_campaign(CHAT, None).await.unwrap_err();
        assert!(matches!(err, CampaignError::AlreadyActive));
        let err = h
            .campaigns
            .set_post(CHAT, ADMIN, "https://x.com/eddy/status/901", "", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::AlreadyActive));
    }

    #[tokio::test]
    async fn stale_timer_does_not_end_the_next_round() {
        let h = harness();
        h.campaigns
            .set_post(CHAT, ADMIN, POST_LINK, "#eddy", "", "")
            .await
            .unwrap();
        h.campaigns.start_campaign(CHAT, None).await.unwrap();
        h.campaigns.stop_campaign(CHAT).await.unwrap();
        let round_two = h.campaigns.start_campaign(CHAT, None).await.unwrap();
        assert_eq!(round_two.round, 2);

        let timers = h.scheduler.take();
        assert_eq!(timers.len(), 2);
        for (_, timer) in timers.into_iter().take(1) {
            timer.await;
        }
        let state = h.campaigns.campaign_state(CHAT).await.unwrap().unwrap();
        assert!(state.is_active);
        assert_eq!(state.round, 2);

        assert!(h.campaigns.end_campaign(CHAT, 2).await.unwrap().is_some());
        assert!(h.campaigns.end_campaign(CHAT, 2).await.unwrap().is_none());
        let err = h.campaigns.stop_campaign(CHAT).await.unwrap_err();
        assert!(matches!(err, CampaignError::NotActive));
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let h = harness();
        let err = h
            .campaigns
            .set_post(CHAT, ADMIN, "https://example.com/post/1", "", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::InvalidPostLink));
        let err = h
            .campaigns
            .set_twitter_handle(UserId(5), None, "no spaces allowed")
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::InvalidHandle));
    }

    #[tokio::test]
    async fn set_post_parses_criteria() {
        let h = harness();
        let post = h
            .campaigns
            .set_post(CHAT, ADMIN, POST_LINK, " #eddy , #raid,", "new, project", "Love it")
            .await
            .unwrap();
        assert_eq!(post.post_id, "900");
        assert_eq!(post.entities.hashtags, vec!["#eddy", "#raid"]);
        assert_eq!(post.entities.keywords, vec!["new", "project"]);
        assert_eq!(h.campaigns.list_posts().await.unwrap(), vec![post]);
    }

    #[tokio::test]
    async fn handle_can_be_set_before_registering() {
        let h = harness();
        let handle = h
            .campaigns
            .set_twitter_handle(UserId(3), Some("carol".to_string()), "@Carol_X")
            .await
            .unwrap();
        assert_eq!(handle, "Carol_X");
        let user = h.storage.get_user(UserId(3)).await.unwrap().unwrap();
        assert_eq!(user.twitter_handle.as_deref(), Some("Carol_X"));
    }

    #[tokio::test]
    async fn leaderboard_and_reset() {
        let h = harness();
        h.storage.add_points(UserId(1), 5).await.unwrap();
        h.storage.add_points(UserId(2), 9).await.unwrap();
        let top = h.campaigns.leaderboard(1).await.unwrap();
        assert_eq!(top[0].user_id, UserId(2));
        h.campaigns.reset_points().await.unwrap();
        assert!(h.campaigns.leaderboard(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_post_keeps_the_post_text() {
        let h = harness();
        let post = h
            .campaigns
            .set_post(CHAT, ADMIN, POST_LINK, "#eddy", "", "")
            .await
            .unwrap();
        assert_eq!(post.full_text, "Eddy post 900");
        assert_eq!(
            h.storage.get_post("900").await.unwrap().unwrap().full_text,
            "Eddy post 900"
        );

        let err = h
            .campaigns
            .set_post(CHAT, ADMIN, "https://x.com/eddy/status/404", "#eddy", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::PostNotFound));
        assert!(h.storage.get_post("404").await.unwrap().is_none());
        let state = h.campaigns.campaign_state(CHAT).await.unwrap().unwrap();
        assert_eq!(state.active_post_id.as_deref(), Some("900"));
    }

    #[tokio::test]
    async fn a_handle_belongs_to_one_member() {
        let h = harness();
        h.campaigns
            .set_post(CHAT, ADMIN, POST_LINK, "#eddy", "gm", "")
            .await
            .unwrap();
        join_with_handle(&h, 10, "@alice").await;
        h.campaigns.register_user(UserId(11), None).await.unwrap();
        let err = h
            .campaigns
            .set_twitter_handle(UserId(11), None, "Alice")
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::HandleTaken));

        h.campaigns.start_campaign(CHAT, None).await.unwrap();
        h.campaigns
            .submit(CHAT, UserId(10), "https://x.com/alice/status/905")
            .await
            .unwrap();
        let err = h
            .campaigns
            .submit(CHAT, UserId(11), "https://x.com/alice/status/905")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::HandleNotSet));

        h.campaigns.stop_campaign(CHAT).await.unwrap();
        assert_eq!(h.campaigns.points_of(UserId(10)).await.unwrap(), 100);
        assert_eq!(h.campaigns.points_of(UserId(11)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wallet_must_be_a_valid_address() {
        let h = harness();
        let err = h
            .campaigns
            .set_wallet(UserId(4), None, "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::InvalidWallet));
        assert!(h.campaigns.user(UserId(4)).await.unwrap().is_none());

        let address = h
            .campaigns
            .set_wallet(
                UserId(4),
                Some("dave".to_string()),
                " 0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed ",
            )
            .await
            .unwrap();
        assert_eq!(address, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        let user = h.campaigns.user(UserId(4)).await.unwrap().unwrap();
        assert_eq!(user.wallet_address.as_deref(), Some(address.as_str()));
        assert_eq!(user.username.as_deref(), Some("dave"));
    }

    #[tokio::test]
    async fn chat_duration_applies_when_start_has_none() {
        let h = harness();
        h.campaigns
            .set_campaign_duration(CHAT, Duration::from_secs(20 * 60))
            .await
            .unwrap();
        h.campaigns
            .set_post(CHAT, ADMIN, POST_LINK, "#eddy", "", "")
            .await
            .unwrap();

        h.campaigns.start_campaign(CHAT, None).await.unwrap();
        h.campaigns.stop_campaign(CHAT).await.unwrap();
        h.campaigns
            .start_campaign(CHAT, Some(Duration::from_secs(60)))
            .await
            .unwrap();

        let delays: Vec<Duration> = h.scheduler.take().into_iter().map(|(d, _)| d).collect();
        assert_eq!(
            delays,
            vec![Duration::from_secs(20 * 60), Duration::from_secs(60)]
        );
    }

    #[tokio::test]
    async fn comments_use_the_current_post() {
        let h = harness();
        let err = h.campaigns.generate_comment(CHAT).await.unwrap_err();
        assert!(matches!(err, CampaignError::CommentsDisabled));

        let campaigns = h
            .campaigns
            .clone()
            .with_comment_generator(Arc::new(CannedComment));
        let err = campaigns.generate_comment(CHAT).await.unwrap_err();
        assert!(matches!(err, CampaignError::NoPost));

        campaigns
            .set_post(CHAT, ADMIN, POST_LINK, "#eddy, #raid", "moon", "")
            .await
            .unwrap();
        assert_eq!(
            campaigns.generate_comment(CHAT).await.unwrap(),
            "gm to the moon #Eddy #raid"
        );
    }

    #[tokio::test]
    async fn stop_can_settle_in_the_background() {
        let h = harness();
        h.campaigns
            .set_post(CHAT, ADMIN, POST_LINK, "#eddy", "gm", "")
            .await
            .unwrap();
        join_with_handle(&h, 10, "alice").await;
        h.campaigns.start_campaign(CHAT, None).await.unwrap();
        h.campaigns
            .submit(CHAT, UserId(10), "https://x.com/alice/status/903")
            .await
            .unwrap();

        let campaigns = h.campaigns.clone();
        let report = tokio::spawn(async move { campaigns.stop_campaign(CHAT).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.points_awarded(), 100);
        assert!(!h.campaigns.campaign_state(CHAT).await.unwrap().unwrap().is_active);

        let campaigns = h.campaigns.clone();
        let err = tokio::spawn(async move { campaigns.stop_campaign(CHAT).await })
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, CampaignError::NotActive));
    }
}
