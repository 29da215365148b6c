use std::sync::Arc;

use eddybot_common::{
    teloxide::{
        dispatching::UpdateFilterExt,
        prelude::{Bot, ChatId, Dispatcher, Message, Requester, Update, UserId},
        payloads::SendMessageSetters,
        types::ParseMode,
        utils::markdown,
    },
    utils::{chat::check_admin_permission_in_chat, format_duration},
};
use raid_campaigns::{CampaignError, RaidCampaigns, SubmissionError};

use crate::commands::{
    parse_command, parse_raid_duration, parse_set_post_args, Command, HELP_TEXT,
};

const LEADERBOARD_SIZE: usize = 10;

pub struct RaidBot {
    bot: Bot,
    campaigns: RaidCampaigns,
    /// Raids run in this chat only, admin commands check this chat's admins
    group_chat_id: ChatId,
}

impl RaidBot {
    pub fn new(bot: Bot, campaigns: RaidCampaigns, group_chat_id: ChatId) -> Self {
        Self {
            bot,
            campaigns,
            group_chat_id,
        }
    }

    pub async fn start_polling(self: Arc<Self>) {
        let this = Arc::clone(&self);
        let handler = Update::filter_message().endpoint(move |msg: Message| {
            let this = Arc::clone(&this);
            async move {
                if let Err(err) = this.handle_message(&msg).await {
                    log::warn!("Failed to handle message in {}: {err:?}", msg.chat.id);
                }
                Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
            }
        });
        Dispatcher::builder(self.bot.clone(), handler)
            .build()
            .dispatch()
            .await;
    }

    async fn handle_message(&self, message: &Message) -> Result<(), anyhow::Error> {
        let Some(text) = message.text() else {
            return Ok(());
        };
        let Some(command) = parse_command(text) else {
            return Ok(());
        };
        let Some(user) = message.from.as_ref() else {
            return Ok(());
        };
        let chat_id = message.chat.id;
        log::debug!("{} sent {command:?} in {chat_id}", user.id);

        let admin_only = matches!(
            command,
            Command::SetPost(_)
                | Command::SetDuration(_)
                | Command::StartRaid(_)
                | Command::StopRaid
                | Command::ResetPoints
        );
        if admin_only && !check_admin_permission_in_chat(&self.bot, self.group_chat_id, user.id).await
        {
            self.bot
                .send_message(chat_id, "Only chat admins can do this\\.")
                .parse_mode(ParseMode::MarkdownV2)
                .await?;
            return Ok(());
        }

        let reply = match command {
            Command::Start => {
                self.campaigns
                    .register_user(user.id, user.username.clone())
                    .await?;
                format!(
                    "Welcome, {}\\! Link your X account with /add\\_twitter `<handle>` to join raids\\.\n\n{HELP_TEXT}",
                    markdown::escape(&user.first_name)
                )
            }
            Command::Help => HELP_TEXT.to_string(),
            Command::AddTwitter(handle) => {
                if handle.is_empty() {
                    "Usage: /add\\_twitter `<handle>`".to_string()
                } else {
                    match self
                        .campaigns
                        .set_twitter_handle(user.id, user.username.clone(), &handle)
                        .await
                    {
                        Ok(handle) => format!(
                            "Your X handle is now *@{}*",
                            markdown::escape(&handle)
                        ),
                        Err(err) => self.campaign_error(err)?,
                    }
                }
            }
            Command::SetWallet(address) => {
                if address.is_empty() {
                    "Usage: /set\\_wallet `<ethereum address>`".to_string()
                } else {
                    match self
                        .campaigns
                        .set_wallet(user.id, user.username.clone(), &address)
                        .await
                    {
                        Ok(address) => format!(
                            "Your wallet is now `{}`",
                            markdown::escape_code(&address)
                        ),
                        Err(err) => self.campaign_error(err)?,
                    }
                }
            }
            Command::GenerateComment => {
                match self.campaigns.generate_comment(self.group_chat_id).await {
                    Ok(comment) => format!(
                        "Here's a reply you can post:\n\n`{}`",
                        markdown::escape_code(&comment)
                    ),
                    Err(err) => self.campaign_error(err)?,
                }
            }
            Command::Submit(link) => {
                if link.is_empty() {
                    "Usage: /submit `<link to your reply>`".to_string()
                } else {
                    match self
                        .campaigns
                        .submit(self.group_chat_id, user.id, &link)
                        .await
                    {
                        Ok(_) => "✅ Reply received\\! Points are counted when the raid ends\\."
                            .to_string(),
                        Err(SubmissionError::Storage(err)) => return Err(err),
                        Err(err) => markdown::escape(&err.to_string()),
                    }
                }
            }
            Command::Points => {
                let points = self.campaigns.points_of(user.id).await?;
                format!("You have *{points}* points")
            }
            Command::Leaderboard => self.leaderboard().await?,
            Command::SetPost(args) => self.set_post(user.id, &args).await?,
            Command::StartRaid(duration) => {
                match parse_raid_duration(duration.as_deref()) {
                    Some(Err(invalid)) => format!(
                        "Invalid duration `{}`, try something like `30m` or `1h30m`",
                        markdown::escape_code(&invalid)
                    ),
                    duration => match self
                        .campaigns
                        .start_campaign(self.group_chat_id, duration.and_then(Result::ok))
                        .await
                    {
                        Ok(_) if chat_id == self.group_chat_id => return Ok(()),
                        Ok(state) => format!("Raid round {} started", state.round),
                        Err(err) => self.campaign_error(err)?,
                    },
                }
            }
            Command::SetDuration(duration) => match parse_raid_duration(Some(&duration)) {
                Some(Ok(duration)) => {
                    self.campaigns
                        .set_campaign_duration(self.group_chat_id, duration)
                        .await?;
                    format!(
                        "Raids now last {} unless /start\\_raid says otherwise",
                        markdown::escape(&format_duration(duration))
                    )
                }
                _ => format!(
                    "Invalid duration `{}`, try something like `30m` or `1h30m`",
                    markdown::escape_code(&duration)
                ),
            },
            Command::StopRaid => match self.stop_raid(chat_id).await? {
                Some(reply) => reply,
                None => return Ok(()),
            },
            Command::ResetPoints => {
                self.campaigns.reset_points().await?;
                "All points have been reset\\.".to_string()
            }
        };

        self.bot
            .send_message(chat_id, reply)
            .parse_mode(ParseMode::MarkdownV2)
            .await?;
        Ok(())
    }

    /// Settlement can take minutes with many submissions, so it runs in the
    /// background and the group hears about it through the notifier.
    async fn stop_raid(&self, chat_id: ChatId) -> Result<Option<String>, anyhow::Error> {
        let running = self
            .campaigns
            .campaign_state(self.group_chat_id)
            .await?
            .is_some_and(|state| state.is_active);
        if !running {
            return Ok(Some(self.campaign_error(CampaignError::NotActive)?));
        }

        let campaigns = self.campaigns.clone();
        let group_chat_id = self.group_chat_id;
        tokio::spawn(async move {
            match campaigns.stop_campaign(group_chat_id).await {
                Ok(report) => log::info!(
                    "Raid in {group_chat_id} stopped, {} points awarded",
                    report.points_awarded()
                ),
                Err(CampaignError::NotActive) => {
                    log::debug!("Raid in {group_chat_id} ended before /stop_raid got to it")
                }
                Err(err) => log::error!("Failed to stop raid in {group_chat_id}: {err:?}"),
            }
        });
        Ok((chat_id != self.group_chat_id)
            .then(|| "Stopping the raid, results will be posted in the group\\.".to_string()))
    }

    async fn set_post(&self, admin_id: UserId, args: &str) -> Result<String, anyhow::Error> {
        let Some(args) = parse_set_post_args(args) else {
            return Ok(
                "Usage: /set\\_post `<link> | <hashtags> | <keywords> [| <sample>]`".to_string(),
            );
        };
        let post = match self
            .campaigns
            .set_post(
                self.group_chat_id,
                admin_id,
                &args.link,
                &args.hashtags,
                &args.keywords,
                &args.comment_sample,
            )
            .await
        {
            Ok(post) => post,
            Err(err) => return self.campaign_error(err),
        };
        let duration = self
            .campaigns
            .campaign_state(self.group_chat_id)
            .await?
            .and_then(|state| state.raid_duration())
            .unwrap_or(self.campaigns.config().duration);
        let text = if post.full_text.is_empty() {
            String::new()
        } else {
            format!("\n_{}_\n", markdown::escape(&post.full_text))
        };
        Ok(format!(
            "Post set: {}\n{text}*Hashtags:* {}\n*Keywords:* {}\n\nStart the raid with /start\\_raid, default duration is {}",
            markdown::escape(&post.post_link),
            markdown::escape(&post.entities.hashtags.join(", ")),
            markdown::escape(&post.entities.keywords.join(", ")),
            markdown::escape(&format_duration(duration)),
        ))
    }

    async fn leaderboard(&self) -> Result<String, anyhow::Error> {
        let top = self.campaigns.leaderboard(LEADERBOARD_SIZE).await?;
        let top: Vec<_> = top.into_iter().filter(|point| point.points > 0).collect();
        if top.is_empty() {
            return Ok("Nobody has points yet\\.".to_string());
        }
        let mut message = "*Leaderboard*\n".to_string();
        for (i, point) in top.iter().enumerate() {
            let name = match self.campaigns.user(point.user_id).await? {
                Some(profile) => profile
                    .twitter_handle
                    .map(|handle| format!("@{handle}"))
                    .or(profile.username)
                    .unwrap_or_else(|| point.user_id.to_string()),
                None => point.user_id.to_string(),
            };
            message.push_str(&format!(
                "\n{}\\. {} \\- {}",
                i + 1,
                markdown::escape(&name),
                point.points
            ));
        }
        Ok(message)
    }

    /// User-facing text for expected errors, storage errors are propagated.
    fn campaign_error(&self, err: CampaignError) -> Result<String, anyhow::Error> {
        match err {
            CampaignError::Storage(err) => Err(err),
            err => Ok(markdown::escape(&err.to_string())),
        }
    }
}
