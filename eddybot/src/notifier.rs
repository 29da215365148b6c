use async_trait::async_trait;
use chrono::Utc;
use eddybot_common::{
    teloxide::{
        prelude::{Bot, ChatId, Requester},
        payloads::SendMessageSetters,
        types::ParseMode,
        utils::markdown,
    },
    utils::format_duration,
};
use raid_campaigns::{model::CampaignState, model::Post, CampaignNotifier, SettlementReport};

/// Announces raids in the group chat.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send(&self, chat_id: ChatId, text: String) -> Result<(), anyhow::Error> {
        self.bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::MarkdownV2)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CampaignNotifier for TelegramNotifier {
    async fn campaign_started(
        &self,
        state: &CampaignState,
        post: Option<&Post>,
    ) -> Result<(), anyhow::Error> {
        let mut message = "*RAID STARTED*\n\n".to_string();
        if let Some(post) = post {
            message.push_str(&format!("{}\n\n", markdown::escape(&post.post_link)));
            if !post.full_text.is_empty() {
                message.push_str(&format!("_{}_\n\n", markdown::escape(&post.full_text)));
            }
            if !post.entities.hashtags.is_empty() {
                message.push_str(&format!(
                    "*Hashtags:* {}\n",
                    markdown::escape(&post.entities.hashtags.join(", "))
                ));
            }
            if !post.entities.keywords.is_empty() {
                message.push_str(&format!(
                    "*Keywords:* {}\n",
                    markdown::escape(&post.entities.keywords.join(", "))
                ));
            }
            if !post.entities.comment_sample.is_empty() {
                message.push_str(&format!(
                    "*Example:* _{}_\n",
                    markdown::escape(&post.entities.comment_sample)
                ));
            }
            message.push('\n');
        }
        if let Some(ends_at) = state.ends_at {
            let left = (ends_at - Utc::now()).to_std().unwrap_or_default();
            message.push_str(&format!(
                "⏳ Ends in {}\n",
                markdown::escape(&format_duration(left))
            ));
        }
        message.push_str("\nReply to the post, then send /submit `<link to your reply>`");
        self.send(state.chat_id, message).await
    }

    async fn campaign_ended(
        &self,
        chat_id: ChatId,
        _post_id: &str,
        participants: usize,
    ) -> Result<(), anyhow::Error> {
        self.send(
            chat_id,
            format!(
                "*RAID ENDED*\n\n{participants} repl{} submitted, counting points\\.\\.\\.",
                if participants == 1 { "y" } else { "ies" }
            ),
        )
        .await
    }

    async fn settlement_finished(
        &self,
        chat_id: ChatId,
        report: &SettlementReport,
    ) -> Result<(), anyhow::Error> {
        if report.submissions == 0 {
            return self
                .send(chat_id, "No replies were submitted in this raid\\.".to_string())
                .await;
        }
        let mut message = format!(
            "*RAID RESULTS*\n\n🏆 {} points awarded to {} raider{}",
            report.points_awarded(),
            report.rewarded_users(),
            if report.rewarded_users() == 1 { "" } else { "s" }
        );
        if report.discarded > 0 {
            message.push_str(&discarded_line(report.discarded));
        }
        if report.missing > 0 {
            message.push_str(&format!(
                "\n{} repl{} could not be found",
                report.missing,
                if report.missing == 1 { "y" } else { "ies" }
            ));
        }
        message.push_str("\n\nCheck your total with /points");
        self.send(chat_id, message).await
    }
}

fn discarded_line(discarded: usize) -> String {
    if discarded == 1 {
        "\n1 submission wasn't a direct reply to the post".to_string()
    } else {
        format!("\n{discarded} submissions weren't direct replies to the post")
    }
}
