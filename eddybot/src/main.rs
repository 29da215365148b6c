mod bot;
mod commands;
mod notifier;

use std::sync::Arc;

use anyhow::Context;
use eddybot_common::mongodb::options::ClientOptions;
use eddybot_common::mongodb::{Client, Database};
use eddybot_common::teloxide::prelude::{Bot, ChatId};
use log::info;
use raid_campaigns::mongo::MongoStorage;
use raid_campaigns::comment::DEFAULT_COMMENT_MODEL;
use raid_campaigns::x_api::{XApiClient, DEFAULT_X_API_URL};
use raid_campaigns::{
    CampaignConfig, OpenAiCommentGenerator, RaidCampaigns, Repositories, TokioScheduler,
};

use crate::bot::RaidBot;
use crate::notifier::TelegramNotifier;

fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    let project_level = if std::env::var("DEBUG").is_ok() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level("eddybot", project_level)
        .with_module_level("eddybot_common", project_level)
        .with_module_level("raid_campaigns", project_level)
        .env()
        .init()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let config = CampaignConfig::from_env()?;
            let group_chat_id = ChatId(
                std::env::var("GROUP_CHAT_ID")
                    .context("GROUP_CHAT_ID not set")?
                    .parse()
                    .context("GROUP_CHAT_ID is not a chat id")?,
            );

            let token = std::env::var("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN not set")?;
            let mut bot = Bot::new(token);
            if let Ok(url) = std::env::var("TELEGRAM_API_URL") {
                bot = bot.set_api_url(url.parse().context("TELEGRAM_API_URL is not a url")?);
            }

            let x_api = XApiClient::with_base_url(
                std::env::var("X_API_URL").unwrap_or_else(|_| DEFAULT_X_API_URL.to_string()),
                std::env::var("X_BEARER_TOKEN").context("X_BEARER_TOKEN not set")?,
            );

            let db = get_db().await?;
            let storage = Arc::new(MongoStorage::new(db).await?);

            let mut campaigns = RaidCampaigns::new(
                Repositories::from_storage(storage),
                Arc::new(x_api),
                Arc::new(TokioScheduler),
                Arc::new(TelegramNotifier::new(bot.clone())),
                config,
            );
            if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
                let model = std::env::var("OPENAI_MODEL")
                    .unwrap_or_else(|_| DEFAULT_COMMENT_MODEL.to_string());
                info!("Comment suggestions enabled with {model}");
                campaigns = campaigns
                    .with_comment_generator(Arc::new(OpenAiCommentGenerator::new(&api_key, model)));
            } else {
                info!("OPENAI_API_KEY not set, /generate_comment is disabled");
            }

            info!(
                "Starting raid bot in chat {group_chat_id}, default raid duration {:?}, {} points per raid",
                config.duration, config.points_budget
            );
            Arc::new(RaidBot::new(bot, campaigns, group_chat_id))
                .start_polling()
                .await;

            Ok(())
        })
}

async fn get_db() -> Result<Database, anyhow::Error> {
    let client_uri = std::env::var("MONGODB_URI").context("MONGODB_URI not set")?;
    let options = ClientOptions::parse(&client_uri).await?;
    let client = Client::with_options(options)?;
    client
        .default_database()
        .ok_or_else(|| anyhow::anyhow!("No default database specified in MONGODB_URI"))
}
