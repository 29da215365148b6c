pub mod analyzer;
pub mod batch;
pub mod campaign;
pub mod comment;
pub mod config;
pub mod gate;
pub mod links;
pub mod lookup;
pub mod memory;
pub mod model;
pub mod mongo;
pub mod repository;
pub mod scoring;
pub mod wallet;
pub mod x_api;

pub use analyzer::{settle, SettlementConfig, SettlementReport};
pub use campaign::{CampaignError, CampaignNotifier, RaidCampaigns, Scheduler, TokioScheduler};
pub use comment::{CommentGenerator, OpenAiCommentGenerator};
pub use config::CampaignConfig;
pub use gate::SubmissionError;
pub use lookup::{ContentLookupClient, LookupError};
pub use repository::Repositories;
