use std::time::Duration;

use anyhow::Context;
use eddybot_common::utils::parse_duration;

use crate::analyzer::{
    SettlementConfig, DEFAULT_PAGE_SIZE, DEFAULT_POINTS_BUDGET, DEFAULT_REQUEST_INTERVAL,
};

pub const DEFAULT_CAMPAIGN_DURATION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignConfig {
    /// Used when `/start_raid` is called without a duration
    pub duration: Duration,
    pub points_budget: u64,
    pub page_size: usize,
    pub request_interval: Duration,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_CAMPAIGN_DURATION,
            points_budget: DEFAULT_POINTS_BUDGET,
            page_size: DEFAULT_PAGE_SIZE,
            request_interval: DEFAULT_REQUEST_INTERVAL,
        }
    }
}

impl CampaignConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Reads the config through `var`, missing variables keep their defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let mut config = Self::default();
        if let Some(value) = var("CAMPAIGN_DURATION") {
            config.duration = parse_duration(&value)
                .with_context(|| format!("CAMPAIGN_DURATION: invalid duration {value:?}"))?;
        }
        if let Some(value) = var("CAMPAIGN_POINTS") {
            config.points_budget = value
                .trim()
                .parse()
                .with_context(|| format!("CAMPAIGN_POINTS: invalid number {value:?}"))?;
        }
        if let Some(value) = var("SETTLEMENT_PAGE_SIZE") {
            config.page_size = value
                .trim()
                .parse()
                .with_context(|| format!("SETTLEMENT_PAGE_SIZE: invalid number {value:?}"))?;
            if config.page_size == 0 || config.page_size > crate::x_api::MAX_IDS_PER_REQUEST {
                anyhow::bail!(
                    "SETTLEMENT_PAGE_SIZE must be between 1 and {}",
                    crate::x_api::MAX_IDS_PER_REQUEST
                );
            }
        }
        if let Some(value) = var("SETTLEMENT_REQUEST_INTERVAL") {
            config.request_interval = parse_duration(&value).with_context(|| {
                format!("SETTLEMENT_REQUEST_INTERVAL: invalid duration {value:?}")
            })?;
        }
        Ok(config)
    }

    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig {
            page_size: self.page_size,
            request_interval: self.request_interval,
            points_budget: self.points_budget,
        }
    }
}
