use std::time::Duration;

use lazy_static::lazy_static;

lazy_static! {
    static ref CLIENT: reqwest::Client = reqwest::Client::builder()
        .user_agent("Eddy Raid Bot")
        .timeout(Duration::from_secs(60))
        .build()
        .expect("Failed to create reqwest client");
}

/// Shared HTTP client, all outbound API calls go through it so that
/// connections are pooled.
pub fn get_reqwest_client() -> &'static reqwest::Client {
    &CLIENT
}
