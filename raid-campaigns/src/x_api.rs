use async_trait::async_trait;
use eddybot_common::utils::requests::get_reqwest_client;
use serde::Deserialize;

use crate::{
    lookup::{ApiError, ContentLookupClient, LookupError},
    model::ContentItem,
};

pub const DEFAULT_X_API_URL: &str = "https://api.x.com";

/// The X API v2 allows up to 100 ids per tweet lookup.
pub const MAX_IDS_PER_REQUEST: usize = 100;

/// Tweet lookup through the X API v2 `GET /2/tweets` endpoint.
pub struct XApiClient {
    base_url: String,
    bearer_token: String,
}

impl XApiClient {
    pub fn new(bearer_token: String) -> Self {
        Self::with_base_url(DEFAULT_X_API_URL.to_string(), bearer_token)
    }

    pub fn with_base_url(base_url: String, bearer_token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
        }
    }
}

#[async_trait]
impl ContentLookupClient for XApiClient {
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<ContentItem>, LookupError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = get_reqwest_client()
            .get(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("ids", ids.join(",")),
                (
                    "tweet.fields",
                    "text,entities,referenced_tweets".to_string(),
                ),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<TweetsResponse>(&body) {
                Ok(response) if !response.errors.is_empty() => LookupError::Api {
                    errors: response.errors,
                },
                _ => LookupError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }
        parse_tweets_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct TweetsResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    #[serde(default)]
    entities: Option<TweetEntities>,
    #[serde(default)]
    referenced_tweets: Vec<ReferencedTweet>,
}

#[derive(Debug, Deserialize)]
struct TweetEntities {
    #[serde(default)]
    hashtags: Vec<HashtagEntity>,
}

#[derive(Debug, Deserialize)]
struct HashtagEntity {
    tag: String,
}

#[derive(Debug, Deserialize)]
struct ReferencedTweet {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

impl From<Tweet> for ContentItem {
    fn from(tweet: Tweet) -> Self {
        let replied_to_id = tweet
            .referenced_tweets
            .into_iter()
            .find(|reference| reference.kind == "replied_to")
            .map(|reference| reference.id);
        ContentItem {
            id: tweet.id,
            text: tweet.text,
            hashtags: tweet
                .entities
                .map(|entities| entities.hashtags.into_iter().map(|h| h.tag).collect())
                .unwrap_or_default(),
            replied_to_id,
        }
    }
}

/// Tweets that were found are returned even if some ids failed (deleted or
/// protected tweets). Only a response without any tweet and with errors is an
/// error.
fn parse_tweets_response(body: &str) -> Result<Vec<ContentItem>, LookupError> {
    let response: TweetsResponse = serde_json::from_str(body)?;
    if response.data.is_empty() && !response.errors.is_empty() {
        return Err(LookupError::Api {
            errors: response.errors,
        });
    }
    for error in response.errors.iter() {
        log::debug!("Tweet lookup partial error: {error}");
    }
    Ok(response.data.into_iter().map(ContentItem::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_replies_hashtags_and_partial_errors() {
        let body = r#"{
            "data": [
                {
                    "id": "200",
                    "text": "@eddy gm #NodeJS #react",
                    "edit_history_tweet_ids": ["200"],
                    "entities": {
                        "hashtags": [
                            {"start": 9, "end": 16, "tag": "NodeJS"},
                            {"start": 17, "end": 23, "tag": "react"}
                        ],
                        "mentions": [{"start": 0, "end": 5, "username": "eddy"}]
                    },
                    "referenced_tweets": [
                        {"type": "quoted", "id": "999"},
                        {"type": "replied_to", "id": "100"}
                    ]
                },
                {"id": "201", "text": "no entities here"}
            ],
            "errors": [
                {
                    "value": "202",
                    "detail": "Could not find tweet with ids: [202].",
                    "title": "Not Found Error",
                    "resource_type": "tweet",
                    "parameter": "ids",
                    "resource_id": "202",
                    "type": "https://api.twitter.com/2/problems/resource-not-found"
                }
            ]
        }"#;
        let items = parse_tweets_response(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "200");
        assert_eq!(items[0].hashtags, vec!["NodeJS", "react"]);
        assert_eq!(items[0].replied_to_id.as_deref(), Some("100"));
        assert!(items[0].is_direct_reply_to("100"));
        assert!(!items[0].is_direct_reply_to("999"));
        assert!(items[1].hashtags.is_empty());
        assert_eq!(items[1].replied_to_id, None);
    }

    #[test]
    fn only_errors_is_a_structured_error() {
        let body = r#"{
            "errors": [
                {"value": "1", "title": "Not Found Error", "detail": "gone", "resource_id": "1"},
                {"value": "2", "title": "Authorization Error", "detail": "protected", "resource_id": "2"}
            ]
        }"#;
        let err = parse_tweets_response(body).unwrap_err();
        let errors = err.api_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].resource_id.as_deref(), Some("2"));
        assert!(err.to_string().contains("Authorization Error: protected (id 2)"));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            parse_tweets_response("<html>"),
            Err(LookupError::Decode(_))
        ));
    }
}
