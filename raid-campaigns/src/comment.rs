use std::collections::HashSet;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;

use crate::{model::Post, scoring::normalize_hashtag};

pub const DEFAULT_COMMENT_MODEL: &str = "gpt-4o-mini";

/// Writes reply suggestions for raiders.
#[async_trait]
pub trait CommentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, anyhow::Error>;
}

pub struct OpenAiCommentGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCommentGenerator {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(OpenAIConfig::new().with_api_key(api_key)),
            model: model.into(),
        }
    }
}

#[async_trait]
impl CommentGenerator for OpenAiCommentGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, anyhow::Error> {
        let message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?
            .into();
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(vec![message])
            .build()?;
        let response = self.client.chat().create(request).await?;
        response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow::anyhow!("{} returned no comment", self.model))
    }
}

/// Instructions for a reply to `post` that uses its keywords and hashtags in
/// the tone of its sample comment.
pub fn comment_prompt(post: &Post) -> String {
    let entities = &post.entities;
    let mut prompt = String::from("Write a reply to a post on X (Twitter).\n");
    if !post.full_text.is_empty() {
        prompt.push_str(&format!("The post says:\n{}\n", post.full_text));
    }
    if !entities.comment_sample.is_empty() {
        prompt.push_str(&format!(
            "Use a context similar to this sample comment:\n{}\n",
            entities.comment_sample
        ));
    }
    if !entities.keywords.is_empty() {
        prompt.push_str(&format!(
            "The reply must contain these words: {}\n",
            entities.keywords.join(", ")
        ));
    }
    if !entities.hashtags.is_empty() {
        let hashtags: Vec<String> = entities
            .hashtags
            .iter()
            .map(|tag| format!("#{}", tag.trim().trim_start_matches('#')))
            .collect();
        prompt.push_str(&format!(
            "It must also contain these hashtags: {}\n",
            hashtags.join(" ")
        ));
    }
    prompt.push_str("Keep it positive and under 280 characters. Reply with the comment text only.");
    prompt
}

/// Appends the post's hashtags that `text` doesn't use yet, so a generated
/// comment always scores them.
pub fn complete_comment(text: &str, post: &Post) -> String {
    let used: HashSet<String> = text
        .split_whitespace()
        .filter(|word| word.starts_with('#'))
        .map(|word| word.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .map(normalize_hashtag)
        .collect();
    let mut comment = text.trim().to_string();
    let mut added = HashSet::new();
    for tag in &post.entities.hashtags {
        let normalized = normalize_hashtag(tag);
        if normalized.is_empty() || used.contains(&normalized) || !added.insert(normalized) {
            continue;
        }
        comment.push_str(" #");
        comment.push_str(tag.trim().trim_start_matches('#'));
    }
    comment
}

#[cfg(test)]
mod tests {
    use eddybot_common::teloxide::types::UserId;

    use super::*;
    use crate::model::PostEntities;

    fn post() -> Post {
        Post {
            post_id: "900".to_string(),
            post_link: "https://x.com/eddy/status/900".to_string(),
            admin_id: UserId(1),
            full_text: "Eddy v2 is live".to_string(),
            entities: PostEntities {
                keywords: vec!["moon".to_string(), "launch".to_string()],
                hashtags: vec!["#Eddy".to_string(), "raid".to_string()],
                comment_sample: "This is huge!".to_string(),
            },
        }
    }

    #[test]
    fn prompt_carries_the_post_and_criteria() {
        let prompt = comment_prompt(&post());
        assert!(prompt.contains("Eddy v2 is live"));
        assert!(prompt.contains("This is huge!"));
        assert!(prompt.contains("moon, launch"));
        assert!(prompt.contains("#Eddy #raid"));
    }

    #[test]
    fn prompt_skips_empty_parts() {
        let mut post = post();
        post.full_text.clear();
        post.entities = PostEntities::default();
        let prompt = comment_prompt(&post);
        assert!(!prompt.contains("The post says"));
        assert!(!prompt.contains("hashtags"));
        assert!(!prompt.contains("sample"));
    }

    #[test]
    fn missing_hashtags_are_appended_once() {
        assert_eq!(
            complete_comment("To the moon! #eddy,", &post()),
            "To the moon! #eddy, #raid"
        );
        assert_eq!(complete_comment(" gm ", &post()), "gm #Eddy #raid");
        assert_eq!(
            complete_comment("#RAID #Eddy gm", &post()),
            "#RAID #Eddy gm"
        );
    }
}
