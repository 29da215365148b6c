use cached::{proc_macro::cached, TimedSizedCache};
use teloxide::{
    prelude::{Bot, ChatId, Requester, UserId},
    types::ChatMemberKind,
};

async fn _internal_is_chat_admin(
    bot: &Bot,
    chat_id: ChatId,
    user_id: UserId,
) -> Result<bool, anyhow::Error> {
    let member = bot.get_chat_member(chat_id, user_id).await?;
    Ok(matches!(
        member.kind,
        ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_)
    ))
}

/// Whether the user is the owner or an administrator of the chat. Successful
/// lookups are cached for 5 minutes, errors are not cached.
#[cached(
    result = true,
    convert = "{ (chat_id.0, user_id.0) }",
    ty = "TimedSizedCache<(i64, u64), bool>",
    create = "{ TimedSizedCache::with_size_and_lifespan(500, 300) }"
)]
pub async fn is_chat_admin_cached_5m(
    bot: &Bot,
    chat_id: ChatId,
    user_id: UserId,
) -> Result<bool, anyhow::Error> {
    _internal_is_chat_admin(bot, chat_id, user_id).await
}

pub async fn check_admin_permission_in_chat(bot: &Bot, chat_id: ChatId, user_id: UserId) -> bool {
    match is_chat_admin_cached_5m(bot, chat_id, user_id).await {
        Ok(is_admin) => is_admin,
        Err(err) => {
            log::warn!("Failed to check admin status of {user_id} in {chat_id}: {err:?}");
            false
        }
    }
}
