use eddybot_common::teloxide::types::{ChatId, UserId};

use crate::{
    links::{normalize_handle, parse_status_link},
    model::Submission,
    repository::{Repositories, SubmissionInsert},
};

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Not a valid X post link")]
    InvalidLink,

    #[error("There's no active raid right now")]
    NoActiveCampaign,

    #[error("Set your X handle with /add_twitter first")]
    HandleNotSet,

    #[error("This reply was posted by @{actual}, but your X handle is @{expected}")]
    HandleMismatch { expected: String, actual: String },

    #[error("You have already submitted a reply for this raid")]
    Duplicate,

    #[error("This reply was already submitted by someone else")]
    ReplyTaken,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Admits a reply link into the running campaign of `chat_id`.
///
/// Nothing is scored here, the submission waits for the end of the campaign.
/// Checks run cheapest first: link shape, campaign, handle, then the
/// first-write-wins insert. A submission that lands after the campaign
/// ended is taken back.
pub async fn submit(
    repos: &Repositories,
    chat_id: ChatId,
    user_id: UserId,
    link: &str,
) -> Result<Submission, SubmissionError> {
    let status = parse_status_link(link).ok_or(SubmissionError::InvalidLink)?;

    let (post_id, round) = match repos.campaigns.get_campaign(chat_id).await? {
        Some(state) if state.is_active => (
            state
                .active_post_id
                .ok_or(SubmissionError::NoActiveCampaign)?,
            state.round,
        ),
        _ => return Err(SubmissionError::NoActiveCampaign),
    };
    if status.status_id == post_id {
        // the raided post itself, not a reply to it
        return Err(SubmissionError::InvalidLink);
    }

    let expected = repos
        .users
        .get_user(user_id)
        .await?
        .and_then(|user| user.twitter_handle)
        .ok_or(SubmissionError::HandleNotSet)?;
    if normalize_handle(&expected) != normalize_handle(&status.username) {
        return Err(SubmissionError::HandleMismatch {
            expected,
            actual: status.username,
        });
    }

    let submission = Submission {
        reference_id: status.status_id,
        post_id,
        user_id,
        url: link.trim().to_string(),
    };
    match repos
        .submissions
        .create_submission(submission.clone())
        .await?
    {
        SubmissionInsert::Created => {}
        SubmissionInsert::UserAlreadySubmitted => return Err(SubmissionError::Duplicate),
        SubmissionInsert::ReplyAlreadySubmitted => return Err(SubmissionError::ReplyTaken),
    }

    // the campaign may have ended while the insert was in flight
    let still_running = repos
        .campaigns
        .get_campaign(chat_id)
        .await?
        .is_some_and(|state| {
            state.is_active
                && state.round == round
                && state.active_post_id.as_deref() == Some(submission.post_id.as_str())
        });
    if !still_running {
        repos
            .submissions
            .delete_submission(&submission.post_id, user_id)
            .await?;
        log::info!(
            "Dropped late submission {} of user {user_id}, the raid on post {} is over",
            submission.reference_id,
            submission.post_id
        );
        return Err(SubmissionError::NoActiveCampaign);
    }
    log::info!(
        "User {user_id} submitted reply {} for post {}",
        submission.reference_id,
        submission.post_id
    );
    Ok(submission)
}
