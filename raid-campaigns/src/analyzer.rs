use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    panic::AssertUnwindSafe,
    time::Duration,
};

use eddybot_common::teloxide::types::UserId;
use futures_util::FutureExt;

use crate::{
    batch::run_batched,
    lookup::{ContentLookupClient, LookupError},
    model::{ContentItem, PostEntities, ScoreBreakdown, Submission},
    repository::{PointRepository, PostRepository, SubmissionRepository},
    scoring::score,
};

/// The X API accepts at most 100 ids per lookup, one less leaves some room.
pub const DEFAULT_PAGE_SIZE: usize = 99;
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_secs(4);
pub const DEFAULT_POINTS_BUDGET: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Ids per lookup request
    pub page_size: usize,
    /// Minimum time between two lookup requests
    pub request_interval: Duration,
    /// Points for a reply that matches every criterion
    pub points_budget: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            request_interval: DEFAULT_REQUEST_INTERVAL,
            points_budget: DEFAULT_POINTS_BUDGET,
        }
    }
}

/// What settlement reads from and writes to.
#[derive(Clone, Copy)]
pub struct SettlementDeps<'a> {
    pub submissions: &'a dyn SubmissionRepository,
    pub points: &'a dyn PointRepository,
    pub posts: &'a dyn PostRepository,
    pub lookup: &'a dyn ContentLookupClient,
}

#[derive(Debug)]
pub struct ScoredSubmission {
    pub user_id: UserId,
    pub reference_id: String,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug)]
pub struct FailedChunk {
    pub index: usize,
    pub reference_ids: Vec<String>,
    pub error: LookupError,
}

#[derive(Debug, Default)]
pub struct SettlementReport {
    pub post_id: String,
    pub submissions: usize,
    pub scored: Vec<ScoredSubmission>,
    /// Submissions of a reply that another submission already claimed
    pub duplicates: usize,
    /// Fetched, but not a direct reply to the post
    pub discarded: usize,
    /// Not returned by the lookup although its chunk succeeded (deleted,
    /// protected or never existed)
    pub missing: usize,
    pub failed_chunks: Vec<FailedChunk>,
}

impl SettlementReport {
    fn empty(post_id: &str) -> Self {
        Self {
            post_id: post_id.to_string(),
            ..Default::default()
        }
    }

    pub fn points_awarded(&self) -> u64 {
        self.scored.iter().map(|s| s.breakdown.points).sum()
    }

    pub fn rewarded_users(&self) -> usize {
        self.scored.iter().filter(|s| s.breakdown.points > 0).count()
    }
}

/// Scores every pending submission of `post_id`, awards the points and
/// deletes the pending submissions.
///
/// The pending submissions are deleted whatever happens while scoring,
/// including errors and panics, so running this twice never awards points
/// twice: the second run finds nothing to score. Submissions of chunks that
/// could not be fetched are dropped without points.
pub async fn settle(
    post_id: &str,
    deps: SettlementDeps<'_>,
    config: &SettlementConfig,
) -> Result<SettlementReport, anyhow::Error> {
    let result = AssertUnwindSafe(settle_pending(post_id, deps, config))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            Err(anyhow::anyhow!("Settlement of post {post_id} panicked"))
        });

    let cleanup = deps.submissions.delete_all_pending(post_id).await;
    if let Err(err) = &cleanup {
        log::error!("Failed to delete pending submissions of post {post_id}: {err:?}");
    }

    let report = result?;
    cleanup?;
    Ok(report)
}

async fn settle_pending(
    post_id: &str,
    deps: SettlementDeps<'_>,
    config: &SettlementConfig,
) -> Result<SettlementReport, anyhow::Error> {
    let submissions = deps.submissions.list_pending(post_id).await?;
    if submissions.is_empty() {
        log::info!("No pending submissions for post {post_id}");
        return Ok(SettlementReport::empty(post_id));
    }
    let post = deps
        .posts
        .get_post(post_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post {post_id} not found"))?;

    // one reply is scored once, for the first submission that claimed it
    let mut by_reference: HashMap<&str, &Submission> = HashMap::new();
    let mut reference_ids = Vec::new();
    for submission in &submissions {
        match by_reference.entry(submission.reference_id.as_str()) {
            Entry::Vacant(entry) => {
                entry.insert(submission);
                reference_ids.push(submission.reference_id.clone());
            }
            Entry::Occupied(entry) => log::warn!(
                "Reply {} of post {post_id} was submitted by both {} and {}, keeping the first",
                submission.reference_id,
                entry.get().user_id,
                submission.user_id
            ),
        }
    }

    let page_size = config.page_size.max(1);
    log::info!(
        "Settling {} submissions for post {post_id} in {} chunk(s)",
        reference_ids.len(),
        reference_ids.len().div_ceil(page_size)
    );

    let outcome = run_batched(
        reference_ids.clone(),
        page_size,
        config.request_interval,
        move |ids| async move { deps.lookup.fetch_by_ids(&ids).await },
    )
    .await;

    let mut report = SettlementReport {
        post_id: post_id.to_string(),
        submissions: submissions.len(),
        duplicates: submissions.len() - reference_ids.len(),
        ..Default::default()
    };
    for failure in outcome.failures {
        let start = failure.index * page_size;
        let reference_ids = reference_ids[start..start + failure.len].to_vec();
        log::warn!(
            "Dropping submissions {reference_ids:?} of post {post_id}, chunk {} failed: {}",
            failure.index,
            failure.error
        );
        for api_error in failure.error.api_errors() {
            log::warn!("Chunk {} of post {post_id}: {api_error}", failure.index);
        }
        report.failed_chunks.push(FailedChunk {
            index: failure.index,
            reference_ids,
            error: failure.error,
        });
    }

    let mut seen = HashSet::new();
    for item in outcome.results {
        let Some(submission) = by_reference.get(item.id.as_str()) else {
            log::debug!("Lookup returned unrequested tweet {}", item.id);
            continue;
        };
        if !seen.insert(item.id.clone()) {
            log::debug!("Lookup returned tweet {} twice", item.id);
            continue;
        }
        if !item.is_direct_reply_to(post_id) {
            log::debug!(
                "Tweet {} of user {} is not a direct reply to {post_id}",
                item.id,
                submission.user_id
            );
            report.discarded += 1;
            continue;
        }
        let scored = score_reply(&item, submission, &post.entities, config);
        if scored.breakdown.points > 0 {
            deps.points
                .add_points(scored.user_id, scored.breakdown.points)
                .await?;
        }
        report.scored.push(scored);
    }

    let failed: usize = report
        .failed_chunks
        .iter()
        .map(|chunk| chunk.reference_ids.len())
        .sum();
    report.missing = reference_ids.len().saturating_sub(failed + seen.len());

    log::info!(
        "Settled post {post_id}: {} scored, {} points awarded to {} users, {} duplicates, {} discarded, {} missing, {} failed chunk(s)",
        report.scored.len(),
        report.points_awarded(),
        report.rewarded_users(),
        report.duplicates,
        report.discarded,
        report.missing,
        report.failed_chunks.len()
    );
    Ok(report)
}

fn score_reply(
    item: &ContentItem,
    submission: &Submission,
    criteria: &PostEntities,
    config: &SettlementConfig,
) -> ScoredSubmission {
    ScoredSubmission {
        user_id: submission.user_id,
        reference_id: submission.reference_id.clone(),
        breakdown: score(Some(item.content()), criteria, config.points_budget),
    }
}
