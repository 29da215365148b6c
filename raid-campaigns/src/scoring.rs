use std::collections::HashSet;

use crate::model::{CommentContent, PostEntities, ScoreBreakdown};

/// Lowercases a hashtag and strips the leading `#`, so `#NodeJS` and
/// `nodejs` compare equal.
pub fn normalize_hashtag(tag: &str) -> String {
    let tag = tag.trim();
    tag.strip_prefix('#').unwrap_or(tag).to_lowercase()
}

/// Scores a reply against the post criteria.
///
/// Every criterion that matches counts once, and the points are the share of
/// matched criteria in `points_budget`, rounded once at the end. Criteria
/// listed twice are counted twice, both in the matches and in the maximum.
/// `None` content (the tweet couldn't be fetched) scores nothing.
pub fn score(
    content: Option<CommentContent<'_>>,
    criteria: &PostEntities,
    points_budget: u64,
) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown {
        tweet_found: false,
        total_hashtags: criteria.hashtags.len(),
        total_keywords: criteria.keywords.len(),
        hashtags_found: 0,
        keywords_found: 0,
        points: 0,
        total_points: points_budget,
    };

    let Some(content) = content else {
        return breakdown;
    };
    breakdown.tweet_found = true;

    let tags: HashSet<String> = content
        .hashtags
        .iter()
        .map(|tag| normalize_hashtag(tag))
        .collect();
    breakdown.hashtags_found = criteria
        .hashtags
        .iter()
        .map(|tag| normalize_hashtag(tag))
        .filter(|tag| !tag.is_empty() && tags.contains(tag))
        .count();

    let text = content.text.to_lowercase();
    breakdown.keywords_found = criteria
        .keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty() && text.contains(keyword.as_str()))
        .count();

    breakdown.points = proportional_points(
        points_budget,
        breakdown.hashtags_found + breakdown.keywords_found,
        breakdown.total_hashtags + breakdown.total_keywords,
    );
    breakdown
}

fn proportional_points(budget: u64, matched: usize, max_matches: usize) -> u64 {
    if max_matches == 0 {
        return 0;
    }
    (budget as f64 * matched as f64 / max_matches as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(keywords: &[&str], hashtags: &[&str]) -> PostEntities {
        PostEntities {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            hashtags: hashtags.iter().map(|s| s.to_string()).collect(),
            comment_sample: String::new(),
        }
    }

    fn tags(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn hashtag_criteria_match_with_or_without_hash() {
        let candidate = tags(&["nodejs"]);
        let content = CommentContent {
            text: "",
            hashtags: &candidate,
        };
        let with_hash = score(Some(content), &criteria(&[], &["#nodejs"]), 10);
        let without_hash = score(Some(content), &criteria(&[], &["nodejs"]), 10);
        assert_eq!(with_hash.hashtags_found, 1);
        assert_eq!(with_hash, without_hash);
        assert_eq!(with_hash.points, 10);
    }

    #[test]
    fn hashtags_compare_case_insensitively() {
        let candidate = tags(&["NodeJS", "#React"]);
        let content = CommentContent {
            text: "",
            hashtags: &candidate,
        };
        let breakdown = score(Some(content), &criteria(&[], &["#nodejs", "REACT"]), 100);
        assert_eq!(breakdown.hashtags_found, 2);
    }

    #[test]
    fn points_are_proportional_to_matched_criteria() {
        let candidate = tags(&["rust"]);
        let content = CommentContent {
            text: "what a launch",
            hashtags: &candidate,
        };
        let breakdown = score(
            Some(content),
            &criteria(&["launch", "token"], &["#rust", "#near", "#web3"]),
            100,
        );
        assert_eq!(breakdown.keywords_found, 1);
        assert_eq!(breakdown.hashtags_found, 1);
        assert_eq!(breakdown.points, 40);
        assert_eq!(breakdown.total_points, 100);
    }

    #[test]
    fn empty_criteria_never_award_points() {
        let candidate = tags(&["anything"]);
        let content = CommentContent {
            text: "some text",
            hashtags: &candidate,
        };
        let breakdown = score(Some(content), &criteria(&[], &[]), 100);
        assert!(breakdown.tweet_found);
        assert_eq!(breakdown.points, 0);
        assert_eq!(breakdown.total_hashtags + breakdown.total_keywords, 0);
    }

    #[test]
    fn keyword_and_hashtag_scenario() {
        let candidate = tags(&["nodejs"]);
        let content = CommentContent {
            text: "Excited about this NEW project with #nodejs",
            hashtags: &candidate,
        };
        let breakdown = score(
            Some(content),
            &criteria(&["new", "project"], &["#nodejs", "#react"]),
            40,
        );
        assert_eq!(breakdown.keywords_found, 2);
        assert_eq!(breakdown.hashtags_found, 1);
        assert_eq!(breakdown.points, 30);
    }

    #[test]
    fn missing_content_keeps_totals() {
        let breakdown = score(None, &criteria(&["a", "b"], &["#c"]), 50);
        assert!(!breakdown.tweet_found);
        assert_eq!(breakdown.total_keywords, 2);
        assert_eq!(breakdown.total_hashtags, 1);
        assert_eq!(breakdown.keywords_found, 0);
        assert_eq!(breakdown.points, 0);
    }

    #[test]
    fn repeated_occurrences_count_once_per_criterion() {
        let candidate = tags(&["rust", "rust", "#rust"]);
        let content = CommentContent {
            text: "moon moon moon",
            hashtags: &candidate,
        };
        let breakdown = score(Some(content), &criteria(&["moon"], &["#rust", "#near"]), 30);
        assert_eq!(breakdown.keywords_found, 1);
        assert_eq!(breakdown.hashtags_found, 1);
        assert_eq!(breakdown.points, 20);
    }

    #[test]
    fn rounds_the_aggregate_once() {
        // 2 of 3 matched with a budget of 10 is 6.67 -> 7, rounding each
        // match separately would give 3 + 3 = 6.
        let content = CommentContent {
            text: "alpha beta",
            hashtags: &[],
        };
        let breakdown = score(Some(content), &criteria(&["alpha", "beta", "gamma"], &[]), 10);
        assert_eq!(breakdown.points, 7);
    }
}
