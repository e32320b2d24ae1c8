//! Pattern specificity scoring for override rule ordering.
//!
//! A pattern is split on `.` and every token is weighted by how literal it is.
//! Token weights are scaled by `0.1^(i + 1)`, so a difference at an earlier
//! segment always outweighs any combination of differences after it.

use std::cmp::Ordering;

/// Weight of a token without wildcards.
const LITERAL_WEIGHT: u8 = 9;
/// Weight of a token containing `?`.
const SINGLE_CHAR_WILDCARD_WEIGHT: u8 = 4;
/// Weight of a token with `*` after its first character (`ab*`, `a*b`).
const EMBEDDED_STAR_WEIGHT: u8 = 3;
/// Weight of a token starting with `*` followed by more characters (`*ab`).
const LEADING_STAR_WEIGHT: u8 = 2;
/// Weight of a bare `*` token.
const BARE_STAR_WEIGHT: u8 = 1;

/// Multiplier applied to the flow pattern score in [`combined_rank`].
pub const FLOW_RANK_FACTOR: f64 = 1000.0;

/// Returns the weight of a single pattern token.
pub fn token_score(token: &str) -> u8 {
    if !token.contains(['*', '?']) {
        LITERAL_WEIGHT
    } else if token == "*" {
        BARE_STAR_WEIGHT
    } else if token.contains('?') {
        SINGLE_CHAR_WILDCARD_WEIGHT
    } else if token.starts_with('*') {
        LEADING_STAR_WEIGHT
    } else {
        EMBEDDED_STAR_WEIGHT
    }
}

/// Scores a dotted glob pattern in `[0, 1)`; higher is more specific.
pub fn score(pattern: &str) -> f64 {
    pattern
        .split('.')
        .enumerate()
        .map(|(i, token)| f64::from(token_score(token)) * 0.1_f64.powi(i as i32 + 1))
        .sum()
}

/// Combined numeric rank of a (flow pattern, profile pattern) pair.
pub fn combined_rank(flow_pattern: &str, profile_pattern: &str) -> f64 {
    score(flow_pattern) * FLOW_RANK_FACTOR + score(profile_pattern)
}

/// Precomputed ordering key of an override rule.
///
/// Ordering compares the flow pattern score first and the profile pattern
/// score second, which is the order [`combined_rank`] encodes numerically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rank {
    /// Score of the flow-name pattern.
    pub flow: f64,
    /// Score of the profile-name pattern.
    pub profile: f64,
}

impl Rank {
    /// Computes the rank of a rule's patterns.
    pub fn new(flow_pattern: &str, profile_pattern: &str) -> Self {
        Self {
            flow: score(flow_pattern),
            profile: score(profile_pattern),
        }
    }

    /// Numeric form of this rank, `flow * 1000 + profile`.
    pub fn combined(&self) -> f64 {
        self.flow * FLOW_RANK_FACTOR + self.profile
    }

    /// Total order used to sort matching rules, lowest rank first.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.flow
            .total_cmp(&other.flow)
            .then_with(|| self.profile.total_cmp(&other.profile))
    }
}
