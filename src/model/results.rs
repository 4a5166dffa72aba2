//! Tallying and winner determination for a single voting day.
//!
//! Everything here is pure: callers fetch a [`CandidateTally`] per candidate
//! from storage and decide separately whether the day is finalized.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{api::ApiId, common::VotingDay, db::Candidate};

/// Only tie-break rule in use: earliest name, ignoring case.
pub const TIE_BREAK_ALPHABETICAL: &str = "alphabetical";

/// One candidate and the votes it received on some day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTally {
    pub candidate: Candidate,
    pub votes: u64,
}

/// Leaderboard order: most votes first, then name ignoring case. The exact
/// name and the ID settle anything left so the order is total.
fn leaderboard_order(a: &CandidateTally, b: &CandidateTally) -> Ordering {
    b.votes
        .cmp(&a.votes)
        .then_with(|| name_order(&a.candidate, &b.candidate))
}

fn name_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Active candidates only, in leaderboard order. Zero-vote candidates are kept.
pub fn active_leaderboard(all: &[CandidateTally]) -> Vec<&CandidateTally> {
    let mut active: Vec<_> = all.iter().filter(|t| t.candidate.active).collect();
    active.sort_by(|a, b| leaderboard_order(a, b));
    active
}

/// Vote count per active candidate, keyed by ID.
pub fn tally(all: &[CandidateTally]) -> BTreeMap<ApiId, u64> {
    all.iter()
        .filter(|t| t.candidate.active)
        .map(|t| (t.candidate.id.into(), t.votes))
        .collect()
}

/// The day's winner among active candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub id: ApiId,
    pub name: String,
    pub party: String,
    pub vote_count: u64,
    /// True if several candidates shared the top count.
    pub tie_broken: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tie_breaking_method: Option<String>,
    /// Names of every candidate that shared the top count, in tie-break order.
    /// Empty unless `tie_broken`.
    pub tied_candidates: Vec<String>,
}

/// Pick the winner among active candidates. Ties on the top count go to the
/// alphabetically earliest name, ignoring case.
pub fn winner(all: &[CandidateTally]) -> Option<Winner> {
    let leaderboard = active_leaderboard(all);
    let max_votes = leaderboard.first()?.votes;
    let mut tied: Vec<_> = leaderboard
        .into_iter()
        .filter(|t| t.votes == max_votes)
        .collect();
    tied.sort_by(|a, b| name_order(&a.candidate, &b.candidate));

    let top = tied[0];
    let tie_broken = tied.len() > 1;
    Some(Winner {
        id: top.candidate.id.into(),
        name: top.candidate.name.clone(),
        party: top.candidate.party.clone(),
        vote_count: top.votes,
        tie_broken,
        tie_breaking_method: tie_broken.then(|| TIE_BREAK_ALPHABETICAL.to_string()),
        tied_candidates: if tie_broken {
            tied.iter().map(|t| t.candidate.name.clone()).collect()
        } else {
            Vec::new()
        },
    })
}

/// A top vote-getter that is no longer standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedWinner {
    pub name: String,
    pub party: String,
    pub vote_count: u64,
}

/// Report the case where the overall top vote-getter has since revoked their
/// candidacy while still holding at least as many votes as the active
/// leader. Purely informational: inactive candidates never win. With nobody
/// left standing there is no leader to compare against, so nothing is
/// reported.
pub fn detect_retroactive_invalidation(all: &[CandidateTally]) -> Option<RevokedWinner> {
    let top = all.iter().min_by(|a, b| leaderboard_order(a, b))?;
    if top.candidate.active || top.votes == 0 {
        return None;
    }
    let active_leader_votes = active_leaderboard(all).first()?.votes;
    (top.votes >= active_leader_votes).then(|| RevokedWinner {
        name: top.candidate.name.clone(),
        party: top.candidate.party.clone(),
        vote_count: top.votes,
    })
}

/// A candidate's line in the published results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub id: ApiId,
    pub name: String,
    pub party: String,
    pub position: String,
    pub description: String,
    pub profile_pic: Option<String>,
    pub vote_count: u64,
}

impl From<&CandidateTally> for CandidateResult {
    fn from(tally: &CandidateTally) -> Self {
        let candidate = &tally.candidate;
        Self {
            id: candidate.id.into(),
            name: candidate.name.clone(),
            party: candidate.party.clone(),
            position: candidate.position.clone(),
            description: candidate.description.clone(),
            profile_pic: candidate.profile_pic.clone(),
            vote_count: tally.votes,
        }
    }
}

/// Full results for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayResults {
    pub day: VotingDay,
    /// Active candidates in leaderboard order.
    pub results: Vec<CandidateResult>,
    /// Vote count per active candidate ID, zero-vote candidates included.
    pub tally: BTreeMap<ApiId, u64>,
    pub total_votes: u64,
    pub total_candidates: usize,
    pub is_finalized: bool,
    /// Only present once the day is finalized.
    pub winner: Option<Winner>,
    pub tie_broken: bool,
    pub tied_candidates: Vec<String>,
    pub previous_winner_revoked: bool,
    pub revoked_winner_info: Option<RevokedWinner>,
    pub voting_status: String,
}

impl DayResults {
    /// Build the results for `day` from every candidate's tally.
    pub fn new(day: VotingDay, all: &[CandidateTally], finalized: bool) -> Self {
        let leaderboard = active_leaderboard(all);
        let results: Vec<CandidateResult> =
            leaderboard.iter().map(|t| CandidateResult::from(*t)).collect();
        let total_votes = leaderboard.iter().map(|t| t.votes).sum();

        let (winner, revoked) = if finalized {
            (winner(all), detect_retroactive_invalidation(all))
        } else {
            (None, None)
        };

        let voting_status = match (finalized, &revoked) {
            (false, _) => "Voting is currently in progress. Results are not final yet.".to_string(),
            (true, Some(revoked)) => format!(
                "Voting has ended for {day}. Original winner {} ({} votes) withdrew from \
                 candidacy. Winner recalculated from remaining candidates.",
                revoked.name, revoked.vote_count
            ),
            (true, None) => format!("Voting has ended for {day}. Results are final."),
        };

        Self {
            day,
            total_candidates: results.len(),
            results,
            tally: tally(all),
            total_votes,
            is_finalized: finalized,
            tie_broken: winner.as_ref().map_or(false, |w| w.tie_broken),
            tied_candidates: winner
                .as_ref()
                .map(|w| w.tied_candidates.clone())
                .unwrap_or_default(),
            winner,
            previous_winner_revoked: revoked.is_some(),
            revoked_winner_info: revoked,
            voting_status,
        }
    }
}
