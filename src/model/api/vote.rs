use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::{ApiId, CandidateView},
    common::VotingDay,
    db::{Candidate, Vote},
    mongodb::Id,
};

/// A request to vote for a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoteRequest {
    pub candidate_id: Id,
}

/// Confirmation of a recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub message: String,
    pub vote_id: ApiId,
    pub candidate_id: ApiId,
    pub day: VotingDay,
    pub cast_at: DateTime<Utc>,
}

impl From<&Vote> for VoteReceipt {
    fn from(vote: &Vote) -> Self {
        Self {
            message: "Vote cast successfully".to_string(),
            vote_id: vote.id.into(),
            candidate_id: vote.candidate_id.into(),
            day: vote.day,
            cast_at: vote.cast_at,
        }
    }
}

/// Whether the caller has voted on the current day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotStatus {
    pub has_voted: bool,
    pub voter_id: ApiId,
    pub day: VotingDay,
}

/// The caller's vote for the current day, with the candidate it went to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyVote {
    pub has_voted: bool,
    pub day: VotingDay,
    pub cast_at: Option<DateTime<Utc>>,
    pub candidate: Option<CandidateView>,
}

impl MyVote {
    pub fn new(day: VotingDay, vote: Option<(Vote, Option<Candidate>)>) -> Self {
        match vote {
            Some((vote, candidate)) => Self {
                has_voted: true,
                day,
                cast_at: Some(vote.cast_at),
                candidate: candidate.as_ref().map(CandidateView::from),
            },
            None => Self {
                has_voted: false,
                day,
                cast_at: None,
                candidate: None,
            },
        }
    }
}
