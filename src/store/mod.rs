//! Durable storage for voters, candidates and votes.
//!
//! Every mutating operation checks its own preconditions inside the same
//! atomic unit as the write, so callers never race between a check and an
//! insert.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use serde::Serialize;

use crate::error::Result;
use crate::model::{
    common::VotingDay,
    db::{
        Candidate, CandidateUpdate, NewCandidate, NewVote, NewVoter, ProfileUpdate, Vote, Voter,
    },
    mongodb::Id,
    results::CandidateTally,
};

#[rocket::async_trait]
pub trait VotingStore: Send + Sync {
    /// Human-readable backend name, for logs.
    fn backend(&self) -> &'static str;

    /// Insert a voter. Fails with `UserExists` if the email is taken.
    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter>;

    async fn voter_by_id(&self, id: Id) -> Result<Option<Voter>>;

    /// Apply the supplied profile fields and return the updated voter, or
    /// `None` if there is no such voter.
    async fn update_voter(&self, id: Id, update: ProfileUpdate) -> Result<Option<Voter>>;

    /// Look up a voter by (lowercase) email.
    async fn voter_by_email(&self, email: &str) -> Result<Option<Voter>>;

    async fn candidate_by_id(&self, id: Id) -> Result<Option<Candidate>>;

    /// The candidate record owned by the given voter, active or not.
    async fn candidate_by_voter(&self, voter_id: Id) -> Result<Option<Candidate>>;

    /// All active candidates, sorted by name.
    async fn active_candidates(&self) -> Result<Vec<Candidate>>;

    /// Insert a new candidate. Fails with `AlreadyCandidate` if the owning
    /// voter already has a candidate record, active or not.
    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate>;

    /// Flip the voter's inactive candidate record back to active, applying the
    /// supplied field updates. Fails with `NotCandidate` or `AlreadyActive`.
    async fn reactivate_candidate(&self, voter_id: Id, update: CandidateUpdate)
        -> Result<Candidate>;

    /// Deactivate the voter's candidate record and purge every vote ever cast
    /// for it, as one atomic unit. Fails with `NotCandidate` or
    /// `AlreadyInactive`. Returns the number of purged votes.
    async fn revoke_candidate(&self, voter_id: Id) -> Result<u64>;

    /// The vote the given voter cast on the given day, if any.
    async fn vote_by_voter(&self, voter_id: Id, day: VotingDay) -> Result<Option<Vote>>;

    /// Record a vote. In order, fails with `AlreadyVoted` if the voter already
    /// has a vote for that day, `CandidateNotFound` if the candidate does not
    /// exist, and `CandidateInactive` if it is not active.
    async fn insert_vote(&self, vote: NewVote) -> Result<Vote>;

    /// Vote counts for every candidate (active and inactive) on the given day,
    /// including candidates with no votes, read from one consistent snapshot.
    async fn tally(&self, day: VotingDay) -> Result<Vec<CandidateTally>>;

    /// Number of votes the given candidate has on the given day.
    async fn candidate_votes(&self, candidate_id: Id, day: VotingDay) -> Result<u64>;

    async fn stats(&self) -> Result<Stats>;
}

/// Global counters for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_voters: u64,
    pub total_candidates: u64,
    pub total_votes: u64,
}
