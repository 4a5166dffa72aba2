//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.

pub mod candidate;
pub use candidate::{
    Candidate, CandidateCore, CandidateUpdate, NewCandidate, DEFAULT_PARTY, DEFAULT_POSITION,
};

pub mod vote;
pub use vote::{NewVote, Vote, VoteCore};

pub mod voter;
pub use voter::{NewVoter, ProfileUpdate, Voter, VoterCore, DEFAULT_ROLE};
