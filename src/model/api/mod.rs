//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g. IDs
//! are serialised as hex strings and days as `YYYY-MM-DD`.

pub mod auth;
mod candidate;
mod id;
mod vote;

pub use auth::{
    AuthResponse, AuthToken, LoginRequest, ProfileRequest, ProfileResponse, RegisterRequest,
    UpdatedFields, VoterView,
};
pub use candidate::{
    CandidacyRequest, CandidacyResponse, CandidacyStatus, CandidateView, OwnCandidacy, VoteCount,
};
pub use id::ApiId;
pub use vote::{BallotStatus, MyVote, VoteReceipt, VoteRequest};
