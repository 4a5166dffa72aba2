use std::collections::BTreeMap;
use std::sync::Arc;

use rocket::tokio::sync::Mutex;

use crate::error::{Result, VotingError};
use crate::model::{
    common::VotingDay,
    db::{
        Candidate, CandidateUpdate, NewCandidate, NewVote, NewVoter, ProfileUpdate, Vote, Voter,
    },
    mongodb::Id,
    results::CandidateTally,
};

use super::{Stats, VotingStore};

#[derive(Debug, Default)]
struct Tables {
    voters: BTreeMap<Id, Voter>,
    candidates: BTreeMap<Id, Candidate>,
    votes: BTreeMap<Id, Vote>,
}

impl Tables {
    fn candidate_of_voter_mut(&mut self, voter_id: Id) -> Option<&mut Candidate> {
        self.candidates
            .values_mut()
            .find(|c| c.voter_id == Some(voter_id))
    }

    fn votes_for(&self, candidate_id: Id, day: VotingDay) -> u64 {
        self.votes
            .values()
            .filter(|v| v.candidate_id == candidate_id && v.day == day)
            .count() as u64
    }
}

/// An in-process store. A single lock guards all three tables, so every
/// operation is trivially atomic. Nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl VotingStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        let mut tables = self.tables.lock().await;
        if tables.voters.values().any(|v| v.email == voter.email) {
            return Err(VotingError::UserExists.into());
        }
        let voter = Voter {
            id: Id::new(),
            voter,
        };
        tables.voters.insert(voter.id, voter.clone());
        Ok(voter)
    }

    async fn voter_by_id(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.tables.lock().await.voters.get(&id).cloned())
    }

    async fn update_voter(&self, id: Id, update: ProfileUpdate) -> Result<Option<Voter>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.voters.get_mut(&id).map(|voter| {
            update.apply_to(voter);
            voter.clone()
        }))
    }

    async fn voter_by_email(&self, email: &str) -> Result<Option<Voter>> {
        let tables = self.tables.lock().await;
        Ok(tables.voters.values().find(|v| v.email == email).cloned())
    }

    async fn candidate_by_id(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.tables.lock().await.candidates.get(&id).cloned())
    }

    async fn candidate_by_voter(&self, voter_id: Id) -> Result<Option<Candidate>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .candidates
            .values()
            .find(|c| c.voter_id == Some(voter_id))
            .cloned())
    }

    async fn active_candidates(&self) -> Result<Vec<Candidate>> {
        let tables = self.tables.lock().await;
        let mut active: Vec<_> = tables
            .candidates
            .values()
            .filter(|c| c.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let mut tables = self.tables.lock().await;
        if let Some(voter_id) = candidate.voter_id {
            if tables.candidate_of_voter_mut(voter_id).is_some() {
                return Err(VotingError::AlreadyCandidate.into());
            }
        }
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        tables.candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    async fn reactivate_candidate(
        &self,
        voter_id: Id,
        update: CandidateUpdate,
    ) -> Result<Candidate> {
        let mut tables = self.tables.lock().await;
        let candidate = tables
            .candidate_of_voter_mut(voter_id)
            .ok_or(VotingError::NotCandidate)?;
        if candidate.active {
            return Err(VotingError::AlreadyActive.into());
        }
        update.apply_to(candidate);
        candidate.active = true;
        Ok(candidate.clone())
    }

    async fn revoke_candidate(&self, voter_id: Id) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let candidate = tables
            .candidate_of_voter_mut(voter_id)
            .ok_or(VotingError::NotCandidate)?;
        if !candidate.active {
            return Err(VotingError::AlreadyInactive.into());
        }
        candidate.active = false;
        let candidate_id = candidate.id;

        let before = tables.votes.len();
        tables.votes.retain(|_, v| v.candidate_id != candidate_id);
        Ok((before - tables.votes.len()) as u64)
    }

    async fn vote_by_voter(&self, voter_id: Id, day: VotingDay) -> Result<Option<Vote>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .values()
            .find(|v| v.voter_id == voter_id && v.day == day)
            .cloned())
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote> {
        let mut tables = self.tables.lock().await;
        if tables
            .votes
            .values()
            .any(|v| v.voter_id == vote.voter_id && v.day == vote.day)
        {
            return Err(VotingError::AlreadyVoted.into());
        }
        match tables.candidates.get(&vote.candidate_id) {
            None => return Err(VotingError::CandidateNotFound.into()),
            Some(c) if !c.active => return Err(VotingError::CandidateInactive.into()),
            Some(_) => {}
        }
        let vote = Vote {
            id: Id::new(),
            vote,
        };
        tables.votes.insert(vote.id, vote.clone());
        Ok(vote)
    }

    async fn tally(&self, day: VotingDay) -> Result<Vec<CandidateTally>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .candidates
            .values()
            .map(|candidate| CandidateTally {
                votes: tables.votes_for(candidate.id, day),
                candidate: candidate.clone(),
            })
            .collect())
    }

    async fn candidate_votes(&self, candidate_id: Id, day: VotingDay) -> Result<u64> {
        Ok(self.tables.lock().await.votes_for(candidate_id, day))
    }

    async fn stats(&self) -> Result<Stats> {
        let tables = self.tables.lock().await;
        Ok(Stats {
            total_voters: tables.voters.len() as u64,
            total_candidates: tables.candidates.values().filter(|c| c.active).count() as u64,
            total_votes: tables.votes.len() as u64,
        })
    }
}
