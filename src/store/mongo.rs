use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use mongodb::{
    bson::{doc, Bson, Document},
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, SessionOptions},
    Client, Database,
};
use rocket::{futures::TryStreamExt, tokio::time::sleep};

use crate::error::{Error, Result, VotingError};
use crate::model::{
    common::VotingDay,
    db::{
        Candidate, CandidateUpdate, NewCandidate, NewVote, NewVoter, ProfileUpdate, Vote, Voter,
    },
    mongodb::{
        ensure_indexes_exist, is_duplicate_key_error, is_transient_transaction_error,
        is_write_conflict, Coll, Id,
    },
    results::CandidateTally,
};

use super::{Stats, VotingStore};

/// How many times a transaction is attempted before a conflict is reported.
const MAX_TRANSACTION_ATTEMPTS: u32 = 6;
/// Wait before the first retry. Doubles on every further attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(5);

/// MongoDB-backed storage. Multi-document operations run in transactions,
/// so the server must be a replica set.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Connect to the given server, select the database and make sure the
    /// required indexes exist.
    pub async fn connect(uri: &str, database: &str) -> std::result::Result<Self, DbError> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        ensure_indexes_exist(&db).await?;
        Ok(Self { client, db })
    }

    fn voters(&self) -> Coll<Voter> {
        Coll::from_db(&self.db)
    }

    fn candidates(&self) -> Coll<Candidate> {
        Coll::from_db(&self.db)
    }

    fn votes(&self) -> Coll<Vote> {
        Coll::from_db(&self.db)
    }

    async fn try_insert_candidate(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        if let Some(voter_id) = candidate.voter_id {
            let existing = self
                .candidates()
                .find_one_with_session(doc! {"voter_id": voter_id}, None, &mut session)
                .await?;
            if existing.is_some() {
                return Err(VotingError::AlreadyCandidate.into());
            }
        }

        let candidate = Candidate {
            id: Id::new(),
            candidate: candidate.clone(),
        };
        self.candidates()
            .insert_one_with_session(&candidate, None, &mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(candidate)
    }

    async fn try_reactivate_candidate(
        &self,
        voter_id: Id,
        update: &CandidateUpdate,
    ) -> Result<Candidate> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let mut candidate = self
            .candidates()
            .find_one_with_session(doc! {"voter_id": voter_id}, None, &mut session)
            .await?
            .ok_or(VotingError::NotCandidate)?;
        if candidate.active {
            return Err(VotingError::AlreadyActive.into());
        }

        let mut set = update.to_set_doc();
        set.insert("active", true);
        self.candidates()
            .update_one_with_session(
                doc! {"_id": candidate.id, "active": false},
                doc! {"$set": set},
                None,
                &mut session,
            )
            .await?;

        session.commit_transaction().await?;
        update.apply_to(&mut candidate);
        candidate.active = true;
        Ok(candidate)
    }

    async fn try_revoke_candidate(&self, voter_id: Id) -> Result<u64> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let candidate = self
            .candidates()
            .find_one_with_session(doc! {"voter_id": voter_id}, None, &mut session)
            .await?
            .ok_or(VotingError::NotCandidate)?;
        if !candidate.active {
            return Err(VotingError::AlreadyInactive.into());
        }

        self.candidates()
            .update_one_with_session(
                candidate.id.as_doc(),
                doc! {"$set": {"active": false}},
                None,
                &mut session,
            )
            .await?;
        let purged = self
            .votes()
            .delete_many_with_session(doc! {"candidate_id": candidate.id}, None, &mut session)
            .await?
            .deleted_count;

        session.commit_transaction().await?;
        Ok(purged)
    }

    async fn try_insert_vote(&self, vote: &NewVote) -> Result<Vote> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let existing = self
            .votes()
            .find_one_with_session(
                doc! {"voter_id": vote.voter_id, "day": vote.day},
                None,
                &mut session,
            )
            .await?;
        if existing.is_some() {
            return Err(VotingError::AlreadyVoted.into());
        }

        // Touch the candidate so a concurrent revocation conflicts with this
        // transaction instead of missing the new vote in its purge.
        let touched = self
            .candidates()
            .update_one_with_session(
                doc! {"_id": vote.candidate_id, "active": true},
                doc! {"$currentDate": {"last_vote_at": true}},
                None,
                &mut session,
            )
            .await?;
        if touched.matched_count == 0 {
            let exists = self
                .candidates()
                .find_one_with_session(vote.candidate_id.as_doc(), None, &mut session)
                .await?
                .is_some();
            return Err(if exists {
                VotingError::CandidateInactive
            } else {
                VotingError::CandidateNotFound
            }
            .into());
        }

        let vote = Vote {
            id: Id::new(),
            vote: vote.clone(),
        };
        self.votes()
            .insert_one_with_session(&vote, None, &mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(vote)
    }
}

/// Backoff before retry number `attempt` (1-based).
fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * 2_u32.pow(attempt.saturating_sub(1))
}

/// Run a transaction, retrying it from scratch with exponential backoff while
/// the server reports a transient conflict.
async fn with_retry<T, F, Fut>(what: &str, mut transaction: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match transaction().await {
            Err(Error::Db(err))
                if is_transient_transaction_error(&err) && attempt < MAX_TRANSACTION_ATTEMPTS =>
            {
                let delay = retry_delay(attempt);
                debug!("{what} conflicted on attempt {attempt}, retrying in {delay:?}: {err}");
                sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Is this a write conflict that survived every retry?
fn is_lingering_conflict<T>(result: &Result<T>) -> bool {
    matches!(result, Err(Error::Db(err)) if is_write_conflict(err))
}

/// Report a lost race for a unique key as the given business error. A
/// duplicate key always means another writer claimed the key first. A write
/// conflict only does if the competing record is now known to exist
/// (`claimed`); otherwise it stays a server error.
fn settle_race<T>(result: Result<T>, race: VotingError, claimed: bool) -> Result<T> {
    match result {
        Err(Error::Db(err))
            if is_duplicate_key_error(&err) || (claimed && is_write_conflict(&err)) =>
        {
            warn!("Unique key race resolved as {}: {err}", race.code());
            Err(race.into())
        }
        result => result,
    }
}

/// Read a `$sum` counter, whichever integer width the server chose.
fn count_field(group: &Document) -> u64 {
    match group.get("count") {
        Some(Bson::Int32(n)) => *n as u64,
        Some(Bson::Int64(n)) => *n as u64,
        _ => 0,
    }
}

#[rocket::async_trait]
impl VotingStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn insert_voter(&self, voter: NewVoter) -> Result<Voter> {
        let voter = Voter {
            id: Id::new(),
            voter,
        };
        match self.voters().insert_one(&voter, None).await {
            Ok(_) => Ok(voter),
            Err(err) if is_duplicate_key_error(&err) => Err(VotingError::UserExists.into()),
            Err(err) => Err(err.into()),
        }
    }

    async fn voter_by_id(&self, id: Id) -> Result<Option<Voter>> {
        Ok(self.voters().find_one(id.as_doc(), None).await?)
    }

    async fn update_voter(&self, id: Id, update: ProfileUpdate) -> Result<Option<Voter>> {
        if update.is_empty() {
            return self.voter_by_id(id).await;
        }
        let after = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .voters()
            .find_one_and_update(id.as_doc(), doc! {"$set": update.to_set_doc()}, after)
            .await?)
    }

    async fn voter_by_email(&self, email: &str) -> Result<Option<Voter>> {
        Ok(self.voters().find_one(doc! {"email": email}, None).await?)
    }

    async fn candidate_by_id(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.candidates().find_one(id.as_doc(), None).await?)
    }

    async fn candidate_by_voter(&self, voter_id: Id) -> Result<Option<Candidate>> {
        Ok(self
            .candidates()
            .find_one(doc! {"voter_id": voter_id}, None)
            .await?)
    }

    async fn active_candidates(&self) -> Result<Vec<Candidate>> {
        let by_name = FindOptions::builder().sort(doc! {"name": 1}).build();
        let candidates: Vec<Candidate> = self
            .candidates()
            .find(doc! {"active": true}, by_name)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let result = with_retry("Candidate application", || {
            self.try_insert_candidate(&candidate)
        })
        .await;
        let claimed = match candidate.voter_id {
            Some(voter_id) if is_lingering_conflict(&result) => {
                self.candidate_by_voter(voter_id).await?.is_some()
            }
            _ => false,
        };
        settle_race(result, VotingError::AlreadyCandidate, claimed)
    }

    async fn reactivate_candidate(
        &self,
        voter_id: Id,
        update: CandidateUpdate,
    ) -> Result<Candidate> {
        with_retry("Candidate reactivation", || {
            self.try_reactivate_candidate(voter_id, &update)
        })
        .await
    }

    async fn revoke_candidate(&self, voter_id: Id) -> Result<u64> {
        with_retry("Candidate revocation", || self.try_revoke_candidate(voter_id)).await
    }

    async fn vote_by_voter(&self, voter_id: Id, day: VotingDay) -> Result<Option<Vote>> {
        Ok(self
            .votes()
            .find_one(doc! {"voter_id": voter_id, "day": day}, None)
            .await?)
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote> {
        let result = with_retry("Vote", || self.try_insert_vote(&vote)).await;
        let claimed = is_lingering_conflict(&result)
            && self.vote_by_voter(vote.voter_id, vote.day).await?.is_some();
        settle_race(result, VotingError::AlreadyVoted, claimed)
    }

    async fn tally(&self, day: VotingDay) -> Result<Vec<CandidateTally>> {
        // Counts and candidates must come from the same point in time.
        let session_options = SessionOptions::builder().snapshot(true).build();
        let mut session = self.client.start_session(Some(session_options)).await?;

        let pipeline = [
            doc! {"$match": {"day": day}},
            doc! {"$group": {"_id": "$candidate_id", "count": {"$sum": 1}}},
        ];
        let mut counts = HashMap::new();
        let mut groups = self
            .votes()
            .aggregate_with_session(pipeline, None, &mut session)
            .await?;
        while let Some(group) = groups.next(&mut session).await {
            let group = group?;
            if let Ok(candidate_id) = group.get_object_id("_id") {
                counts.insert(Id::from(candidate_id), count_field(&group));
            }
        }

        let mut tallies = Vec::new();
        let mut candidates = self
            .candidates()
            .find_with_session(doc! {}, None, &mut session)
            .await?;
        while let Some(candidate) = candidates.next(&mut session).await {
            let candidate = candidate?;
            tallies.push(CandidateTally {
                votes: counts.get(&candidate.id).copied().unwrap_or(0),
                candidate,
            });
        }
        Ok(tallies)
    }

    async fn candidate_votes(&self, candidate_id: Id, day: VotingDay) -> Result<u64> {
        let filter = doc! {"candidate_id": candidate_id, "day": day};
        Ok(self.votes().count_documents(filter, None).await?)
    }

    async fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            total_voters: self.voters().count_documents(doc! {}, None).await?,
            total_candidates: self
                .candidates()
                .count_documents(doc! {"active": true}, None)
                .await?,
            total_votes: self.votes().count_documents(doc! {}, None).await?,
        })
    }
}
