use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{Candidate, NewCandidate, NewVote, NewVoter, Vote, Voter};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Voter collections
const VOTERS: &str = "voters";
impl MongoCollection for Voter {
    const NAME: &'static str = VOTERS;
}
impl MongoCollection for NewVoter {
    const NAME: &'static str = VOTERS;
}

// Candidate collections
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}
impl MongoCollection for NewCandidate {
    const NAME: &'static str = CANDIDATES;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Voter collection: one account per email.
    let voter_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique.clone())
        .build();
    Coll::<Voter>::from_db(db)
        .create_index(voter_index, None)
        .await?;

    // Candidate collection: at most one record per owning voter. Seeded
    // candidates have no owner and are not constrained.
    let owner_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(doc! {"voter_id": {"$exists": true}})
                .build(),
        )
        .build();
    let active_index = IndexModel::builder()
        .keys(doc! {"active": 1, "name": 1})
        .build();
    Coll::<Candidate>::from_db(db)
        .create_indexes([owner_index, active_index], None)
        .await?;

    // Vote collection: one vote per voter per day.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "day": 1})
        .options(unique)
        .build();
    let tally_index = IndexModel::builder()
        .keys(doc! {"day": 1, "candidate_id": 1})
        .build();
    let purge_index = IndexModel::builder()
        .keys(doc! {"candidate_id": 1})
        .build();
    Coll::<Vote>::from_db(db)
        .create_indexes([ballot_index, tally_index, purge_index], None)
        .await?;

    Ok(())
}
