use std::ops::{Deref, DerefMut};

use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Document};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Party recorded when an applicant does not name one.
pub const DEFAULT_PARTY: &str = "Independent";
/// Position recorded for every voter who applies.
pub const DEFAULT_POSITION: &str = "Candidate";

/// Core candidate data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    /// The voter who owns this candidacy, if any. At most one candidate
    /// record exists per voter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_id: Option<Id>,
    pub name: String,
    pub party: String,
    pub position: String,
    pub description: String,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
    /// Inactive candidates cannot receive votes and never win.
    pub active: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

/// A partial update to a candidate's details: only the supplied fields change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateUpdate {
    pub name: Option<String>,
    pub party: Option<String>,
    pub description: Option<String>,
    pub dob: Option<NaiveDate>,
    pub gender: Option<String>,
    pub profile_pic: Option<String>,
}

impl CandidateUpdate {
    /// Apply the supplied fields to an in-memory record.
    pub fn apply_to(&self, candidate: &mut CandidateCore) {
        if let Some(name) = &self.name {
            candidate.name = name.clone();
        }
        if let Some(party) = &self.party {
            candidate.party = party.clone();
        }
        if let Some(description) = &self.description {
            candidate.description = description.clone();
        }
        if let Some(dob) = self.dob {
            candidate.dob = Some(dob);
        }
        if let Some(gender) = &self.gender {
            candidate.gender = Some(gender.clone());
        }
        if let Some(profile_pic) = &self.profile_pic {
            candidate.profile_pic = Some(profile_pic.clone());
        }
    }

    /// The `$set` document for the supplied fields.
    pub fn to_set_doc(&self) -> Document {
        let mut set = Document::new();
        if let Some(name) = &self.name {
            set.insert("name", name.as_str());
        }
        if let Some(party) = &self.party {
            set.insert("party", party.as_str());
        }
        if let Some(description) = &self.description {
            set.insert("description", description.as_str());
        }
        if let Some(dob) = self.dob {
            set.insert("dob", dob.format("%Y-%m-%d").to_string());
        }
        if let Some(gender) = &self.gender {
            set.insert("gender", gender.as_str());
        }
        if let Some(profile_pic) = &self.profile_pic {
            set.insert("profile_pic", profile_pic.as_str());
        }
        set
    }
}
