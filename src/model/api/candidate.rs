use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, VotingError};
use crate::model::{
    api::ApiId,
    common::VotingDay,
    db::{Candidate, CandidateUpdate, NewCandidate, DEFAULT_PARTY, DEFAULT_POSITION},
    mongodb::Id,
};

/// Details supplied when applying, or re-applying, to stand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidacyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
}

/// Trim a string field, treating blank as absent.
fn present(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl CandidacyRequest {
    /// Build a fresh candidate record owned by the given voter. Name,
    /// description, date of birth and gender are required.
    pub fn into_new_candidate(
        self,
        voter_id: Id,
        now: DateTime<Utc>,
    ) -> Result<NewCandidate, Error> {
        let description = present(&self.description)
            .ok_or_else(|| VotingError::validation("Description is required"))?;
        let name =
            present(&self.name).ok_or_else(|| VotingError::validation("Name is required"))?;
        let dob = self
            .dob
            .ok_or_else(|| VotingError::validation("Date of birth is required"))?;
        let gender =
            present(&self.gender).ok_or_else(|| VotingError::validation("Gender is required"))?;

        Ok(NewCandidate {
            voter_id: Some(voter_id),
            name,
            party: present(&self.party).unwrap_or_else(|| DEFAULT_PARTY.to_string()),
            position: DEFAULT_POSITION.to_string(),
            description,
            dob: Some(dob),
            gender: Some(gender),
            profile_pic: present(&self.profile_pic),
            active: true,
            created_at: now,
        })
    }

    /// Only the fields that were actually supplied.
    pub fn into_update(self) -> CandidateUpdate {
        CandidateUpdate {
            name: present(&self.name),
            party: present(&self.party),
            description: present(&self.description),
            dob: self.dob,
            gender: present(&self.gender),
            profile_pic: present(&self.profile_pic),
        }
    }
}

/// Public view of a candidate. Never carries vote counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateView {
    pub id: ApiId,
    pub name: String,
    pub party: String,
    pub position: String,
    pub description: String,
    pub dob: Option<NaiveDate>,
    pub gender: Option<String>,
    pub profile_pic: Option<String>,
}

impl From<&Candidate> for CandidateView {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            name: candidate.name.clone(),
            party: candidate.party.clone(),
            position: candidate.position.clone(),
            description: candidate.description.clone(),
            dob: candidate.dob,
            gender: candidate.gender.clone(),
            profile_pic: candidate.profile_pic.clone(),
        }
    }
}

/// The outcome of applying to stand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidacyResponse {
    pub message: String,
    pub candidate_id: ApiId,
    pub reactivated: bool,
    pub candidate: CandidateView,
}

/// A voter's own candidacy, including today's count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnCandidacy {
    #[serde(flatten)]
    pub candidate: CandidateView,
    pub is_active: bool,
    pub day: VotingDay,
    pub vote_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidacyStatus {
    pub is_candidate: bool,
    pub candidate: Option<OwnCandidacy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub day: VotingDay,
    pub vote_count: u64,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_fills_defaults() {
        let voter_id = Id::new();
        let candidate = CandidacyRequest::example()
            .into_new_candidate(voter_id, Utc::now())
            .unwrap();
        assert_eq!(candidate.voter_id, Some(voter_id));
        assert_eq!(candidate.party, "Independent");
        assert_eq!(candidate.position, "Candidate");
        assert!(candidate.active);
    }

    #[test]
    fn application_requires_details() {
        let cases = [
            (
                CandidacyRequest {
                    description: Some("  ".to_string()),
                    ..CandidacyRequest::example()
                },
                "Description is required",
            ),
            (
                CandidacyRequest {
                    name: None,
                    ..CandidacyRequest::example()
                },
                "Name is required",
            ),
            (
                CandidacyRequest {
                    dob: None,
                    ..CandidacyRequest::example()
                },
                "Date of birth is required",
            ),
            (
                CandidacyRequest {
                    gender: Some(String::new()),
                    ..CandidacyRequest::example()
                },
                "Gender is required",
            ),
        ];
        for (request, expected) in cases {
            match request.into_new_candidate(Id::new(), Utc::now()) {
                Err(Error::Voting(VotingError::Validation(message))) => {
                    assert_eq!(message, expected)
                }
                other => panic!("expected a validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn update_skips_blank_fields() {
        let update = CandidacyRequest {
            name: Some(" Alicia ".to_string()),
            party: Some("".to_string()),
            ..Default::default()
        }
        .into_update();
        assert_eq!(update.name.as_deref(), Some("Alicia"));
        assert!(update.party.is_none());
        assert!(update.description.is_none());
    }
}
