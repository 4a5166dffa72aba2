use std::ops::{Deref, DerefMut};

use chrono::NaiveDate;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Role given to every registered account.
pub const DEFAULT_ROLE: &str = "user";

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// Core voter account data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    pub name: String,
    /// Unique login identifier, stored lowercase.
    pub email: String,
    pub password_hash: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl VoterCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // A malformed hash can only come from outside this application,
        // so treat it as a failed login rather than a server fault.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}

/// Changes to a voter's own profile. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub gender: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.dob.is_none() && self.gender.is_none()
    }

    pub fn apply_to(&self, voter: &mut VoterCore) {
        if let Some(name) = &self.name {
            voter.name = name.clone();
        }
        if let Some(dob) = self.dob {
            voter.dob = Some(dob);
        }
        if let Some(gender) = &self.gender {
            voter.gender = Some(gender.clone());
        }
    }

    /// The `$set` document for the supplied fields.
    pub fn to_set_doc(&self) -> Document {
        let mut set = Document::new();
        if let Some(name) = &self.name {
            set.insert("name", name.as_str());
        }
        if let Some(dob) = self.dob {
            set.insert("dob", dob.format("%Y-%m-%d").to_string());
        }
        if let Some(gender) = &self.gender {
            set.insert("gender", gender.as_str());
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use crate::model::api::RegisterRequest;

    use super::*;

    fn mallory() -> VoterCore {
        VoterCore {
            name: "Mallory".to_string(),
            email: "mallory@example.com".to_string(),
            password_hash: "not a hash".to_string(),
            role: default_role(),
            dob: None,
            gender: None,
        }
    }

    #[test]
    fn password_verification() {
        let voter: NewVoter = RegisterRequest::example().try_into().unwrap();
        assert!(voter.verify_password(&RegisterRequest::example().password));
        assert!(!voter.verify_password("wrong password"));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!mallory().verify_password("anything"));
    }

    #[test]
    fn profile_update_only_touches_supplied_fields() {
        let mut voter = mallory();
        let update = ProfileUpdate {
            gender: Some("female".to_string()),
            ..Default::default()
        };
        update.apply_to(&mut voter);
        assert_eq!(voter.gender.as_deref(), Some("female"));
        assert_eq!(voter.name, "Mallory");
        assert!(voter.dob.is_none());
        assert_eq!(update.to_set_doc(), doc! {"gender": "female"});
        assert!(ProfileUpdate::default().is_empty());
    }

    #[test]
    fn older_records_get_default_profile_fields() {
        let stored = doc! {
            "_id": Id::new(),
            "name": "Old Timer",
            "email": "old@example.com",
            "password_hash": "hash",
        };
        let voter: Voter = mongodb::bson::from_document(stored).unwrap();
        assert_eq!(voter.role, "user");
        assert!(voter.dob.is_none());
        assert!(voter.gender.is_none());
    }
}
