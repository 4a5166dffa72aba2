use argon2::Config;
use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, VotingError};
use crate::model::{
    api::ApiId,
    db::{NewVoter, ProfileUpdate, Voter, DEFAULT_ROLE},
};

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// A request to create a voter account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl TryFrom<RegisterRequest> for NewVoter {
    type Error = Error;

    /// Validate the request and hash the password.
    fn try_from(request: RegisterRequest) -> Result<Self, Self::Error> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(VotingError::validation("Name is required").into());
        }
        let email = request.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(VotingError::validation("A valid email is required").into());
        }
        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(VotingError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            ))
            .into());
        }

        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(request.password.as_bytes(), &salt, &Config::default())?;

        Ok(Self {
            name: name.to_string(),
            email,
            password_hash,
            role: DEFAULT_ROLE.to_string(),
            dob: None,
            gender: None,
        })
    }
}

/// Email and password login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A voter as shown to themselves. Never includes the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterView {
    pub id: ApiId,
    pub name: String,
    pub email: String,
    pub role: String,
    pub dob: Option<NaiveDate>,
    pub gender: Option<String>,
}

impl From<Voter> for VoterView {
    fn from(voter: Voter) -> Self {
        Self {
            id: voter.id.into(),
            name: voter.voter.name,
            email: voter.voter.email,
            role: voter.voter.role,
            dob: voter.voter.dob,
            gender: voter.voter.gender,
        }
    }
}

/// Partial update of a voter's own profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl TryFrom<ProfileRequest> for ProfileUpdate {
    type Error = Error;

    /// A supplied name must not be blank. A blank gender is ignored.
    fn try_from(request: ProfileRequest) -> Result<Self, Self::Error> {
        let name = match request.name.as_deref().map(str::trim) {
            Some("") => return Err(VotingError::validation("Name cannot be empty").into()),
            name => name.map(str::to_string),
        };
        let gender = request
            .gender
            .as_deref()
            .map(str::trim)
            .filter(|gender| !gender.is_empty())
            .map(str::to_string);
        Ok(Self {
            name,
            dob: request.dob,
            gender,
        })
    }
}

/// Which fields a profile update touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedFields {
    pub name: bool,
    pub dob: bool,
    pub gender: bool,
}

impl From<&ProfileUpdate> for UpdatedFields {
    fn from(update: &ProfileUpdate) -> Self {
        Self {
            name: update.name.is_some(),
            dob: update.dob.is_some(),
            gender: update.gender.is_some(),
        }
    }
}

/// Returned from a profile update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub message: String,
    pub updated: UpdatedFields,
    pub voter: VoterView,
}

/// Returned on register and login. The token is also set as a cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub voter: VoterView,
}

#[cfg(test)]
mod examples {
    use super::*;

    impl RegisterRequest {
        pub fn example() -> Self {
            Self {
                name: "Alice Example".to_string(),
                email: "Alice@Example.com".to_string(),
                password: "correct horse".to_string(),
            }
        }
    }

    impl LoginRequest {
        pub fn example() -> Self {
            let register = RegisterRequest::example();
            Self {
                email: register.email,
                password: register.password,
            }
        }
    }
}
