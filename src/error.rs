use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use log::{debug, error};
use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::RequestTrace;

pub type Result<T> = std::result::Result<T, Error>;

/// Expected, user-facing business rule violations. These are reported to the
/// caller verbatim and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VotingError {
    #[error("Voting is closed. Voting hours are 8:00 AM to 8:00 PM.")]
    VotingClosed,
    #[error("You have already voted today")]
    AlreadyVoted,
    #[error("Candidate not found")]
    CandidateNotFound,
    #[error("Candidate is no longer standing")]
    CandidateInactive,
    #[error("You are already an active candidate")]
    AlreadyCandidate,
    #[error("You are not a candidate")]
    NotCandidate,
    #[error("Your candidacy is already inactive")]
    AlreadyInactive,
    #[error("Your candidacy is already active")]
    AlreadyActive,
    #[error("{0}")]
    Validation(String),
    #[error("Email already registered")]
    UserExists,
    #[error("No account found with this email")]
    UserNotFound,
    #[error("Invalid credentials")]
    InvalidCredentials,
}

impl VotingError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::VotingClosed => "VOTING_CLOSED",
            Self::AlreadyVoted => "ALREADY_VOTED",
            Self::CandidateNotFound => "CANDIDATE_NOT_FOUND",
            Self::CandidateInactive => "CANDIDATE_INACTIVE",
            Self::AlreadyCandidate => "ALREADY_CANDIDATE",
            Self::NotCandidate => "NOT_CANDIDATE",
            Self::AlreadyInactive => "ALREADY_INACTIVE",
            Self::AlreadyActive => "ALREADY_ACTIVE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UserExists => "USER_EXISTS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::VotingClosed => Status::Forbidden,
            Self::CandidateNotFound => Status::NotFound,
            Self::UserNotFound | Self::InvalidCredentials => Status::Unauthorized,
            Self::AlreadyVoted
            | Self::CandidateInactive
            | Self::AlreadyCandidate
            | Self::NotCandidate
            | Self::AlreadyInactive
            | Self::AlreadyActive
            | Self::Validation(_)
            | Self::UserExists => Status::BadRequest,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Voting(#[from] VotingError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// Create a `Status(NotFound)` error for the given resource.
    pub fn not_found(what: String) -> Self {
        Self::Status(Status::NotFound, format!("Not found: {what}"))
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Voting(err) => err.status(),
            Self::Db(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::Jwt(_) => Status::Unauthorized,
            Self::Status(status, _) => *status,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Voting(err) => err.code(),
            Self::Db(_) | Self::Argon2(_) => "SERVER_ERROR",
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature => "TOKEN_EXPIRED",
                _ => "INVALID_TOKEN",
            },
            Self::Status(status, _) => match status.code {
                400 => "BAD_REQUEST",
                401 => "UNAUTHORIZED",
                403 => "FORBIDDEN",
                404 => "NOT_FOUND",
                422 => "VALIDATION_ERROR",
                _ => "SERVER_ERROR",
            },
        }
    }
}

/// JSON error envelope: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let id = RequestTrace::of(req).id;
        let status = self.status();
        let message = if status.class() == StatusClass::ServerError {
            // Internals stay in the log, never in the response.
            error!("  req{id} failed: {self}");
            "Internal server error".to_string()
        } else {
            debug!("  req{id} rejected: {self}");
            self.to_string()
        };
        (status, Json(ErrorBody::new(self.code(), message))).respond_to(req)
    }
}
