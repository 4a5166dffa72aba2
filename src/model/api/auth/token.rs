use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use log::debug;
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::RequestTrace;
use crate::model::{db::Voter, mongodb::Id};
use crate::voting::Voting;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: Id,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given voter.
    pub fn new(voter: &Voter) -> Self {
        Self { id: voter.id }
    }

    /// Sign this token into a JWT that expires after the configured lifetime.
    pub fn encode(self, config: &Config) -> Result<String> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(token)
    }

    /// Wrap a signed token in the authentication cookie.
    pub fn cookie(jwt: String, config: &Config) -> Cookie<'static> {
        Cookie::build(AUTH_TOKEN_COOKIE, jwt)
            .path("/")
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Verify and decode a JWT.
    pub fn decode(jwt: &str, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            jwt,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }
}

/// Token claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// The raw JWT from the cookie, or failing that from an
/// `Authorization: Bearer` header.
fn raw_token(req: &Request<'_>) -> Option<String> {
    if let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .get_one("Authorization")
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an [`AuthToken`] from the request and check the voter it names
    /// still exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let unauthorized =
            |message: &str| Error::Status(Status::Unauthorized, message.to_string());

        let (config, voting) = match (
            req.guard::<&State<Config>>().await,
            req.guard::<&State<Voting>>().await,
        ) {
            (Outcome::Success(config), Outcome::Success(voting)) => (config, voting),
            _ => {
                let err = Error::Status(
                    Status::InternalServerError,
                    "Authentication is not configured".to_string(),
                );
                return Outcome::Failure((Status::InternalServerError, err));
            }
        };

        let Some(jwt) = raw_token(req) else {
            return Outcome::Failure((Status::Unauthorized, unauthorized("Not logged in")));
        };

        let token = match Self::decode(&jwt, config) {
            Ok(token) => token,
            Err(err) => {
                debug!("Rejected auth token: {err}");
                return Outcome::Failure((Status::Unauthorized, err));
            }
        };

        match voting.voter(token.id).await {
            Ok(Some(_)) => {
                RequestTrace::of(req).authenticated(token.id);
                Outcome::Success(token)
            }
            Ok(None) => Outcome::Failure((
                Status::Unauthorized,
                unauthorized("Account no longer exists"),
            )),
            Err(err) => Outcome::Failure((Status::InternalServerError, err)),
        }
    }
}
