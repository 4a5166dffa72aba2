use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AUTH_TOKEN_COOKIE, AuthResponse, AuthToken, LoginRequest, ProfileRequest,
            ProfileResponse, RegisterRequest, VoterView,
        },
        db::Voter,
    },
    voting::Voting,
    Config,
};

use super::Message;

pub fn routes() -> Vec<Route> {
    routes![register, login, logout, me, update_profile]
}

/// Issue a token for the voter, both as a cookie and in the body.
fn log_in(voter: Voter, cookies: &CookieJar<'_>, config: &Config) -> Result<Json<AuthResponse>> {
    let access_token = AuthToken::new(&voter).encode(config)?;
    cookies.add(AuthToken::cookie(access_token.clone(), config));
    Ok(Json(AuthResponse {
        access_token,
        voter: voter.into(),
    }))
}

#[post("/api/auth/register", data = "<request>", format = "json")]
pub async fn register(
    request: Json<RegisterRequest>,
    cookies: &CookieJar<'_>,
    voting: &State<Voting>,
    config: &State<Config>,
) -> Result<(Status, Json<AuthResponse>)> {
    let voter = voting.register(request.into_inner()).await?;
    Ok((Status::Created, log_in(voter, cookies, config)?))
}

#[post("/api/auth/login", data = "<request>", format = "json")]
pub async fn login(
    request: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    voting: &State<Voting>,
    config: &State<Config>,
) -> Result<Json<AuthResponse>> {
    let voter = voting.login(request.into_inner()).await?;
    log_in(voter, cookies, config)
}

#[delete("/api/auth")]
pub async fn logout(cookies: &CookieJar<'_>) -> Json<Message> {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Message::new("Logged out")
}

#[get("/api/auth/me")]
pub async fn me(token: AuthToken, voting: &State<Voting>) -> Result<Json<VoterView>> {
    let voter = voting
        .voter(token.id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {}", token.id)))?;
    Ok(Json(voter.into()))
}

#[put("/api/auth/profile", data = "<request>", format = "json")]
pub async fn update_profile(
    token: AuthToken,
    request: Json<ProfileRequest>,
    voting: &State<Voting>,
) -> Result<Json<ProfileResponse>> {
    let (voter, updated) = voting
        .update_profile(token.id, request.into_inner())
        .await?;
    Ok(Json(ProfileResponse {
        message: "Profile updated".to_string(),
        updated,
        voter: voter.into(),
    }))
}
