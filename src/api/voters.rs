use rocket::{http::Status, serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        api::{AuthToken, BallotStatus, MyVote, VoteReceipt, VoteRequest},
        common::VotingStatus,
    },
    voting::Voting,
};

pub fn routes() -> Vec<Route> {
    routes![vote, ballot_status, my_vote, voting_status]
}

#[post("/api/voters/vote", data = "<request>", format = "json")]
async fn vote(
    token: AuthToken,
    request: Json<VoteRequest>,
    voting: &State<Voting>,
) -> Result<(Status, Json<VoteReceipt>)> {
    let vote = voting.cast_vote(token.id, request.candidate_id).await?;
    Ok((Status::Created, Json(VoteReceipt::from(&vote))))
}

#[get("/api/voters/status")]
async fn ballot_status(token: AuthToken, voting: &State<Voting>) -> Result<Json<BallotStatus>> {
    let has_voted = voting.has_voted_today(token.id).await?;
    Ok(Json(BallotStatus {
        has_voted,
        voter_id: token.id.into(),
        day: voting.today(),
    }))
}

#[get("/api/voters/my-vote")]
async fn my_vote(token: AuthToken, voting: &State<Voting>) -> Result<Json<MyVote>> {
    let vote = voting.my_vote(token.id).await?;
    Ok(Json(MyVote::new(voting.today(), vote)))
}

#[get("/api/voters/voting-status")]
fn voting_status(voting: &State<Voting>) -> Json<VotingStatus> {
    Json(voting.voting_status())
}
