use rocket::{http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Result, VotingError},
    model::{
        api::{
            AuthToken, CandidacyRequest, CandidacyResponse, CandidacyStatus, CandidateView,
            OwnCandidacy, VoteCount,
        },
        common::VotingDay,
        results::DayResults,
    },
    voting::Voting,
};

use super::Message;

pub fn routes() -> Vec<Route> {
    routes![
        list_candidates,
        apply,
        candidacy_status,
        own_vote_count,
        revoke,
        results
    ]
}

#[get("/api/candidates")]
async fn list_candidates(voting: &State<Voting>) -> Result<Json<Vec<CandidateView>>> {
    let candidates = voting.candidates().await?;
    Ok(Json(candidates.iter().map(CandidateView::from).collect()))
}

#[post("/api/candidates/apply", data = "<request>", format = "json")]
async fn apply(
    token: AuthToken,
    request: Json<CandidacyRequest>,
    voting: &State<Voting>,
) -> Result<(Status, Json<CandidacyResponse>)> {
    let outcome = voting.apply_candidacy(token.id, request.into_inner()).await?;
    let (status, message) = if outcome.reactivated {
        (Status::Ok, "Successfully reactivated your candidacy")
    } else {
        (Status::Created, "Successfully applied as a candidate")
    };
    let response = CandidacyResponse {
        message: message.to_string(),
        candidate_id: outcome.candidate.id.into(),
        reactivated: outcome.reactivated,
        candidate: CandidateView::from(&outcome.candidate),
    };
    Ok((status, Json(response)))
}

#[get("/api/candidates/status")]
async fn candidacy_status(
    token: AuthToken,
    voting: &State<Voting>,
) -> Result<Json<CandidacyStatus>> {
    let candidate =
        voting
            .candidate_status(token.id)
            .await?
            .map(|(candidate, vote_count)| OwnCandidacy {
                candidate: CandidateView::from(&candidate),
                is_active: candidate.active,
                day: voting.today(),
                vote_count,
            });
    Ok(Json(CandidacyStatus {
        is_candidate: candidate.is_some(),
        candidate,
    }))
}

#[get("/api/candidates/votes")]
async fn own_vote_count(token: AuthToken, voting: &State<Voting>) -> Result<Json<VoteCount>> {
    let vote_count = voting.my_vote_count(token.id).await?;
    Ok(Json(VoteCount {
        day: voting.today(),
        vote_count,
    }))
}

#[post("/api/candidates/revoke")]
async fn revoke(token: AuthToken, voting: &State<Voting>) -> Result<Json<Message>> {
    voting.revoke_candidacy(token.id).await?;
    Ok(Message::new("Candidacy revoked successfully"))
}

#[get("/api/candidates/results?<day>")]
async fn results(day: Option<&str>, voting: &State<Voting>) -> Result<Json<DayResults>> {
    let day = day
        .map(|day| {
            day.parse::<VotingDay>()
                .map_err(|_| VotingError::validation("Day must be formatted as YYYY-MM-DD"))
        })
        .transpose()?;
    Ok(Json(voting.results(day).await?))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::ContentType,
        local::asynchronous::{Client, LocalResponse},
        serde::json::serde_json::json,
    };

    use crate::error::ErrorBody;
    use crate::model::{
        api::VoteReceipt,
        common::{FixedClock, VotingWindow},
        db::CandidateCore,
        mongodb::Id,
    };
    use crate::store::{MemoryStore, VotingStore};

    use super::*;

    async fn apply_example(client: &Client) -> LocalResponse<'_> {
        client
            .post(uri!(apply))
            .header(ContentType::JSON)
            .body(json!(CandidacyRequest::example()).to_string())
            .dispatch()
            .await
    }

    async fn error_code(response: LocalResponse<'_>) -> String {
        let body: ErrorBody = response.into_json().await.unwrap();
        body.error.code
    }

    #[backend_test]
    async fn candidates_are_public_and_sorted(client: Client, store: MemoryStore) {
        store
            .insert_candidate(CandidateCore::named("Zed"))
            .await
            .unwrap();
        store
            .insert_candidate(CandidateCore::named("Amy"))
            .await
            .unwrap();
        let mut ghost = CandidateCore::named("Ghost");
        ghost.active = false;
        store.insert_candidate(ghost).await.unwrap();

        let response = client.get(uri!(list_candidates)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let candidates: Vec<CandidateView> = response.into_json().await.unwrap();
        let names: Vec<_> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Amy", "Zed"]);
    }

    #[backend_test]
    async fn applying_requires_login(client: Client) {
        let response = apply_example(&client).await;
        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(error_code(response).await, "UNAUTHORIZED");
    }

    #[backend_test(voter)]
    async fn apply_revoke_reapply(client: Client) {
        let response = apply_example(&client).await;
        assert_eq!(Status::Created, response.status());
        let first: CandidacyResponse = response.into_json().await.unwrap();
        assert!(!first.reactivated);
        assert_eq!(first.candidate.party, "Independent");

        let response = apply_example(&client).await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(error_code(response).await, "ALREADY_CANDIDATE");

        let response = client.post(uri!(revoke)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let response = client.post(uri!(revoke)).dispatch().await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(error_code(response).await, "ALREADY_INACTIVE");

        let response = client
            .post(uri!(apply))
            .header(ContentType::JSON)
            .body(json!({"party": "Green"}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let second: CandidacyResponse = response.into_json().await.unwrap();
        assert!(second.reactivated);
        assert_eq!(second.candidate_id, first.candidate_id);
        assert_eq!(second.candidate.party, "Green");
        assert_eq!(second.candidate.name, first.candidate.name);
    }

    #[backend_test(voter)]
    async fn incomplete_application_is_refused(client: Client) {
        let response = client
            .post(uri!(apply))
            .header(ContentType::JSON)
            .body(json!({"name": "Alice"}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let body: ErrorBody = response.into_json().await.unwrap();
        assert_eq!(body.error.code, "VALIDATION_ERROR");
        assert_eq!(body.error.message, "Description is required");
    }

    #[backend_test(voter)]
    async fn own_status_and_count(client: Client) {
        let response = client.get(uri!(candidacy_status)).dispatch().await;
        let status: CandidacyStatus = response.into_json().await.unwrap();
        assert!(!status.is_candidate);
        let response = client.get(uri!(own_vote_count)).dispatch().await;
        assert_eq!(error_code(response).await, "NOT_CANDIDATE");

        apply_example(&client).await;
        let response = client
            .post("/api/voters/vote")
            .header(ContentType::JSON)
            .body(json!({"candidate_id": own_id(&client).await}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        let _: VoteReceipt = response.into_json().await.unwrap();

        let response = client.get(uri!(candidacy_status)).dispatch().await;
        let status: CandidacyStatus = response.into_json().await.unwrap();
        let own = status.candidate.unwrap();
        assert!(own.is_active);
        assert_eq!(own.vote_count, 1);
        assert_eq!(own.day.to_string(), "2026-10-17");

        let response = client.get(uri!(own_vote_count)).dispatch().await;
        let count: VoteCount = response.into_json().await.unwrap();
        assert_eq!(count.vote_count, 1);
    }

    async fn own_id(client: &Client) -> String {
        let response = client.get(uri!(candidacy_status)).dispatch().await;
        let status: CandidacyStatus = response.into_json().await.unwrap();
        status.candidate.unwrap().candidate.id.to_string()
    }

    #[backend_test]
    async fn results_hide_the_winner_until_the_window_closes(
        client: Client,
        clock: FixedClock,
        store: MemoryStore,
    ) {
        let window = VotingWindow::default();
        let voting = client.rocket().state::<Voting>().unwrap();
        for (name, votes) in [("Bob", 3), ("Alice", 3), ("Carl", 1)] {
            let candidate = store
                .insert_candidate(CandidateCore::named(name))
                .await
                .unwrap();
            for _ in 0..votes {
                voting
                    .cast_vote(Id::new(), candidate.id)
                    .await
                    .unwrap();
            }
        }

        let response = client.get(uri!(results(_))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let open: DayResults = response.into_json().await.unwrap();
        assert!(!open.is_finalized);
        assert!(open.winner.is_none());
        assert_eq!(open.total_votes, 7);

        clock.set(window.at(2026, 10, 17, 20, 0));
        let response = client
            .get("/api/candidates/results?day=2026-10-17")
            .dispatch()
            .await;
        let closed: DayResults = response.into_json().await.unwrap();
        assert!(closed.is_finalized);
        assert_eq!(closed.winner.unwrap().name, "Alice");
        assert!(closed.tie_broken);
        assert_eq!(closed.tied_candidates, vec!["Alice", "Bob"]);
        let names: Vec<_> = closed.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "Carl"]);
    }

    #[backend_test]
    async fn malformed_day_is_refused(client: Client) {
        let response = client
            .get("/api/candidates/results?day=17-10-2026")
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(error_code(response).await, "VALIDATION_ERROR");
    }
}
