use chrono::{DateTime, Utc};
use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{error::Result, model::common::VotingDay, store::Stats, voting::Voting};

pub fn routes() -> Vec<Route> {
    routes![health, stats]
}

/// Liveness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub storage: String,
    pub day: VotingDay,
    pub time: DateTime<Utc>,
}

#[get("/api/health")]
fn health(voting: &State<Voting>) -> Json<Health> {
    let now = voting.now();
    Json(Health {
        status: "ok".to_string(),
        storage: voting.backend().to_string(),
        day: voting.window().voting_day(now),
        time: now,
    })
}

#[get("/api/stats")]
async fn stats(voting: &State<Voting>) -> Result<Json<Stats>> {
    Ok(Json(voting.stats().await?))
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client, serde::json::Value};

    use crate::model::{api::CandidacyRequest, db::CandidateCore};
    use crate::store::{MemoryStore, VotingStore};

    use super::*;

    #[backend_test]
    async fn health_reports_the_backend(client: Client) {
        let response = client.get(uri!(health)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let health: Health = response.into_json().await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.storage, "memory");
        assert_eq!(health.day.to_string(), "2026-10-17");
    }

    #[backend_test(voter)]
    async fn stats_count_active_candidates_only(client: Client, store: MemoryStore) {
        let mut ghost = CandidateCore::named("Ghost");
        ghost.active = false;
        store.insert_candidate(ghost).await.unwrap();
        client
            .post("/api/candidates/apply")
            .header(rocket::http::ContentType::JSON)
            .body(rocket::serde::json::json!(CandidacyRequest::example()).to_string())
            .dispatch()
            .await;

        let response = client.get(uri!(stats)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let stats: Value = response.into_json().await.unwrap();
        assert_eq!(stats["total_voters"], 1);
        assert_eq!(stats["total_candidates"], 1);
        assert_eq!(stats["total_votes"], 0);
    }

    #[backend_test]
    async fn unknown_routes_use_the_error_envelope(client: Client) {
        let response = client.get("/api/nothing-here").dispatch().await;
        assert_eq!(Status::NotFound, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
