use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};
use serde::{Deserialize, Serialize};

use crate::error::ErrorBody;

pub mod auth;
mod candidates;
mod info;
mod voters;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(candidates::routes());
    routes.extend(voters::routes());
    routes.extend(info::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

/// A plain acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Render anything Rocket rejects before a handler runs (unknown routes,
/// failed guards, malformed bodies) in the same envelope as handler errors.
#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Json<ErrorBody>) {
    let (code, message) = match status.code {
        400 => ("BAD_REQUEST", "Malformed request"),
        401 => ("UNAUTHORIZED", "Authentication required"),
        404 => ("NOT_FOUND", "Not found"),
        422 => ("VALIDATION_ERROR", "Request body could not be understood"),
        500..=599 => ("SERVER_ERROR", "Internal server error"),
        _ => ("ERROR", status.reason_lossy()),
    };
    (status, Json(ErrorBody::new(code, message)))
}
