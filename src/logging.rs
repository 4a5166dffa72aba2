use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use log::{info, log, warn, Level};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    Data, Orbit, Request, Response, Rocket,
};

use crate::model::mongodb::Id;

/// Per-request bookkeeping shared by the logger, the auth guard and the
/// error responder. Cached on the request on first use.
#[derive(Debug)]
pub struct RequestTrace {
    pub id: usize,
    started: Instant,
    voter: OnceLock<Id>,
}

impl RequestTrace {
    fn start() -> Self {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            started: Instant::now(),
            voter: OnceLock::new(),
        }
    }

    /// The trace for this request.
    pub fn of<'r>(req: &'r Request<'_>) -> &'r Self {
        req.local_cache(Self::start)
    }

    /// Record who the request was made by. Only the first voter sticks.
    pub fn authenticated(&self, voter: Id) {
        let _ = self.voter.set(voter);
    }

    pub fn voter(&self) -> Option<Id> {
        self.voter.get().copied()
    }

    fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

/// Server faults at error, refusals at warn, the rest at info.
fn level_for(class: StatusClass) -> Level {
    match class {
        StatusClass::ServerError => Level::Error,
        StatusClass::ClientError => Level::Warn,
        _ => Level::Info,
    }
}

fn caller(voter: Option<Id>) -> String {
    match voter {
        Some(id) => format!("voter {id}"),
        None => "anonymous".to_string(),
    }
}

/// Logs server lifecycle events plus one line per request and response.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let scheme = if config.tls_enabled() { "https" } else { "http" };
        info!(
            "Daily voting backend listening on {scheme}://{}:{}",
            config.address, config.port
        );
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let trace = RequestTrace::of(req);
        info!("->req{} {} {}", trace.id, req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let trace = RequestTrace::of(req);
        let route = req
            .route()
            .map(|route| route.uri.to_string())
            .unwrap_or_else(|| "no route".to_string());
        let status = res.status();
        log!(
            level_for(status.class()),
            "<-rsp{} {status} {route} for {} in {}ms",
            trace.id,
            caller(trace.voter()),
            trace.elapsed_ms()
        );
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutting down, no more ballots accepted");
    }
}
