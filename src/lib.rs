#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
pub mod voting;

pub use config::Config;

use config::{ConfigFairing, StoreFairing};
use logging::LoggerFairing;

/// Build the server from the figment configuration, opening the configured
/// store.
pub fn build() -> Rocket<Build> {
    base_rocket(rocket::build()).attach(StoreFairing)
}

/// A server with everything configured except its voting service.
/// Fairings run in attach order, so the config is always loaded first.
fn base_rocket(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(ConfigFairing)
        .attach(LoggerFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// A test server over in-memory storage, with a clock fixed at midday on a
/// voting day. Returns handles on the clock and the storage.
#[cfg(test)]
pub(crate) fn test_rocket() -> (
    Rocket<Build>,
    model::common::FixedClock,
    store::MemoryStore,
) {
    use std::sync::Arc;

    use model::common::{FixedClock, VotingWindow};
    use rocket::figment::providers::Serialized;
    use store::MemoryStore;
    use voting::Voting;

    let window = VotingWindow::default();
    let clock = FixedClock::new(window.at(2026, 10, 17, 12, 0));
    let store = MemoryStore::new();
    let voting = Voting::new(Arc::new(store.clone()), Arc::new(clock.clone()), window);

    let figment = rocket::Config::figment()
        .merge(Serialized::default("jwt_secret", "test secret, do not use"))
        .merge(Serialized::default("auth_ttl", 3600))
        .merge(Serialized::default("storage", "memory"))
        .merge(Serialized::default("log_level", "off"));
    let rocket = base_rocket(rocket::custom(figment)).manage(voting);
    (rocket, clock, store)
}
