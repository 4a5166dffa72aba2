use std::sync::Arc;

use chrono::Duration;
use log::{error, info};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::common::{SystemClock, VotingWindow, DEFAULT_UTC_OFFSET_MINUTES};
use crate::store::{MemoryStore, MongoStore, VotingStore};
use crate::voting::Voting;

/// Name of the MongoDB database everything lives in.
const DATABASE: &str = "dailyvote";

/// Where voters, candidates and votes are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// MongoDB, which must be a replica set for transactions.
    #[default]
    Mongodb,
    /// Process memory. Everything is lost on restart.
    Memory,
}

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Clone, Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    #[serde(default = "default_utc_offset_minutes")]
    utc_offset_minutes: i32,
    #[serde(default)]
    storage: StorageBackend,
    // secrets
    jwt_secret: String,
    #[serde(default)]
    db_uri: Option<String>,
}

fn default_utc_offset_minutes() -> i32 {
    DEFAULT_UTC_OFFSET_MINUTES
}

impl Config {
    /// Valid lifetime of auth tokens in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// The voting window in the configured regional offset, if the offset is
    /// valid.
    pub fn window(&self) -> Option<VotingWindow> {
        VotingWindow::from_offset_minutes(self.utc_offset_minutes)
    }

    pub fn storage(&self) -> StorageBackend {
        self.storage
    }

    pub fn db_uri(&self) -> Option<&str> {
        self.db_uri.as_deref()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if config.window().is_none() {
            error!(
                "Invalid `utc_offset_minutes` {}: must be within a day of UTC",
                config.utc_offset_minutes
            );
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// A fairing that opens the configured store and places the [`Voting`]
/// service into managed state. Must be attached after [`ConfigFairing`].
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some((storage, db_uri, window)) = rocket.state::<Config>().and_then(|config| {
            let db_uri = config.db_uri().map(str::to_string);
            Some((config.storage(), db_uri, config.window()?))
        }) else {
            error!("Store requires a loaded config");
            return Err(rocket);
        };

        let store: Arc<dyn VotingStore> = match storage {
            StorageBackend::Memory => {
                info!("Using in-memory storage, nothing will persist");
                Arc::new(MemoryStore::new())
            }
            StorageBackend::Mongodb => {
                let Some(db_uri) = db_uri else {
                    error!("`db_uri` must be set to use MongoDB storage");
                    return Err(rocket);
                };
                info!("Loaded database config, connecting...");
                match MongoStore::connect(&db_uri, DATABASE).await {
                    Ok(store) => {
                        info!("...database connection online!");
                        Arc::new(store)
                    }
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                }
            }
        };

        info!("Voting window is 08:00-20:00 at UTC{}", window.offset());
        Ok(rocket.manage(Voting::new(store, Arc::new(SystemClock), window)))
    }
}
