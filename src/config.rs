use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocket::{
    fairing::{Fairing, Info, Kind},
    serde::json::serde_json,
    tokio::fs,
    Build, Rocket,
};
use serde::Deserialize;
use thiserror::Error;

use crate::model::db::Election;
use crate::store::{MemoryStore, MongoStore, Store, DEFAULT_TRANSACTION_ATTEMPTS};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Clone, Deserialize)]
pub struct Config {
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Secret shared with the auth provider, used to verify caller tokens.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        Ok(rocket.manage(config))
    }
}

/// Which storage engine backs the elections.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoreKind {
    Mongodb,
    Memory,
}

/// Configuration for the election store.
#[derive(Deserialize)]
struct StoreConfig {
    store: StoreKind,
    #[serde(default = "default_db_name")]
    db_name: String,
    #[serde(default = "default_transaction_attempts")]
    transaction_attempts: u32,
    /// JSON file of elections to preload into the in-memory store.
    #[serde(default)]
    election_seed: Option<PathBuf>,
    // secrets
    #[serde(default)]
    db_uri: Option<String>,
}

fn default_db_name() -> String {
    "alumni".to_string()
}

fn default_transaction_attempts() -> u32 {
    DEFAULT_TRANSACTION_ATTEMPTS
}

/// A fairing that loads the store config, connects to the configured store,
/// performs any setup necessary, and places the [`Store`] into managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let store: Store = match config.store {
            StoreKind::Mongodb => {
                let Some(db_uri) = config.db_uri.as_deref() else {
                    error!("`db_uri` must be set when using the mongodb store");
                    return Err(rocket);
                };
                info!("Loaded database config, connecting...");
                match MongoStore::connect(db_uri, &config.db_name, config.transaction_attempts)
                    .await
                {
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
            StoreKind::Memory => {
                warn!("Using the in-memory store; ballots will not survive a restart");
                let store = MemoryStore::with_attempts(config.transaction_attempts);
                if let Some(path) = &config.election_seed {
                    match load_seed(path).await {
                        Ok(elections) => {
                            info!("Seeding {} election(s) from {}", elections.len(), path.display());
                            for election in elections {
                                store.insert_election(election).await;
                            }
                        }
                        Err(e) => {
                            error!("Failed to load election seed {}: {e}", path.display());
                            return Err(rocket);
                        }
                    }
                }
                Arc::new(store)
            }
        };

        Ok(rocket.manage(store))
    }
}

/// Failures while loading the election seed file.
#[derive(Debug, Error)]
enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed seed file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read a JSON array of elections.
async fn load_seed(path: &Path) -> Result<Vec<Election>, SeedError> {
    let raw = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}
