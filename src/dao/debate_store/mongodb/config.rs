use std::{env, time::Duration};

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const URI_ENV: &str = "MONGO_URI";
const DATABASE_ENV: &str = "MONGO_DB";
const DEFAULT_DATABASE: &str = "gavel";
const APP_NAME: &str = "gavel-back";
/// Bounds how long a single operation waits for a reachable server.
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the debate collections live and how the driver reaches them.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the URI.
    pub options: ClientOptions,
    /// Database holding the debate collections.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`, tagging the connection with the application name. The database defaults
    /// to `gavel`.
    pub async fn from_uri(uri: &str, database_name: Option<&str>) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        options
            .server_selection_timeout
            .get_or_insert(SERVER_SELECTION_TIMEOUT);

        Ok(Self {
            options,
            database_name: database_name.unwrap_or(DEFAULT_DATABASE).to_owned(),
        })
    }

    /// Read `MONGO_URI` and the optional `MONGO_DB`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = env::var(URI_ENV).map_err(|_| MongoDaoError::MissingEnvVar { var: URI_ENV })?;
        let database_name = env::var(DATABASE_ENV).ok();
        Self::from_uri(&uri, database_name.as_deref()).await
    }
}
