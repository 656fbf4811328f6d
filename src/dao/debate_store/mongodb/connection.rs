use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

const CONNECT_ATTEMPTS: u32 = 10;
const FIRST_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Open a client for `config` and return once the debate database answers a ping.
///
/// Gives up after [`CONNECT_ATTEMPTS`] pings, doubling the wait between them.
pub(super) async fn open_database(config: &MongoConfig) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut backoff = FIRST_BACKOFF;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => {
                debug!(attempt, database = %config.database_name, "MongoDB reachable");
                return Ok((client, database));
            }
            Err(source) if attempt >= CONNECT_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                warn!(attempt, error = %err, "MongoDB not reachable yet; retrying");
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
