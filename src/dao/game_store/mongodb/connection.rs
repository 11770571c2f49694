use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

/// Pings sent before the game database is declared unreachable.
const PING_ATTEMPTS: u32 = 5;
const FIRST_PING_DELAY: Duration = Duration::from_millis(250);
const MAX_PING_DELAY: Duration = Duration::from_secs(5);

/// Pauses between failed pings: doubling from [`FIRST_PING_DELAY`], capped at [`MAX_PING_DELAY`].
fn ping_delays() -> impl Iterator<Item = Duration> {
    std::iter::successors(Some(FIRST_PING_DELAY), |delay| {
        Some((*delay * 2).min(MAX_PING_DELAY))
    })
    .take(PING_ATTEMPTS as usize - 1)
}

/// Open a client on the game database and wait until it answers a ping.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut delays = ping_delays();
    let mut attempts = 0;
    loop {
        attempts += 1;
        let Err(err) = database.run_command(doc! { "ping": 1 }).await else {
            return Ok((client, database));
        };
        let Some(delay) = delays.next() else {
            return Err(MongoDaoError::InitialPing {
                attempts,
                source: err,
            });
        };
        debug!(attempts, database = database_name, error = %err, "game database ping failed; retrying");
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_delays_double_up_to_the_cap() {
        let delays: Vec<_> = ping_delays().collect();
        assert_eq!(
            delays,
            [250, 500, 1000, 2000].map(Duration::from_millis).to_vec()
        );
    }
}
