use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "word_derby";

/// Where the CouchDB game store lives.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root, e.g. `http://localhost:5984`.
    pub base_url: String,
    /// Database holding game, player and pending-slot documents.
    pub database: String,
    /// Basic-auth pair, when the server requires one.
    pub credentials: Option<CouchCredentials>,
}

/// Basic-auth pair sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchCredentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` (defaults to `word_derby`) and
    /// the optional `COUCH_USERNAME` / `COUCH_PASSWORD` pair.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let base_url = non_empty("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = non_empty("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        // A lone username or password is ignored.
        let credentials = non_empty("COUCH_USERNAME")
            .zip(non_empty("COUCH_PASSWORD"))
            .map(|(username, password)| CouchCredentials { username, password });

        Ok(Self {
            base_url,
            database,
            credentials,
        })
    }
}
