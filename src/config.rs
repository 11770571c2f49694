//! Application-level configuration loading: game defaults, orchestration timings
//! and the word dictionary location.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "WORD_DERBY_CONFIG_PATH";
/// Dictionary file used when the configuration does not name one.
const DEFAULT_WORDS_PATH: &str = "config/words.json";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Settings copied into every new game.
    pub game: GameSettings,
    /// Delays driving the orchestration continuations.
    pub timings: Timings,
    /// Maximum number of concurrent sends during a broadcast.
    pub broadcast_concurrency: usize,
    /// Location of the word dictionary.
    pub words_path: PathBuf,
}

/// Fixed configuration applied to a game at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameSettings {
    pub target_score: u32,
    pub options_per_question: u32,
    pub seconds_per_question: u32,
    pub max_player_count: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            target_score: 500,
            options_per_question: 3,
            seconds_per_question: 10,
            max_player_count: 5,
        }
    }
}

/// Durations used when scheduling continuations and expiry hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Grace period after game creation before a non-full lobby starts anyway.
    pub autostart: Duration,
    /// "About to start" countdown before the first question.
    pub countdown: Duration,
    /// Pause between a round summary and the next question.
    pub round_pause: Duration,
    /// Expiry applied to a game once it starts.
    pub game_ttl: Duration,
    /// Expiry applied to player records.
    pub player_ttl: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            autostart: Duration::from_secs(30),
            countdown: Duration::from_secs(5),
            round_pause: Duration::from_secs(2),
            game_ttl: Duration::from_secs(3600),
            player_ttl: Duration::from_secs(3600),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        target_score = app_config.game.target_score,
                        max_player_count = app_config.game.max_player_count,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON configuration document. Missing keys take their default value.
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    game: GameSettings,
    autostart_seconds: u64,
    countdown_seconds: u64,
    round_pause_seconds: u64,
    game_ttl_seconds: u64,
    player_ttl_seconds: u64,
    broadcast_concurrency: usize,
    words_path: Option<PathBuf>,
}

impl Default for RawConfig {
    fn default() -> Self {
        let timings = Timings::default();
        Self {
            game: GameSettings::default(),
            autostart_seconds: timings.autostart.as_secs(),
            countdown_seconds: timings.countdown.as_secs(),
            round_pause_seconds: timings.round_pause.as_secs(),
            game_ttl_seconds: timings.game_ttl.as_secs(),
            player_ttl_seconds: timings.player_ttl.as_secs(),
            broadcast_concurrency: 16,
            words_path: None,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            game: value.game,
            timings: Timings {
                autostart: Duration::from_secs(value.autostart_seconds),
                countdown: Duration::from_secs(value.countdown_seconds),
                round_pause: Duration::from_secs(value.round_pause_seconds),
                game_ttl: Duration::from_secs(value.game_ttl_seconds),
                player_ttl: Duration::from_secs(value.player_ttl_seconds),
            },
            broadcast_concurrency: value.broadcast_concurrency.max(1),
            words_path: value
                .words_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORDS_PATH)),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config.game, GameSettings::default());
        assert_eq!(config.timings, Timings::default());
        assert_eq!(config.broadcast_concurrency, 16);
        assert_eq!(config.words_path, PathBuf::from(DEFAULT_WORDS_PATH));
    }

    #[test]
    fn partial_document_overrides_given_keys() {
        let config = AppConfig::from_json_str(
            r#"{
                "game": { "targetScore": 300, "maxPlayerCount": 2 },
                "countdownSeconds": 1,
                "broadcastConcurrency": 0,
                "wordsPath": "/tmp/words.json"
            }"#,
        )
        .unwrap();

        assert_eq!(config.game.target_score, 300);
        assert_eq!(config.game.max_player_count, 2);
        assert_eq!(config.game.options_per_question, 3);
        assert_eq!(config.timings.countdown, Duration::from_secs(1));
        assert_eq!(config.timings.autostart, Duration::from_secs(30));
        assert_eq!(config.broadcast_concurrency, 1);
        assert_eq!(config.words_path, PathBuf::from("/tmp/words.json"));
    }

    #[test]
    fn malformed_document_is_rejected() {
        assert!(AppConfig::from_json_str(r#"{ "game": 5 }"#).is_err());
    }
}
