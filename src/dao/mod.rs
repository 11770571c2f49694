/// Game, player and pending-slot storage backends.
pub mod game_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Word dictionary questions are drawn from.
pub mod words;
