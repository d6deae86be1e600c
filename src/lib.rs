// Public API for the view layer, the replay binary and integration tests

pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod protocol;
pub mod replay;
pub mod router;
pub mod store;
pub mod types;
