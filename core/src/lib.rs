pub mod cli;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod markdown;
pub mod model;
pub mod registry;
pub mod services;

pub use collector::{compute_deletable, CleanReport, DeletionOutcome, MediaCollector};
pub use db::SqliteCatalogue;
pub use error::{Error, Result};
pub use registry::{Persisted, Registry};
