use media_api::{CatalogueError, StorageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Catalogue error: {0}")]
    Catalogue(#[from] CatalogueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
