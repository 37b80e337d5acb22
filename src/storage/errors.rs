use std::io::Error as IoError;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("creating data directory {}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: IoError,
    },

    #[error("opening note store {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{action} failed")]
    Write {
        action: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{action} failed")]
    Query {
        action: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("note {id} not found")]
    NotFound { id: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub(super) fn write_error(action: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |source| StoreError::Write { action, source }
}

pub(super) fn query_error(action: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |source| StoreError::Query { action, source }
}
