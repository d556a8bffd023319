use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("action log unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}
