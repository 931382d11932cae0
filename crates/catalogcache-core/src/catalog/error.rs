use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("A catalog load is already in progress")]
    LoadInProgress,

    #[error(transparent)]
    Fetch(#[from] ApiError),

    #[error("Failed to update the local catalog: {0}")]
    Store(#[from] StoreError),
}
