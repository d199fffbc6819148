//! Errors raised by the user and file repositories.

use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    StorageWrite(String),
    #[error("{0}")]
    StorageRead(String),
    #[error("{0}")]
    Deserialization(String),
    #[error("{0}")]
    FeatureDisabled(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Wrap a failed store write, keeping key and signing errors distinguishable.
    pub fn write(context: impl std::fmt::Display, err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey(_) => Self::Validation(format!("{context}: {err}")),
            StoreError::FeatureDisabled(msg) => Self::FeatureDisabled(msg),
            other => Self::StorageWrite(format!("{context}: {other}")),
        }
    }

    /// Wrap a failed store read; a missing object becomes `NotFound`.
    pub fn read(context: impl std::fmt::Display, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(format!("{context}: {err}")),
            StoreError::InvalidKey(_) => Self::Validation(format!("{context}: {err}")),
            StoreError::FeatureDisabled(msg) => Self::FeatureDisabled(msg),
            other => Self::StorageRead(format!("{context}: {other}")),
        }
    }
}
