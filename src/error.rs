use crate::domain::catalog::Platform;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IapError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Purchasing is not initialized")]
    NotInitialized,
    #[error("Product catalog is empty")]
    EmptyCatalog,
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),
    #[error("Duplicate product id in catalog: {0}")]
    DuplicateProduct(String),
    #[error("Unknown product: {0}")]
    UnknownProduct(String),
    #[error("Product is not available for purchase: {0}")]
    NotPurchasable(String),
    #[error("A restore is already in progress")]
    RestoreInProgress,
    #[error("No restore strategy available for platform {0}")]
    NoRestoreStrategy(Platform),
    #[error("Purchasing was disposed")]
    Disposed,
    #[error("Purchase service has stopped")]
    ServiceStopped,
    #[error("Script error: {0}")]
    ScriptError(String),
}

pub type Result<T> = std::result::Result<T, IapError>;

/// Failures reported synchronously by a store controller.
#[derive(Error, Debug, PartialEq)]
pub enum BackendError {
    #[error("No receipt for product {0}")]
    NoReceipt(String),
    #[error("Receipt for product {0} could not be parsed")]
    InvalidReceipt(String),
}
