use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Batch-level failures. Per-slug fetch and geocoding failures are recorded
/// in the data instead of surfacing here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Http Error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No offices found in the main table. The page structure may have changed.")]
    EmptyOfficeTable,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
