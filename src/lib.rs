pub mod aggregator;
pub mod api_client;
pub mod checkpoint;
pub mod config;
pub mod delay;
pub mod error;
pub mod extract;
pub mod geocoder;
pub mod logger;
pub mod office_loader;
pub mod retry;

// Exporting types for convenience
pub use aggregator::CombinedRecord;
pub use api_client::{ApiResult, DmvClient};
pub use checkpoint::ProgressState;
pub use config::Config;
pub use error::{Error, Result};
pub use geocoder::Geocoder;
pub use office_loader::OfficeRecord;
pub use retry::RetryPolicy;
