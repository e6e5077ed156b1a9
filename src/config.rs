use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Runtime configuration, read once at batch start. Every variable has a
/// working default so the binary runs with no flags at all.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub geocoder_url: String,
    pub retry: RetryPolicy,
    pub checkpoint_every: usize,
    pub output_dir: PathBuf,
    pub skip_geocoding: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("DMV_BASE_URL")
            .unwrap_or_else(|_| "https://www.dmvwaittimes.live".to_string());
        let geocoder_url = env::var("DMV_GEOCODER_URL")
            .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string());

        let max_attempts = parse_var("DMV_MAX_ATTEMPTS", 5u32)?;
        if max_attempts == 0 {
            return Err(Error::Config("DMV_MAX_ATTEMPTS must be at least 1".into()));
        }
        let base_delay_ms = parse_var("DMV_BASE_DELAY_MS", 1_000u64)?;
        let max_delay_ms = parse_var("DMV_MAX_DELAY_MS", 30_000u64)?;
        let checkpoint_every = parse_var("DMV_CHECKPOINT_EVERY", 25usize)?;

        let output_dir = PathBuf::from(
            env::var("DMV_OUTPUT_DIR").unwrap_or_else(|_| "data".to_string()),
        );
        let skip_geocoding = env::var("DMV_SKIP_GEOCODING").is_ok();

        Ok(Config {
            base_url: base_url.trim_end_matches('/').to_string(),
            geocoder_url: geocoder_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(
                max_attempts,
                Duration::from_millis(base_delay_ms),
                Duration::from_millis(max_delay_ms),
            ),
            checkpoint_every: checkpoint_every.max(1),
            output_dir,
            skip_geocoding,
        })
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join("dmv_offices_progress.json")
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{} has invalid value {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}
