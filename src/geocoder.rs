use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use crate::delay;
use crate::error::Result;
use crate::office_loader::OfficeRecord;
use crate::retry::RetryPolicy;

/// Resolves street addresses to coordinates through Nominatim. Keeps its own
/// HTTP client, separate from the wait-time session, and a per-batch cache
/// so a repeated address costs one lookup.
pub struct Geocoder {
    client: Client,
    endpoint: String,
    policy: RetryPolicy,
    cache: HashMap<String, Option<(f64, f64)>>,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl Geocoder {
    pub fn new(endpoint: &str) -> Self {
        let mut headers = HeaderMap::new();
        // Nominatim's usage policy requires an identifying agent.
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("dmv_office_mapper/0.1 (batch geocoding)"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .expect("Failed to build geocoding client");

        Geocoder {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            policy: RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(10)),
            cache: HashMap::new(),
        }
    }

    /// Fills `latitude`/`longitude`/`geocoded` on every record, in place and
    /// exactly once. Addresses that cannot be resolved leave the coordinates
    /// unset; geocoding never aborts the batch.
    pub fn geocode_offices(&mut self, offices: &mut [OfficeRecord]) {
        let total = offices.len();
        let mut resolved = 0;

        for (i, office) in offices.iter_mut().enumerate() {
            info!("Geocoding {}/{}: {}", i + 1, total, office.name);

            let coords = match office.address.as_deref() {
                Some(address) if !address.trim().is_empty() => self.geocode_address(address),
                _ => {
                    warn!("  No address available for {}", office.name);
                    None
                }
            };

            office.latitude = coords.map(|(lat, _)| lat);
            office.longitude = coords.map(|(_, lon)| lon);
            office.geocoded = coords.is_some();
            if coords.is_some() {
                resolved += 1;
            }
        }

        let rate = if total > 0 {
            resolved as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        info!("Geocoding done: {}/{} resolved ({:.1}%)", resolved, total, rate);
    }

    /// Resolves one address, consulting the cache first. Remote lookups are
    /// spaced at one per second per the Nominatim usage policy.
    pub fn geocode_address(&mut self, address: &str) -> Option<(f64, f64)> {
        if let Some(cached) = self.cache.get(address) {
            debug!("  Cache hit for {:?}", address);
            return *cached;
        }

        let coords = self.resolve(address);
        self.cache.insert(address.to_string(), coords);
        delay::geocode_spacing();
        coords
    }

    fn resolve(&self, address: &str) -> Option<(f64, f64)> {
        let query = search_query(address);

        for attempt in 1..=self.policy.max_attempts {
            match self.lookup(&query) {
                Ok(Some((lat, lon))) => {
                    info!("  Found: {:.4}, {:.4}", lat, lon);
                    return Some((lat, lon));
                }
                // Not found is terminal; only transport errors are retried.
                Ok(None) => {
                    warn!("  Address not found: {:?}", address);
                    return None;
                }
                Err(e) => {
                    warn!(
                        "  Geocoding attempt {}/{} failed for {:?}: {}",
                        attempt, self.policy.max_attempts, address, e
                    );
                    if let Some(backoff) = self.policy.delay_before_retry(attempt) {
                        thread::sleep(backoff);
                    }
                }
            }
        }

        warn!("  Failed to geocode {:?} after {} attempts", address, self.policy.max_attempts);
        None
    }

    fn lookup(&self, query: &str) -> Result<Option<(f64, f64)>> {
        let url = format!(
            "{}/search?q={}&format=json&limit=1",
            self.endpoint,
            urlencoding::encode(query)
        );
        let body = self.client.get(&url).send()?.error_for_status()?.text()?;
        parse_response(&body)
    }
}

/// California addresses on the source site usually end in "CA <zip>"; the
/// country suffix noticeably improves Nominatim's hit rate.
fn search_query(address: &str) -> String {
    if address.contains("CA") && !address.contains("USA") {
        format!("{}, USA", address)
    } else {
        address.to_string()
    }
}

fn parse_response(body: &str) -> Result<Option<(f64, f64)>> {
    let places: Vec<NominatimPlace> = serde_json::from_str(body)?;
    let coords = places.first().and_then(|place| {
        let lat = place.lat.parse::<f64>().ok()?;
        let lon = place.lon.parse::<f64>().ok()?;
        Some((lat, lon))
    });
    Ok(coords)
}
