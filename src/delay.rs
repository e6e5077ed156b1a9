use log::debug;
use rand::Rng;
use std::thread;
use std::time::Duration;

/// Jittered pause between requests to different office slugs, so the batch
/// does not hammer the remote server. Independent of the backoff-on-failure
/// schedule in [`crate::retry`].
pub fn request_spacing() {
    let mut rng = rand::thread_rng();
    let delay_ms = rng.gen_range(1_000..=3_000);
    debug!("Waiting {} ms before next office request...", delay_ms);
    thread::sleep(Duration::from_millis(delay_ms));
}

/// Fixed pause after a remote geocoding lookup. Nominatim is a free service
/// with an absolute limit of one request per second.
pub fn geocode_spacing() {
    thread::sleep(Duration::from_secs(1));
}
