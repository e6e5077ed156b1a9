use dmv_scraper_lib::{aggregator, delay, logger, office_loader};
use dmv_scraper_lib::{Config, DmvClient, Geocoder, ProgressState, Result};

use log::info;
use std::fs;

fn main() -> Result<()> {
    logger::init();
    info!("Starting DMV wait-time scraper...");

    let config = Config::from_env()?;
    fs::create_dir_all(&config.output_dir)?;

    // 1. Scrape the office table. No offices means the site layout changed
    //    and nothing downstream can run.
    let client = DmvClient::new(&config.base_url, config.retry);
    let html = client.fetch_main_page()?;
    let mut offices = office_loader::parse_office_table(&html, &config.base_url)?;

    // 2. Resume from the last checkpoint if one exists.
    let checkpoint_path = config.checkpoint_path();
    let mut progress = ProgressState::load(&checkpoint_path);

    // 3. Fetch historical wait data per office. Failures are recorded in the
    //    results, not raised; checkpoint write failures are fatal.
    let total = offices.len();
    let mut fetched_this_run = 0;
    for (i, office) in offices.iter().enumerate() {
        if progress.contains(&office.slug) {
            continue;
        }

        if fetched_this_run > 0 {
            delay::request_spacing();
        }
        fetched_this_run += 1;

        info!("Progress: {}/{} - fetching {}...", i + 1, total, office.slug);
        let result = client.fetch_wait_history(&office.slug);
        progress.insert(result);

        let successful = progress.completed.values().filter(|r| r.success).count();
        info!(
            "  Running success rate: {:.1}% ({}/{})",
            successful as f64 / progress.len() as f64 * 100.0,
            successful,
            progress.len()
        );

        if fetched_this_run % config.checkpoint_every == 0 {
            progress.save(&checkpoint_path)?;
            info!("Saved checkpoint at {} completed offices", progress.len());
        }
    }
    progress.save(&checkpoint_path)?;
    info!(
        "Fetch stage complete: {} offices ({} fetched this run)",
        progress.len(),
        fetched_this_run
    );

    // 4. Geocode office addresses. Misses leave coordinates unset.
    if config.skip_geocoding {
        info!("Skipping geocoding pass (DMV_SKIP_GEOCODING set)");
    } else {
        let mut geocoder = Geocoder::new(&config.geocoder_url);
        geocoder.geocode_offices(&mut offices);
    }

    // 5. Join on slug and write the output files.
    let combined = aggregator::combine(offices, &progress.completed);
    aggregator::write_complete_json(
        &combined,
        &config.output_dir.join("dmv_offices_complete.json"),
    )?;
    aggregator::write_details_csv(
        &combined,
        &config.output_dir.join("dmv_offices_details.csv"),
    )?;
    let summary = aggregator::build_summary(&combined);
    aggregator::write_summary_json(&summary, &config.output_dir.join("dmv_summary.json"))?;

    // A finished batch must not be silently resumed by the next run.
    ProgressState::clear(&checkpoint_path)?;

    info!(
        "Batch complete. {} offices, API success rate {}, geocoding success rate {}",
        combined.len(),
        summary.scraping_results.api_success_rate,
        summary.geocoding_results.geocoding_success_rate
    );
    Ok(())
}
