use chrono::Local;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::api_client::ApiResult;
use crate::error::Result;
use crate::extract::FieldExtractor;
use crate::office_loader::OfficeRecord;

/// The final per-office structure: scraped table row, geocoded coordinates
/// and the historical API payload, joined on the office slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedRecord {
    pub table_data: OfficeRecord,
    pub api_data: ApiResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub scraping_results: ScrapeStats,
    pub geocoding_results: GeocodeStats,
    pub wait_time_stats: WaitTimeStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScrapeStats {
    pub total_offices_found: usize,
    pub successful_api_calls: usize,
    pub failed_api_calls: usize,
    pub api_success_rate: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeocodeStats {
    pub total_addresses_processed: usize,
    pub successfully_geocoded: usize,
    pub failed_geocoding: usize,
    pub geocoding_success_rate: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WaitTimeStats {
    pub appointment: WaitStats,
    pub non_appointment: WaitStats,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WaitStats {
    pub count: usize,
    pub average: f64,
    pub min: u32,
    pub max: u32,
}

/// Joins the office list with the fetched results: exactly one record per
/// office slug, ordered by slug so repeated runs serialize identically. An
/// office whose result is missing from the map (an aborted fetch stage) is
/// logged and dropped rather than invented.
pub fn combine(
    offices: Vec<OfficeRecord>,
    results: &BTreeMap<String, ApiResult>,
) -> Vec<CombinedRecord> {
    let mut combined: Vec<CombinedRecord> = offices
        .into_iter()
        .filter_map(|office| match results.get(&office.slug) {
            Some(api_data) => Some(CombinedRecord {
                table_data: office,
                api_data: api_data.clone(),
            }),
            None => {
                warn!("No API result recorded for slug '{}'; dropping it", office.slug);
                None
            }
        })
        .collect();

    combined.sort_by(|a, b| a.table_data.slug.cmp(&b.table_data.slug));
    combined
}

/// Writes the single source of truth for downstream analysis.
pub fn write_complete_json(records: &[CombinedRecord], path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)?;
    fs::write(path, json)?;
    info!("Wrote {} combined records to {:?}", records.len(), path);
    Ok(())
}

/// Flat per-office details for spreadsheet work. Only geocoded offices are
/// emitted since the sheet exists for location-based analysis.
pub fn write_details_csv(records: &[CombinedRecord], path: &Path) -> Result<()> {
    let extractor = FieldExtractor::new();
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "name",
        "slug",
        "address",
        "zip",
        "latitude",
        "longitude",
        "appt_wait_min",
        "walk_in_wait_min",
        "api_data_available",
        "timestamp",
    ])?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let mut rows = 0;
    for record in records {
        let office = &record.table_data;
        let (lat, lon) = match (office.latitude, office.longitude) {
            (Some(lat), Some(lon)) if office.geocoded => (lat, lon),
            _ => continue,
        };

        let zip = office
            .address
            .as_deref()
            .and_then(|a| extractor.extract_zip(a))
            .unwrap_or_default();
        let appt = office
            .current_appt_wait
            .as_deref()
            .and_then(|w| extractor.parse_wait_minutes(w))
            .map(|m| m.to_string())
            .unwrap_or_default();
        let walk_in = office
            .current_non_appt_wait
            .as_deref()
            .and_then(|w| extractor.parse_wait_minutes(w))
            .map(|m| m.to_string())
            .unwrap_or_default();
        let lat = format!("{:.6}", lat);
        let lon = format!("{:.6}", lon);

        writer.write_record([
            office.name.as_str(),
            office.slug.as_str(),
            office.address.as_deref().unwrap_or(""),
            zip.as_str(),
            lat.as_str(),
            lon.as_str(),
            appt.as_str(),
            walk_in.as_str(),
            if record.api_data.success { "yes" } else { "no" },
            timestamp.as_str(),
        ])?;
        rows += 1;
    }

    writer.flush()?;
    info!("Wrote {} office rows to {:?}", rows, path);
    Ok(())
}

pub fn build_summary(records: &[CombinedRecord]) -> RunSummary {
    let total = records.len();
    let successful_api = records.iter().filter(|r| r.api_data.success).count();
    let geocoded = records.iter().filter(|r| r.table_data.geocoded).count();

    let extractor = FieldExtractor::new();
    let appt: Vec<u32> = records
        .iter()
        .filter_map(|r| r.table_data.current_appt_wait.as_deref())
        .filter_map(|w| extractor.parse_wait_minutes(w))
        .collect();
    let walk_in: Vec<u32> = records
        .iter()
        .filter_map(|r| r.table_data.current_non_appt_wait.as_deref())
        .filter_map(|w| extractor.parse_wait_minutes(w))
        .collect();

    RunSummary {
        generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        scraping_results: ScrapeStats {
            total_offices_found: total,
            successful_api_calls: successful_api,
            failed_api_calls: total - successful_api,
            api_success_rate: percentage(successful_api, total),
        },
        geocoding_results: GeocodeStats {
            total_addresses_processed: total,
            successfully_geocoded: geocoded,
            failed_geocoding: total - geocoded,
            geocoding_success_rate: percentage(geocoded, total),
        },
        wait_time_stats: WaitTimeStats {
            appointment: wait_stats(&appt),
            non_appointment: wait_stats(&walk_in),
        },
    }
}

pub fn write_summary_json(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(summary)?;
    fs::write(path, json)?;
    info!("Wrote run summary to {:?}", path);
    Ok(())
}

fn percentage(part: usize, whole: usize) -> String {
    if whole == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part as f64 / whole as f64 * 100.0)
}

fn wait_stats(minutes: &[u32]) -> WaitStats {
    if minutes.is_empty() {
        return WaitStats::default();
    }
    let sum: u64 = minutes.iter().map(|&m| m as u64).sum();
    WaitStats {
        count: minutes.len(),
        average: (sum as f64 / minutes.len() as f64 * 10.0).round() / 10.0,
        min: *minutes.iter().min().unwrap(),
        max: *minutes.iter().max().unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn office(slug: &str, appt: Option<&str>, walk_in: Option<&str>) -> OfficeRecord {
        OfficeRecord {
            name: format!("Office {}", slug),
            slug: slug.to_string(),
            address: Some(format!("{} Main St, Somewhere, CA 95818", slug.len())),
            current_appt_wait: appt.map(String::from),
            current_non_appt_wait: walk_in.map(String::from),
            url: format!("https://www.dmvwaittimes.live/office/{}", slug),
            latitude: None,
            longitude: None,
            geocoded: false,
        }
    }

    fn api_result(slug: &str, success: bool) -> ApiResult {
        ApiResult {
            slug: slug.to_string(),
            success,
            data: success.then(|| serde_json::json!({"monday": {"0900": 12}})),
            api_url: format!(
                "https://www.dmvwaittimes.live/api/wait_times_daily_averages?slug={}",
                slug
            ),
            error: (!success).then(|| "503 Service Unavailable".to_string()),
            attempts_needed: if success { 2 } else { 5 },
        }
    }

    #[test]
    fn join_is_complete_and_majority_failure_is_fine() {
        // 176 offices, 22 of which have API data. The observed success rate
        // in production is about this bad.
        let offices: Vec<OfficeRecord> = (0..176)
            .map(|i| office(&format!("office-{:03}", i), Some("10"), Some("30")))
            .collect();
        let results: BTreeMap<String, ApiResult> = (0..176)
            .map(|i| {
                let slug = format!("office-{:03}", i);
                let result = api_result(&slug, i < 22);
                (slug, result)
            })
            .collect();

        let combined = combine(offices, &results);
        assert_eq!(combined.len(), 176);
        assert_eq!(combined.iter().filter(|r| r.api_data.data.is_some()).count(), 22);
        assert_eq!(combined.iter().filter(|r| !r.api_data.success).count(), 154);
    }

    #[test]
    fn combined_records_are_sorted_by_slug_with_no_duplicates() {
        let offices = vec![
            office("fresno", None, None),
            office("arleta", None, None),
            office("bakersfield", None, None),
        ];
        let results: BTreeMap<String, ApiResult> = offices
            .iter()
            .map(|o| (o.slug.clone(), api_result(&o.slug, false)))
            .collect();

        let combined = combine(offices, &results);
        let slugs: Vec<&str> = combined.iter().map(|r| r.table_data.slug.as_str()).collect();
        assert_eq!(slugs, vec!["arleta", "bakersfield", "fresno"]);
    }

    #[test]
    fn office_without_a_result_is_dropped() {
        let offices = vec![office("arleta", None, None), office("fresno", None, None)];
        let mut results = BTreeMap::new();
        results.insert("arleta".to_string(), api_result("arleta", true));

        let combined = combine(offices, &results);
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].table_data.slug, "arleta");
    }

    #[test]
    fn summary_counts_and_averages() {
        let mut offices = vec![
            office("a", Some("10"), Some("20")),
            office("b", Some("20"), Some("N/A")),
            office("c", None, Some("40")),
        ];
        offices[0].latitude = Some(34.0);
        offices[0].longitude = Some(-118.0);
        offices[0].geocoded = true;

        let results: BTreeMap<String, ApiResult> = offices
            .iter()
            .enumerate()
            .map(|(i, o)| (o.slug.clone(), api_result(&o.slug, i == 0)))
            .collect();
        let combined = combine(offices, &results);
        let summary = build_summary(&combined);

        assert_eq!(summary.scraping_results.total_offices_found, 3);
        assert_eq!(summary.scraping_results.successful_api_calls, 1);
        assert_eq!(summary.scraping_results.failed_api_calls, 2);
        assert_eq!(summary.scraping_results.api_success_rate, "33.3%");
        assert_eq!(summary.geocoding_results.successfully_geocoded, 1);

        assert_eq!(summary.wait_time_stats.appointment.count, 2);
        assert_eq!(summary.wait_time_stats.appointment.average, 15.0);
        assert_eq!(summary.wait_time_stats.non_appointment.count, 2);
        assert_eq!(summary.wait_time_stats.non_appointment.min, 20);
        assert_eq!(summary.wait_time_stats.non_appointment.max, 40);
    }

    #[test]
    fn complete_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dmv_offices_complete.json");

        let offices = vec![office("arleta", Some("15"), Some("45"))];
        let results: BTreeMap<String, ApiResult> =
            [("arleta".to_string(), api_result("arleta", true))].into();
        let combined = combine(offices, &results);

        write_complete_json(&combined, &path).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let reloaded: Vec<CombinedRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].api_data.attempts_needed, 2);
        assert!(reloaded[0].api_data.data.is_some());
    }

    #[test]
    fn details_csv_only_contains_geocoded_offices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dmv_offices_details.csv");

        let mut geocoded = office("arleta", Some("15"), Some("45"));
        geocoded.latitude = Some(34.2415);
        geocoded.longitude = Some(-118.4302);
        geocoded.geocoded = true;
        let offices = vec![geocoded, office("fresno", Some("5"), Some("10"))];
        let results: BTreeMap<String, ApiResult> = offices
            .iter()
            .map(|o| (o.slug.clone(), api_result(&o.slug, false)))
            .collect();
        let combined = combine(offices, &results);

        write_details_csv(&combined, &path).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("name,slug,address,zip"));
        assert!(lines[1].contains("arleta"));
        assert!(lines[1].contains("95818"));
        assert!(lines[1].contains("34.241500"));
    }
}
