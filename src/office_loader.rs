use log::{info, warn};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

use crate::error::{Error, Result};

/// One row of the main office table. Coordinates start empty and are filled
/// in once by the geocoding pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfficeRecord {
    pub name: String,
    pub slug: String,
    pub address: Option<String>,
    pub current_appt_wait: Option<String>,
    pub current_non_appt_wait: Option<String>,
    pub url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geocoded: bool,
}

/// Parses the landing-page HTML into office records. Every office is linked
/// as `<a href="/office/<slug>">` inside a table row whose cells hold the
/// current appointment wait, walk-in wait and street address, in that order
/// after the name cell.
///
/// An empty result is a hard error: every downstream step depends on this
/// list, so a layout change on the site must stop the run.
pub fn parse_office_table(html: &str, base_url: &str) -> Result<Vec<OfficeRecord>> {
    let base = Url::parse(base_url)
        .map_err(|e| Error::Config(format!("invalid base url {:?}: {}", base_url, e)))?;

    let document = Html::parse_document(html);
    let link_selector = Selector::parse(r#"a[href^="/office/"]"#).unwrap();
    let cell_selector = Selector::parse("td").unwrap();

    let mut seen = HashSet::new();
    let mut offices = Vec::new();

    for link in document.select(&link_selector) {
        let href = match link.value().attr("href") {
            Some(h) => h,
            None => continue,
        };
        let slug = href.trim_start_matches("/office/").trim().to_string();
        if slug.is_empty() || !seen.insert(slug.clone()) {
            continue;
        }

        let name = collect_text(&link);
        let url = match base.join(href) {
            Ok(u) => u.to_string(),
            Err(e) => {
                warn!("Skipping office '{}' with unusable href {:?}: {}", name, href, e);
                seen.remove(&slug);
                continue;
            }
        };

        let mut current_appt_wait = None;
        let mut current_non_appt_wait = None;
        let mut address = None;

        if let Some(row) = parent_row(&link) {
            let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
            current_appt_wait = cells.get(1).map(collect_text).filter(|s| !s.is_empty());
            current_non_appt_wait = cells.get(2).map(collect_text).filter(|s| !s.is_empty());
            address = cells.get(3).map(collect_text).filter(|s| !s.is_empty());
        }

        offices.push(OfficeRecord {
            name,
            slug,
            address,
            current_appt_wait,
            current_non_appt_wait,
            url,
            latitude: None,
            longitude: None,
            geocoded: false,
        });
    }

    if offices.is_empty() {
        return Err(Error::EmptyOfficeTable);
    }

    offices.sort_by(|a, b| a.name.cmp(&b.name));
    info!("Found {} unique offices in the main table", offices.len());
    Ok(offices)
}

fn collect_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn parent_row<'a>(link: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    let mut node = link.parent();
    while let Some(current) = node {
        if let Some(element) = ElementRef::wrap(current) {
            if element.value().name() == "tr" {
                return Some(element);
            }
        }
        node = current.parent();
    }
    None
}
