use regex::Regex;

/// Pulls typed fields out of the free-text values the site serves: street
/// addresses ending in a ZIP code and wait-time cells that mix minute counts
/// with placeholders like "N/A" or "Closed".
pub struct FieldExtractor {
    zip_regex: Regex,
}

impl FieldExtractor {
    pub fn new() -> Self {
        FieldExtractor {
            // "..., CA 91331" or "..., CA 91331-1234"
            zip_regex: Regex::new(r"\b(\d{5})(?:-\d{4})?\s*$").unwrap(),
        }
    }

    pub fn extract_zip(&self, address: &str) -> Option<String> {
        self.zip_regex
            .captures(address.trim())
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Numeric wait in minutes, or `None` for anything that is not a plain
    /// digit string.
    pub fn parse_wait_minutes(&self, raw: &str) -> Option<u32> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        trimmed.parse().ok()
    }
}
