use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::wizard::{PointOfView, Tone};

pub const DEFAULT_COUNTRY: &str = "United States";
pub const DEFAULT_LANGUAGE: &str = "English (US)";
pub const COUNTRY_COLUMN: &str = "Country Name";

pub const LANGUAGES: &[&str] = &["English (US)", "Spanish", "French", "German", "Other"];

const FALLBACK_COUNTRIES: &[&str] = &[
    "Australia",
    "Canada",
    "France",
    "Germany",
    "India",
    "Ireland",
    "Mexico",
    "New Zealand",
    "Spain",
    "United Kingdom",
    "United States",
];

/// Choices offered by the first two wizard pages.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Catalog {
    pub countries: Vec<String>,
    pub languages: Vec<String>,
    pub tones: Vec<&'static str>,
    pub points_of_view: Vec<&'static str>,
    pub default_country: String,
}

impl Catalog {
    pub fn new(countries: Vec<String>) -> Self {
        let default_country = if countries.iter().any(|c| c == DEFAULT_COUNTRY) {
            DEFAULT_COUNTRY.to_string()
        } else {
            countries.first().cloned().unwrap_or_default()
        };
        Self {
            countries,
            languages: LANGUAGES.iter().map(|l| l.to_string()).collect(),
            tones: Tone::ALL.iter().map(|t| t.label()).collect(),
            points_of_view: PointOfView::ALL.iter().map(|p| p.label()).collect(),
            default_country,
        }
    }

    /// Reads the countries CSV, or falls back to a short built-in list when
    /// the file does not exist.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "countries file not found, using built-in list");
            return Ok(Self::new(FALLBACK_COUNTRIES.iter().map(|c| c.to_string()).collect()));
        }
        let countries = load_countries(path)?;
        info!(path = %path.display(), count = countries.len(), "loaded countries");
        Ok(Self::new(countries))
    }
}

pub fn load_countries(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_countries(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Extracts the `Country Name` column, in file order.
pub fn parse_countries(csv: &str) -> anyhow::Result<Vec<String>> {
    let mut lines = csv.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or_else(|| anyhow::anyhow!("empty csv"))?;
    let header = split_record(header.trim_start_matches('\u{feff}'));
    let column = header
        .iter()
        .position(|h| h.trim() == COUNTRY_COLUMN)
        .ok_or_else(|| anyhow::anyhow!("missing '{}' column", COUNTRY_COLUMN))?;
    Ok(lines
        .filter_map(|line| split_record(line).into_iter().nth(column))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect())
}

/// Splits one CSV record, honouring double-quoted fields and `""` escapes.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
