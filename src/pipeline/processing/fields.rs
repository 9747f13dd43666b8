//! Field normalizer: whitespace, casing and missing-value canonicalization.
//!
//! Nothing here is audited. These rewrites repair the encoding of a value,
//! they never discard information.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument};

use crate::constants::{MISSING_VALUES, NON_EXISTENT_STREET_PATTERN};
use crate::types::{Column, RawRecord};

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
static SPACED_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+-\s+").unwrap());
static SPACED_SLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+/\s+").unwrap());
static AMPERSAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)\s*&\s*(\w)").unwrap());
static NON_EXISTENT_STREET: Lazy<Regex> =
    Lazy::new(|| Regex::new(NON_EXISTENT_STREET_PATTERN).unwrap());

/// Identifiers and codes: no whitespace may appear anywhere
const COMPACT_COLUMNS: [Column; 8] = [
    Column::Beat,
    Column::Sector,
    Column::Precinct,
    Column::Group,
    Column::OffenseId,
    Column::OffenseCode,
    Column::ReportNumber,
    Column::CrimeCategory,
];

/// Names and addresses: single-spaced, tight dashes and slashes, spaced ampersands
const FREE_TEXT_COLUMNS: [Column; 4] =
    [Column::OffenseParentGroup, Column::Offense, Column::MicroArea, Column::Address];

/// Columns holding letters, upper-cased for consistent comparison
const LETTER_COLUMNS: [Column; 10] = [
    Column::Group,
    Column::CrimeCategory,
    Column::OffenseParentGroup,
    Column::Offense,
    Column::OffenseCode,
    Column::Precinct,
    Column::Sector,
    Column::Beat,
    Column::MicroArea,
    Column::Address,
];

/// Run whitespace, casing and missing-value cleanup over every record
#[instrument(skip(records), fields(records = records.len()))]
pub fn normalize_fields(records: &mut [RawRecord]) {
    let mut nulled = 0usize;
    for record in records.iter_mut() {
        cleanup_whitespace(record);
        cleanup_casing(record);
        nulled += cleanup_missing_values(record);
    }
    info!(nulled, "Normalized field encodings");
}

pub fn cleanup_whitespace(record: &mut RawRecord) {
    for column in Column::ALL {
        let field = record.field_mut(column);
        let Some(value) = field.take() else { continue };

        let mut value = value.trim().to_string();
        if COMPACT_COLUMNS.contains(&column) {
            value.retain(|c| c != ' ');
        }
        if FREE_TEXT_COLUMNS.contains(&column) {
            value = tidy_free_text(&value);
        }

        *field = if value.is_empty() { None } else { Some(value) };
    }
}

fn tidy_free_text(value: &str) -> String {
    let value = MULTI_SPACE.replace_all(value, " ");
    let value = SPACED_DASH.replace_all(&value, "-");
    let value = SPACED_SLASH.replace_all(&value, "/");
    AMPERSAND.replace_all(&value, "$1 & $2").into_owned()
}

pub fn cleanup_casing(record: &mut RawRecord) {
    for column in LETTER_COLUMNS {
        if let Some(value) = record.field_mut(column) {
            *value = value.to_uppercase();
        }
    }
}

/// Null designated missing-value markers. Returns how many fields were nulled.
pub fn cleanup_missing_values(record: &mut RawRecord) -> usize {
    let mut nulled = 0;
    for column in Column::ALL {
        let field = record.field_mut(column);
        if field.as_deref().map_or(false, |v| MISSING_VALUES.contains(&v)) {
            *field = None;
            nulled += 1;
        }
    }

    if record.address.as_deref().map_or(false, |a| NON_EXISTENT_STREET.is_match(a)) {
        record.address = None;
        nulled += 1;
    }

    // The feed writes 0 for an unknown coordinate. This runs on the text form,
    // before coercion, so "0.5" is caught too.
    for column in [Column::Latitude, Column::Longitude] {
        let field = record.field_mut(column);
        if field.as_deref().map_or(false, |v| v.starts_with('0')) {
            *field = None;
            nulled += 1;
        }
    }
    nulled
}
