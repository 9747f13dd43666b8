use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument};

use crate::audit::{AuditLedger, ReasonCode};
use crate::types::{Column, RawRecord, Record};

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a feed timestamp. Offsets are dropped after conversion to the
/// naive local wall-clock the rest of the record uses.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse a decimal coordinate; non-finite values count as failures.
pub fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert text records to typed records. Non-null values that fail to parse
/// are audited with their original text and become null.
#[instrument(skip(records, ledger), fields(records = records.len()))]
pub fn coerce_types(records: Vec<RawRecord>, ledger: &mut AuditLedger) -> Vec<Record> {
    let mut failures = 0usize;
    let typed = records
        .into_iter()
        .map(|raw| {
            let id = raw.audit_id();
            let mut datetime = |column: Column| {
                coerce(&raw, column, &id, ledger, ReasonCode::DatetimeParseFailure, parse_datetime, &mut failures)
            };
            let offense_start = datetime(Column::OffenseStart);
            let offense_end = datetime(Column::OffenseEnd);
            let report_datetime = datetime(Column::ReportDatetime);

            let longitude = coerce(&raw, Column::Longitude, &id, ledger, ReasonCode::NumericParseFailure, parse_number, &mut failures);
            let latitude = coerce(&raw, Column::Latitude, &id, ledger, ReasonCode::NumericParseFailure, parse_number, &mut failures);

            Record {
                row: raw.row,
                report_number: raw.report_number,
                offense_id: raw.offense_id,
                offense_start,
                offense_end,
                report_datetime,
                group: raw.group,
                crime_category: raw.crime_category,
                offense_parent_group: raw.offense_parent_group,
                offense: raw.offense,
                offense_code: raw.offense_code,
                precinct: raw.precinct,
                sector: raw.sector,
                beat: raw.beat,
                micro_area: raw.micro_area,
                address: raw.address,
                longitude,
                latitude,
            }
        })
        .collect();
    info!(failures, "Coerced datetime and numeric columns");
    typed
}

fn coerce<T>(
    raw: &RawRecord,
    column: Column,
    id: &str,
    ledger: &mut AuditLedger,
    reason: ReasonCode,
    parse: fn(&str) -> Option<T>,
    failures: &mut usize,
) -> Option<T> {
    let text = raw.field(column)?;
    let parsed = parse(text);
    if parsed.is_none() {
        debug!(column = column.name(), record_id = id, value = text, "Value failed to parse");
        ledger.try_insert(column, id, reason, text);
        *failures += 1;
    }
    parsed
}
