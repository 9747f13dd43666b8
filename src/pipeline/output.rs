use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::audit::{AuditLedger, StageTiming};
use crate::error::Result;
use crate::pipeline::processing::temporal::format_datetime;
use crate::types::Record;

/// One cleaned row in storage column order. `None` is the only null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub report_number: Option<String>,
    pub offense_id: Option<String>,
    pub offense_start_datetime: Option<String>,
    pub offense_end_datetime: Option<String>,
    pub report_datetime: Option<String>,
    pub group_a_b: Option<String>,
    pub crime_against_category: Option<String>,
    pub offense_parent_group: Option<String>,
    pub offense: Option<String>,
    pub offense_code: Option<String>,
    pub precinct: Option<String>,
    pub sector: Option<String>,
    pub beat: Option<String>,
    pub mcpp: Option<String>,
    pub _100_block_address: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

/// Blank text is not a value
fn canonical_null(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<Record> for OutputRecord {
    fn from(r: Record) -> Self {
        Self {
            report_number: canonical_null(r.report_number),
            offense_id: canonical_null(r.offense_id),
            offense_start_datetime: r.offense_start.as_ref().map(format_datetime),
            offense_end_datetime: r.offense_end.as_ref().map(format_datetime),
            report_datetime: r.report_datetime.as_ref().map(format_datetime),
            group_a_b: canonical_null(r.group),
            crime_against_category: canonical_null(r.crime_category),
            offense_parent_group: canonical_null(r.offense_parent_group),
            offense: canonical_null(r.offense),
            offense_code: canonical_null(r.offense_code),
            precinct: canonical_null(r.precinct),
            sector: canonical_null(r.sector),
            beat: canonical_null(r.beat),
            mcpp: canonical_null(r.micro_area),
            _100_block_address: canonical_null(r.address),
            longitude: r.longitude.filter(|v| v.is_finite()),
            latitude: r.latitude.filter(|v| v.is_finite()),
        }
    }
}

/// Ledger row as written to `audit.csv` and the `audit_value` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRow {
    pub audited_col: String,
    pub offense_id: String,
    pub audited_val: String,
    pub audited_reason_id: u8,
    pub batch: String,
}

impl AuditRow {
    pub fn from_ledger(ledger: &AuditLedger) -> Vec<AuditRow> {
        ledger
            .entries()
            .map(|(key, entry)| AuditRow {
                audited_col: key.column.name().to_string(),
                offense_id: key.record_id.clone(),
                audited_val: entry.original_value.clone(),
                audited_reason_id: entry.reason.id(),
                batch: entry.batch.to_string(),
            })
            .collect()
    }
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    let mut written = 0usize;
    for row in rows {
        wtr.serialize(row)?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}

pub fn write_records_csv(path: &Path, records: &[OutputRecord]) -> Result<()> {
    let written = write_rows(path, records)?;
    info!(path = %path.display(), rows = written, "Wrote cleaned records");
    Ok(())
}

pub fn write_audit_csv(path: &Path, ledger: &AuditLedger) -> Result<()> {
    let written = write_rows(path, AuditRow::from_ledger(ledger))?;
    info!(path = %path.display(), rows = written, "Wrote audit ledger");
    Ok(())
}

pub fn write_timings_csv(path: &Path, timings: &[StageTiming]) -> Result<()> {
    write_rows(path, timings)?;
    Ok(())
}
