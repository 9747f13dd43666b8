use chrono::NaiveDate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::Column;

/// Why a value was nulled. The numeric ids are persisted and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReasonCode {
    DatetimeParseFailure,
    NumericParseFailure,
    StartAfterEnd,
    MalformedReportNumber,
    LowConfidenceFuzzyMatch,
    /// Fuzzy match against the full vocabulary for a record with no usable precinct
    LowConfidenceFuzzyMatchNoPrecinct,
    InvalidBeat,
    UnrecoverableHierarchyCode,
    UnrecoverableAreaCode,
    LongitudeOutOfRange,
    LatitudeOutOfRange,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 11] = [
        ReasonCode::DatetimeParseFailure,
        ReasonCode::NumericParseFailure,
        ReasonCode::StartAfterEnd,
        ReasonCode::MalformedReportNumber,
        ReasonCode::LowConfidenceFuzzyMatch,
        ReasonCode::LowConfidenceFuzzyMatchNoPrecinct,
        ReasonCode::InvalidBeat,
        ReasonCode::UnrecoverableHierarchyCode,
        ReasonCode::UnrecoverableAreaCode,
        ReasonCode::LongitudeOutOfRange,
        ReasonCode::LatitudeOutOfRange,
    ];

    pub fn id(self) -> u8 {
        match self {
            ReasonCode::DatetimeParseFailure => 1,
            ReasonCode::NumericParseFailure => 2,
            ReasonCode::StartAfterEnd => 3,
            ReasonCode::MalformedReportNumber => 4,
            ReasonCode::LowConfidenceFuzzyMatch => 5,
            ReasonCode::LowConfidenceFuzzyMatchNoPrecinct => 6,
            ReasonCode::InvalidBeat => 7,
            ReasonCode::UnrecoverableHierarchyCode => 8,
            ReasonCode::UnrecoverableAreaCode => 9,
            ReasonCode::LongitudeOutOfRange => 10,
            ReasonCode::LatitudeOutOfRange => 11,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.id() == id)
    }

    /// Short metric/log label
    pub fn label(self) -> &'static str {
        match self {
            ReasonCode::DatetimeParseFailure => "datetime_parse_failure",
            ReasonCode::NumericParseFailure => "numeric_parse_failure",
            ReasonCode::StartAfterEnd => "start_after_end",
            ReasonCode::MalformedReportNumber => "malformed_report_number",
            ReasonCode::LowConfidenceFuzzyMatch => "low_confidence_fuzzy_match",
            ReasonCode::LowConfidenceFuzzyMatchNoPrecinct => "low_confidence_fuzzy_match_no_precinct",
            ReasonCode::InvalidBeat => "invalid_beat",
            ReasonCode::UnrecoverableHierarchyCode => "unrecoverable_hierarchy_code",
            ReasonCode::UnrecoverableAreaCode => "unrecoverable_area_code",
            ReasonCode::LongitudeOutOfRange => "longitude_out_of_range",
            ReasonCode::LatitudeOutOfRange => "latitude_out_of_range",
        }
    }
}

/// Ledger key: which column of which record was nulled
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuditKey {
    pub column: Column,
    pub record_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub reason: ReasonCode,
    /// The value as it was before the stage nulled it
    pub original_value: String,
    pub batch: NaiveDate,
}

/// Append-only record of every value a cleaning run nulled.
///
/// Keys are (column, record id). The first stage to audit a key owns it:
/// later inserts for the same key are dropped, not merged.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    batch: NaiveDate,
    entries: BTreeMap<AuditKey, AuditEntry>,
}

impl AuditLedger {
    pub fn new(batch: NaiveDate) -> Self {
        Self { batch, entries: BTreeMap::new() }
    }

    pub fn batch(&self) -> NaiveDate {
        self.batch
    }

    /// Record that `column` of `record_id` held `original_value` and was nulled for `reason`.
    /// Returns false when the key was already ledgered.
    pub fn try_insert(
        &mut self,
        column: Column,
        record_id: impl Into<String>,
        reason: ReasonCode,
        original_value: impl Into<String>,
    ) -> bool {
        let key = AuditKey { column, record_id: record_id.into() };
        match self.entries.entry(key) {
            Entry::Occupied(existing) => {
                debug!(
                    column = column.name(),
                    record_id = %existing.key().record_id,
                    kept = existing.get().reason.label(),
                    dropped = reason.label(),
                    "Audit key already ledgered; keeping first entry"
                );
                false
            }
            Entry::Vacant(slot) => {
                counter!("spd_cleaner_audited_values_total", "reason" => reason.label()).increment(1);
                slot.insert(AuditEntry {
                    reason,
                    original_value: original_value.into(),
                    batch: self.batch,
                });
                true
            }
        }
    }

    pub fn get(&self, column: Column, record_id: &str) -> Option<&AuditEntry> {
        self.entries.get(&AuditKey { column, record_id: record_id.to_string() })
    }

    /// Entries ordered by (column, record id)
    pub fn entries(&self) -> impl Iterator<Item = (&AuditKey, &AuditEntry)> {
        self.entries.iter()
    }

    pub fn count_by_reason(&self) -> BTreeMap<ReasonCode, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.reason).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runtime of one stage within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub batch: NaiveDate,
    pub runtime_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 4, 8).unwrap()
    }

    #[test]
    fn test_first_writer_wins() {
        let mut ledger = AuditLedger::new(batch());
        assert!(ledger.try_insert(Column::Beat, "1", ReasonCode::InvalidBeat, "Z9"));
        assert!(!ledger.try_insert(Column::Beat, "1", ReasonCode::UnrecoverableHierarchyCode, "other"));

        let entry = ledger.get(Column::Beat, "1").unwrap();
        assert_eq!(entry.reason, ReasonCode::InvalidBeat);
        assert_eq!(entry.original_value, "Z9");
        assert_eq!(entry.batch, batch());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_same_record_different_columns_are_distinct() {
        let mut ledger = AuditLedger::new(batch());
        ledger.try_insert(Column::OffenseStart, "1", ReasonCode::StartAfterEnd, "2023-01-02 00:00:00");
        ledger.try_insert(Column::OffenseEnd, "1", ReasonCode::StartAfterEnd, "2023-01-01 00:00:00");
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.count_by_reason().get(&ReasonCode::StartAfterEnd), Some(&2));
    }

    #[test]
    fn test_reason_ids_are_stable() {
        let ids: Vec<u8> = ReasonCode::ALL.iter().map(|r| r.id()).collect();
        assert_eq!(ids, (1..=11).collect::<Vec<u8>>());
        assert_eq!(ReasonCode::from_id(7), Some(ReasonCode::InvalidBeat));
        assert_eq!(ReasonCode::from_id(12), None);
    }

    #[test]
    fn test_entries_are_ordered_by_column_then_id() {
        let mut ledger = AuditLedger::new(batch());
        ledger.try_insert(Column::Latitude, "2", ReasonCode::LatitudeOutOfRange, "50");
        ledger.try_insert(Column::ReportNumber, "9", ReasonCode::MalformedReportNumber, "12");
        ledger.try_insert(Column::ReportNumber, "3", ReasonCode::MalformedReportNumber, "13");
        let keys: Vec<(Column, &str)> =
            ledger.entries().map(|(k, _)| (k.column, k.record_id.as_str())).collect();
        assert_eq!(
            keys,
            vec![(Column::ReportNumber, "3"), (Column::ReportNumber, "9"), (Column::Latitude, "2")]
        );
    }
}
