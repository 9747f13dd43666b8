//! Location hierarchy reconciliation.
//!
//! Location codes nest: beat ⊂ sector ⊂ precinct, and micro-community ⊂ precinct.
//! A valid low-level code therefore determines its high-level code. Invalid
//! high-level codes are filled from the low level where possible; what cannot
//! be derived is audited and nulled.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::audit::{AuditLedger, ReasonCode};
use crate::reference::{ReferenceTables, Table};
use crate::types::{Location, Record};

/// A functional dependency `low -> high`, answered by `table`
#[derive(Debug, Clone, Copy)]
pub struct Pairing {
    pub high: Location,
    pub low: Location,
    pub table: Table,
}

impl Pairing {
    fn reason(&self) -> ReasonCode {
        match self.table {
            Table::Hierarchy => ReasonCode::UnrecoverableHierarchyCode,
            Table::AreaPairing => ReasonCode::UnrecoverableAreaCode,
        }
    }
}

/// Resolution order: sectors from beats, precincts from the resulting sectors,
/// then precincts from micro-communities.
pub const PAIRINGS: [Pairing; 3] = [
    Pairing { high: Location::Sector, low: Location::Beat, table: Table::Hierarchy },
    Pairing { high: Location::Precinct, low: Location::Sector, table: Table::Hierarchy },
    Pairing { high: Location::Precinct, low: Location::MicroArea, table: Table::AreaPairing },
];

pub struct HierarchyResolver {
    tables: Arc<ReferenceTables>,
}

impl HierarchyResolver {
    pub fn new(tables: Arc<ReferenceTables>) -> Self {
        Self { tables }
    }

    #[instrument(skip(self, records, ledger), fields(records = records.len()))]
    pub fn apply(&self, mut records: Vec<Record>, ledger: &mut AuditLedger) -> Vec<Record> {
        self.null_invalid_beats(&mut records, ledger);
        for pairing in PAIRINGS {
            records = records.into_iter().flat_map(|r| self.fill(r, pairing)).collect();
            self.null_unresolved(&mut records, pairing, ledger);
        }
        records
    }

    /// Beats are the lowest level: nothing can repair an unknown beat.
    pub fn null_invalid_beats(&self, records: &mut [Record], ledger: &mut AuditLedger) {
        let mut nulled = 0usize;
        for record in records.iter_mut() {
            let invalid = record.beat.as_deref().map_or(false, |b| !self.tables.is_valid_beat(b));
            if !invalid {
                continue;
            }
            if let Some(beat) = record.beat.take() {
                ledger.try_insert(Location::Beat.column(), record.audit_id(), ReasonCode::InvalidBeat, beat);
                nulled += 1;
            }
        }
        info!(nulled, "Nulled invalid beats");
    }

    /// Fill an invalid `high` from a valid `low`. One record becomes one row per
    /// distinct parent; rows that come out identical are collapsed.
    fn fill(&self, record: Record, pairing: Pairing) -> Vec<Record> {
        let Pairing { high, low, table } = pairing;
        let high_valid = record
            .location(high)
            .map_or(false, |v| self.tables.is_valid(table, high, v));
        let low_value = record
            .location(low)
            .filter(|v| self.tables.is_valid(table, low, v))
            .map(str::to_string);
        let Some(low_value) = low_value else {
            return vec![record];
        };

        let parents = self.tables.parents_of(table, low, high, &low_value);
        if parents.len() > 1 {
            warn!(
                low = low.column().name(),
                value = %low_value,
                parents = ?parents,
                "Reference table maps one code to several parents"
            );
        }

        let mut rows: Vec<Record> = Vec::with_capacity(parents.len().max(1));
        for parent in parents {
            let mut row = record.clone();
            if !high_valid {
                *row.location_mut(high) = Some(parent.to_string());
            }
            if !rows.contains(&row) {
                rows.push(row);
            }
        }
        if rows.is_empty() {
            rows.push(record);
        }
        rows
    }

    fn null_unresolved(&self, records: &mut [Record], pairing: Pairing, ledger: &mut AuditLedger) {
        let Pairing { high, table, .. } = pairing;
        let mut nulled = 0usize;
        for record in records.iter_mut() {
            let invalid = record
                .location(high)
                .map_or(false, |v| !self.tables.is_valid(table, high, v));
            if !invalid {
                continue;
            }
            let id = record.audit_id();
            if let Some(value) = record.location_mut(high).take() {
                ledger.try_insert(high.column(), id, pairing.reason(), value);
                nulled += 1;
            }
        }
        info!(
            high = high.column().name(),
            low = pairing.low.column().name(),
            nulled,
            "Resolved location codes"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::tests::sample_tables;
    use crate::reference::{AreaRow, HierarchyRow};
    use crate::types::Column;
    use chrono::NaiveDate;

    fn ledger() -> AuditLedger {
        AuditLedger::new(NaiveDate::from_ymd_opt(2023, 4, 8).unwrap())
    }

    fn record(id: &str, precinct: Option<&str>, sector: Option<&str>, beat: Option<&str>, area: Option<&str>) -> Record {
        Record {
            offense_id: Some(id.into()),
            precinct: precinct.map(String::from),
            sector: sector.map(String::from),
            beat: beat.map(String::from),
            micro_area: area.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_fills_missing_codes_from_beat() {
        let resolver = HierarchyResolver::new(Arc::new(sample_tables()));
        let mut ledger = ledger();
        let out = resolver.apply(vec![record("1", None, None, Some("B1"), None)], &mut ledger);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sector.as_deref(), Some("B"));
        assert_eq!(out[0].precinct.as_deref(), Some("N"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_invalid_codes_are_overwritten_not_audited_when_derivable() {
        let resolver = HierarchyResolver::new(Arc::new(sample_tables()));
        let mut ledger = ledger();
        let out = resolver.apply(vec![record("1", Some("XX"), Some("Q"), Some("F1"), None)], &mut ledger);
        assert_eq!(out[0].sector.as_deref(), Some("F"));
        assert_eq!(out[0].precinct.as_deref(), Some("SW"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_invalid_beat_cascades_to_unrecoverable_sector() {
        let resolver = HierarchyResolver::new(Arc::new(sample_tables()));
        let mut ledger = ledger();
        let out = resolver.apply(vec![record("1", None, Some("Q"), Some("Z9"), None)], &mut ledger);

        assert_eq!(out[0].beat, None);
        assert_eq!(out[0].sector, None);
        assert_eq!(ledger.get(Column::Beat, "1").unwrap().reason, ReasonCode::InvalidBeat);
        let sector = ledger.get(Column::Sector, "1").unwrap();
        assert_eq!(sector.reason, ReasonCode::UnrecoverableHierarchyCode);
        assert_eq!(sector.original_value, "Q");
    }

    #[test]
    fn test_precinct_from_micro_area() {
        let resolver = HierarchyResolver::new(Arc::new(sample_tables()));
        let mut ledger = ledger();
        // W is only known to the area table; the hierarchy pass nulls it first
        let out = resolver.apply(
            vec![
                record("1", None, None, None, Some("ALKI")),
                record("2", Some("W"), None, None, Some("DOWNTOWN COMMERCIAL")),
                record("3", Some("NOPE"), None, None, None),
            ],
            &mut ledger,
        );
        assert_eq!(out[0].precinct.as_deref(), Some("SW"));
        assert_eq!(out[1].precinct.as_deref(), Some("W"));
        assert_eq!(out[2].precinct, None);

        assert_eq!(ledger.get(Column::Precinct, "2").unwrap().reason, ReasonCode::UnrecoverableHierarchyCode);
        assert_eq!(ledger.get(Column::Precinct, "3").unwrap().reason, ReasonCode::UnrecoverableHierarchyCode);
    }

    #[test]
    fn test_every_remaining_code_is_consistent() {
        let tables = Arc::new(sample_tables());
        let resolver = HierarchyResolver::new(tables.clone());
        let mut ledger = ledger();
        let out = resolver.apply(
            vec![
                record("1", Some("E"), Some("B"), Some("B2"), None),
                record("2", None, Some("L"), None, Some("BALLARD SOUTH")),
                record("3", Some("N"), Some("ZZ"), Some("C1"), None),
            ],
            &mut ledger,
        );
        for r in &out {
            if r.beat.is_some() {
                assert!(r.sector.is_some());
            }
            if r.sector.is_some() || r.micro_area.is_some() {
                assert!(r.precinct.is_some());
            }
        }
        assert_eq!(out[2].sector.as_deref(), Some("C"));
    }

    #[test]
    fn test_ambiguous_reference_rows_expand_then_collapse() {
        let tables = ReferenceTables::from_rows(
            vec![
                HierarchyRow { precinct: "N".into(), sector: "B".into(), beat: "B1".into() },
                HierarchyRow { precinct: "N".into(), sector: "B".into(), beat: "B2".into() },
                HierarchyRow { precinct: "S".into(), sector: "B".into(), beat: "B3".into() },
            ],
            vec![
                AreaRow { precinct: "N".into(), mcpp: "X".into() },
                AreaRow { precinct: "S".into(), mcpp: "Y".into() },
            ],
        )
        .unwrap();
        let resolver = HierarchyResolver::new(Arc::new(tables));
        let mut ledger = ledger();

        let valid = resolver.apply(vec![record("1", Some("N"), Some("B"), Some("B1"), None)], &mut ledger);
        assert_eq!(valid.len(), 1);

        let derived = resolver.apply(vec![record("2", None, Some("B"), Some("B1"), None)], &mut ledger);
        let precincts: Vec<_> = derived.iter().map(|r| r.precinct.as_deref().unwrap()).collect();
        assert_eq!(precincts, vec!["N", "S"]);
    }

    #[test]
    fn test_precinct_missing_from_area_table_is_unrecoverable() {
        // S is a valid hierarchy precinct but has no micro-communities
        let tables = ReferenceTables::from_rows(
            vec![
                HierarchyRow { precinct: "S".into(), sector: "R".into(), beat: "R1".into() },
                HierarchyRow { precinct: "N".into(), sector: "B".into(), beat: "B1".into() },
            ],
            vec![
                AreaRow { precinct: "N".into(), mcpp: "X".into() },
                AreaRow { precinct: "SW".into(), mcpp: "ALKI".into() },
            ],
        )
        .unwrap();
        let resolver = HierarchyResolver::new(Arc::new(tables));
        let mut ledger = ledger();
        let out = resolver.apply(
            vec![
                record("1", Some("S"), Some("R"), Some("R1"), None),
                record("2", Some("S"), None, None, Some("ALKI")),
            ],
            &mut ledger,
        );

        assert_eq!(out[0].precinct, None);
        assert_eq!(out[0].sector.as_deref(), Some("R"));
        let precinct = ledger.get(Column::Precinct, "1").unwrap();
        assert_eq!(precinct.reason, ReasonCode::UnrecoverableAreaCode);
        assert_eq!(precinct.reason.id(), 9);
        assert_eq!(precinct.original_value, "S");

        assert_eq!(out[1].precinct.as_deref(), Some("SW"));
        assert!(ledger.get(Column::Precinct, "2").is_none());
        assert_eq!(ledger.len(), 1);
    }
}
