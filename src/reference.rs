use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

use crate::error::{CleanerError, Result};
use crate::types::Location;

/// One row of the precinct/sector/beat hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HierarchyRow {
    pub precinct: String,
    pub sector: String,
    pub beat: String,
}

/// One row of the precinct/micro-community pairing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AreaRow {
    pub precinct: String,
    #[serde(alias = "micro_area")]
    pub mcpp: String,
}

/// Which reference table a lookup is answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Table {
    Hierarchy,
    AreaPairing,
}

/// Read-only lookup sets loaded once per run. Share across runs with `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    hierarchy: Vec<HierarchyRow>,
    areas: Vec<AreaRow>,
    // (table, column) -> valid values
    valid: BTreeMap<(Table, &'static str), BTreeSet<String>>,
    // (table, low column, high column, low value) -> high values
    parents: BTreeMap<(Table, &'static str, &'static str, String), BTreeSet<String>>,
}

fn column_key(level: Location) -> &'static str {
    match level {
        Location::Precinct => "precinct",
        Location::Sector => "sector",
        Location::Beat => "beat",
        Location::MicroArea => "mcpp",
    }
}

impl ReferenceTables {
    /// Load both tables from CSV files with headers `precinct,sector,beat`
    /// and `precinct,mcpp`.
    pub fn load(hierarchy_csv: &Path, area_csv: &Path) -> Result<Self> {
        let hierarchy: Vec<HierarchyRow> = read_table(hierarchy_csv, "location codes")?;
        let areas: Vec<AreaRow> = read_table(area_csv, "area pairings")?;
        let tables = Self::from_rows(hierarchy, areas)?;
        info!(
            hierarchy_rows = tables.hierarchy.len(),
            area_rows = tables.areas.len(),
            "Loaded reference tables"
        );
        Ok(tables)
    }

    /// Build the lookup sets from in-memory rows. Values are trimmed and upper-cased
    /// to match what the field normalizer produces.
    pub fn from_rows(hierarchy: Vec<HierarchyRow>, areas: Vec<AreaRow>) -> Result<Self> {
        if hierarchy.is_empty() {
            return Err(CleanerError::ReferenceTable {
                table: "location codes".to_string(),
                message: "no rows".to_string(),
            });
        }
        if areas.is_empty() {
            return Err(CleanerError::ReferenceTable {
                table: "area pairings".to_string(),
                message: "no rows".to_string(),
            });
        }

        let hierarchy: Vec<HierarchyRow> = hierarchy
            .into_iter()
            .map(|r| HierarchyRow {
                precinct: canonical(&r.precinct),
                sector: canonical(&r.sector),
                beat: canonical(&r.beat),
            })
            .collect();
        let areas: Vec<AreaRow> = areas
            .into_iter()
            .map(|r| AreaRow { precinct: canonical(&r.precinct), mcpp: canonical(&r.mcpp) })
            .collect();

        let mut tables = ReferenceTables { hierarchy, areas, ..Default::default() };

        for row in tables.hierarchy.clone() {
            tables.add(Table::Hierarchy, "precinct", &row.precinct);
            tables.add(Table::Hierarchy, "sector", &row.sector);
            tables.add(Table::Hierarchy, "beat", &row.beat);
            tables.link(Table::Hierarchy, "beat", "sector", &row.beat, &row.sector);
            tables.link(Table::Hierarchy, "sector", "precinct", &row.sector, &row.precinct);
        }
        for row in tables.areas.clone() {
            tables.add(Table::AreaPairing, "precinct", &row.precinct);
            tables.add(Table::AreaPairing, "mcpp", &row.mcpp);
            tables.link(Table::AreaPairing, "mcpp", "precinct", &row.mcpp, &row.precinct);
        }

        Ok(tables)
    }

    fn add(&mut self, table: Table, column: &'static str, value: &str) {
        if value.is_empty() {
            return;
        }
        self.valid.entry((table, column)).or_default().insert(value.to_string());
    }

    fn link(&mut self, table: Table, low: &'static str, high: &'static str, low_value: &str, high_value: &str) {
        if low_value.is_empty() || high_value.is_empty() {
            return;
        }
        self.parents
            .entry((table, low, high, low_value.to_string()))
            .or_default()
            .insert(high_value.to_string());
    }

    /// Is `value` a member of `level`'s column in `table`?
    pub fn is_valid(&self, table: Table, level: Location, value: &str) -> bool {
        self.valid
            .get(&(table, column_key(level)))
            .map_or(false, |set| set.contains(value))
    }

    /// Distinct `high` values paired with `low_value` in `table`, sorted.
    /// Well-formed tables yield at most one.
    pub fn parents_of(&self, table: Table, low: Location, high: Location, low_value: &str) -> Vec<&str> {
        self.parents
            .get(&(table, column_key(low), column_key(high), low_value.to_string()))
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_valid_beat(&self, beat: &str) -> bool {
        self.is_valid(Table::Hierarchy, Location::Beat, beat)
    }

    pub fn is_valid_area(&self, area: &str) -> bool {
        self.is_valid(Table::AreaPairing, Location::MicroArea, area)
    }

    /// The precinct is known to the area pairing table
    pub fn is_area_precinct(&self, precinct: &str) -> bool {
        self.is_valid(Table::AreaPairing, Location::Precinct, precinct)
    }

    /// Every valid micro-community, sorted
    pub fn area_vocabulary(&self) -> Vec<&str> {
        self.valid
            .get(&(Table::AreaPairing, "mcpp"))
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Micro-communities paired with `precinct`, sorted and de-duplicated
    pub fn areas_in_precinct(&self, precinct: &str) -> Vec<&str> {
        let set: BTreeSet<&str> = self
            .areas
            .iter()
            .filter(|r| r.precinct == precinct)
            .map(|r| r.mcpp.as_str())
            .collect();
        set.into_iter().collect()
    }
}

fn canonical(value: &str) -> String {
    value.trim().to_uppercase()
}

fn read_table<T>(path: &Path, table: &str) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut rows = Vec::new();
    for (i, result) in rdr.deserialize::<T>().enumerate() {
        let row = result.map_err(|e| CleanerError::ReferenceTable {
            table: table.to_string(),
            message: format!("row {}: {}", i + 1, e),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_tables() -> ReferenceTables {
        let hierarchy = vec![
            ("N", "B", "B1"),
            ("N", "B", "B2"),
            ("N", "L", "L1"),
            ("SW", "F", "F1"),
            ("SW", "W", "W1"),
            ("E", "C", "C1"),
        ]
        .into_iter()
        .map(|(p, s, b)| HierarchyRow { precinct: p.into(), sector: s.into(), beat: b.into() })
        .collect();
        let areas = vec![
            ("SW", "ALKI"),
            ("SW", "HIGH POINT"),
            ("N", "BALLARD NORTH"),
            ("N", "BALLARD SOUTH"),
            ("E", "CAPITOL HILL"),
            ("W", "DOWNTOWN COMMERCIAL"),
        ]
        .into_iter()
        .map(|(p, m)| AreaRow { precinct: p.into(), mcpp: m.into() })
        .collect();
        ReferenceTables::from_rows(hierarchy, areas).unwrap()
    }

    #[test]
    fn test_lookups() {
        let tables = sample_tables();
        assert!(tables.is_valid_beat("B1"));
        assert!(!tables.is_valid_beat("Z9"));
        assert_eq!(tables.parents_of(Table::Hierarchy, Location::Beat, Location::Sector, "F1"), vec!["F"]);
        assert_eq!(tables.parents_of(Table::Hierarchy, Location::Sector, Location::Precinct, "B"), vec!["N"]);
        assert_eq!(tables.parents_of(Table::AreaPairing, Location::MicroArea, Location::Precinct, "ALKI"), vec!["SW"]);
        assert!(tables.parents_of(Table::Hierarchy, Location::Beat, Location::Sector, "Z9").is_empty());
        assert_eq!(tables.areas_in_precinct("N"), vec!["BALLARD NORTH", "BALLARD SOUTH"]);
        assert!(tables.is_area_precinct("W"));
        assert!(!tables.is_valid(Table::Hierarchy, Location::Precinct, "W"));
    }

    #[test]
    fn test_rows_are_canonicalized() {
        let tables = ReferenceTables::from_rows(
            vec![HierarchyRow { precinct: " n ".into(), sector: "b".into(), beat: "b1 ".into() }],
            vec![AreaRow { precinct: "n".into(), mcpp: " ballard north".into() }],
        )
        .unwrap();
        assert!(tables.is_valid_beat("B1"));
        assert!(tables.is_valid_area("BALLARD NORTH"));
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let err = ReferenceTables::from_rows(Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, CleanerError::ReferenceTable { .. }));
    }

    #[test]
    fn test_load_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let loc = dir.path().join("loc_codes.csv");
        let mcpp = dir.path().join("mcpp.csv");
        std::fs::write(&loc, "precinct,sector,beat\nN,B,B1\nN,B,B2\n").unwrap();
        std::fs::write(&mcpp, "precinct,mcpp\nN,BALLARD NORTH\n").unwrap();
        let tables = ReferenceTables::load(&loc, &mcpp).unwrap();
        assert!(tables.is_valid_beat("B2"));
        assert!(tables.is_valid(Table::Hierarchy, Location::Sector, "B"));
        assert_eq!(tables.area_vocabulary(), vec!["BALLARD NORTH"]);
    }
}
