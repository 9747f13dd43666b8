use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::pipeline::output::AuditRow;
use crate::pipeline::CleaningOutcome;

/// SQLite home of the cleaned feed and its audit trail
pub struct CrimeStore {
    conn: Connection,
}

/// What one load wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub records: usize,
    pub audit_values: usize,
    pub stages: usize,
}

impl CrimeStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS crime (
                crime_id                INTEGER PRIMARY KEY AUTOINCREMENT,
                report_number           TEXT,
                offense_id              TEXT,
                offense_start_datetime  TEXT,
                offense_end_datetime    TEXT,
                report_datetime         TEXT,
                group_a_b               TEXT,
                crime_against_category  TEXT,
                offense_parent_group    TEXT,
                offense                 TEXT,
                offense_code            TEXT,
                precinct                TEXT,
                sector                  TEXT,
                beat                    TEXT,
                mcpp                    TEXT,
                _100_block_address      TEXT,
                longitude               REAL,
                latitude                REAL
            );
            CREATE INDEX IF NOT EXISTS crime_key ON crime (report_number, offense_id);
            CREATE TABLE IF NOT EXISTS audit_value (
                audited_col        TEXT NOT NULL,
                offense_id         TEXT NOT NULL,
                audited_val        TEXT,
                audited_reason_id  INTEGER NOT NULL,
                batch              TEXT NOT NULL,
                PRIMARY KEY (audited_col, offense_id, audited_reason_id)
            );
            CREATE TABLE IF NOT EXISTS audit_stage (
                run_id        TEXT NOT NULL,
                stage         TEXT NOT NULL,
                batch         TEXT NOT NULL,
                runtime_secs  REAL NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Drop crimes reported more than `retention_days` before `today`, along
    /// with their audit rows. Returns the number of crimes removed.
    #[instrument(skip(self))]
    pub fn purge_expired(&mut self, today: NaiveDate, retention_days: i64) -> Result<usize> {
        let cutoff = (today - Duration::days(retention_days)).format("%Y-%m-%d").to_string();
        let tx = self.conn.transaction()?;
        let audits = tx.execute(
            "DELETE FROM audit_value WHERE offense_id IN (
                 SELECT offense_id FROM crime WHERE date(report_datetime) < date(?1)
             )",
            params![cutoff],
        )?;
        let crimes = tx.execute("DELETE FROM crime WHERE date(report_datetime) < date(?1)", params![cutoff])?;
        tx.commit()?;
        info!(%cutoff, crimes, audits, "Purged expired rows");
        Ok(crimes)
    }

    /// Write one run's records, ledger and stage timings in a single transaction.
    ///
    /// A (report number, offense id) key may cover several rows, one per split
    /// address. Every key in the run replaces all rows stored under it.
    #[instrument(skip(self, outcome), fields(run_id = %outcome.run_id))]
    pub fn load(&mut self, outcome: &CleaningOutcome) -> Result<LoadSummary> {
        let tx = self.conn.transaction()?;
        let mut summary = LoadSummary::default();
        {
            let keys: BTreeSet<(Option<&str>, Option<&str>)> = outcome
                .records
                .iter()
                .map(|r| (r.report_number.as_deref(), r.offense_id.as_deref()))
                .collect();
            let mut stmt = tx.prepare("DELETE FROM crime WHERE report_number IS ?1 AND offense_id IS ?2")?;
            let mut replaced = 0usize;
            for (report_number, offense_id) in keys {
                replaced += stmt.execute(params![report_number, offense_id])?;
            }
            debug!(replaced, "Cleared rows for reloaded keys");

            let mut stmt = tx.prepare(
                "INSERT INTO crime (
                     report_number, offense_id, offense_start_datetime, offense_end_datetime,
                     report_datetime, group_a_b, crime_against_category, offense_parent_group,
                     offense, offense_code, precinct, sector, beat, mcpp, _100_block_address,
                     longitude, latitude
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )?;
            for r in &outcome.records {
                summary.records += stmt.execute(params![
                    r.report_number,
                    r.offense_id,
                    r.offense_start_datetime,
                    r.offense_end_datetime,
                    r.report_datetime,
                    r.group_a_b,
                    r.crime_against_category,
                    r.offense_parent_group,
                    r.offense,
                    r.offense_code,
                    r.precinct,
                    r.sector,
                    r.beat,
                    r.mcpp,
                    r._100_block_address,
                    r.longitude,
                    r.latitude,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO audit_value (audited_col, offense_id, audited_val, audited_reason_id, batch)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in AuditRow::from_ledger(&outcome.ledger) {
                summary.audit_values += stmt.execute(params![
                    row.audited_col,
                    row.offense_id,
                    row.audited_val,
                    row.audited_reason_id,
                    row.batch,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO audit_stage (run_id, stage, batch, runtime_secs) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let run_id = outcome.run_id.to_string();
            for timing in &outcome.timings {
                summary.stages += stmt.execute(params![
                    run_id,
                    timing.stage,
                    timing.batch.to_string(),
                    timing.runtime_secs,
                ])?;
            }
        }
        tx.commit()?;
        info!(
            records = summary.records,
            audit_values = summary.audit_values,
            stages = summary.stages,
            "Loaded cleaning run"
        );
        Ok(summary)
    }

    pub fn count(&self, table: StoreTable) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StoreTable {
    Crime,
    AuditValue,
    AuditStage,
}

impl StoreTable {
    fn name(self) -> &'static str {
        match self {
            StoreTable::Crime => "crime",
            StoreTable::AuditValue => "audit_value",
            StoreTable::AuditStage => "audit_stage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLedger, ReasonCode, StageTiming};
    use crate::pipeline::output::OutputRecord;
    use crate::types::{Column, Record};
    use chrono::NaiveDateTime;
    use uuid::Uuid;

    fn reported(date: &str) -> Option<NaiveDateTime> {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(9, 0, 0))
    }

    fn outcome(batch: NaiveDate) -> CleaningOutcome {
        let records = vec![
            Record {
                report_number: Some("2021-000001".into()),
                offense_id: Some("1".into()),
                report_datetime: reported("2021-01-01"),
                ..Default::default()
            },
            Record {
                report_number: Some("2023-000002".into()),
                offense_id: Some("2".into()),
                report_datetime: reported("2023-04-01"),
                ..Default::default()
            },
        ];
        let mut ledger = AuditLedger::new(batch);
        ledger.try_insert(Column::Beat, "1", ReasonCode::InvalidBeat, "Z9");
        ledger.try_insert(Column::Latitude, "2", ReasonCode::LatitudeOutOfRange, "50");
        CleaningOutcome {
            run_id: Uuid::new_v4(),
            records: records.into_iter().map(OutputRecord::from).collect(),
            ledger,
            timings: vec![StageTiming { stage: "normalize_fields".into(), batch, runtime_secs: 0.01 }],
        }
    }

    #[test]
    fn test_load_is_idempotent_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CrimeStore::open(dir.path().join("db").join("spd.db")).unwrap();
        let batch = NaiveDate::from_ymd_opt(2023, 4, 8).unwrap();
        let run = outcome(batch);

        let first = store.load(&run).unwrap();
        assert_eq!(first, LoadSummary { records: 2, audit_values: 2, stages: 1 });
        let second = store.load(&run).unwrap();
        assert_eq!(second.audit_values, 0);

        assert_eq!(store.count(StoreTable::Crime).unwrap(), 2);
        assert_eq!(store.count(StoreTable::AuditValue).unwrap(), 2);
        assert_eq!(store.count(StoreTable::AuditStage).unwrap(), 2);
    }

    #[test]
    fn test_split_rows_sharing_a_key_are_all_kept() {
        let mut store = CrimeStore::open_in_memory().unwrap();
        let batch = NaiveDate::from_ymd_opt(2023, 4, 8).unwrap();
        let split = |address: &str| Record {
            report_number: Some("2023-000003".into()),
            offense_id: Some("3".into()),
            report_datetime: reported("2023-04-01"),
            address: Some(address.into()),
            ..Default::default()
        };
        let run = CleaningOutcome {
            run_id: Uuid::new_v4(),
            records: vec![split("PIKE ST"), split("1ST AVE")].into_iter().map(OutputRecord::from).collect(),
            ledger: AuditLedger::new(batch),
            timings: Vec::new(),
        };

        assert_eq!(store.load(&run).unwrap().records, 2);
        assert_eq!(store.count(StoreTable::Crime).unwrap(), 2);
        // Reloading replaces the pair rather than duplicating it
        store.load(&run).unwrap();
        assert_eq!(store.count(StoreTable::Crime).unwrap(), 2);

        let addresses: Vec<String> = store
            .conn
            .prepare("SELECT _100_block_address FROM crime ORDER BY crime_id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(addresses, vec!["PIKE ST", "1ST AVE"]);
    }

    #[test]
    fn test_purge_removes_old_crimes_and_their_audits() {
        let mut store = CrimeStore::open_in_memory().unwrap();
        let today = NaiveDate::from_ymd_opt(2023, 4, 8).unwrap();
        store.load(&outcome(today)).unwrap();

        let purged = store.purge_expired(today, 366).unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.count(StoreTable::Crime).unwrap(), 1);
        assert_eq!(store.count(StoreTable::AuditValue).unwrap(), 1);
    }
}
