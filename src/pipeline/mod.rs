//! Cleaning pipeline: the fixed sequence of repair and validation stages.
//!
//! One record set and one audit ledger are threaded through every stage in
//! order. Stages never fail; whatever they cannot repair is nulled and
//! ledgered, so a run always completes.

pub mod output;
pub mod processing;

use chrono::{Local, NaiveDate};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::audit::{AuditLedger, StageTiming};
use crate::config::FuzzyConfig;
use crate::reference::ReferenceTables;
use crate::types::RawRecord;

use output::OutputRecord;
use processing::fuzzy::FuzzyMatcher;
use processing::hierarchy::HierarchyResolver;
use processing::{address, coercion, fields, geo, non_crime, report_number, temporal};

/// Everything one run produces
#[derive(Debug)]
pub struct CleaningOutcome {
    pub run_id: Uuid,
    pub records: Vec<OutputRecord>,
    pub ledger: AuditLedger,
    pub timings: Vec<StageTiming>,
}

pub struct CleaningPipeline {
    tables: Arc<ReferenceTables>,
    fuzzy: FuzzyConfig,
}

/// Collects per-stage runtimes for the run
struct StageClock {
    batch: NaiveDate,
    timings: Vec<StageTiming>,
}

impl StageClock {
    fn time<T>(&mut self, stage: &'static str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        let runtime_secs = started.elapsed().as_secs_f64();
        histogram!("spd_cleaner_stage_duration_seconds", "stage" => stage).record(runtime_secs);
        self.timings.push(StageTiming { stage: stage.to_string(), batch: self.batch, runtime_secs });
        out
    }
}

impl CleaningPipeline {
    pub fn new(tables: Arc<ReferenceTables>, fuzzy: FuzzyConfig) -> Self {
        Self { tables, fuzzy }
    }

    /// Clean `raw`, stamping ledger entries with today's date
    pub fn run(&self, raw: Vec<RawRecord>) -> CleaningOutcome {
        self.run_with_batch(raw, Local::now().date_naive())
    }

    #[instrument(skip(self, raw), fields(input = raw.len()))]
    pub fn run_with_batch(&self, mut raw: Vec<RawRecord>, batch: NaiveDate) -> CleaningOutcome {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting cleaning run");
        counter!("spd_cleaner_records_total", "direction" => "input").increment(raw.len() as u64);

        for (row, record) in raw.iter_mut().enumerate() {
            record.row = row;
        }

        let mut ledger = AuditLedger::new(batch);
        let mut clock = StageClock { batch, timings: Vec::new() };

        clock.time("normalize_fields", || fields::normalize_fields(&mut raw));
        clock.time("clear_non_crimes", || non_crime::clear_non_crimes(&mut raw));
        clock.time("normalize_addresses", || address::normalize_addresses(&mut raw));
        let mut records = clock.time("coerce_types", || coercion::coerce_types(raw, &mut ledger));
        clock.time("correct_offense_window", || {
            temporal::correct_offense_window(&mut records, &mut ledger)
        });
        clock.time("repair_report_numbers", || {
            report_number::repair_report_numbers(&mut records, &mut ledger)
        });
        let matcher = FuzzyMatcher::new(self.tables.clone(), self.fuzzy.clone());
        clock.time("match_micro_areas", || matcher.apply(&mut records, &mut ledger));
        let resolver = HierarchyResolver::new(self.tables.clone());
        let mut records = clock.time("resolve_hierarchy", || resolver.apply(records, &mut ledger));
        clock.time("validate_coordinates", || geo::validate_coordinates(&mut records, &mut ledger));
        let records = clock.time("split_addresses", || address::split_addresses(records));
        let records: Vec<OutputRecord> =
            clock.time("canonical_nulls", || records.into_iter().map(OutputRecord::from).collect());

        counter!("spd_cleaner_records_total", "direction" => "output").increment(records.len() as u64);
        info!(
            %run_id,
            output = records.len(),
            audited = ledger.len(),
            "Finished cleaning run"
        );

        CleaningOutcome { run_id, records, ledger, timings: clock.timings }
    }
}
