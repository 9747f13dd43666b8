//! Report-number repair.
//!
//! Valid report numbers look like `1234-567890`. Malformed values are pushed
//! through an ordered cascade of rewrite rules; every rule checks its own
//! trigger against the value as left by the rules before it. The order is
//! part of the contract: later, narrower rules clean up what earlier, broader
//! rules leave behind. Whatever still fails the canonical grammar afterwards
//! is audited, in its rewritten form, and nulled.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::audit::{AuditLedger, ReasonCode};
use crate::types::{Column, Record};

static CANONICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{6}$").unwrap());
static LETTER_O: Lazy<Regex> = Lazy::new(|| Regex::new(r"[Oo]").unwrap());
static INVALID_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d*[=_*,;/\\]\d*$").unwrap());
static DELIMITERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=_*,;/\\]").unwrap());
static NO_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10}$").unwrap());
static ZERO_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}0+\d{6}$").unwrap());
static LONG_BACK: Lazy<Regex> = Lazy::new(|| Regex::new(r"-0+\d{6,}$").unwrap());
static SHORT_FRONT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{0,3}-").unwrap());

/// Per-record facts a rewrite may draw on
pub struct RepairContext {
    /// Year of the (already coerced) report datetime
    pub report_year: Option<i32>,
}

/// One step of the cascade: when `trigger` matches, `rewrite` produces the
/// replacement. A rewrite returning `None` leaves the value as it was.
pub struct RepairRule {
    pub name: &'static str,
    pub trigger: &'static Lazy<Regex>,
    pub rewrite: fn(&str, &RepairContext) -> Option<String>,
}

/// The cascade, in priority order
pub static RULES: [RepairRule; 6] = [
    RepairRule { name: "letter_o", trigger: &LETTER_O, rewrite: replace_letter_o },
    RepairRule { name: "invalid_delimiter", trigger: &INVALID_DELIMITER, rewrite: replace_delimiter },
    RepairRule { name: "no_delimiter", trigger: &NO_DELIMITER, rewrite: split_front_back },
    RepairRule { name: "zero_delimiter", trigger: &ZERO_DELIMITER, rewrite: split_front_back },
    RepairRule { name: "long_back", trigger: &LONG_BACK, rewrite: trim_long_back },
    RepairRule { name: "short_front", trigger: &SHORT_FRONT, rewrite: year_for_short_front },
];

pub fn is_canonical(value: &str) -> bool {
    CANONICAL.is_match(value)
}

fn replace_letter_o(value: &str, _: &RepairContext) -> Option<String> {
    Some(value.replace(['O', 'o'], "0"))
}

fn replace_delimiter(value: &str, _: &RepairContext) -> Option<String> {
    let mut parts = DELIMITERS.split(value);
    let front = parts.next()?;
    let back = parts.next()?;
    Some(format!("{}-{}", front, back))
}

fn first_chars(value: &str, n: usize) -> &str {
    match value.char_indices().nth(n) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

fn last_chars(value: &str, n: usize) -> &str {
    let count = value.chars().count();
    if count <= n {
        return value;
    }
    match value.char_indices().nth(count - n) {
        Some((idx, _)) => &value[idx..],
        None => value,
    }
}

fn split_front_back(value: &str, _: &RepairContext) -> Option<String> {
    Some(format!("{}-{}", first_chars(value, 4), last_chars(value, 6)))
}

fn trim_long_back(value: &str, _: &RepairContext) -> Option<String> {
    let front = value.split('-').next()?;
    Some(format!("{}-{}", front, last_chars(value, 6)))
}

fn year_for_short_front(value: &str, ctx: &RepairContext) -> Option<String> {
    let year = ctx.report_year?;
    Some(format!("{:04}-{}", year, last_chars(value, 6)))
}

/// Run the cascade over one value. Returns the repaired value, which may
/// still be non-canonical.
pub fn repair(value: &str, ctx: &RepairContext) -> String {
    let mut current = value.to_string();
    for rule in RULES.iter() {
        if !rule.trigger.is_match(&current) {
            continue;
        }
        if let Some(rewritten) = (rule.rewrite)(&current, ctx) {
            if rewritten != current {
                debug!(rule = rule.name, from = %current, to = %rewritten, "Rewrote report number");
                current = rewritten;
            }
        }
    }
    current
}

/// Drive every report number toward `^\d{4}-\d{6}$`; audit and null the rest.
#[instrument(skip(records, ledger), fields(records = records.len()))]
pub fn repair_report_numbers(records: &mut [Record], ledger: &mut AuditLedger) {
    let needs_repair = records
        .iter()
        .any(|r| r.report_number.as_deref().map_or(false, |v| !is_canonical(v)));
    if !needs_repair {
        info!("All report numbers canonical");
        return;
    }

    let mut repaired = 0usize;
    let mut nulled = 0usize;
    for record in records.iter_mut() {
        let Some(original) = record.report_number.take() else { continue };
        if is_canonical(&original) {
            record.report_number = Some(original);
            continue;
        }

        let ctx = RepairContext { report_year: record.report_datetime.map(|dt| dt.year()) };
        let candidate = repair(&original, &ctx);
        if is_canonical(&candidate) {
            record.report_number = Some(candidate);
            repaired += 1;
        } else {
            // The ledger keeps the value as the cascade left it
            ledger.try_insert(Column::ReportNumber, record.audit_id(), ReasonCode::MalformedReportNumber, candidate);
            nulled += 1;
        }
    }
    info!(repaired, nulled, "Repaired report numbers");
}
