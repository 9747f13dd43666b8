use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::audit::{AuditLedger, ReasonCode};
use crate::config::{FuzzyConfig, FuzzyMode};
use crate::reference::ReferenceTables;
use crate::types::{Column, Record};

const TOKEN_SCALE: f64 = 0.95;

/// Case-fold and reduce to alphanumeric tokens separated by single spaces
fn process(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_uppercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    (strsim::normalized_levenshtein(a, b) * 100.0).round()
}

/// Best ratio of the shorter string against every same-length window of the longer
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() { (a, b) } else { (b, a) };
    let short_len = short.chars().count();
    if short_len == 0 {
        return 0.0;
    }
    let long_chars: Vec<char> = long.chars().collect();
    let mut best = 0.0f64;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(ratio(short, &window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn token_sort(value: &str) -> String {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Compare the shared tokens against each side's shared-plus-remaining tokens
fn token_set(a: &str, b: &str, scorer: fn(&str, &str) -> f64) -> f64 {
    let left: BTreeSet<&str> = a.split_whitespace().collect();
    let right: BTreeSet<&str> = b.split_whitespace().collect();
    let join = |tokens: Vec<&str>| tokens.join(" ");

    let shared = join(left.intersection(&right).copied().collect());
    let only_left = join(left.difference(&right).copied().collect());
    let only_right = join(right.difference(&left).copied().collect());
    let combined_left = format!("{} {}", shared, only_left).trim().to_string();
    let combined_right = format!("{} {}", shared, only_right).trim().to_string();

    scorer(&shared, &combined_left)
        .max(scorer(&shared, &combined_right))
        .max(scorer(&combined_left, &combined_right))
}

/// Similarity of two strings on a 0-100 scale, weighted like fuzzywuzzy's WRatio.
///
/// Strings of similar length take the best of the plain ratio and the
/// token-sorted and token-set ratios (the token scores discounted to 95%).
/// When one string is at least 1.5 times longer, partial (substring) variants
/// are used instead, scaled by 0.9, or by 0.6 past a length ratio of 8.
pub fn similarity(a: &str, b: &str) -> u8 {
    let (a, b) = (process(a), process(b));
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (len_a, len_b) = (a.chars().count() as f64, b.chars().count() as f64);
    let length_ratio = len_a.max(len_b) / len_a.min(len_b);

    let base = ratio(&a, &b);
    let score = if length_ratio < 1.5 {
        let sorted = ratio(&token_sort(&a), &token_sort(&b)) * TOKEN_SCALE;
        let set = token_set(&a, &b, ratio) * TOKEN_SCALE;
        base.max(sorted).max(set)
    } else {
        let partial_scale = if length_ratio <= 8.0 { 0.9 } else { 0.6 };
        let partial = partial_ratio(&a, &b) * partial_scale;
        let sorted = partial_ratio(&token_sort(&a), &token_sort(&b)) * TOKEN_SCALE * partial_scale;
        let set = token_set(&a, &b, partial_ratio) * TOKEN_SCALE * partial_scale;
        base.max(partial).max(sorted).max(set)
    };
    score.round().clamp(0.0, 100.0) as u8
}

/// Best-scoring candidate; ties go to the earliest candidate.
pub fn best_match<'a>(query: &str, candidates: &[&'a str]) -> Option<(&'a str, u8)> {
    let mut best: Option<(&'a str, u8)> = None;
    for candidate in candidates {
        let score = similarity(query, candidate);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best
}

/// Repairs misspelled micro-community names against the area vocabulary
pub struct FuzzyMatcher {
    tables: Arc<ReferenceTables>,
    config: FuzzyConfig,
}

/// What the matcher decided for one value
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Corrected { from: String, to: String, score: u8 },
    Rejected { reason: ReasonCode, best_score: u8 },
}

impl FuzzyMatcher {
    pub fn new(tables: Arc<ReferenceTables>, config: FuzzyConfig) -> Self {
        Self { tables, config }
    }

    /// Decide a single invalid value for a record in `precinct`
    pub fn resolve(&self, value: &str, precinct: Option<&str>) -> MatchOutcome {
        let narrowed = match (self.config.mode, precinct) {
            (FuzzyMode::Precinct, Some(p)) if self.tables.is_area_precinct(p) => Some(p),
            _ => None,
        };

        let (candidates, threshold, reason) = match (self.config.mode, narrowed) {
            (FuzzyMode::Global, _) => (
                self.tables.area_vocabulary(),
                self.config.base_threshold,
                ReasonCode::LowConfidenceFuzzyMatch,
            ),
            (FuzzyMode::Precinct, Some(p)) => (
                self.tables.areas_in_precinct(p),
                self.config.narrowed_threshold,
                ReasonCode::LowConfidenceFuzzyMatch,
            ),
            (FuzzyMode::Precinct, None) => (
                self.tables.area_vocabulary(),
                self.config.base_threshold,
                ReasonCode::LowConfidenceFuzzyMatchNoPrecinct,
            ),
        };

        match best_match(value, &candidates) {
            Some((to, score)) if score >= threshold => {
                MatchOutcome::Corrected { from: value.to_string(), to: to.to_string(), score }
            }
            other => MatchOutcome::Rejected { reason, best_score: other.map_or(0, |(_, s)| s) },
        }
    }

    /// Correct or null every non-null micro-community that is not in the vocabulary
    #[instrument(skip(self, records, ledger), fields(records = records.len(), mode = ?self.config.mode))]
    pub fn apply(&self, records: &mut [Record], ledger: &mut AuditLedger) {
        let mut corrected = 0usize;
        let mut rejected = 0usize;
        for record in records.iter_mut() {
            let Some(area) = record.micro_area.as_deref() else { continue };
            if self.tables.is_valid_area(area) {
                continue;
            }
            match self.resolve(area, record.precinct.as_deref()) {
                MatchOutcome::Corrected { from, to, score } => {
                    debug!(%from, %to, score, "Corrected micro-community");
                    record.micro_area = Some(to);
                    corrected += 1;
                }
                MatchOutcome::Rejected { reason, best_score } => {
                    debug!(area, best_score, "Micro-community match below threshold");
                    if let Some(original) = record.micro_area.take() {
                        ledger.try_insert(Column::MicroArea, record.audit_id(), reason, original);
                    }
                    rejected += 1;
                }
            }
        }
        info!(corrected, rejected, "Matched micro-community names");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::tests::sample_tables;
    use chrono::NaiveDate;

    fn ledger() -> AuditLedger {
        AuditLedger::new(NaiveDate::from_ymd_opt(2023, 4, 8).unwrap())
    }

    fn record(id: &str, area: &str, precinct: Option<&str>) -> Record {
        Record {
            offense_id: Some(id.into()),
            micro_area: Some(area.into()),
            precinct: precinct.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_similarity_scores() {
        assert_eq!(similarity("ALKI", "ALKI"), 100);
        assert_eq!(similarity("ALKY", "ALKI"), 75);
        assert!(similarity("CAPITOL HIL", "CAPITOL HILL") >= 85);
        assert!(similarity("NORTH BALLARD", "BALLARD NORTH") >= 90);
        assert!(similarity("ALKI", "DOWNTOWN COMMERCIAL") < 50);
    }

    #[test]
    fn test_truncated_names_score_through_partial_match() {
        assert_eq!(partial_ratio("DOWNTOWN", "DOWNTOWN COMMERCIAL"), 100.0);
        assert_eq!(similarity("DOWNTOWN", "DOWNTOWN COMMERCIAL"), 90);
        assert_eq!(similarity("CAPITOL HILL", "CAPITOL HILL SOUTH"), 90);
        // Past a length ratio of 8 the partial score is heavily discounted
        assert_eq!(similarity("A", "ABCDEFGHIJ"), 60);
    }

    #[test]
    fn test_token_set_ignores_extra_tokens() {
        assert_eq!(token_set("BALLARD NORTH", "NORTH BALLARD", ratio), 100.0);
        assert_eq!(token_set("ALKI", "HIGH POINT", ratio), 0.0);
    }

    #[test]
    fn test_truncated_area_is_corrected_not_audited() {
        let matcher = FuzzyMatcher::new(Arc::new(sample_tables()), FuzzyConfig::default());
        let mut ledger = ledger();
        let mut records = vec![record("1", "DOWNTOWN", None)];
        matcher.apply(&mut records, &mut ledger);
        assert_eq!(records[0].micro_area.as_deref(), Some("DOWNTOWN COMMERCIAL"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_global_mode_corrects_close_matches() {
        let matcher = FuzzyMatcher::new(Arc::new(sample_tables()), FuzzyConfig::default());
        let mut ledger = ledger();
        let mut records = vec![
            record("1", "CAPITOL HIL", None),
            record("2", "ALKY", None),
            record("3", "ALKI", None),
        ];
        matcher.apply(&mut records, &mut ledger);

        assert_eq!(records[0].micro_area.as_deref(), Some("CAPITOL HILL"));
        assert_eq!(records[1].micro_area, None);
        assert_eq!(records[2].micro_area.as_deref(), Some("ALKI"));

        let entry = ledger.get(Column::MicroArea, "2").unwrap();
        assert_eq!(entry.reason, ReasonCode::LowConfidenceFuzzyMatch);
        assert_eq!(entry.original_value, "ALKY");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_precinct_mode_narrows_vocabulary() {
        let config = FuzzyConfig { mode: FuzzyMode::Precinct, ..FuzzyConfig::default() };
        let matcher = FuzzyMatcher::new(Arc::new(sample_tables()), config);

        // Inside N the only candidates are the two Ballard areas
        match matcher.resolve("BALLARD NORT", Some("N")) {
            MatchOutcome::Corrected { to, .. } => assert_eq!(to, "BALLARD NORTH"),
            other => panic!("unexpected {:?}", other),
        }
        // Capitol Hill is not in N, so nothing clears the narrowed threshold
        assert!(matches!(
            matcher.resolve("CAPITOL HIL", Some("N")),
            MatchOutcome::Rejected { reason: ReasonCode::LowConfidenceFuzzyMatch, .. }
        ));
        // No usable precinct: full vocabulary, own reason code on failure
        assert!(matches!(
            matcher.resolve("CAPITOL HIL", Some("ZZ")),
            MatchOutcome::Corrected { .. }
        ));
        assert!(matches!(
            matcher.resolve("ALKY", None),
            MatchOutcome::Rejected { reason: ReasonCode::LowConfidenceFuzzyMatchNoPrecinct, .. }
        ));
    }
}
