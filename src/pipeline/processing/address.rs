use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{info, instrument};

use crate::types::{RawRecord, Record};

static BLOCK_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)(X+)(\s)").unwrap());
static AVENUE_ABBREVIATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\s)AV(\s)").unwrap());

/// Canonicalize block numbers and street suffixes:
/// `5XX BLOCK OF PIKE ST` becomes `500 BLOCK OF PIKE ST`, ` AV ` becomes ` AVE `.
#[instrument(skip(records), fields(records = records.len()))]
pub fn normalize_addresses(records: &mut [RawRecord]) {
    let mut changed = 0usize;
    for record in records.iter_mut() {
        if let Some(address) = record.address.as_mut() {
            let normalized = normalize_address(address);
            if normalized != *address {
                *address = normalized;
                changed += 1;
            }
        }
    }
    info!(changed, "Normalized addresses");
}

pub fn normalize_address(address: &str) -> String {
    let address = BLOCK_PLACEHOLDER.replace_all(address, |caps: &Captures| {
        format!("{}{}{}", &caps[1], "0".repeat(caps[2].len()), &caps[3])
    });
    AVENUE_ABBREVIATION.replace_all(&address, "${1}AVE${2}").into_owned()
}

/// Expand intersection addresses (`A/B`) into one record per street segment.
/// Records are emitted in input order, segments in address order.
#[instrument(skip(records), fields(records = records.len()))]
pub fn split_addresses(records: Vec<Record>) -> Vec<Record> {
    let before = records.len();
    let split: Vec<Record> = records.into_iter().flat_map(split_address).collect();
    info!(added = split.len() - before, "Split multi-street addresses");
    split
}

/// One record becomes one or two: an address without `/` (or no address at all)
/// passes through unchanged. Only the first `/` splits. Blank segments are
/// dropped rather than emitted as address-less rows, so `A /` yields a single
/// `A` row, and an address that is nothing but a slash keeps one row with no
/// address.
pub fn split_address(record: Record) -> impl Iterator<Item = Record> {
    let Some(address) = record.address.as_deref().filter(|a| a.contains('/')) else {
        return vec![record].into_iter();
    };
    let segments: Vec<String> = address
        .splitn(2, '/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let expanded: Vec<Record> = if segments.is_empty() {
        vec![Record { address: None, ..record }]
    } else {
        segments
            .into_iter()
            .map(|segment| Record { address: Some(segment), ..record.clone() })
            .collect()
    };
    expanded.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_placeholder_becomes_zeros() {
        assert_eq!(normalize_address("5XX BLOCK OF PIKE ST"), "500 BLOCK OF PIKE ST");
        assert_eq!(normalize_address("12XXX BLOCK OF XENIA AV N"), "12000 BLOCK OF XENIA AVE N");
        assert_eq!(normalize_address("DAVIS AVE"), "DAVIS AVE");
    }

    #[test]
    fn test_split_duplicates_other_fields() {
        let record = Record {
            offense_id: Some("7".into()),
            beat: Some("B1".into()),
            longitude: Some(-122.3),
            address: Some("100 BLOCK OF 5TH AVE / 6TH AVE".into()),
            ..Default::default()
        };
        let rows: Vec<Record> = split_address(record.clone()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].address.as_deref(), Some("100 BLOCK OF 5TH AVE"));
        assert_eq!(rows[1].address.as_deref(), Some("6TH AVE"));
        for row in &rows {
            assert_eq!(Record { address: None, ..row.clone() }, Record { address: None, ..record.clone() });
        }
    }

    #[test]
    fn test_records_without_slash_pass_through() {
        let records = vec![
            Record { offense_id: Some("1".into()), address: None, ..Default::default() },
            Record { offense_id: Some("2".into()), address: Some("1500 BLOCK OF 3RD AVE".into()), ..Default::default() },
        ];
        let out = split_addresses(records.clone());
        assert_eq!(out, records);
    }

    #[test]
    fn test_blank_segments_are_dropped() {
        let with = |address: &str| Record { offense_id: Some("8".into()), address: Some(address.into()), ..Default::default() };

        let rows: Vec<Record> = split_address(with("PIKE ST /")).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address.as_deref(), Some("PIKE ST"));

        let rows: Vec<Record> = split_address(with(" / 1ST AVE")).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address.as_deref(), Some("1ST AVE"));

        let rows: Vec<Record> = split_address(with("/")).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, None);
        assert_eq!(rows[0].offense_id.as_deref(), Some("8"));
    }
}
