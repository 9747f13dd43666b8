use chrono::NaiveDateTime;
use tracing::{info, instrument};

use crate::audit::{AuditLedger, ReasonCode};
use crate::types::{Column, Record};

pub(crate) fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Null both ends of an offense window that starts after it ends.
#[instrument(skip(records, ledger), fields(records = records.len()))]
pub fn correct_offense_window(records: &mut [Record], ledger: &mut AuditLedger) {
    let mut inverted = 0usize;
    for record in records.iter_mut() {
        let (Some(start), Some(end)) = (record.offense_start, record.offense_end) else {
            continue;
        };
        if start <= end {
            continue;
        }
        let id = record.audit_id();
        ledger.try_insert(Column::OffenseStart, id.as_str(), ReasonCode::StartAfterEnd, format_datetime(&start));
        ledger.try_insert(Column::OffenseEnd, id, ReasonCode::StartAfterEnd, format_datetime(&end));
        record.offense_start = None;
        record.offense_end = None;
        inverted += 1;
    }
    info!(inverted, "Corrected inverted offense windows");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2023, 1, day).unwrap().and_hms_opt(12, 0, 0)
    }

    #[test]
    fn test_inverted_window_is_nulled_and_audited() {
        let mut ledger = AuditLedger::new(NaiveDate::from_ymd_opt(2023, 4, 8).unwrap());
        let mut records = vec![
            Record { offense_id: Some("1".into()), offense_start: at(5), offense_end: at(2), ..Default::default() },
            Record { offense_id: Some("2".into()), offense_start: at(1), offense_end: at(2), ..Default::default() },
            Record { offense_id: Some("3".into()), offense_start: at(9), offense_end: None, ..Default::default() },
        ];
        correct_offense_window(&mut records, &mut ledger);

        assert_eq!((records[0].offense_start, records[0].offense_end), (None, None));
        assert_eq!(records[1].offense_start, at(1));
        assert_eq!(records[2].offense_start, at(9));
        assert_eq!(ledger.len(), 2);
        let start = ledger.get(Column::OffenseStart, "1").unwrap();
        assert_eq!(start.reason, ReasonCode::StartAfterEnd);
        assert_eq!(start.original_value, "2023-01-05 12:00:00");
        assert_eq!(ledger.get(Column::OffenseEnd, "1").unwrap().original_value, "2023-01-02 12:00:00");
    }
}
