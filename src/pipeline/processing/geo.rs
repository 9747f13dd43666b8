use tracing::{info, instrument};

use crate::audit::{AuditLedger, ReasonCode};
use crate::constants::{LATITUDE_RANGE, LONGITUDE_RANGE};
use crate::types::{Column, Record};

fn within((min, max): (f64, f64), value: f64) -> bool {
    value >= min && value <= max
}

/// Null coordinates outside Washington State's bounding box. Each axis is
/// checked on its own, so a record can keep one coordinate and lose the other.
#[instrument(skip(records, ledger), fields(records = records.len()))]
pub fn validate_coordinates(records: &mut [Record], ledger: &mut AuditLedger) {
    let mut nulled = 0usize;
    for record in records.iter_mut() {
        let id = record.audit_id();
        if let Some(lon) = record.longitude.filter(|v| !within(LONGITUDE_RANGE, *v)) {
            ledger.try_insert(Column::Longitude, id.as_str(), ReasonCode::LongitudeOutOfRange, lon.to_string());
            record.longitude = None;
            nulled += 1;
        }
        if let Some(lat) = record.latitude.filter(|v| !within(LATITUDE_RANGE, *v)) {
            ledger.try_insert(Column::Latitude, id.as_str(), ReasonCode::LatitudeOutOfRange, lat.to_string());
            record.latitude = None;
            nulled += 1;
        }
    }
    info!(nulled, "Validated coordinates");
}
