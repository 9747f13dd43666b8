use tracing::{info, instrument};

use crate::constants::NOT_A_CRIME;
use crate::types::RawRecord;

/// Drop records whose crime category marks them as not an offense
/// (justifiable homicide). Scope narrowing, so nothing is audited.
#[instrument(skip(records), fields(records = records.len()))]
pub fn clear_non_crimes(records: &mut Vec<RawRecord>) {
    let before = records.len();
    records.retain(|r| r.crime_category.as_deref() != Some(NOT_A_CRIME));
    info!(removed = before - records.len(), "Cleared non-crime records");
}
