use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants;

/// Every column of the crime schema, in storage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    ReportNumber,
    OffenseId,
    OffenseStart,
    OffenseEnd,
    ReportDatetime,
    Group,
    CrimeCategory,
    OffenseParentGroup,
    Offense,
    OffenseCode,
    Precinct,
    Sector,
    Beat,
    MicroArea,
    Address,
    Longitude,
    Latitude,
}

impl Column {
    pub const ALL: [Column; 17] = [
        Column::ReportNumber,
        Column::OffenseId,
        Column::OffenseStart,
        Column::OffenseEnd,
        Column::ReportDatetime,
        Column::Group,
        Column::CrimeCategory,
        Column::OffenseParentGroup,
        Column::Offense,
        Column::OffenseCode,
        Column::Precinct,
        Column::Sector,
        Column::Beat,
        Column::MicroArea,
        Column::Address,
        Column::Longitude,
        Column::Latitude,
    ];

    /// Name used by the feed, the storage schema and the audit ledger
    pub fn name(self) -> &'static str {
        match self {
            Column::ReportNumber => constants::REPORT_NUMBER,
            Column::OffenseId => constants::OFFENSE_ID,
            Column::OffenseStart => constants::OFFENSE_START,
            Column::OffenseEnd => constants::OFFENSE_END,
            Column::ReportDatetime => constants::REPORT_DATETIME,
            Column::Group => constants::GROUP,
            Column::CrimeCategory => constants::CRIME_CATEGORY,
            Column::OffenseParentGroup => constants::OFFENSE_PARENT_GROUP,
            Column::Offense => constants::OFFENSE,
            Column::OffenseCode => constants::OFFENSE_CODE,
            Column::Precinct => constants::PRECINCT,
            Column::Sector => constants::SECTOR,
            Column::Beat => constants::BEAT,
            Column::MicroArea => constants::MICRO_AREA,
            Column::Address => constants::ADDRESS,
            Column::Longitude => constants::LONGITUDE,
            Column::Latitude => constants::LATITUDE,
        }
    }

    /// Map a feed header onto a column. Accepts the API's snake_case keys
    /// as well as the CSV download's "Title Case" headers.
    pub fn from_header(header: &str) -> Option<Column> {
        let key = header.trim().to_lowercase().replace([' ', '-'], "_");
        let key = key.trim_start_matches('_');
        let column = match key {
            "report_number" => Column::ReportNumber,
            "offense_id" => Column::OffenseId,
            "offense_start_datetime" => Column::OffenseStart,
            "offense_end_datetime" => Column::OffenseEnd,
            "report_datetime" => Column::ReportDatetime,
            "group_a_b" => Column::Group,
            "crime_against_category" => Column::CrimeCategory,
            "offense_parent_group" => Column::OffenseParentGroup,
            "offense" => Column::Offense,
            "offense_code" => Column::OffenseCode,
            "precinct" => Column::Precinct,
            "sector" => Column::Sector,
            "beat" => Column::Beat,
            "mcpp" => Column::MicroArea,
            "100_block_address" => Column::Address,
            "longitude" => Column::Longitude,
            "latitude" => Column::Latitude,
            _ => return None,
        };
        Some(column)
    }
}

/// One incident exactly as received from the feed: every field is text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Position in the input; identifies the row when `offense_id` is missing
    #[serde(skip)]
    pub row: usize,
    #[serde(default, deserialize_with = "lenient_text")]
    pub report_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub offense_id: Option<String>,
    #[serde(default, rename = "offense_start_datetime", deserialize_with = "lenient_text")]
    pub offense_start: Option<String>,
    #[serde(default, rename = "offense_end_datetime", deserialize_with = "lenient_text")]
    pub offense_end: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub report_datetime: Option<String>,
    #[serde(default, rename = "group_a_b", deserialize_with = "lenient_text")]
    pub group: Option<String>,
    #[serde(default, rename = "crime_against_category", deserialize_with = "lenient_text")]
    pub crime_category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub offense_parent_group: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub offense: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub offense_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub precinct: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub sector: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub beat: Option<String>,
    #[serde(default, rename = "mcpp", deserialize_with = "lenient_text")]
    pub micro_area: Option<String>,
    #[serde(
        default,
        rename = "_100_block_address",
        alias = "100_block_address",
        deserialize_with = "lenient_text"
    )]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub longitude: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub latitude: Option<String>,
}

impl RawRecord {
    /// Build a record from (header, value) pairs; unknown headers are ignored.
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut record = RawRecord::default();
        for (header, value) in fields {
            if let Some(column) = Column::from_header(header) {
                *record.field_mut(column) = Some(value.to_string());
            }
        }
        record
    }

    pub fn field(&self, column: Column) -> Option<&str> {
        match column {
            Column::ReportNumber => self.report_number.as_deref(),
            Column::OffenseId => self.offense_id.as_deref(),
            Column::OffenseStart => self.offense_start.as_deref(),
            Column::OffenseEnd => self.offense_end.as_deref(),
            Column::ReportDatetime => self.report_datetime.as_deref(),
            Column::Group => self.group.as_deref(),
            Column::CrimeCategory => self.crime_category.as_deref(),
            Column::OffenseParentGroup => self.offense_parent_group.as_deref(),
            Column::Offense => self.offense.as_deref(),
            Column::OffenseCode => self.offense_code.as_deref(),
            Column::Precinct => self.precinct.as_deref(),
            Column::Sector => self.sector.as_deref(),
            Column::Beat => self.beat.as_deref(),
            Column::MicroArea => self.micro_area.as_deref(),
            Column::Address => self.address.as_deref(),
            Column::Longitude => self.longitude.as_deref(),
            Column::Latitude => self.latitude.as_deref(),
        }
    }

    pub fn field_mut(&mut self, column: Column) -> &mut Option<String> {
        match column {
            Column::ReportNumber => &mut self.report_number,
            Column::OffenseId => &mut self.offense_id,
            Column::OffenseStart => &mut self.offense_start,
            Column::OffenseEnd => &mut self.offense_end,
            Column::ReportDatetime => &mut self.report_datetime,
            Column::Group => &mut self.group,
            Column::CrimeCategory => &mut self.crime_category,
            Column::OffenseParentGroup => &mut self.offense_parent_group,
            Column::Offense => &mut self.offense,
            Column::OffenseCode => &mut self.offense_code,
            Column::Precinct => &mut self.precinct,
            Column::Sector => &mut self.sector,
            Column::Beat => &mut self.beat,
            Column::MicroArea => &mut self.micro_area,
            Column::Address => &mut self.address,
            Column::Longitude => &mut self.longitude,
            Column::Latitude => &mut self.latitude,
        }
    }

    /// Key this record is audited under
    pub fn audit_id(&self) -> String {
        audit_id(self.offense_id.as_deref(), self.row)
    }
}

/// The four location codes that take part in the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Precinct,
    Sector,
    Beat,
    MicroArea,
}

impl Location {
    pub fn column(self) -> Column {
        match self {
            Location::Precinct => Column::Precinct,
            Location::Sector => Column::Sector,
            Location::Beat => Column::Beat,
            Location::MicroArea => Column::MicroArea,
        }
    }
}

/// One incident after type coercion. Datetime and coordinate fields are typed;
/// `None` is the single "no value" marker from here on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub row: usize,
    pub report_number: Option<String>,
    pub offense_id: Option<String>,
    pub offense_start: Option<NaiveDateTime>,
    pub offense_end: Option<NaiveDateTime>,
    pub report_datetime: Option<NaiveDateTime>,
    pub group: Option<String>,
    pub crime_category: Option<String>,
    pub offense_parent_group: Option<String>,
    pub offense: Option<String>,
    pub offense_code: Option<String>,
    pub precinct: Option<String>,
    pub sector: Option<String>,
    pub beat: Option<String>,
    pub micro_area: Option<String>,
    pub address: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

impl Record {
    pub fn audit_id(&self) -> String {
        audit_id(self.offense_id.as_deref(), self.row)
    }

    pub fn location(&self, level: Location) -> Option<&str> {
        match level {
            Location::Precinct => self.precinct.as_deref(),
            Location::Sector => self.sector.as_deref(),
            Location::Beat => self.beat.as_deref(),
            Location::MicroArea => self.micro_area.as_deref(),
        }
    }

    pub fn location_mut(&mut self, level: Location) -> &mut Option<String> {
        match level {
            Location::Precinct => &mut self.precinct,
            Location::Sector => &mut self.sector,
            Location::Beat => &mut self.beat,
            Location::MicroArea => &mut self.micro_area,
        }
    }
}

/// Records without an offense id fall back to their input position so two
/// such rows never share a ledger key.
fn audit_id(offense_id: Option<&str>, row: usize) -> String {
    match offense_id {
        Some(id) => id.to_string(),
        None => format!("row:{}", row),
    }
}

/// Accept strings, numbers or null for a text field; the feed is not
/// consistent about quoting numeric columns.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
