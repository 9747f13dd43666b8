/// Column names used in the audit ledger and the storage schema.
/// These follow the feed's own naming so ledger rows line up with the loaded table.
pub const REPORT_NUMBER: &str = "report_number";
pub const OFFENSE_ID: &str = "offense_id";
pub const OFFENSE_START: &str = "offense_start_datetime";
pub const OFFENSE_END: &str = "offense_end_datetime";
pub const REPORT_DATETIME: &str = "report_datetime";
pub const GROUP: &str = "group_a_b";
pub const CRIME_CATEGORY: &str = "crime_against_category";
pub const OFFENSE_PARENT_GROUP: &str = "offense_parent_group";
pub const OFFENSE: &str = "offense";
pub const OFFENSE_CODE: &str = "offense_code";
pub const PRECINCT: &str = "precinct";
pub const SECTOR: &str = "sector";
pub const BEAT: &str = "beat";
pub const MICRO_AREA: &str = "mcpp";
pub const ADDRESS: &str = "_100_block_address";
pub const LONGITUDE: &str = "longitude";
pub const LATITUDE: &str = "latitude";

/// Fixed storage column order
pub const OUTPUT_COLUMNS: [&str; 17] = [
    REPORT_NUMBER,
    OFFENSE_ID,
    OFFENSE_START,
    OFFENSE_END,
    REPORT_DATETIME,
    GROUP,
    CRIME_CATEGORY,
    OFFENSE_PARENT_GROUP,
    OFFENSE,
    OFFENSE_CODE,
    PRECINCT,
    SECTOR,
    BEAT,
    MICRO_AREA,
    ADDRESS,
    LONGITUDE,
    LATITUDE,
];

/// Designated missing-value spellings, matched case-sensitively after upper-casing
pub const MISSING_VALUES: [&str; 13] = [
    "UNKNOWN", "99", "OOJ", "<NULL>", "<Null>", "NULL", "null", "nil", "empty", "-", "NA", "n/a",
    "na",
];

/// Street names the feed uses as placeholders for an unknown block
pub const NON_EXISTENT_STREET_PATTERN: &str = r"OFTH|OFND|OFRD";

/// Crime category of records that are reported but are not offenses (justifiable homicide)
pub const NOT_A_CRIME: &str = "NOT_A_CRIME";

/// Washington State bounding box, inclusive
pub const LONGITUDE_RANGE: (f64, f64) = (-125.0, -116.5);
pub const LATITUDE_RANGE: (f64, f64) = (45.5, 49.0);

/// Minimum fuzzy score to accept a correction against the full vocabulary
pub const DEFAULT_FUZZY_THRESHOLD: u8 = 85;
/// Minimum fuzzy score when the vocabulary is narrowed to one precinct
pub const DEFAULT_NARROWED_FUZZY_THRESHOLD: u8 = 90;

/// Days of history kept in the store
pub const DEFAULT_RETENTION_DAYS: i64 = 366;

/// Socrata host serving the SPD crime dataset
pub const FEED_DOMAIN: &str = "data.seattle.gov";
pub const FEED_DATASET_ID: &str = "tazs-3rd5";
pub const DEFAULT_MAX_RETRIES: u32 = 5;
