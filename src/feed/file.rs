use async_trait::async_trait;
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::error::{CleanerError, Result};
use crate::feed::RecordSource;
use crate::types::RawRecord;

/// Read raw records from CSV with a header row. Unknown columns are ignored,
/// empty cells are absent values.
pub fn records_from_csv<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let fields = headers.iter().zip(row.iter()).filter(|(_, value)| !value.is_empty());
        records.push(RawRecord::from_fields(fields));
    }
    Ok(records)
}

/// A feed snapshot on disk, `.csv` or `.json` (an array of records)
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Result<Vec<RawRecord>> {
        let extension = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let file = std::fs::File::open(&self.path)?;
        let records = match extension.as_deref() {
            Some("csv") => records_from_csv(file)?,
            Some("json") => serde_json::from_reader(std::io::BufReader::new(file))?,
            _ => {
                return Err(CleanerError::Feed {
                    message: format!("unsupported input file '{}': expected .csv or .json", self.path.display()),
                })
            }
        };
        info!(path = %self.path.display(), records = records.len(), "Read feed file");
        Ok(records)
    }
}

#[async_trait]
impl RecordSource for FileSource {
    fn source_name(&self) -> &'static str {
        "file"
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        self.read()
    }
}
