use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::FeedConfig;
use crate::error::{CleanerError, Result};
use crate::feed::RecordSource;
use crate::types::RawRecord;

fn build_client(config: &FeedConfig) -> Result<Client> {
    Ok(Client::builder().timeout(config.timeout()).gzip(true).build()?)
}

/// Timeouts, whether reported by the server or hit locally, are retryable
fn classify(source_name: &str, err: reqwest::Error) -> CleanerError {
    if err.is_timeout() || err.status() == Some(StatusCode::REQUEST_TIMEOUT) {
        CleanerError::FeedTimeout { source_name: source_name.to_string() }
    } else {
        CleanerError::Http(err)
    }
}

async fn get_bytes(source_name: &str, request: reqwest::RequestBuilder) -> Result<Vec<u8>> {
    let resp = request
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| classify(source_name, e))?;
    let bytes = resp.bytes().await.map_err(|e| classify(source_name, e))?;
    debug!(source = source_name, bytes = bytes.len(), "Received feed payload");
    Ok(bytes.to_vec())
}

/// Socrata SoQL endpoint; filters server-side by report date and sends the app token
pub struct SocrataSource {
    client: Client,
    url: String,
    app_token: Option<String>,
    since: NaiveDate,
}

impl SocrataSource {
    pub fn new(config: &FeedConfig, since: NaiveDate) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            url: format!("https://{}/resource/{}.json", config.domain, config.dataset_id),
            app_token: config.app_token.clone(),
            since,
        })
    }

    pub fn query(&self) -> String {
        format!(
            "SELECT * WHERE DATE_TRUNC_YMD(report_datetime) >= '{}' ORDER BY report_datetime DESC LIMIT 100000000",
            self.since.format("%Y-%m-%d")
        )
    }
}

#[async_trait]
impl RecordSource for SocrataSource {
    fn source_name(&self) -> &'static str {
        "socrata"
    }

    #[instrument(skip(self), fields(since = %self.since))]
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        let mut request = self.client.get(&self.url).query(&[("$query", self.query())]);
        if let Some(token) = &self.app_token {
            request = request.header("X-App-Token", token);
        }
        let payload = get_bytes(self.source_name(), request).await?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

#[derive(Deserialize)]
struct ODataPage {
    value: Vec<RawRecord>,
}

/// OData v4 endpoint; filters by report date, no authentication
pub struct ODataSource {
    client: Client,
    url: String,
    since: NaiveDate,
}

impl ODataSource {
    pub fn new(config: &FeedConfig, since: NaiveDate) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            url: format!("https://{}/api/odata/v4/{}", config.domain, config.dataset_id),
            since,
        })
    }
}

#[async_trait]
impl RecordSource for ODataSource {
    fn source_name(&self) -> &'static str {
        "odata"
    }

    #[instrument(skip(self), fields(since = %self.since))]
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        let filter = format!("report_datetime ge '{}'", self.since.format("%Y-%m-%d"));
        let request = self.client.get(&self.url).query(&[("$filter", filter)]);
        let payload = get_bytes(self.source_name(), request).await?;
        let page: ODataPage = serde_json::from_slice(&payload)?;
        Ok(page.value)
    }
}

/// Full CSV export of the dataset. Unfiltered, so it is the last resort.
pub struct CsvDownloadSource {
    client: Client,
    url: String,
}

impl CsvDownloadSource {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            url: format!("https://{}/api/views/{}/rows.csv?accessType=DOWNLOAD", config.domain, config.dataset_id),
        })
    }
}

#[async_trait]
impl RecordSource for CsvDownloadSource {
    fn source_name(&self) -> &'static str {
        "csv_download"
    }

    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        let request = self.client.get(&self.url);
        let payload = get_bytes(self.source_name(), request).await?;
        crate::feed::file::records_from_csv(payload.as_slice())
    }
}
