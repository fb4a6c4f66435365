use chrono::NaiveDateTime;
use reqwest::Client;

use crate::{Error, FeedConfig, RawRecord, Result};

/// Upstream timestamp layout, e.g. `20250901T071500Z`. The trailing Z
/// is nominal only; the feed encodes civic-local time with a one-hour
/// skew that the classifier corrects.
const FEED_TIMESTAMP: &str = "%Y%m%dT%H%M%SZ";

/// Columns of the intermediate table, in order.
pub const TABLE_COLUMNS: [&str; 7] = [
    "Subject",
    "Start Date",
    "Start Time",
    "End Date",
    "End Time",
    "Description",
    "Location",
];

/// Converts the upstream ICS feed into the intermediate CSV table and
/// maintains the local snapshot used as fallback when the remote
/// fetch fails.
pub struct FeedNormalizer {
    client: Client,
    config: FeedConfig,
}

impl FeedNormalizer {
    pub fn new(config: FeedConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("stundenplan/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    pub const fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Fetch the raw feed from the configured URL.
    pub async fn fetch_remote(&self) -> Result<String> {
        let url = self
            .config
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("no feed URL configured".to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_fetch_error)?;

        let response = response.error_for_status().map_err(Self::map_fetch_error)?;
        response.text().await.map_err(Self::map_fetch_error)
    }

    fn map_fetch_error(error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(error)
        }
    }

    /// Block-oriented parse of the feed text. Only the VEVENT markers
    /// and the SUMMARY/DTSTART/DTEND prefixes are consumed; anything
    /// else is ignored so feed additions do not break us. A block
    /// without a parseable DTSTART (all-day or malformed entries) is
    /// dropped silently.
    pub fn normalize(feed: &str) -> Vec<RawRecord> {
        let mut records = Vec::new();
        let mut block: Option<EventBlock> = None;

        for line in feed.lines() {
            let line = line.trim();
            if line.starts_with("BEGIN:VEVENT") {
                block = Some(EventBlock::default());
                continue;
            }
            let Some(current) = block.as_mut() else {
                continue;
            };
            if let Some(value) = line.strip_prefix("SUMMARY:") {
                current.summary = value.to_string();
            } else if let Some(value) = line.strip_prefix("DTSTART:") {
                current.start = NaiveDateTime::parse_from_str(value, FEED_TIMESTAMP).ok();
            } else if let Some(value) = line.strip_prefix("DTEND:") {
                current.end = NaiveDateTime::parse_from_str(value, FEED_TIMESTAMP).ok();
            } else if line.starts_with("END:VEVENT") {
                if let Some(record) = block.take().and_then(EventBlock::into_record) {
                    records.push(record);
                } else {
                    tracing::debug!("dropping event block without start time");
                }
            }
        }

        records
    }

    /// Render records as the CSV intermediate table.
    pub fn to_table(records: &[RawRecord]) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(TABLE_COLUMNS)?;
        for record in records {
            writer.serialize(record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Feed { message: format!("table write failed: {e}") })?;
        String::from_utf8(bytes).map_err(|e| Error::Feed {
            message: format!("table is not valid UTF-8: {e}"),
        })
    }

    /// Fetch, normalize and snapshot in one step. The snapshot write
    /// is best-effort; a failed write does not fail the ingestion.
    pub async fn fetch_table(&self) -> Result<String> {
        let feed = self.fetch_remote().await?;
        let records = Self::normalize(&feed);
        let table = Self::to_table(&records)?;

        if let Err(e) = tokio::fs::write(&self.config.snapshot_path, &table).await {
            tracing::warn!(
                path = %self.config.snapshot_path.display(),
                "failed to write snapshot: {e}"
            );
        }

        Ok(table)
    }

    /// Intermediate table of the last successful ingestion, if any.
    pub async fn read_snapshot(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.config.snapshot_path).await?)
    }
}

#[derive(Default)]
struct EventBlock {
    summary: String,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

impl EventBlock {
    fn into_record(self) -> Option<RawRecord> {
        let start = self.start?;
        let (end_date, end_time) = self.end.map_or_else(
            || (String::new(), String::new()),
            |end| {
                (
                    end.format("%m/%d/%Y").to_string(),
                    end.format("%H:%M").to_string(),
                )
            },
        );

        Some(RawRecord {
            subject: self.summary,
            start_date: start.format("%m/%d/%Y").to_string(),
            start_time: start.format("%H:%M").to_string(),
            end_date,
            end_time,
            description: String::new(),
            location: String::new(),
        })
    }
}
