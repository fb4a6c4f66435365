use std::{env, path::PathBuf, time::Duration};

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One event block of the upstream feed, flattened into the
/// intermediate table columns. Exists only during normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Start Date")]
    pub start_date: String,
    #[serde(rename = "Start Time")]
    pub start_time: String,
    #[serde(rename = "End Date")]
    pub end_date: String,
    #[serde(rename = "End Time")]
    pub end_time: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Location")]
    pub location: String,
}

/// Derived tag for an anomalous lesson state. At most one applies;
/// cancellation wins over a move, a move wins over a room change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecialNote {
    Cancelled,
    Moved,
    RoomChanged,
}

impl SpecialNote {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Moved => "moved",
            Self::RoomChanged => "room-changed",
        }
    }
}

/// Why a record was dropped during classification. Rejections are
/// diagnostics, never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    MissingSubject,
    MissingStart,
    BadTimestamp,
}

/// A dropped record together with its reason, surfaced so tests and
/// diagnostics can observe silent-drop behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub subject: String,
    pub reason: RejectReason,
}

/// A classified timetable entry. Immutable once built; a refresh
/// replaces the whole event set rather than editing entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonEvent {
    /// Resolved label, "Mathematik (H1.03)" or just "Mathematik".
    pub display_summary: String,
    /// Resolved subject name alone, the key for notebook links.
    pub subject: String,
    /// Verbatim source summary, kept for audit and debugging.
    pub original_summary: String,
    /// Start instant in the civic timezone; `start < end` always holds.
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub description: String,
    pub location: String,
    pub is_exam: bool,
    pub is_cancelled: bool,
    pub special_note: Option<SpecialNote>,
}

impl LessonEvent {
    /// Wire representation for the presentation layer.
    pub fn view(&self) -> LessonView {
        LessonView {
            summary: self.display_summary.clone(),
            start: self.start.to_rfc3339(),
            end: Some(self.end.to_rfc3339()),
            description: self.description.clone(),
            location: self.location.clone(),
            is_exam: self.is_exam,
            is_cancelled: self.is_cancelled,
            special_note: self.special_note,
            notebook_link: None,
        }
    }
}

/// JSON shape consumed by the dashboard front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonView {
    pub summary: String,
    pub start: String,
    pub end: Option<String>,
    pub description: String,
    pub location: String,
    pub is_exam: bool,
    pub is_cancelled: bool,
    pub special_note: Option<SpecialNote>,
    /// Only populated for the current lesson, keyed by resolved subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_link: Option<String>,
}

/// A skew beyond one day is certainly a misconfiguration, not a feed
/// quirk.
pub const MAX_SKEW_HOURS: i64 = 24;

fn parse_skew_hours(raw: &str) -> Result<i64> {
    let hours: i64 = raw
        .parse()
        .map_err(|e| Error::Config(format!("invalid skew hours '{raw}': {e}")))?;
    if hours.abs() > MAX_SKEW_HOURS {
        return Err(Error::Config(format!(
            "skew hours {hours} out of range (±{MAX_SKEW_HOURS})"
        )));
    }
    Ok(hours)
}

/// Feed and cache configuration. Every field has a default so the
/// service comes up without any environment set.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Upstream ICS endpoint; `None` means local-snapshot only.
    pub url: Option<String>,
    /// Where the normalized table of the last successful fetch lives.
    pub snapshot_path: PathBuf,
    /// Fixed timeout for the remote fetch.
    pub timeout: Duration,
    /// Civic timezone used for day/week boundaries and display.
    pub timezone: Tz,
    /// Correction for the upstream feed's one-hour encoding skew.
    /// Kept configurable because the quirk is undocumented upstream.
    pub skew_hours: i64,
    /// Maximum age at which cached data is served without re-ingestion.
    pub freshness: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            snapshot_path: PathBuf::from("stundenplan.csv"),
            timeout: Duration::from_secs(10),
            timezone: chrono_tz::Europe::Zurich,
            skew_hours: 1,
            freshness: Duration::from_secs(300),
        }
    }
}

impl FeedConfig {
    /// Build a config from `STUNDENPLAN_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("STUNDENPLAN_FEED_URL") {
            config.url = Some(url);
        }
        if let Ok(path) = env::var("STUNDENPLAN_SNAPSHOT") {
            config.snapshot_path = PathBuf::from(path);
        }
        if let Ok(tz) = env::var("STUNDENPLAN_TIMEZONE") {
            config.timezone = tz
                .parse::<Tz>()
                .map_err(|e| Error::Config(format!("invalid timezone '{tz}': {e}")))?;
        }
        if let Ok(skew) = env::var("STUNDENPLAN_SKEW_HOURS") {
            config.skew_hours = parse_skew_hours(&skew)?;
        }
        if let Ok(secs) = env::var("STUNDENPLAN_FRESHNESS_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("invalid freshness '{secs}': {e}")))?;
            config.freshness = Duration::from_secs(secs);
        }
        if let Ok(secs) = env::var("STUNDENPLAN_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("invalid timeout '{secs}': {e}")))?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skew_hours_parse_within_range() {
        assert_eq!(parse_skew_hours("1").unwrap(), 1);
        assert_eq!(parse_skew_hours("-2").unwrap(), -2);
        assert_eq!(parse_skew_hours("0").unwrap(), 0);
    }

    #[test]
    fn skew_hours_out_of_range_is_a_config_error() {
        assert!(matches!(parse_skew_hours("48"), Err(Error::Config(_))));
        assert!(matches!(
            parse_skew_hours("9999999999999999"),
            Err(Error::Config(_))
        ));
        assert!(matches!(parse_skew_hours("bogus"), Err(Error::Config(_))));
    }
}
