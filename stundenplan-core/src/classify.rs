use chrono::{Duration, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;

use crate::{
    Error, LessonEvent, RawRecord, RejectReason, RejectedRecord, Result, SpecialNote,
    feed::TABLE_COLUMNS, subjects::SubjectResolver,
};

/// Table timestamp layout: `MM/DD/YYYY HH:MM`, civic-local before the
/// skew correction.
const TABLE_TIMESTAMP: &str = "%m/%d/%Y %H:%M";

/// Room codes like "H1.03" or "HL3.01" embedded in the subject text.
const ROOM_PATTERN: &str = r"[A-Za-z]{1,2}\d{1,2}\.\d{2}";

/// Generic exam markers, matched case-insensitively against subject
/// and description.
const EXAM_KEYWORDS: [&str; 3] = ["prüfung", "klausur", "exam"];

/// More specific markers that override the generic ones: a re-exam is
/// never classified as an exam.
const RE_EXAM_KEYWORDS: [&str; 2] = ["nachprüfung", "re-exam"];

/// Ordered keyword groups for the special note. Evaluated top to
/// bottom, first match wins: cancellation before move, move before
/// room change.
const NOTE_KEYWORDS: [(&[&str], SpecialNote); 3] = [
    (
        &["entfällt", "fällt aus", "ausfall", "cancelled"],
        SpecialNote::Cancelled,
    ),
    (&["verschoben", "moved"], SpecialNote::Moved),
    (
        &["raumwechsel", "zimmerwechsel", "room change"],
        SpecialNote::RoomChanged,
    ),
];

/// Classifier output: the accepted events plus every record dropped
/// along the way, with its reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub events: Vec<LessonEvent>,
    pub rejected: Vec<RejectedRecord>,
}

/// Turns the intermediate table into typed, timezone-aware lesson
/// events.
pub struct Classifier {
    timezone: Tz,
    skew: Duration,
    resolver: SubjectResolver,
    room_pattern: Regex,
}

impl Classifier {
    pub fn new(timezone: Tz, skew_hours: i64) -> Self {
        Self::with_resolver(timezone, skew_hours, SubjectResolver::default())
    }

    pub fn with_resolver(timezone: Tz, skew_hours: i64, resolver: SubjectResolver) -> Self {
        Self {
            timezone,
            // Out-of-range values are caught at config parse time; a
            // direct caller handing in an absurd magnitude gets no
            // correction rather than a panic.
            skew: Duration::try_hours(skew_hours).unwrap_or_else(Duration::zero),
            resolver,
            room_pattern: Regex::new(ROOM_PATTERN).expect("room pattern is valid"),
        }
    }

    pub const fn resolver(&self) -> &SubjectResolver {
        &self.resolver
    }

    /// Classify the whole table. Fails only when the table itself is
    /// unreadable (missing required columns); individual bad records
    /// are dropped with a reason, never fatally.
    pub fn classify(&self, table: &str) -> Result<Classified> {
        let mut reader = csv::Reader::from_reader(table.as_bytes());

        let headers = reader.headers()?.clone();
        for column in TABLE_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(Error::MissingColumn(column.to_string()));
            }
        }

        let mut events = Vec::new();
        let mut rejected = Vec::new();

        for row in reader.deserialize::<RawRecord>() {
            let record = match row {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!("skipping unreadable table row: {e}");
                    continue;
                }
            };
            match self.classify_record(&record) {
                Ok(event) => events.push(event),
                Err(reason) => {
                    tracing::debug!(subject = %record.subject, ?reason, "rejecting record");
                    rejected.push(RejectedRecord {
                        subject: record.subject,
                        reason,
                    });
                }
            }
        }

        // Stable, so same-instant events keep their feed order.
        events.sort_by_key(|event| event.start);

        Ok(Classified { events, rejected })
    }

    fn classify_record(
        &self,
        record: &RawRecord,
    ) -> std::result::Result<LessonEvent, RejectReason> {
        let subject_text = record.subject.trim();
        if subject_text.is_empty() {
            return Err(RejectReason::MissingSubject);
        }
        if record.start_date.trim().is_empty() || record.start_time.trim().is_empty() {
            return Err(RejectReason::MissingStart);
        }

        let start = self.parse_instant(&record.start_date, &record.start_time)?;
        // End is required: "current lesson" needs a valid interval.
        if record.end_date.trim().is_empty() || record.end_time.trim().is_empty() {
            return Err(RejectReason::BadTimestamp);
        }
        let end = self.parse_instant(&record.end_date, &record.end_time)?;
        if end <= start {
            return Err(RejectReason::BadTimestamp);
        }

        let location = Some(record.location.trim())
            .filter(|loc| !loc.is_empty())
            .map(str::to_string)
            .or_else(|| self.extract_room(subject_text))
            .unwrap_or_default();

        let code = subject_text.split_whitespace().next().unwrap_or(subject_text);
        let subject = self.resolver.resolve(code);
        let display_summary = if location.is_empty() {
            subject.clone()
        } else {
            format!("{subject} ({location})")
        };

        let haystack = format!("{} {}", record.subject, record.description).to_lowercase();
        let is_exam = Self::detect_exam(&haystack);
        let special_note = Self::detect_note(&haystack);

        Ok(LessonEvent {
            display_summary,
            subject,
            original_summary: record.subject.clone(),
            start,
            end,
            description: record.description.trim().to_string(),
            location,
            is_exam,
            is_cancelled: special_note == Some(SpecialNote::Cancelled),
            special_note,
        })
    }

    /// Parse a table timestamp, apply the configured skew, then attach
    /// the civic timezone. A local time skipped by a DST transition is
    /// treated as unparseable.
    fn parse_instant(
        &self,
        date: &str,
        time: &str,
    ) -> std::result::Result<chrono::DateTime<chrono::FixedOffset>, RejectReason> {
        let naive =
            NaiveDateTime::parse_from_str(&format!("{} {}", date.trim(), time.trim()), TABLE_TIMESTAMP)
                .map_err(|_| RejectReason::BadTimestamp)?;
        let corrected = naive + self.skew;
        self.timezone
            .from_local_datetime(&corrected)
            .earliest()
            .map(|instant| instant.fixed_offset())
            .ok_or(RejectReason::BadTimestamp)
    }

    fn extract_room(&self, subject: &str) -> Option<String> {
        self.room_pattern
            .find(subject)
            .map(|m| m.as_str().to_string())
    }

    fn detect_exam(haystack: &str) -> bool {
        if RE_EXAM_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
            return false;
        }
        EXAM_KEYWORDS.iter().any(|kw| haystack.contains(kw))
    }

    fn detect_note(haystack: &str) -> Option<SpecialNote> {
        NOTE_KEYWORDS
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|kw| haystack.contains(kw)))
            .map(|&(_, note)| note)
    }
}
