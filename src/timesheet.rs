// src/timesheet.rs
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// --- Raw field values ---

/// A value as it arrived from a form or from the extraction service:
/// either already numeric or still free-form text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Number(f64),
    Text(String),
}

impl Default for RawField {
    fn default() -> Self {
        RawField::Number(0.0)
    }
}

impl fmt::Display for RawField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawField::Number(n) => write!(f, "{}", n),
            RawField::Text(s) => write!(f, "{}", s),
        }
    }
}

// --- Day status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayStatus {
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "not approved")]
    NotApproved,
    #[serde(rename = "missing from stored Timesheet data")]
    MissingFromStored,
    #[serde(rename = "missing from image")]
    MissingFromImage,
    /// Placeholder for a weekday the user has not filled in yet.
    #[serde(rename = "missing")]
    Missing,
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DayStatus::Approved => "approved",
            DayStatus::NotApproved => "not approved",
            DayStatus::MissingFromStored => "missing from stored Timesheet data",
            DayStatus::MissingFromImage => "missing from image",
            DayStatus::Missing => "missing",
        };
        write!(f, "{}", label)
    }
}

// --- Stored records ---

/// One calendar day's authoritative work-hours entry within a week.
/// Raw time strings are kept as entered so mismatch reports can quote them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    #[serde(default)]
    pub lunch_timeout: RawField,
    #[serde(default)]
    pub total_hours: f64,
    pub status: DayStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl DayRecord {
    /// Placeholder for a weekday with no user-provided data yet.
    pub fn placeholder(date: NaiveDate) -> Self {
        Self {
            date,
            time_in: None,
            time_out: None,
            lunch_timeout: RawField::Number(0.0),
            total_hours: 0.0,
            status: DayStatus::Missing,
            notes: None,
        }
    }
}

/// One day's work-hours data as read out of an uploaded image by the
/// extraction service. All fields are raw text/number until normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub date: String,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    pub lunch_timeout: Option<RawField>,
    pub total_hours: Option<RawField>,
    #[serde(default)]
    pub source_image_index: usize,
    #[serde(default)]
    pub source_path: String,
}

// --- Manager review ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerReview {
    pub status: ReviewStatus,
    pub note: Option<String>,
    pub reviewed_by: String,
    pub reviewed_at: DateTime<Utc>,
}

// --- Week record ---

/// The Monday-to-Friday authoritative weekly timesheet document for one user.
/// Invariant: `days` holds exactly one entry per calendar day from
/// `week_start` to `week_end` inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekRecord {
    pub id: String,
    pub user_id: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub days: Vec<DayRecord>,
    pub is_draft: bool,
    pub submitted: bool,
    pub is_validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_result: Option<ComparisonResult>,
    #[serde(default)]
    pub image_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ManagerReview>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeekRecord {
    pub fn new_draft(
        user_id: &str,
        week_start: NaiveDate,
        week_end: NaiveDate,
        days: Vec<DayRecord>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            user_id: user_id.to_string(),
            week_start,
            week_end,
            days,
            is_draft: true,
            submitted: false,
            is_validated: false,
            validation_result: None,
            image_paths: Vec::new(),
            review: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge user-provided days into the existing week, replacing any day
    /// that shares a date. Days outside the week boundary are ignored.
    pub fn merge_days(&mut self, provided: &BTreeMap<NaiveDate, DayRecord>) {
        for day in &mut self.days {
            if let Some(entry) = provided.get(&day.date) {
                *day = entry.clone();
            }
        }
    }
}

// --- Comparison results ---

/// Raw-value snapshot of one side of a comparison, quoted back to the user
/// in mismatch payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    pub lunch_timeout: Option<RawField>,
    pub total_hours: Option<RawField>,
}

impl FieldSnapshot {
    pub fn of_extracted(record: &ExtractedRecord) -> Self {
        Self {
            time_in: record.time_in.clone(),
            time_out: record.time_out.clone(),
            lunch_timeout: record.lunch_timeout.clone(),
            total_hours: record.total_hours.clone(),
        }
    }

    pub fn of_stored(day: &DayRecord) -> Self {
        Self {
            time_in: day.time_in.clone(),
            time_out: day.time_out.clone(),
            lunch_timeout: Some(day.lunch_timeout.clone()),
            total_hours: Some(RawField::Number(day.total_hours)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub extracted: FieldSnapshot,
    pub stored: FieldSnapshot,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingFromStoredDetail {
    pub extracted: FieldSnapshot,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingFromImageDetail {
    pub stored: FieldSnapshot,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub total_images: usize,
    pub succeeded: usize,
    pub errors: Vec<String>,
}

/// Outcome of reconciling extracted records against a stored week.
/// Every reconciled date lands in exactly one of `matches`, `mismatched`, or
/// `missing_from_stored`; `missing_from_source` holds the stored dates the
/// extraction never touched. `valid` is true iff all three failure
/// collections are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub valid: bool,
    pub message: String,
    pub matches: Vec<NaiveDate>,
    pub mismatched: BTreeMap<NaiveDate, Mismatch>,
    pub missing_from_stored: BTreeMap<NaiveDate, MissingFromStoredDetail>,
    pub missing_from_source: BTreeMap<NaiveDate, MissingFromImageDetail>,
    #[serde(default)]
    pub processing_summary: ProcessingSummary,
}

impl ComparisonResult {
    pub fn started() -> Self {
        Self {
            valid: true,
            message: "Validation completed".to_string(),
            matches: Vec::new(),
            mismatched: BTreeMap::new(),
            missing_from_stored: BTreeMap::new(),
            missing_from_source: BTreeMap::new(),
            processing_summary: ProcessingSummary::default(),
        }
    }

    pub fn no_data() -> Self {
        Self {
            valid: false,
            message: "No data extracted from image".to_string(),
            ..Self::started()
        }
    }

    /// Per-date classification used to write statuses back onto day records.
    pub fn classify(&self, date: NaiveDate) -> DayStatus {
        if self.matches.contains(&date) {
            DayStatus::Approved
        } else if self.mismatched.contains_key(&date) {
            DayStatus::NotApproved
        } else if self.missing_from_stored.contains_key(&date) {
            DayStatus::MissingFromStored
        } else {
            DayStatus::MissingFromImage
        }
    }
}

// --- Week boundaries ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeekBoundaryError {
    #[error("No day dates provided.")]
    NoDates,
}

/// Compute the Monday and Friday bounding the week of the earliest supplied
/// date. If any supplied date falls on a Saturday or Sunday the whole window
/// shifts forward to the next week.
pub fn week_boundaries_from_input(
    dates: &[NaiveDate],
) -> Result<(NaiveDate, NaiveDate), WeekBoundaryError> {
    let base = dates.iter().min().ok_or(WeekBoundaryError::NoDates)?;

    let mut monday = *base - Duration::days(base.weekday().num_days_from_monday() as i64);
    if dates
        .iter()
        .any(|d| matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
    {
        monday += Duration::days(7);
    }
    let friday = monday + Duration::days(4);

    Ok((monday, friday))
}

/// Build one `DayRecord` per calendar day from `week_start` to `week_end`
/// inclusive, taking user-provided entries where present and placeholders
/// otherwise.
pub fn populate_week_days(
    week_start: NaiveDate,
    week_end: NaiveDate,
    provided: &BTreeMap<NaiveDate, DayRecord>,
) -> Vec<DayRecord> {
    let mut days = Vec::new();
    let mut current = week_start;
    while current <= week_end {
        match provided.get(&current) {
            Some(entry) => days.push(entry.clone()),
            None => days.push(DayRecord::placeholder(current)),
        }
        current += Duration::days(1);
    }
    days
}
