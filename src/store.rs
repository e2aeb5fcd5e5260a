// src/store.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::timesheet::{
    ComparisonResult, DayRecord, DayStatus, ExtractedRecord, ManagerReview, WeekRecord,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
}

/// Opaque record identifier, in the same shape the OAuth state strings use.
pub fn generate_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// Keyed read/write access to week records. Injected into the services so
/// the core stays testable without a live database.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        week_end: NaiveDate,
    ) -> Result<Option<WeekRecord>, StoreError>;

    async fn find_week_by_id(&self, id: &str) -> Result<Option<WeekRecord>, StoreError>;

    /// Insert a new week record and return its assigned id.
    async fn insert_week(&self, week: WeekRecord) -> Result<String, StoreError>;

    /// Replace the day entries of an existing week.
    async fn set_days(
        &self,
        id: &str,
        days: Vec<DayRecord>,
        is_draft: bool,
    ) -> Result<(), StoreError>;

    /// Mark a week as submitted with its final day entries and image paths.
    /// Clears any earlier validation result.
    async fn mark_submitted(
        &self,
        id: &str,
        days: Vec<DayRecord>,
        image_paths: Vec<String>,
    ) -> Result<(), StoreError>;

    /// Persist the outcome of a validation pass: the day entries with their
    /// new statuses and the comparison result, in one write.
    async fn set_validation(
        &self,
        id: &str,
        days: Vec<DayRecord>,
        result: ComparisonResult,
    ) -> Result<(), StoreError>;

    async fn set_review(&self, id: &str, review: ManagerReview) -> Result<(), StoreError>;

    async fn weeks_for_user(&self, user_id: &str) -> Result<Vec<WeekRecord>, StoreError>;

    async fn all_weeks(&self) -> Result<Vec<WeekRecord>, StoreError>;

    /// Reset the given date back to a placeholder in the user's draft weeks.
    /// Returns how many weeks were touched.
    async fn clear_draft_day(&self, user_id: &str, date: NaiveDate) -> Result<usize, StoreError>;
}

// --- Audit sink ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub user_id: String,
    pub recorded_at: DateTime<Utc>,
    pub extracted: Vec<ExtractedRecord>,
    pub comparison: ComparisonResult,
    pub image_paths: Vec<String>,
    pub note: String,
}

/// Receives a record of each validation pass. Failures to write audit data
/// are never fatal to the validation itself.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<String, StoreError>;

    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<AuditEntry>, StoreError>;
}

// --- In-memory implementations ---

#[derive(Clone, Default)]
pub struct InMemoryStore {
    weeks: Arc<Mutex<HashMap<String, WeekRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_week<T>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut WeekRecord) -> T,
    ) -> Result<T, StoreError> {
        let mut weeks = self.weeks.lock().unwrap();
        let week = weeks.get_mut(id).ok_or(StoreError::NotFound)?;
        let value = apply(week);
        week.updated_at = Utc::now();
        Ok(value)
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn find_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        week_end: NaiveDate,
    ) -> Result<Option<WeekRecord>, StoreError> {
        let weeks = self.weeks.lock().unwrap();
        Ok(weeks
            .values()
            .find(|w| {
                w.user_id == user_id && w.week_start == week_start && w.week_end == week_end
            })
            .cloned())
    }

    async fn find_week_by_id(&self, id: &str) -> Result<Option<WeekRecord>, StoreError> {
        let weeks = self.weeks.lock().unwrap();
        Ok(weeks.get(id).cloned())
    }

    async fn insert_week(&self, mut week: WeekRecord) -> Result<String, StoreError> {
        if week.id.is_empty() {
            week.id = generate_id();
        }
        let id = week.id.clone();
        info!(
            "Storing week record {} for user {} ({} - {})",
            id, week.user_id, week.week_start, week.week_end
        );
        self.weeks.lock().unwrap().insert(id.clone(), week);
        Ok(id)
    }

    async fn set_days(
        &self,
        id: &str,
        days: Vec<DayRecord>,
        is_draft: bool,
    ) -> Result<(), StoreError> {
        self.with_week(id, |week| {
            week.days = days;
            week.is_draft = is_draft;
        })
    }

    async fn mark_submitted(
        &self,
        id: &str,
        days: Vec<DayRecord>,
        image_paths: Vec<String>,
    ) -> Result<(), StoreError> {
        self.with_week(id, |week| {
            week.days = days;
            week.image_paths = image_paths;
            week.is_draft = false;
            week.submitted = true;
            week.is_validated = false;
            week.validation_result = None;
        })
    }

    async fn set_validation(
        &self,
        id: &str,
        days: Vec<DayRecord>,
        result: ComparisonResult,
    ) -> Result<(), StoreError> {
        self.with_week(id, |week| {
            week.days = days;
            week.is_validated = true;
            week.validation_result = Some(result);
        })
    }

    async fn set_review(&self, id: &str, review: ManagerReview) -> Result<(), StoreError> {
        self.with_week(id, |week| {
            week.review = Some(review);
        })
    }

    async fn weeks_for_user(&self, user_id: &str) -> Result<Vec<WeekRecord>, StoreError> {
        let weeks = self.weeks.lock().unwrap();
        let mut found: Vec<WeekRecord> = weeks
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|w| w.week_start);
        Ok(found)
    }

    async fn all_weeks(&self) -> Result<Vec<WeekRecord>, StoreError> {
        let weeks = self.weeks.lock().unwrap();
        let mut found: Vec<WeekRecord> = weeks.values().cloned().collect();
        found.sort_by_key(|w| (w.user_id.clone(), w.week_start));
        Ok(found)
    }

    async fn clear_draft_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<usize, StoreError> {
        let mut weeks = self.weeks.lock().unwrap();
        let mut touched = 0;
        for week in weeks.values_mut() {
            if week.user_id != user_id || !week.is_draft || week.is_validated {
                continue;
            }
            let mut cleared = false;
            for day in &mut week.days {
                if day.date == date && day.status != DayStatus::Missing {
                    *day = DayRecord::placeholder(date);
                    cleared = true;
                }
            }
            if cleared {
                week.updated_at = Utc::now();
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, mut entry: AuditEntry) -> Result<String, StoreError> {
        if entry.id.is_empty() {
            entry.id = generate_id();
        }
        let id = entry.id.clone();
        info!("Audit log stored with ID: {}", id);
        self.entries.lock().unwrap().push(entry);
        Ok(id)
    }

    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}
