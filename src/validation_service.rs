// src/validation_service.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::extraction::ExtractionService;
use crate::reconciliation::reconcile;
use crate::store::{AuditEntry, AuditSink, RecordStore, StoreError};
use crate::time_parsing::normalize_date;
use crate::timesheet::{ComparisonResult, ExtractedRecord, ProcessingSummary, WeekRecord};

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("timesheet week not found")]
    WeekNotFound,

    #[error("No images available for validation and none provided")]
    NoImages,

    #[error("no usable data extracted from any image: [{}]", .0.join("; "))]
    AllImagesFailed(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct ValidationOutcome {
    pub week: WeekRecord,
    pub comparison: ComparisonResult,
    pub audit_id: Option<String>,
}

/// Drives a validation pass over a submitted week: extracts records from
/// every uploaded image, merges them, reconciles against the stored days,
/// writes the per-day statuses and the comparison result back to the store,
/// and records an audit entry.
pub struct ValidationService {
    extractor: Arc<dyn ExtractionService>,
    store: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditSink>,
}

impl ValidationService {
    pub fn new(
        extractor: Arc<dyn ExtractionService>,
        store: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            extractor,
            store,
            audit,
        }
    }

    pub async fn validate_week(&self, week_id: &str) -> Result<ValidationOutcome, ValidationError> {
        let mut week = self
            .store
            .find_week_by_id(week_id)
            .await?
            .ok_or(ValidationError::WeekNotFound)?;
        if week.image_paths.is_empty() {
            return Err(ValidationError::NoImages);
        }

        let (merged, summary) = self.extract_and_merge(&week.image_paths).await?;

        let mut comparison = reconcile(&merged, &week.days);
        comparison.processing_summary = summary;

        for day in &mut week.days {
            day.status = comparison.classify(day.date);
        }
        week.is_validated = true;
        week.validation_result = Some(comparison.clone());

        // The store is updated exactly once, after the aggregation decision.
        self.store
            .set_validation(week_id, week.days.clone(), comparison.clone())
            .await?;

        let audit_entry = AuditEntry {
            id: String::new(),
            user_id: week.user_id.clone(),
            recorded_at: Utc::now(),
            extracted: merged,
            comparison: comparison.clone(),
            image_paths: week.image_paths.clone(),
            note: "Weekly timesheet validation".to_string(),
        };
        let audit_id = match self.audit.record(audit_entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to store audit log entry: {}", e);
                None
            }
        };

        info!(
            "Validation pass for week {} finished: valid={}, message='{}'",
            week_id, comparison.valid, comparison.message
        );
        Ok(ValidationOutcome {
            week,
            comparison,
            audit_id,
        })
    }

    /// Run extraction once per image, soft-failing per image, then merge the
    /// accumulated records in image order with the first occurrence of each
    /// date winning. Hard-fails only when every image reported an error.
    async fn extract_and_merge(
        &self,
        image_paths: &[String],
    ) -> Result<(Vec<ExtractedRecord>, ProcessingSummary), ValidationError> {
        let mut collected: Vec<ExtractedRecord> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut succeeded = 0usize;

        for (index, path) in image_paths.iter().enumerate() {
            info!(
                "Processing image {} of {}: {}",
                index + 1,
                image_paths.len(),
                path
            );
            match self.extractor.extract(path).await {
                Ok(mut records) => {
                    succeeded += 1;
                    for record in &mut records {
                        record.source_image_index = index;
                        record.source_path = path.clone();
                    }
                    collected.extend(records);
                }
                Err(e) => {
                    let message = format!("Image {} ({}): {}", index + 1, path, e);
                    warn!("Extraction failed, continuing with remaining images: {}", message);
                    errors.push(message);
                }
            }
        }

        if succeeded == 0 {
            return Err(ValidationError::AllImagesFailed(errors));
        }

        let mut merged: Vec<ExtractedRecord> = Vec::new();
        let mut seen: HashSet<NaiveDate> = HashSet::new();
        for record in collected {
            if let Some(date) = normalize_date(&record.date) {
                if !seen.insert(date) {
                    // Re-photographed pages produce the same dates twice.
                    warn!(
                        "Duplicate date {} from image {} dropped, first occurrence kept",
                        date,
                        record.source_image_index + 1
                    );
                    continue;
                }
            }
            merged.push(record);
        }

        let summary = ProcessingSummary {
            total_images: image_paths.len(),
            succeeded,
            errors,
        };
        Ok((merged, summary))
    }
}
