// src/reconciliation.rs
use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveTime};
use tracing::{info, warn};

use crate::time_parsing::{
    normalize_date, normalize_lunch, parse_hours, parse_time, TimeParseError,
};
use crate::timesheet::{
    ComparisonResult, DayRecord, ExtractedRecord, FieldSnapshot, Mismatch, MissingFromImageDetail,
    MissingFromStoredDetail, RawField,
};

/// Two duration values closer than this are considered equal. Absorbs float
/// rounding, not legitimate discrepancy.
pub const DURATION_TOLERANCE: f64 = 0.01;

fn parse_time_field(
    field: &'static str,
    value: Option<&str>,
) -> Result<NaiveTime, TimeParseError> {
    let raw = value.ok_or(TimeParseError::Missing(field))?;
    parse_time(raw)
}

/// Compare one extracted record with the stored day for the same date and
/// return a human-readable detail message per mismatching field. An empty
/// list means the day matches. A field that cannot be parsed on either side
/// contributes an error detail instead of aborting the comparison.
pub fn compare_day(record: &ExtractedRecord, stored: &DayRecord) -> Vec<String> {
    let mut details = Vec::new();

    match (
        parse_time_field("time_in", record.time_in.as_deref()),
        parse_time_field("time_in", stored.time_in.as_deref()),
    ) {
        (Ok(extracted), Ok(kept)) => {
            if extracted != kept {
                details.push(format!(
                    "time_in mismatch: extracted '{}' vs stored '{}'",
                    record.time_in.as_deref().unwrap_or_default(),
                    stored.time_in.as_deref().unwrap_or_default()
                ));
            }
        }
        (Err(e), _) | (_, Err(e)) => details.push(format!("Error comparing record: {}", e)),
    }

    match (
        parse_time_field("time_out", record.time_out.as_deref()),
        parse_time_field("time_out", stored.time_out.as_deref()),
    ) {
        (Ok(extracted), Ok(kept)) => {
            if extracted != kept {
                details.push(format!(
                    "time_out mismatch: extracted '{}' vs stored '{}'",
                    record.time_out.as_deref().unwrap_or_default(),
                    stored.time_out.as_deref().unwrap_or_default()
                ));
            }
        }
        (Err(e), _) | (_, Err(e)) => details.push(format!("Error comparing record: {}", e)),
    }

    // Absent lunch values read as zero, the same default the form layer uses.
    let record_lunch_raw = record
        .lunch_timeout
        .as_ref()
        .map(RawField::to_string)
        .unwrap_or_else(|| "0".to_string());
    let stored_lunch_raw = stored.lunch_timeout.to_string();
    match (
        normalize_lunch(&record_lunch_raw),
        normalize_lunch(&stored_lunch_raw),
    ) {
        (Ok(extracted), Ok(kept)) => {
            if (extracted - kept).abs() > DURATION_TOLERANCE {
                details.push(format!(
                    "lunch_timeout mismatch: extracted '{}' vs stored '{}'",
                    record_lunch_raw, stored_lunch_raw
                ));
            }
        }
        (Err(e), _) | (_, Err(e)) => details.push(format!("Error comparing record: {}", e)),
    }

    let record_hours_raw = record
        .total_hours
        .clone()
        .unwrap_or(RawField::Number(0.0));
    match parse_hours(&record_hours_raw) {
        Ok(extracted) => {
            if (extracted - stored.total_hours).abs() > DURATION_TOLERANCE {
                details.push(format!(
                    "total_hours mismatch: extracted '{}' vs stored '{}'",
                    record_hours_raw, stored.total_hours
                ));
            }
        }
        Err(e) => details.push(format!("Error comparing record: {}", e)),
    }

    details
}

/// Reconcile extracted records against the stored days of a week.
///
/// Stored days are indexed by date (later entries win on a collision, though
/// stored sequences carry unique dates by construction). Extracted records
/// whose date cannot be normalized are skipped with a log line. Every
/// reconciled date is classified as a match, a mismatch, or missing from the
/// stored data; stored dates never touched by the extraction come out as
/// missing from the source image.
pub fn reconcile(extracted: &[ExtractedRecord], stored: &[DayRecord]) -> ComparisonResult {
    let mut result = ComparisonResult::started();

    let mut stored_by_date: BTreeMap<NaiveDate, &DayRecord> = BTreeMap::new();
    for day in stored {
        stored_by_date.insert(day.date, day);
    }

    let mut touched: HashSet<NaiveDate> = HashSet::new();
    for record in extracted {
        let Some(date) = normalize_date_logged(record) else {
            continue;
        };
        // Duplicate dates are resolved upstream by the image merge; keep the
        // first occurrence here too so no date lands in two categories.
        if !touched.insert(date) {
            warn!("Duplicate extracted record for {}, keeping the first", date);
            continue;
        }

        match stored_by_date.get(&date) {
            Some(day) => {
                let details = compare_day(record, day);
                if details.is_empty() {
                    info!("Extracted record for {} matches the stored entry", date);
                    result.matches.push(date);
                } else {
                    result.mismatched.insert(
                        date,
                        Mismatch {
                            extracted: FieldSnapshot::of_extracted(record),
                            stored: FieldSnapshot::of_stored(day),
                            details,
                        },
                    );
                    result.valid = false;
                    result.message =
                        "Discrepancies found between extracted and stored Timesheet entries"
                            .to_string();
                }
            }
            None => {
                warn!("No stored day found for extracted date {}", date);
                result.missing_from_stored.insert(
                    date,
                    MissingFromStoredDetail {
                        extracted: FieldSnapshot::of_extracted(record),
                        details: vec![format!(
                            "Record for {} is missing from stored Timesheet data.",
                            date
                        )],
                    },
                );
                result.valid = false;
                result.message =
                    "Some records are missing from the stored Timesheet data".to_string();
            }
        }
    }

    // Empty input and input with no readable dates are the same outcome, and
    // distinct from "every stored day missing from the image".
    if touched.is_empty() {
        warn!("No usable records in extracted data");
        return ComparisonResult::no_data();
    }

    for (date, day) in &stored_by_date {
        if touched.contains(date) {
            continue;
        }
        warn!("Stored day {} not present in extracted data", date);
        result.missing_from_source.insert(
            *date,
            MissingFromImageDetail {
                stored: FieldSnapshot::of_stored(day),
                details: vec![format!(
                    "Stored day for {} is missing from extracted image data.",
                    date
                )],
            },
        );
        result.valid = false;
        if !result.message.contains("missing from the image") {
            if result.message == "Validation completed" {
                result.message =
                    "Some days in stored data are missing from the image".to_string();
            } else {
                result
                    .message
                    .push_str(", some days in stored data are missing from the image");
            }
        }
    }

    result
}

fn normalize_date_logged(record: &ExtractedRecord) -> Option<NaiveDate> {
    if record.date.trim().is_empty() {
        warn!(
            "Missing date in extracted record from image {}",
            record.source_image_index + 1
        );
        return None;
    }
    match normalize_date(&record.date) {
        Some(date) => Some(date),
        None => {
            warn!("Could not normalize date '{}', skipping record", record.date);
            None
        }
    }
}
