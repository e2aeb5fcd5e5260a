// src/reconciliation_tests.rs

#[cfg(test)]
mod tests {
    use crate::reconciliation::{compare_day, reconcile};
    use crate::timesheet::{DayRecord, DayStatus, ExtractedRecord, RawField};
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("Invalid date string format: {}", s))
    }

    // Helper to build an extracted record the way the extraction service
    // returns them.
    fn extracted(
        date: &str,
        time_in: &str,
        time_out: &str,
        lunch: RawField,
        total: RawField,
    ) -> ExtractedRecord {
        ExtractedRecord {
            date: date.to_string(),
            time_in: Some(time_in.to_string()),
            time_out: Some(time_out.to_string()),
            lunch_timeout: Some(lunch),
            total_hours: Some(total),
            source_image_index: 0,
            source_path: String::new(),
        }
    }

    fn stored_day(
        date: &str,
        time_in: &str,
        time_out: &str,
        lunch_minutes: f64,
        total_hours: f64,
    ) -> DayRecord {
        DayRecord {
            date: d(date),
            time_in: Some(time_in.to_string()),
            time_out: Some(time_out.to_string()),
            lunch_timeout: RawField::Number(lunch_minutes),
            total_hours,
            status: DayStatus::NotApproved,
            notes: None,
        }
    }

    // --- compare_day ---

    #[test]
    fn test_compare_day_all_fields_match() {
        let record = extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.5),
        );
        let stored = stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5);
        assert!(compare_day(&record, &stored).is_empty());
    }

    #[test]
    fn test_compare_day_accepts_equivalent_time_formats() {
        let record = extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.5),
        );
        let stored = stored_day("2024-03-04", "9:00 AM", "5:00 PM", 30.0, 7.5);
        assert!(compare_day(&record, &stored).is_empty());
    }

    #[test]
    fn test_compare_day_accepts_lunch_in_hours_or_minutes() {
        // "0.5" reads as half an hour, "0:30" as thirty minutes.
        let record = extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Text("0.5".to_string()),
            RawField::Number(7.5),
        );
        let stored = stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5);
        assert!(compare_day(&record, &stored).is_empty());

        let record = extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Text("0:30".to_string()),
            RawField::Number(7.5),
        );
        assert!(compare_day(&record, &stored).is_empty());
    }

    #[test]
    fn test_compare_day_reports_each_mismatching_field() {
        let record = extracted(
            "03-04-2024",
            "10:00",
            "18:00",
            RawField::Number(45.0),
            RawField::Number(7.5),
        );
        let stored = stored_day("2024-03-04", "09:00", "17:00", 30.0, 8.0);
        let details = compare_day(&record, &stored);
        assert_eq!(details.len(), 4);
        assert!(details
            .contains(&"time_in mismatch: extracted '10:00' vs stored '09:00'".to_string()));
        assert!(details
            .contains(&"time_out mismatch: extracted '18:00' vs stored '17:00'".to_string()));
        assert!(details
            .contains(&"lunch_timeout mismatch: extracted '45' vs stored '30'".to_string()));
        assert!(details
            .contains(&"total_hours mismatch: extracted '7.5' vs stored '8'".to_string()));
    }

    #[test]
    fn test_compare_day_tolerance_boundary() {
        let stored = stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5);

        // A difference of exactly 0.01 hours is within tolerance.
        let close = extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.51),
        );
        assert!(compare_day(&close, &stored).is_empty());

        // 0.011 is not.
        let off = extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.511),
        );
        let details = compare_day(&off, &stored);
        assert_eq!(details.len(), 1);
        assert!(details[0].starts_with("total_hours mismatch"));
    }

    #[test]
    fn test_compare_day_parse_failures_become_error_details() {
        let record = extracted(
            "03-04-2024",
            "whenever",
            "17:00",
            RawField::Text("half an hour".to_string()),
            RawField::Number(7.5),
        );
        let stored = stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5);
        let details = compare_day(&record, &stored);
        assert_eq!(details.len(), 2);
        assert!(details
            .iter()
            .all(|detail| detail.starts_with("Error comparing record: ")));
    }

    #[test]
    fn test_compare_day_missing_stored_time_is_an_error_detail() {
        let record = extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.5),
        );
        let mut stored = stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5);
        stored.time_in = None;
        let details = compare_day(&record, &stored);
        assert_eq!(
            details,
            vec!["Error comparing record: no time_in value to compare".to_string()]
        );
    }

    // --- reconcile ---

    #[test]
    fn test_reconcile_matching_week() {
        let records = vec![extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.5),
        )];
        let stored = vec![stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5)];

        let result = reconcile(&records, &stored);
        assert!(result.valid);
        assert_eq!(result.message, "Validation completed");
        assert_eq!(result.matches, vec![d("2024-03-04")]);
        assert!(result.mismatched.is_empty());
        assert!(result.missing_from_stored.is_empty());
        assert!(result.missing_from_source.is_empty());
    }

    #[test]
    fn test_reconcile_total_hours_mismatch() {
        let records = vec![extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.5),
        )];
        let stored = vec![stored_day("2024-03-04", "09:00", "17:00", 30.0, 8.0)];

        let result = reconcile(&records, &stored);
        assert!(!result.valid);
        assert_eq!(
            result.message,
            "Discrepancies found between extracted and stored Timesheet entries"
        );
        let mismatch = result.mismatched.get(&d("2024-03-04")).unwrap();
        assert!(mismatch
            .details
            .iter()
            .any(|detail| detail.starts_with("total_hours mismatch")));
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_reconcile_empty_extraction_short_circuits() {
        let stored = vec![stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5)];
        let result = reconcile(&[], &stored);
        assert!(!result.valid);
        assert_eq!(result.message, "No data extracted from image");
        assert!(result.matches.is_empty());
        assert!(result.mismatched.is_empty());
        assert!(result.missing_from_stored.is_empty());
        // Distinct from "every stored day missing from the image".
        assert!(result.missing_from_source.is_empty());
    }

    #[test]
    fn test_reconcile_unreadable_dates_short_circuit_like_empty_input() {
        let records = vec![extracted(
            "sometime in March",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.5),
        )];
        let stored = vec![stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5)];
        let result = reconcile(&records, &stored);
        assert_eq!(result.message, "No data extracted from image");
        assert!(result.missing_from_source.is_empty());
    }

    #[test]
    fn test_reconcile_extracted_date_missing_from_stored() {
        let records = vec![extracted(
            "03-11-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.5),
        )];
        let stored = vec![stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5)];

        let result = reconcile(&records, &stored);
        assert!(!result.valid);
        let missing = result.missing_from_stored.get(&d("2024-03-11")).unwrap();
        assert_eq!(
            missing.details,
            vec!["Record for 2024-03-11 is missing from stored Timesheet data.".to_string()]
        );
        assert!(result
            .message
            .starts_with("Some records are missing from the stored Timesheet data"));
    }

    #[test]
    fn test_reconcile_stored_day_missing_from_image() {
        let records = vec![extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.5),
        )];
        let stored = vec![
            stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5),
            stored_day("2024-03-05", "09:00", "17:00", 30.0, 7.5),
        ];

        let result = reconcile(&records, &stored);
        assert!(!result.valid);
        assert_eq!(result.matches, vec![d("2024-03-04")]);
        let missing = result.missing_from_source.get(&d("2024-03-05")).unwrap();
        assert_eq!(
            missing.details,
            vec!["Stored day for 2024-03-05 is missing from extracted image data.".to_string()]
        );
        assert_eq!(
            result.message,
            "Some days in stored data are missing from the image"
        );
    }

    #[test]
    fn test_reconcile_appends_missing_image_sentence_after_discrepancies() {
        let records = vec![extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(6.0),
        )];
        let stored = vec![
            stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5),
            stored_day("2024-03-05", "09:00", "17:00", 30.0, 7.5),
        ];

        let result = reconcile(&records, &stored);
        assert_eq!(
            result.message,
            "Discrepancies found between extracted and stored Timesheet entries, \
             some days in stored data are missing from the image"
        );
    }

    #[test]
    fn test_reconcile_partition_invariant() {
        let records = vec![
            extracted(
                "03-04-2024",
                "09:00",
                "17:00",
                RawField::Number(30.0),
                RawField::Number(7.5),
            ),
            extracted(
                "03-05-2024",
                "09:00",
                "17:00",
                RawField::Number(30.0),
                RawField::Number(6.0),
            ),
            extracted(
                "03-07-2024",
                "09:00",
                "17:00",
                RawField::Number(30.0),
                RawField::Number(7.5),
            ),
        ];
        let stored = vec![
            stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5),
            stored_day("2024-03-05", "09:00", "17:00", 30.0, 7.5),
            stored_day("2024-03-06", "09:00", "17:00", 30.0, 7.5),
        ];

        let result = reconcile(&records, &stored);

        let mut seen: HashSet<NaiveDate> = HashSet::new();
        for date in &result.matches {
            assert!(seen.insert(*date), "{} classified twice", date);
        }
        for date in result.mismatched.keys() {
            assert!(seen.insert(*date), "{} classified twice", date);
        }
        for date in result.missing_from_stored.keys() {
            assert!(seen.insert(*date), "{} classified twice", date);
        }
        for date in result.missing_from_source.keys() {
            assert!(seen.insert(*date), "{} classified twice", date);
        }

        let union: HashSet<NaiveDate> = [
            d("2024-03-04"),
            d("2024-03-05"),
            d("2024-03-06"),
            d("2024-03-07"),
        ]
        .into_iter()
        .collect();
        assert_eq!(seen, union);

        assert_eq!(result.matches, vec![d("2024-03-04")]);
        assert!(result.mismatched.contains_key(&d("2024-03-05")));
        assert!(result.missing_from_stored.contains_key(&d("2024-03-07")));
        assert!(result.missing_from_source.contains_key(&d("2024-03-06")));
    }

    #[test]
    fn test_reconcile_valid_iff_no_failure_category_is_populated() {
        let matching = vec![extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(7.5),
        )];
        let stored = vec![stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5)];
        let result = reconcile(&matching, &stored);
        assert!(result.valid);
        assert!(
            result.mismatched.is_empty()
                && result.missing_from_stored.is_empty()
                && result.missing_from_source.is_empty()
        );

        let off = vec![extracted(
            "03-04-2024",
            "09:00",
            "17:00",
            RawField::Number(30.0),
            RawField::Number(6.0),
        )];
        let result = reconcile(&off, &stored);
        assert!(!result.valid);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let records = vec![
            extracted(
                "03-04-2024",
                "09:00",
                "17:00",
                RawField::Number(30.0),
                RawField::Number(6.0),
            ),
            extracted(
                "03-07-2024",
                "09:00",
                "17:00",
                RawField::Number(30.0),
                RawField::Number(7.5),
            ),
        ];
        let stored = vec![
            stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5),
            stored_day("2024-03-05", "09:00", "17:00", 30.0, 7.5),
        ];

        let first = reconcile(&records, &stored);
        let second = reconcile(&records, &stored);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reconcile_mixed_date_formats_reconcile_by_calendar_day() {
        let records = vec![
            extracted(
                "2024/03/04",
                "09:00",
                "17:00",
                RawField::Number(30.0),
                RawField::Number(7.5),
            ),
            extracted(
                "05.03.2024",
                "09:00",
                "17:00",
                RawField::Number(30.0),
                RawField::Number(7.5),
            ),
        ];
        let stored = vec![
            stored_day("2024-03-04", "09:00", "17:00", 30.0, 7.5),
            // 05.03.2024 reads as May 3 via the MM.DD.YYYY pattern.
            stored_day("2024-05-03", "09:00", "17:00", 30.0, 7.5),
        ];

        let result = reconcile(&records, &stored);
        assert!(result.valid, "unexpected result: {:?}", result);
        assert_eq!(result.matches.len(), 2);
    }
}
