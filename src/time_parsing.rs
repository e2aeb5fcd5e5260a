// src/time_parsing.rs
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::timesheet::RawField;

/// Date format chain, tried in order. Upstream sources (AI extraction and
/// manual form input) mix all of these freely.
const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d", // YYYY-MM-DD
    "%m-%d-%Y", // MM-DD-YYYY
    "%d-%m-%Y", // DD-MM-YYYY
    "%Y/%m/%d", // YYYY/MM/DD
    "%m/%d/%Y", // MM/DD/YYYY
    "%d/%m/%Y", // DD/MM/YYYY
    "%m.%d.%Y", // MM.DD.YYYY
    "%d.%m.%Y", // DD.MM.YYYY
];

const TIME_FORMATS: [&str; 4] = [
    "%H:%M:%S",    // 24-hour with seconds, e.g. "21:35:00"
    "%H:%M",       // 24-hour, e.g. "21:35" (also covers bare "9:35" as 09:35)
    "%I:%M:%S %p", // 12-hour with seconds, e.g. "9:35:00 PM"
    "%I:%M %p",    // 12-hour, e.g. "9:35 PM"
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}. Use HH:MM or HH:MM AM/PM")]
    Unrecognized(String),
    #[error("no {0} value to compare")]
    Missing(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("invalid duration value: '{0}'")]
    Unrecognized(String),
}

/// Normalize any supported date representation to a calendar date.
///
/// Tries the format chain first, then falls back to splitting the numeric
/// runs on `-`/`/` and locating a four-digit year; the two remaining parts
/// are read as month then day. Returns `None` when the text cannot be read
/// as a date, never panics.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }

    // Fallback: strip everything but digits and separators, then hunt for
    // the year among the remaining runs.
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '/')
        .collect();
    let parts: Vec<&str> = cleaned
        .split(['-', '/'])
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 {
        return None;
    }

    let year_part = *parts.iter().find(|p| p.len() == 4)?;
    let rest: Vec<&str> = parts.iter().filter(|p| **p != year_part).copied().collect();
    if rest.len() != 2 {
        return None;
    }

    let year: i32 = year_part.parse().ok()?;
    let month: u32 = rest[0].parse().ok()?;
    let day: u32 = rest[1].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a time-of-day in 24-hour or 12-hour notation. A bare `HH:MM`
/// without an AM/PM marker reads as 24-hour (so morning values come out
/// as-is, matching the assumed-AM convention).
pub fn parse_time(raw: &str) -> Result<NaiveTime, TimeParseError> {
    let trimmed = raw.trim();
    for fmt in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(trimmed, fmt) {
            return Ok(time);
        }
    }
    Err(TimeParseError::Unrecognized(raw.to_string()))
}

/// Normalize a lunch-break value to minutes.
///
/// `H:MM` converts exactly; a bare number up to 2 reads as hours, anything
/// larger as minutes. The threshold is a known precision limitation carried
/// over from the upstream sources, which mix "30" (minutes) and "0.5"
/// (hours) conventions: "2" reads as two hours while "2.5" reads as two and
/// a half minutes.
pub fn normalize_lunch(raw: &str) -> Result<f64, DurationParseError> {
    let trimmed = raw.trim();
    if let Some((h, m)) = trimmed.split_once(':') {
        let hours: i64 = h
            .trim()
            .parse()
            .map_err(|_| DurationParseError::Unrecognized(raw.to_string()))?;
        let minutes: i64 = m
            .trim()
            .parse()
            .map_err(|_| DurationParseError::Unrecognized(raw.to_string()))?;
        return Ok((hours * 60 + minutes) as f64);
    }

    let num: f64 = trimmed
        .parse()
        .map_err(|_| DurationParseError::Unrecognized(raw.to_string()))?;
    Ok(if num <= 2.0 { num * 60.0 } else { num })
}

/// Read a total-hours value: numbers pass through, `H:MM` converts to
/// fractional hours, anything else must parse as a float.
pub fn parse_hours(value: &RawField) -> Result<f64, DurationParseError> {
    match value {
        RawField::Number(n) => Ok(*n),
        RawField::Text(s) => {
            let trimmed = s.trim();
            if let Some((h, m)) = trimmed.split_once(':') {
                let hours: f64 = h
                    .trim()
                    .parse()
                    .map_err(|_| DurationParseError::Unrecognized(s.clone()))?;
                let minutes: f64 = m
                    .trim()
                    .parse()
                    .map_err(|_| DurationParseError::Unrecognized(s.clone()))?;
                return Ok(hours + minutes / 60.0);
            }
            trimmed
                .parse()
                .map_err(|_| DurationParseError::Unrecognized(s.clone()))
        }
    }
}
