//! Date handling for listing rows and run windows.
//!
//! Topic listings show the last post either as a time of day (the post is
//! from today) or as a short `M/D/YY` date whose month and day fields may be
//! one or two digits wide. [`parse_display_date`] turns either form into a
//! calendar date and [`bucket_key`] maps that date onto its month bucket.
//!
//! # Two-digit years
//!
//! `%y` resolves `00..=69` to the 2000s and `70..=99` to the 1900s. A listing
//! showing `9/2/38` therefore parses as 2038, which is in the future, so any
//! two-digit year after the current year is moved back a century. This is an
//! approximation: a post from 1925 shown as `25` would land in 2025 once the
//! current year reaches 2025.

use crate::error::{ArchiveError, Result};
use crate::models::{BucketKey, DateWindow};
use chrono::{Datelike, Days, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

static TIME_OF_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-1]?[0-9]{1,2}:[0-5][0-9] (AM|PM)\b").expect("time-of-day pattern")
});

static DISPLAY_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9]{1,2}/[0-9]{1,2}/[0-9]{2,4}\b").expect("display date pattern")
});

const ISO_DATE: &str = "%Y-%m-%d";

/// Parse the text of a listing's last-post cell.
///
/// `today` stands in for "now": a bare time of day resolves to it, and it is
/// the reference year for the two-digit-year correction.
pub fn parse_display_date(text: &str, today: NaiveDate) -> Result<NaiveDate> {
    let text = text.trim();
    let parse_error = || ArchiveError::DateTimeParse {
        text: text.to_string(),
    };

    if TIME_OF_DAY.is_match(text) {
        return Ok(today);
    }

    let found = DISPLAY_DATE.find(text).ok_or_else(parse_error)?.as_str();
    let fields: Vec<&str> = found.split('/').collect();
    let [month, day, year] = fields.as_slice() else {
        return Err(parse_error());
    };

    let month_day = match (month.len(), day.len()) {
        (1, 1) => "%-m/%-d",
        (1, 2) => "%-m/%d",
        (2, 1) => "%m/%-d",
        (2, 2) => "%m/%d",
        _ => return Err(parse_error()),
    };
    let (year_format, two_digit_year) = match year.len() {
        2 => ("%y", true),
        4 => ("%Y", false),
        _ => return Err(parse_error()),
    };

    let format = format!("{month_day}/{year_format}");
    let parsed = NaiveDate::parse_from_str(found, &format).map_err(|_| parse_error())?;

    if two_digit_year && parsed.year() > today.year() {
        let corrected = parsed
            .with_year(parsed.year() - 100)
            .ok_or_else(parse_error)?;
        debug!(%text, %parsed, %corrected, "Moved future two-digit year back a century");
        return Ok(corrected);
    }
    Ok(parsed)
}

/// Month bucket for a post date.
pub fn bucket_key(date: NaiveDate) -> BucketKey {
    BucketKey::from_date(date)
}

/// Parse a `YYYY-MM-DD` command-line date.
pub fn parse_iso_date(field: &'static str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), ISO_DATE).map_err(|_| ArchiveError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

/// Turn optional command-line bounds into a concrete window.
///
/// - missing start: the day before `today`
/// - missing end, or an end after `today`: `today`
/// - equal bounds: start moves one month before end
/// - start after end: [`ArchiveError::InvalidWindow`]
pub fn resolve_window(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<DateWindow> {
    let mut start_date = match start.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => parse_iso_date("start", value)?,
        None => {
            let yesterday = today - Days::new(1);
            info!(%yesterday, "Start date empty; using the day before today");
            yesterday
        }
    };

    let end_date = match end.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => {
            let parsed = parse_iso_date("end", value)?;
            if parsed > today {
                info!(requested = %parsed, %today, "End date is in the future; using today");
                today
            } else {
                parsed
            }
        }
        None => {
            info!(%today, "End date empty; using today");
            today
        }
    };

    if start_date == end_date {
        start_date = end_date
            .checked_sub_months(Months::new(1))
            .unwrap_or(end_date);
        info!(start = %start_date, end = %end_date, "Start equalled end; widened window to one month");
    }

    DateWindow::new(start_date, end_date)
}

/// First day of the month containing `date`.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Split `start..=end` into calendar-month spans.
///
/// Each span starts on the 1st of a month and ends on the 1st of the
/// following month, except the last, which ends at `end` when that is
/// sooner.
pub fn month_spans(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut spans = Vec::new();
    let mut cursor = first_of_month(start);
    while cursor <= end {
        let Some(next) = cursor.checked_add_months(Months::new(1)) else {
            break;
        };
        spans.push((cursor, next.min(end)));
        cursor = next;
    }
    spans
}
