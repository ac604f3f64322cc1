// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use chrono::NaiveDateTime;
use chrono::NaiveTime;

/// Parse a schedule clock string like `"9:05 AM"` or `"10:30 pm BST"`.
///
/// `"---"` and empty strings mean the train does not call, and any string
/// chrono cannot read is treated the same way. Parse failure is never an
/// error here: a malformed clock must not take down the rest of a route.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "---" {
        return None;
    }

    let without_zone = trimmed.strip_suffix(" BST").unwrap_or(trimmed).trim();

    NaiveTime::parse_from_str(without_zone, "%I:%M %p").ok()
}

/// Anchor a schedule clock to the date of `now`. All position math is
/// a time-of-day comparison against "today"; the schedule carries no dates.
pub fn parse_schedule_time(raw: Option<&str>, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let clock = parse_clock(raw?)?;
    Some(now.date().and_time(clock))
}

pub fn format_iso(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Read back an ISO local timestamp, with or without fractional seconds.
pub fn parse_iso(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Render a positive minute count the way the mobile client shows it:
/// `"2h 5m"`, or `"45m"` under an hour.
pub fn format_minutes(total_minutes: i64) -> String {
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
