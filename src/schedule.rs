//! Schedule Resolver: turns human-entered date/time expressions into the
//! provider's scheduling timestamp, DST-correct in the target timezone.

use chrono::DateTime;
use chrono::Datelike;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::TimeZone;
use chrono::Utc;
use chrono::Weekday;
use chrono_tz::America::New_York;
use chrono_tz::Tz;

/// All campaign schedules resolve in the provider's reference timezone.
const TARGET_TZ: Tz = New_York;

/// Provider policy: a send may be scheduled at most this far ahead.
const MAX_SCHEDULE_AHEAD_DAYS: i64 = 7;

#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error(
        "could not parse schedule {input:?}; accepted formats: \
         now | 9:30am | 18:45 | tomorrow 9am | next tuesday 9:30am | \
         2026-9-15 9:30am | 9/15/2026 9:30am"
    )]
    Unrecognized { input: String },

    #[error("scheduled time {0} is not in the future")]
    InPast(String),

    #[error("scheduled time {0} is more than {MAX_SCHEDULE_AHEAD_DAYS} days ahead")]
    TooFarAhead(String),

    #[error("stored schedule timestamp {0:?} is malformed")]
    Malformed(String),
}

/// Parse a schedule expression relative to the current instant.
pub fn parse(input: &str) -> Result<DateTime<Tz>, ScheduleError> {
    let normalized = input.trim().to_lowercase();
    let now = Utc::now().with_timezone(&TARGET_TZ);
    parse_at(&normalized, now).ok_or(ScheduleError::Unrecognized {
        input: input.to_string(),
    })
}

/// Serialize a resolved instant in the provider's expected scheduling format
/// (RFC 2822: day-of-week, day, month, year, time, numeric UTC offset).
pub fn provider_format(instant: &DateTime<Tz>) -> String { instant.to_rfc2822() }

/// An absent timestamp is always valid (no scheduling). A present one must
/// re-parse, be strictly in the future, and respect the provider's 7-day
/// ceiling.
pub fn validate(schedule_time: Option<&str>) -> Result<(), ScheduleError> {
    let Some(stored) = schedule_time else {
        return Ok(());
    };

    let instant = DateTime::parse_from_rfc2822(stored)
        .map_err(|_| ScheduleError::Malformed(stored.to_string()))?
        .with_timezone(&Utc);

    let now = Utc::now();
    if instant <= now {
        return Err(ScheduleError::InPast(stored.to_string()));
    }
    if instant - now > Duration::days(MAX_SCHEDULE_AHEAD_DAYS) {
        return Err(ScheduleError::TooFarAhead(stored.to_string()));
    }
    Ok(())
}

/// Grammar evaluation against a fixed `now`, so tests control the clock.
/// Forms are tried in priority order; the first match wins.
fn parse_at(
    input: &str,
    now: DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    if input == "now" {
        return Some(now);
    }

    // bare clock time: today, rolling forward one day once it has passed
    if let Some(time) = parse_clock(input) {
        let today = resolve_local(now.date_naive(), time);
        return match today {
            Some(candidate) if candidate > now => Some(candidate),
            _ => resolve_local(now.date_naive() + Duration::days(1), time),
        };
    }

    // absolute date + clock time; a date with an unparseable clock falls
    // through to the free-form parse
    if let Some((date_part, time_part)) = input.split_once(' ') {
        if let Some(date) = parse_date(date_part) {
            if let Some(time) = parse_clock(time_part.trim()) {
                return resolve_local(date, time);
            }
        }
    }

    if let Some(rest) = input.strip_prefix("tomorrow ") {
        let time = parse_clock(rest.trim())?;
        return resolve_local(now.date_naive() + Duration::days(1), time);
    }

    if let Some(rest) = input.strip_prefix("next ") {
        let (day_part, time_part) = rest.split_once(' ')?;
        let weekday: Weekday = day_part.parse().ok()?;
        let time = parse_clock(time_part.trim())?;

        // strictly after today: the named weekday rolls a full week forward,
        // never same-day
        let mut ahead = i64::from(weekday.num_days_from_monday())
            - i64::from(now.weekday().num_days_from_monday());
        ahead = ahead.rem_euclid(7);
        if ahead == 0 {
            ahead = 7;
        }
        return resolve_local(now.date_naive() + Duration::days(ahead), time);
    }

    freeform(input)
}

/// `%p` implements the 12-hour rules: `12am` is midnight, `pm` adds 12
/// except at 12. Without an am/pm marker the input is read as 24-hour.
fn parse_clock(input: &str) -> Option<NaiveTime> {
    for format in ["%I:%M%p", "%I%p", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(input, format) {
            return Some(time);
        }
    }
    None
}

fn parse_date(input: &str) -> Option<NaiveDate> {
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return Some(date);
        }
    }
    None
}

/// Interpret a wall-clock time in the target timezone. Ambiguous instants
/// (DST fall-back) take the earlier offset; nonexistent ones (spring-forward
/// gap) resolve to nothing.
fn resolve_local(
    date: NaiveDate,
    time: NaiveTime,
) -> Option<DateTime<Tz>> {
    TARGET_TZ.from_local_datetime(&date.and_time(time)).earliest()
}

/// Last-chance parse for inputs outside the grammar.
fn freeform(input: &str) -> Option<DateTime<Tz>> {
    if let Ok(instant) = DateTime::parse_from_rfc2822(input) {
        return Some(instant.with_timezone(&TARGET_TZ));
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(input) {
        return Some(instant.with_timezone(&TARGET_TZ));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return TARGET_TZ.from_local_datetime(&naive).earliest();
        }
    }
    None
}
