//! Live duration and earnings of an active time-tracking session.

use crate::error::TimestampError;
use crate::util::format_earned;
use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Layouts accepted when the timestamp carries an explicit offset and is not
/// strict RFC 3339 (e.g. `+0200` without a colon).
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// How to read a start timestamp that has no `Z` or offset suffix.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimezonePolicy {
    /// The backend emits naive UTC timestamps.
    #[default]
    AssumeUtc,
    AssumeLocal,
    Reject,
}

/// A session the backend reports as running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub start_time: String,
    #[serde(default)]
    pub hourly_rate: f64,
}

impl ActiveSession {
    pub fn new(start_time: impl Into<String>, hourly_rate: f64) -> Self {
        Self {
            start_time: start_time.into(),
            hourly_rate,
        }
    }
}

/// Display values for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub elapsed_secs: u64,
    pub duration: String,
    pub earned: f64,
}

impl SessionSnapshot {
    pub fn earned_display(&self) -> String {
        format_earned(self.earned)
    }
}

/// Source of "now" for the session calculator.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Cell<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Cell::new(now) }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.now
            .set(self.now.get() + chrono::Duration::seconds(secs));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// True when the string ends in `Z`, `±HH:MM` or `±HHMM`.
pub fn has_timezone_marker(ts: &str) -> bool {
    let ts = ts.trim();
    if ts.ends_with('Z') {
        return true;
    }

    let bytes = ts.as_bytes();
    let offset_suffix = |len: usize, colon: bool| {
        if bytes.len() < len {
            return false;
        }
        let tail = &bytes[bytes.len() - len..];
        let digits: [usize; 4] = if colon { [1, 2, 4, 5] } else { [1, 2, 3, 4] };

        matches!(tail[0], b'+' | b'-')
            && (!colon || tail[3] == b':')
            && digits.iter().all(|&i| tail[i].is_ascii_digit())
    };

    offset_suffix(6, true) || offset_suffix(5, false)
}

/// Parse a backend timestamp into an instant, applying `policy` when the
/// string carries no timezone marker.
pub fn parse_timestamp(
    raw: &str,
    policy: TimezonePolicy,
) -> Result<DateTime<Utc>, TimestampError> {
    let ts = raw.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    if has_timezone_marker(ts) {
        return DateTime::parse_from_rfc3339(ts)
            .ok()
            .or_else(|| {
                OFFSET_FORMATS
                    .iter()
                    .find_map(|fmt| DateTime::parse_from_str(ts, fmt).ok())
            })
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| TimestampError::Invalid(ts.to_string()));
    }

    if policy == TimezonePolicy::Reject {
        return Err(TimestampError::MissingTimezone(ts.to_string()));
    }

    let naive = parse_naive(ts).ok_or_else(|| TimestampError::Invalid(ts.to_string()))?;

    match policy {
        TimezonePolicy::AssumeUtc => Ok(Utc.from_utc_datetime(&naive)),
        TimezonePolicy::AssumeLocal => match Local.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => Err(TimestampError::NonexistentLocal(ts.to_string())),
        },
        TimezonePolicy::Reject => Err(TimestampError::MissingTimezone(ts.to_string())),
    }
}

fn parse_naive(ts: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(ts, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(ts, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// `HH:MM:SS`; hours keep counting past 24.
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Elapsed time and earnings between two instants. A start in the future
/// yields zeros.
pub fn compute_snapshot(
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    hourly_rate: f64,
) -> SessionSnapshot {
    let diff_secs = now
        .signed_duration_since(start)
        .num_milliseconds()
        .div_euclid(1000);

    let elapsed_secs = if diff_secs < 0 {
        log::debug!(
            "session start {} is {}s after now, clamping to zero",
            start.to_rfc3339(),
            -diff_secs
        );
        0
    } else {
        diff_secs as u64
    };

    SessionSnapshot {
        elapsed_secs,
        duration: format_duration(elapsed_secs),
        earned: elapsed_secs as f64 / 3600.0 * hourly_rate,
    }
}

/// One evaluation of a session given its raw start timestamp.
pub fn elapsed_snapshot(
    start_time: &str,
    now: DateTime<Utc>,
    hourly_rate: f64,
    policy: TimezonePolicy,
) -> Result<SessionSnapshot, TimestampError> {
    let start = parse_timestamp(start_time, policy)?;
    Ok(compute_snapshot(start, now, hourly_rate))
}

/// Per-view state of a running session: recomputed on every tick, keeping the
/// last good snapshot when a tick cannot be evaluated.
#[derive(Debug, Clone)]
pub struct SessionTimer {
    session: ActiveSession,
    policy: TimezonePolicy,
    last: Option<SessionSnapshot>,
}

impl SessionTimer {
    pub fn new(session: ActiveSession, policy: TimezonePolicy) -> Self {
        Self {
            session,
            policy,
            last: None,
        }
    }

    pub fn session(&self) -> &ActiveSession {
        &self.session
    }

    pub fn last(&self) -> Option<&SessionSnapshot> {
        self.last.as_ref()
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<&SessionSnapshot> {
        match elapsed_snapshot(
            &self.session.start_time,
            now,
            self.session.hourly_rate,
            self.policy,
        ) {
            Ok(snapshot) => self.last = Some(snapshot),
            Err(e) => log::warn!("skipping session tick: {}", e),
        }

        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_timezone_marker_detection() {
        assert!(has_timezone_marker("2024-01-01T10:00:00Z"));
        assert!(has_timezone_marker("2024-01-01T10:00:00+02:00"));
        assert!(has_timezone_marker("2024-01-01T10:00:00-0530"));
        assert!(has_timezone_marker("2024-01-01T10:00:00.123456+00:00"));
        assert!(!has_timezone_marker("2024-01-01T10:00:00"));
        assert!(!has_timezone_marker("2024-01-01T10:00:00.5"));
        assert!(!has_timezone_marker("2024-01-01"));
    }

    #[test]
    fn test_parse_naive_assumes_utc() {
        let parsed = parse_timestamp("2024-01-01T10:00:00", TimezonePolicy::AssumeUtc).unwrap();
        assert_eq!(parsed, utc("2024-01-01T10:00:00Z"));
    }

    #[test]
    fn test_parse_offsets() {
        let expected = utc("2024-01-01T08:00:00Z");
        for ts in [
            "2024-01-01T10:00:00+02:00",
            "2024-01-01T10:00:00+0200",
            "2024-01-01 10:00:00+0200",
            "2024-01-01T08:00:00Z",
        ] {
            assert_eq!(
                parse_timestamp(ts, TimezonePolicy::Reject).unwrap(),
                expected,
                "{ts}"
            );
        }
    }

    #[test]
    fn test_parse_fractional_and_space_separated() {
        let parsed =
            parse_timestamp("2024-01-01 10:00:00.250", TimezonePolicy::AssumeUtc).unwrap();
        assert_eq!(parsed, utc("2024-01-01T10:00:00.250Z"));
    }

    #[test]
    fn test_parse_date_only_is_midnight() {
        let parsed = parse_timestamp("2024-03-05", TimezonePolicy::AssumeUtc).unwrap();
        assert_eq!(parsed, utc("2024-03-05T00:00:00Z"));
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(
            parse_timestamp("   ", TimezonePolicy::AssumeUtc),
            Err(TimestampError::Empty)
        );
        assert_matches!(
            parse_timestamp("yesterday", TimezonePolicy::AssumeUtc),
            Err(TimestampError::Invalid(_))
        );
        assert_matches!(
            parse_timestamp("2024-13-45T99:00:00Z", TimezonePolicy::AssumeUtc),
            Err(TimestampError::Invalid(_))
        );
        assert_matches!(
            parse_timestamp("2024-01-01T10:00:00", TimezonePolicy::Reject),
            Err(TimestampError::MissingTimezone(_))
        );
    }

    #[test]
    fn test_assume_local_matches_local_offset() {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        let parsed = parse_timestamp("2024-01-15T12:00:00", TimezonePolicy::AssumeLocal).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(3661), "01:01:01");
        assert_eq!(format_duration(59), "00:00:59");
        // no day rollover
        assert_eq!(format_duration(26 * 3600 + 5), "26:00:05");
        assert_eq!(format_duration(100 * 3600), "100:00:00");
    }

    #[test]
    fn test_snapshot_one_hour_one_minute_one_second() {
        let now = utc("2024-06-01T12:00:00Z");
        let start = now - chrono::Duration::seconds(3661);
        let snapshot = compute_snapshot(start, now, 0.0);
        assert_eq!(snapshot.duration, "01:01:01");
        assert_eq!(snapshot.elapsed_secs, 3661);
    }

    #[test]
    fn test_snapshot_naive_start_against_utc_now() {
        let snapshot = elapsed_snapshot(
            "2024-01-01T10:00:00",
            utc("2024-01-01T10:00:10Z"),
            15.0,
            TimezonePolicy::AssumeUtc,
        )
        .unwrap();
        assert_eq!(snapshot.duration, "00:00:10");
    }

    #[test]
    fn test_snapshot_future_start_clamps_to_zero() {
        let snapshot = elapsed_snapshot(
            "2024-01-01T10:05:00Z",
            utc("2024-01-01T10:00:00Z"),
            42.0,
            TimezonePolicy::AssumeUtc,
        )
        .unwrap();
        assert_eq!(snapshot.duration, "00:00:00");
        assert_eq!(snapshot.elapsed_secs, 0);
        assert_eq!(snapshot.earned, 0.0);
    }

    #[test]
    fn test_snapshot_earnings() {
        let now = utc("2024-01-01T11:00:00Z");
        let snapshot = compute_snapshot(utc("2024-01-01T10:00:00Z"), now, 20.0);
        assert_eq!(snapshot.elapsed_secs, 3600);
        assert_eq!(snapshot.earned, 20.0);
        assert_eq!(snapshot.earned_display(), "20.00");
    }

    #[test]
    fn test_snapshot_floors_partial_seconds() {
        let start = utc("2024-01-01T10:00:00.900Z");
        let now = utc("2024-01-01T10:00:02.100Z");
        assert_eq!(compute_snapshot(start, now, 0.0).elapsed_secs, 1);

        // -0.2s floors to -1 and clamps
        let snapshot = compute_snapshot(now, utc("2024-01-01T10:00:01.900Z"), 10.0);
        assert_eq!(snapshot.elapsed_secs, 0);
    }

    #[test]
    fn test_timer_keeps_last_good_snapshot() {
        let clock = FixedClock::new(utc("2024-01-01T10:00:05Z"));
        let mut timer = SessionTimer::new(
            ActiveSession::new("2024-01-01T10:00:00Z", 36.0),
            TimezonePolicy::AssumeUtc,
        );
        assert!(timer.last().is_none());

        let first = timer.tick(clock.now()).cloned().unwrap();
        assert_eq!(first.duration, "00:00:05");
        assert_eq!(first.earned_display(), "0.05");

        clock.advance_secs(1);
        timer.session.start_time = "not a time".to_string();
        assert_eq!(timer.tick(clock.now()), Some(&first));
    }

    #[test]
    fn test_timer_with_bad_start_shows_nothing() {
        let mut timer = SessionTimer::new(ActiveSession::new("", 10.0), TimezonePolicy::AssumeUtc);
        assert!(timer.tick(Utc::now()).is_none());
    }

    #[test]
    fn test_active_session_from_backend_json() {
        let session: ActiveSession =
            serde_json::from_str(r#"{"startTime":"2024-01-01T10:00:00","hourlyRate":12.5}"#)
                .unwrap();
        assert_eq!(session, ActiveSession::new("2024-01-01T10:00:00", 12.5));

        let no_rate: ActiveSession =
            serde_json::from_str(r#"{"startTime":"2024-01-01T10:00:00"}"#).unwrap();
        assert_eq!(no_rate.hourly_rate, 0.0);
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(TimezonePolicy::AssumeUtc.to_string(), "assume_utc");
        assert_eq!(TimezonePolicy::default(), TimezonePolicy::AssumeUtc);
    }
}
