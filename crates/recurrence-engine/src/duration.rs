//! Event length: nominal days plus exact seconds.
//!
//! Day components are calendar days, applied in the event's timezone, so a
//! one-day event starting at 10:00 ends at 10:00 the next day even across a
//! DST change. Hour/minute/second components are exact elapsed time.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::error::RecurrenceError;
use crate::zone::{instant_for, to_local, DstPolicy, ZoneRules};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventDuration {
    days: i64,
    seconds: i64,
}

impl EventDuration {
    pub fn new(days: i64, seconds: i64) -> Self {
        EventDuration { days, seconds }
    }

    pub fn days(days: i64) -> Self {
        EventDuration::new(days, 0)
    }

    pub fn exact(duration: Duration) -> Self {
        EventDuration::new(0, duration.num_seconds())
    }

    pub fn day_count(&self) -> i64 {
        self.days
    }

    pub fn second_count(&self) -> i64 {
        self.seconds
    }

    pub fn is_positive(&self) -> bool {
        self.days >= 0 && self.seconds >= 0 && (self.days > 0 || self.seconds > 0)
    }

    /// Whether the duration is a whole number of days with no time part.
    pub fn is_whole_days(&self) -> bool {
        self.seconds == 0
    }

    /// The end of an occurrence starting at `start` in `zone`.
    pub(crate) fn end_from(
        &self,
        start: DateTime<Utc>,
        zone: &dyn ZoneRules,
    ) -> Option<DateTime<Utc>> {
        let after_days = if self.days == 0 {
            start
        } else {
            let local = to_local(zone, start).checked_add_signed(Duration::try_days(self.days)?)?;
            instant_for(zone, local, DstPolicy::ShiftForward)?
        };
        after_days.checked_add_signed(Duration::try_seconds(self.seconds)?)
    }
}

/// Parse an ISO 8601 duration (`P1W`, `P2D`, `PT1H30M`, `P1DT2H`, `PT45S`).
///
/// Weeks and days are nominal; the time part is exact. Years and months are
/// rejected because their length depends on the start date.
///
/// # Errors
///
/// Returns [`RecurrenceError::InvalidDuration`] for anything else, including
/// signed or all-zero durations.
pub fn parse_iso_duration(s: &str) -> Result<EventDuration, RecurrenceError> {
    let s = s.trim();
    let rest = s
        .strip_prefix('P')
        .or_else(|| s.strip_prefix('p'))
        .ok_or_else(|| RecurrenceError::InvalidDuration(format!("must start with 'P': '{s}'")))?;

    if rest.is_empty() {
        return Err(RecurrenceError::InvalidDuration(format!(
            "duration has no components: '{s}'"
        )));
    }

    let mut days = 0i64;
    let mut seconds = 0i64;
    let mut in_time = false;
    let mut num_buf = String::new();
    let mut found_any = false;

    for ch in rest.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
            continue;
        }
        if ch == 'T' || ch == 't' {
            if in_time || !num_buf.is_empty() {
                return Err(RecurrenceError::InvalidDuration(format!(
                    "misplaced 'T' in '{s}'"
                )));
            }
            in_time = true;
            continue;
        }
        if num_buf.is_empty() {
            return Err(RecurrenceError::InvalidDuration(format!(
                "expected number before '{ch}' in '{s}'"
            )));
        }
        let n: i64 = num_buf
            .parse()
            .map_err(|_| RecurrenceError::InvalidDuration(format!("invalid number in '{s}'")))?;
        num_buf.clear();
        found_any = true;

        match (in_time, ch.to_ascii_uppercase()) {
            (false, 'W') => days = accumulate(days, n, 7, s)?,
            (false, 'D') => days = accumulate(days, n, 1, s)?,
            (true, 'H') => seconds = accumulate(seconds, n, 3600, s)?,
            (true, 'M') => seconds = accumulate(seconds, n, 60, s)?,
            (true, 'S') => seconds = accumulate(seconds, n, 1, s)?,
            (false, 'Y' | 'M') => {
                return Err(RecurrenceError::InvalidDuration(format!(
                    "year and month components are not supported: '{s}'"
                )));
            }
            _ => {
                return Err(RecurrenceError::InvalidDuration(format!(
                    "unknown unit '{ch}' in '{s}'"
                )));
            }
        }
    }

    if !num_buf.is_empty() {
        return Err(RecurrenceError::InvalidDuration(format!(
            "number without unit at end of '{s}'"
        )));
    }
    if !found_any {
        return Err(RecurrenceError::InvalidDuration(format!(
            "no valid components in '{s}'"
        )));
    }

    let duration = EventDuration::new(days, seconds);
    if !duration.is_positive() {
        return Err(RecurrenceError::InvalidDuration(format!(
            "duration must be positive: '{s}'"
        )));
    }
    Ok(duration)
}

fn accumulate(total: i64, n: i64, unit: i64, s: &str) -> Result<i64, RecurrenceError> {
    n.checked_mul(unit)
        .and_then(|x| total.checked_add(x))
        .ok_or_else(|| RecurrenceError::InvalidDuration(format!("duration too large: '{s}'")))
}

impl fmt::Display for EventDuration {
    /// Renders the ISO 8601 form, e.g. `P1DT2H30M`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("P")?;
        if self.days != 0 {
            write!(f, "{}D", self.days)?;
        }
        if self.seconds != 0 || self.days == 0 {
            f.write_str("T")?;
            let hours = self.seconds / 3600;
            let minutes = (self.seconds % 3600) / 60;
            let secs = self.seconds % 60;
            if hours != 0 {
                write!(f, "{hours}H")?;
            }
            if minutes != 0 {
                write!(f, "{minutes}M")?;
            }
            if secs != 0 || self.seconds == 0 {
                write!(f, "{secs}S")?;
            }
        }
        Ok(())
    }
}
