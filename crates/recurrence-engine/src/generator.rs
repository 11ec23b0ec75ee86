//! Lazy occurrence generation: rule + anchor → ascending candidate starts.
//!
//! [`OccurrenceGenerator`] is a pull-based cursor. Each time its buffer runs
//! dry it expands exactly one period (one year, month, week, day, or one
//! sub-daily step) into the dates the rule selects there, applies BYSETPOS,
//! resolves the wall-clock times through the event's zone, drops exclusions,
//! and buffers what is left. Nothing past the current period is computed, so
//! unbounded rules are safe to consume partially.
//!
//! # Civil time
//!
//! YEARLY, MONTHLY, WEEKLY and DAILY rules step calendar dates in the event's
//! timezone and re-attach the anchor's wall-clock time, so a 09:00 daily event
//! stays at 09:00 local across DST changes. SECONDLY, MINUTELY and HOURLY
//! rules step elapsed time from the anchor instant and test date selectors
//! against the local date of each step.
//!
//! # Termination
//!
//! The sequence ends when COUNT occurrences have been emitted (exclusions do
//! not count), when a candidate passes UNTIL, when a candidate reaches the
//! horizon, when dates leave chrono's range, or once nothing has been
//! emitted for a long calendar span (see [`DEFAULT_MAX_BARREN_YEARS`]).

use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday,
};

use crate::event::BaseEvent;
use crate::exceptions::{ExRuleCursor, ExceptionSet};
use crate::rule::{Frequency, RecurrenceRule, Until, WeekdaySelector};
use crate::zone::{instant_for, to_local, DstPolicy, ZoneRules};

/// Years of consecutive empty periods after which a series is considered
/// exhausted. The Gregorian calendar repeats every 400 years, so a rule that
/// matches nothing across a full cycle never will.
pub const DEFAULT_MAX_BARREN_YEARS: u32 = 400;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    local: NaiveDateTime,
    instant: DateTime<Utc>,
}

/// One expanded period: its candidates, the local date it starts on, and
/// the index of the period to expand next.
#[derive(Debug)]
struct Period {
    candidates: Vec<Candidate>,
    start: NaiveDate,
    next: u64,
}

#[derive(Debug)]
pub struct OccurrenceGenerator {
    rule: RecurrenceRule,
    zone: Arc<dyn ZoneRules>,
    anchor: DateTime<Utc>,
    anchor_local: NaiveDateTime,
    /// First day of the week (per WKST) containing the anchor.
    week_origin: NaiveDate,
    exceptions: ExceptionSet,
    ex_cursor: Option<Box<ExRuleCursor>>,
    horizon: Option<DateTime<Utc>>,
    dst_policy: DstPolicy,
    max_barren_years: u32,
    period: u64,
    buffer: VecDeque<DateTime<Utc>>,
    emitted: u32,
    /// Start of the first period in the current run of empty ones.
    barren_since: Option<NaiveDate>,
    finished: bool,
    cut_off: bool,
}

impl OccurrenceGenerator {
    /// A generator for `rule` anchored at `base`'s start and zone, excluding
    /// whatever `exceptions` matches.
    pub fn new(base: &BaseEvent, rule: &RecurrenceRule, exceptions: &ExceptionSet) -> Self {
        Self::anchored(
            rule.clone(),
            base.shared_zone(),
            base.start(),
            exceptions.clone(),
        )
    }

    fn anchored(
        rule: RecurrenceRule,
        zone: Arc<dyn ZoneRules>,
        anchor: DateTime<Utc>,
        exceptions: ExceptionSet,
    ) -> Self {
        let anchor_local = to_local(zone.as_ref(), anchor);
        let anchor_date = anchor_local.date();
        let offset = days_from_week_start(anchor_date.weekday(), rule.week_start());
        let week_origin = anchor_date
            .checked_sub_days(Days::new(offset))
            .unwrap_or(anchor_date);

        OccurrenceGenerator {
            rule,
            zone,
            anchor,
            anchor_local,
            week_origin,
            exceptions,
            ex_cursor: None,
            horizon: None,
            dst_policy: DstPolicy::default(),
            max_barren_years: DEFAULT_MAX_BARREN_YEARS,
            period: 0,
            buffer: VecDeque::new(),
            emitted: 0,
            barren_since: None,
            finished: false,
            cut_off: false,
        }
    }

    /// Stop before the first candidate at or after `horizon`.
    #[must_use]
    pub fn with_horizon(mut self, horizon: DateTime<Utc>) -> Self {
        self.horizon = Some(horizon);
        self
    }

    #[must_use]
    pub fn with_dst_policy(mut self, policy: DstPolicy) -> Self {
        self.dst_policy = policy;
        self
    }

    #[must_use]
    pub fn with_max_barren_years(mut self, years: u32) -> Self {
        self.max_barren_years = years.max(1);
        self
    }

    /// Whether the series was abandoned after a long run of empty periods
    /// rather than ending naturally.
    pub fn was_cut_off(&self) -> bool {
        self.cut_off
    }

    /// Expand the next period into the buffer.
    fn fill(&mut self) {
        if self.rule.count().is_some_and(|count| self.emitted >= count) {
            self.finished = true;
            return;
        }

        let Some(period) = self.period_candidates(self.period) else {
            self.finished = true;
            return;
        };
        self.period = period.next;

        let mut produced = false;
        for candidate in period.candidates {
            if candidate.instant < self.anchor {
                continue;
            }
            if self.past_until(&candidate) || self.horizon.is_some_and(|h| candidate.instant >= h)
            {
                self.finished = true;
                break;
            }
            if self.is_excluded(&candidate) {
                continue;
            }
            self.buffer.push_back(candidate.instant);
            self.emitted += 1;
            produced = true;
            if self.rule.count().is_some_and(|count| self.emitted >= count) {
                self.finished = true;
                break;
            }
        }

        if produced {
            self.barren_since = None;
            return;
        }
        let since = *self.barren_since.get_or_insert(period.start);
        let span = i64::from(period.start.year()) - i64::from(since.year());
        if span >= i64::from(self.max_barren_years) && !self.finished {
            tracing::warn!(
                rule = %self.rule,
                since = %since,
                years = self.max_barren_years,
                "recurrence produced no occurrences for too long; stopping"
            );
            self.finished = true;
            self.cut_off = true;
        }
    }

    fn past_until(&self, candidate: &Candidate) -> bool {
        match self.rule.until() {
            None => false,
            Some(Until::Utc(until)) => candidate.instant > until,
            Some(Until::Local(until)) => candidate.local > until,
            Some(Until::Date(until)) => candidate.local.date() > until,
        }
    }

    fn is_excluded(&mut self, candidate: &Candidate) -> bool {
        if self
            .exceptions
            .matches_ex_date(candidate.instant, candidate.local.date())
        {
            return true;
        }
        let Some(ex_rule) = self.exceptions.ex_rule() else {
            return false;
        };
        if self.ex_cursor.is_none() {
            let series = self.sibling(ex_rule.clone());
            self.ex_cursor = Some(Box::new(ExRuleCursor::new(series)));
        }
        self.ex_cursor
            .as_mut()
            .is_some_and(|cursor| cursor.matches(candidate.instant))
    }

    /// A generator for another rule sharing this one's anchor and settings,
    /// with no exclusions of its own.
    fn sibling(&self, rule: RecurrenceRule) -> OccurrenceGenerator {
        let mut sibling =
            Self::anchored(rule, Arc::clone(&self.zone), self.anchor, ExceptionSet::new());
        sibling.horizon = self.horizon;
        sibling.dst_policy = self.dst_policy;
        sibling.max_barren_years = self.max_barren_years;
        sibling
    }

    // ── Period expansion ────────────────────────────────────────────────

    /// Candidates for `period`, ascending. `None` once calendar arithmetic
    /// leaves chrono's range.
    fn period_candidates(&self, period: u64) -> Option<Period> {
        let step = period.checked_mul(u64::from(self.rule.interval()))?;
        if self.rule.frequency().is_sub_daily() {
            return self.sub_daily_candidate(period, step);
        }

        let time = self.anchor_local.time();
        let (start, dates) = self.period_dates(step)?;
        let mut locals: Vec<NaiveDateTime> = dates
            .into_iter()
            .map(|date| date.and_time(time))
            .collect();
        locals.sort_unstable();
        locals.dedup();
        if !self.rule.by_set_pos().is_empty() {
            locals = select_positions(&locals, self.rule.by_set_pos());
        }

        let mut candidates: Vec<Candidate> = locals
            .into_iter()
            .filter_map(|local| {
                // The anchor keeps its own instant even when it is the later
                // half of a fold.
                if local == self.anchor_local {
                    return Some(Candidate {
                        local,
                        instant: self.anchor,
                    });
                }
                instant_for(self.zone.as_ref(), local, self.dst_policy)
                    .map(|instant| Candidate { local, instant })
            })
            .collect();
        candidates.sort_by_key(|c| c.instant);
        Some(Period {
            candidates,
            start,
            next: period + 1,
        })
    }

    /// First day of the period `step` frequency units after the anchor's,
    /// and the dates selected in it.
    fn period_dates(&self, step: u64) -> Option<(NaiveDate, Vec<NaiveDate>)> {
        let anchor_date = self.anchor_local.date();
        match self.rule.frequency() {
            Frequency::Yearly => {
                let year = i64::from(anchor_date.year()).checked_add(i64::try_from(step).ok()?)?;
                if year > i64::from(NaiveDate::MAX.year()) {
                    return None;
                }
                let year = i32::try_from(year).ok()?;
                Some((NaiveDate::from_ymd_opt(year, 1, 1)?, self.year_dates(year)))
            }
            Frequency::Monthly => {
                let month_index = i64::from(anchor_date.year()) * 12
                    + i64::from(anchor_date.month0())
                    + i64::try_from(step).ok()?;
                let year = i32::try_from(month_index.div_euclid(12)).ok()?;
                if year > NaiveDate::MAX.year() {
                    return None;
                }
                let month = u32::try_from(month_index.rem_euclid(12)).ok()? + 1;
                let first = NaiveDate::from_ymd_opt(year, month, 1)?;
                if !self.month_allowed(month) {
                    return Some((first, Vec::new()));
                }
                Some((first, self.month_dates(year, month)))
            }
            Frequency::Weekly => {
                let week_start = self
                    .week_origin
                    .checked_add_days(Days::new(step.checked_mul(7)?))?;
                let mut dates = Vec::with_capacity(7);
                for offset in 0..7 {
                    let date = week_start.checked_add_days(Days::new(offset))?;
                    let selected = if self.rule.by_day().is_empty() {
                        date.weekday() == anchor_date.weekday()
                    } else {
                        self.rule.by_day().iter().any(|s| s.weekday == date.weekday())
                    };
                    if selected && self.passes_limits(date, false) {
                        dates.push(date);
                    }
                }
                Some((week_start, dates))
            }
            Frequency::Daily => {
                let date = anchor_date.checked_add_days(Days::new(step))?;
                let dates = if self.passes_limits(date, true) {
                    vec![date]
                } else {
                    Vec::new()
                };
                Some((date, dates))
            }
            Frequency::Hourly | Frequency::Minutely | Frequency::Secondly => {
                Some((anchor_date, Vec::new()))
            }
        }
    }

    fn year_dates(&self, year: i32) -> Vec<NaiveDate> {
        let rule = &self.rule;
        if !rule.by_day().is_empty() && rule.by_month().is_empty() && rule.by_month_day().is_empty()
        {
            // Weekdays across the whole year; ordinals count within the year.
            return match (
                NaiveDate::from_ymd_opt(year, 1, 1),
                NaiveDate::from_ymd_opt(year, 12, 31),
            ) {
                (Some(first), Some(last)) => expand_weekdays(first, last, rule.by_day()),
                _ => Vec::new(),
            };
        }

        let months: Vec<u32> = if !rule.by_month().is_empty() {
            rule.by_month().iter().map(|&m| u32::from(m)).collect()
        } else if !rule.by_day().is_empty() || !rule.by_month_day().is_empty() {
            (1..=12).collect()
        } else {
            vec![self.anchor_local.month()]
        };
        months
            .into_iter()
            .flat_map(|month| self.month_dates(year, month))
            .collect()
    }

    fn month_dates(&self, year: i32, month: u32) -> Vec<NaiveDate> {
        let rule = &self.rule;
        let Some((first, last)) = month_bounds(year, month) else {
            return Vec::new();
        };

        if !rule.by_month_day().is_empty() {
            let mut dates: Vec<NaiveDate> = rule
                .by_month_day()
                .iter()
                .filter_map(|&day| resolve_month_day(day, last.day()))
                .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
                .collect();
            if !rule.by_day().is_empty() {
                let allowed = expand_weekdays(first, last, rule.by_day());
                dates.retain(|date| allowed.contains(date));
            }
            dates
        } else if !rule.by_day().is_empty() {
            expand_weekdays(first, last, rule.by_day())
        } else {
            NaiveDate::from_ymd_opt(year, month, self.anchor_local.day())
                .into_iter()
                .collect()
        }
    }

    fn month_allowed(&self, month: u32) -> bool {
        self.rule.by_month().is_empty()
            || self
                .rule
                .by_month()
                .iter()
                .any(|&m| u32::from(m) == month)
    }

    /// BYMONTH / BYMONTHDAY (and, when `check_weekday`, BYDAY) used as
    /// filters rather than expanders.
    fn passes_limits(&self, date: NaiveDate, check_weekday: bool) -> bool {
        if !self.month_allowed(date.month()) {
            return false;
        }
        if !self.rule.by_month_day().is_empty() {
            let Some((_, last)) = month_bounds(date.year(), date.month()) else {
                return false;
            };
            let matched = self
                .rule
                .by_month_day()
                .iter()
                .any(|&day| resolve_month_day(day, last.day()) == Some(date.day()));
            if !matched {
                return false;
            }
        }
        if check_weekday && !self.rule.by_day().is_empty() {
            return self
                .rule
                .by_day()
                .iter()
                .any(|s| s.weekday == date.weekday());
        }
        true
    }

    /// Sub-daily steps are exact elapsed time from the anchor. A step whose
    /// local date fails the date selectors, or is an excluded date, fast-forwards
    /// to the first step on the next local day.
    fn sub_daily_candidate(&self, period: u64, step: u64) -> Option<Period> {
        let unit = match self.rule.frequency() {
            Frequency::Hourly => 3600,
            Frequency::Minutely => 60,
            _ => 1,
        };
        let elapsed = i64::try_from(step).ok()?.checked_mul(unit)?;
        let instant = self
            .anchor
            .checked_add_signed(Duration::try_seconds(elapsed)?)?;
        let local = to_local(self.zone.as_ref(), instant);

        let date = local.date();
        if self.passes_limits(date, true) && !self.exceptions.excludes_date(date) {
            let mut selected = vec![Candidate { local, instant }];
            if !self.rule.by_set_pos().is_empty() {
                selected = select_positions(&selected, self.rule.by_set_pos());
            }
            return Some(Period {
                candidates: selected,
                start: date,
                next: period + 1,
            });
        }

        let next = date
            .succ_opt()
            .map(|date| date.and_time(NaiveTime::MIN))
            .and_then(|midnight| instant_for(self.zone.as_ref(), midnight, DstPolicy::ShiftForward))
            .and_then(|midnight| {
                let until_midnight = (midnight - self.anchor).num_seconds();
                let stride = unit.checked_mul(i64::from(self.rule.interval()))?;
                u64::try_from((until_midnight + stride - 1).div_euclid(stride)).ok()
            })
            .map_or(period + 1, |next| next.max(period + 1));
        Some(Period {
            candidates: Vec::new(),
            start: date,
            next,
        })
    }
}

impl Iterator for OccurrenceGenerator {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(instant) = self.buffer.pop_front() {
                return Some(instant);
            }
            if self.finished {
                return None;
            }
            self.fill();
        }
    }
}

impl FusedIterator for OccurrenceGenerator {}

// ── Calendar helpers ────────────────────────────────────────────────────────

/// How many days `weekday` is from the week-start day.
fn days_from_week_start(weekday: Weekday, week_start: Weekday) -> u64 {
    u64::from((weekday.num_days_from_monday() + 7 - week_start.num_days_from_monday()) % 7)
}

/// First and last day of a month.
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (ny, nm) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    let last = match NaiveDate::from_ymd_opt(ny, nm, 1) {
        Some(first_next) => first_next.pred_opt()?,
        // December of the last representable year.
        None => NaiveDate::from_ymd_opt(year, 12, 31)?,
    };
    Some((first, last))
}

/// BYMONTHDAY value → day of month, counting negatives from the end.
fn resolve_month_day(day: i8, month_len: u32) -> Option<u32> {
    let day = i64::from(day);
    let resolved = if day > 0 {
        day
    } else {
        i64::from(month_len) + 1 + day
    };
    u32::try_from(resolved)
        .ok()
        .filter(|d| (1..=month_len).contains(d))
}

/// All dates in `[first, last]` matched by `selectors`, ascending.
///
/// A selector without an ordinal matches every such weekday in the range;
/// `n` picks the nth from the start and `-n` the nth from the end.
fn expand_weekdays(first: NaiveDate, last: NaiveDate, selectors: &[WeekdaySelector]) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for selector in selectors {
        let matching = weekdays_in_range(first, last, selector.weekday);
        match selector.ordinal {
            None => dates.extend(matching),
            Some(n) => {
                let index = if n > 0 {
                    usize::try_from(n - 1).ok()
                } else {
                    matching.len().checked_sub(usize::from(n.unsigned_abs()))
                };
                if let Some(date) = index.and_then(|i| matching.get(i)) {
                    dates.push(*date);
                }
            }
        }
    }
    dates.sort_unstable();
    dates.dedup();
    dates
}

/// Every `weekday` in `[first, last]`.
fn weekdays_in_range(first: NaiveDate, last: NaiveDate, weekday: Weekday) -> Vec<NaiveDate> {
    let diff = (weekday.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;
    let mut dates = Vec::new();
    let mut current = first.checked_add_days(Days::new(u64::from(diff)));
    while let Some(date) = current {
        if date > last {
            break;
        }
        dates.push(date);
        current = date.checked_add_days(Days::new(7));
    }
    dates
}

/// BYSETPOS: pick 1-based positions (negative from the end) out of a sorted
/// period set, keeping ascending order.
fn select_positions<T: Copy>(items: &[T], positions: &[i16]) -> Vec<T> {
    let len = items.len() as i64;
    let mut picked: Vec<usize> = positions
        .iter()
        .filter_map(|&pos| {
            let index = if pos > 0 {
                i64::from(pos) - 1
            } else {
                len + i64::from(pos)
            };
            usize::try_from(index).ok().filter(|&i| i < items.len())
        })
        .collect();
    picked.sort_unstable();
    picked.dedup();
    picked.into_iter().map(|i| items[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::EventDuration;
    use crate::zone::tests::spring_forward;
    use crate::zone::{IanaZones, StaticZones};
    use chrono::{TimeZone, Timelike};

    fn event(start: DateTime<Utc>, tz: &str) -> BaseEvent {
        BaseEvent::builder(start, tz)
            .duration(EventDuration::new(0, 3600))
            .build(&IanaZones)
            .unwrap()
    }

    fn expand(start: DateTime<Utc>, rule: &str, limit: usize) -> Vec<DateTime<Utc>> {
        let rule: RecurrenceRule = rule.parse().unwrap();
        OccurrenceGenerator::new(&event(start, "UTC"), &rule, &ExceptionSet::new())
            .take(limit)
            .collect()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn dates(instants: &[DateTime<Utc>]) -> Vec<String> {
        instants
            .iter()
            .map(|t| t.format("%Y-%m-%d").to_string())
            .collect()
    }

    // ── frequencies ─────────────────────────────────────────────────────

    #[test]
    fn test_daily_count() {
        let got = expand(utc(2024, 1, 1, 9), "FREQ=DAILY;COUNT=3", 10);
        assert_eq!(got, vec![utc(2024, 1, 1, 9), utc(2024, 1, 2, 9), utc(2024, 1, 3, 9)]);
    }

    #[test]
    fn test_daily_interval() {
        let got = expand(utc(2024, 1, 1, 9), "FREQ=DAILY;INTERVAL=10;COUNT=3", 10);
        assert_eq!(dates(&got), ["2024-01-01", "2024-01-11", "2024-01-21"]);
    }

    #[test]
    fn test_weekly_byday_scenario() {
        let got = expand(utc(2024, 1, 1, 9), "FREQ=WEEKLY;BYDAY=MO,WE;COUNT=4", 10);
        assert_eq!(dates(&got), ["2024-01-01", "2024-01-03", "2024-01-08", "2024-01-10"]);
        assert!(got.iter().all(|t| t.hour() == 9));
    }

    #[test]
    fn test_weekly_defaults_to_anchor_weekday() {
        // 2024-01-03 is a Wednesday.
        let got = expand(utc(2024, 1, 3, 9), "FREQ=WEEKLY;COUNT=3", 10);
        assert_eq!(dates(&got), ["2024-01-03", "2024-01-10", "2024-01-17"]);
    }

    #[test]
    fn test_weekly_days_before_anchor_in_first_week_dropped() {
        // Anchor Wednesday; Monday of the same week precedes it.
        let got = expand(utc(2024, 1, 3, 9), "FREQ=WEEKLY;BYDAY=MO,WE;COUNT=3", 10);
        assert_eq!(dates(&got), ["2024-01-03", "2024-01-08", "2024-01-10"]);
    }

    #[test]
    fn test_weekly_interval_respects_week_start() {
        // RFC 5545 example: WKST changes which weeks are "every other".
        // DTSTART 1997-08-05 (Tuesday).
        let start = utc(1997, 8, 5, 9);
        let monday = expand(start, "FREQ=WEEKLY;INTERVAL=2;COUNT=4;BYDAY=TU,SU;WKST=MO", 10);
        assert_eq!(dates(&monday), ["1997-08-05", "1997-08-10", "1997-08-19", "1997-08-24"]);
        let sunday = expand(start, "FREQ=WEEKLY;INTERVAL=2;COUNT=4;BYDAY=TU,SU;WKST=SU", 10);
        assert_eq!(dates(&sunday), ["1997-08-05", "1997-08-17", "1997-08-19", "1997-08-31"]);
    }

    #[test]
    fn test_monthly_by_month_day_negative() {
        let got = expand(utc(2024, 1, 31, 9), "FREQ=MONTHLY;BYMONTHDAY=-1;COUNT=4", 10);
        assert_eq!(dates(&got), ["2024-01-31", "2024-02-29", "2024-03-31", "2024-04-30"]);
    }

    #[test]
    fn test_monthly_anchor_day_skips_short_months() {
        let got = expand(utc(2024, 1, 31, 9), "FREQ=MONTHLY;COUNT=3", 10);
        assert_eq!(dates(&got), ["2024-01-31", "2024-03-31", "2024-05-31"]);
    }

    #[test]
    fn test_monthly_nth_weekday() {
        let got = expand(utc(2024, 1, 1, 9), "FREQ=MONTHLY;BYDAY=2TU;COUNT=3", 10);
        assert_eq!(dates(&got), ["2024-01-09", "2024-02-13", "2024-03-12"]);
        let got = expand(utc(2024, 1, 1, 9), "FREQ=MONTHLY;BYDAY=-1FR;COUNT=3", 10);
        assert_eq!(dates(&got), ["2024-01-26", "2024-02-23", "2024-03-29"]);
    }

    #[test]
    fn test_monthly_fifth_weekday_only_when_present() {
        let got = expand(utc(2024, 1, 1, 9), "FREQ=MONTHLY;BYDAY=5MO;COUNT=3", 10);
        assert_eq!(dates(&got), ["2024-01-29", "2024-04-29", "2024-07-29"]);
    }

    #[test]
    fn test_monthly_last_weekday_via_setpos() {
        let got = expand(
            utc(2024, 1, 1, 9),
            "FREQ=MONTHLY;BYDAY=MO,TU,WE,TH,FR;BYSETPOS=-1;COUNT=3",
            10,
        );
        assert_eq!(dates(&got), ["2024-01-31", "2024-02-29", "2024-03-29"]);
    }

    #[test]
    fn test_monthly_friday_the_13th() {
        let got = expand(utc(2024, 1, 1, 9), "FREQ=MONTHLY;BYDAY=FR;BYMONTHDAY=13;COUNT=2", 10);
        assert_eq!(dates(&got), ["2024-09-13", "2024-12-13"]);
    }

    #[test]
    fn test_yearly_defaults_to_anchor_date() {
        let got = expand(utc(2024, 2, 29, 9), "FREQ=YEARLY;COUNT=2", 10);
        assert_eq!(dates(&got), ["2024-02-29", "2028-02-29"]);
    }

    #[test]
    fn test_yearly_by_month_and_weekday() {
        // US Thanksgiving: fourth Thursday of November.
        let got = expand(utc(2024, 1, 1, 12), "FREQ=YEARLY;BYMONTH=11;BYDAY=4TH;COUNT=3", 10);
        assert_eq!(dates(&got), ["2024-11-28", "2025-11-27", "2026-11-26"]);
    }

    #[test]
    fn test_yearly_ordinal_relative_to_year() {
        let got = expand(utc(2024, 1, 1, 9), "FREQ=YEARLY;BYDAY=20MO;COUNT=2", 10);
        assert_eq!(dates(&got), ["2024-05-13", "2025-05-19"]);
    }

    #[test]
    fn test_yearly_by_month_uses_anchor_day() {
        let got = expand(utc(2024, 1, 15, 9), "FREQ=YEARLY;BYMONTH=1,7;COUNT=3", 10);
        assert_eq!(dates(&got), ["2024-01-15", "2024-07-15", "2025-01-15"]);
    }

    #[test]
    fn test_hourly_steps_elapsed_time() {
        let got = expand(utc(2024, 1, 1, 22), "FREQ=HOURLY;INTERVAL=2;COUNT=3", 10);
        assert_eq!(got, vec![utc(2024, 1, 1, 22), utc(2024, 1, 2, 0), utc(2024, 1, 2, 2)]);
    }

    #[test]
    fn test_minutely_with_weekday_limit_skips_days() {
        // Friday 2024-01-05 23:58; only Mondays allowed.
        let start = Utc.with_ymd_and_hms(2024, 1, 5, 23, 58, 0).unwrap();
        let rule: RecurrenceRule = "FREQ=MINUTELY;INTERVAL=15;BYDAY=MO;COUNT=2".parse().unwrap();
        let got: Vec<_> = OccurrenceGenerator::new(&event(start, "UTC"), &rule, &ExceptionSet::new()).collect();
        assert_eq!(
            got,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 8, 0, 13, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 8, 0, 28, 0).unwrap(),
            ]
        );
    }

    // ── termination ─────────────────────────────────────────────────────

    #[test]
    fn test_until_is_inclusive() {
        let got = expand(utc(2024, 1, 1, 9), "FREQ=DAILY;UNTIL=20240103T090000Z", 10);
        assert_eq!(dates(&got), ["2024-01-01", "2024-01-02", "2024-01-03"]);
        let got = expand(utc(2024, 1, 1, 9), "FREQ=DAILY;UNTIL=20240103T085959Z", 10);
        assert_eq!(dates(&got), ["2024-01-01", "2024-01-02"]);
    }

    #[test]
    fn test_until_date_compares_local_date() {
        let got = expand(utc(2024, 1, 1, 9), "FREQ=DAILY;UNTIL=20240103", 10);
        assert_eq!(dates(&got), ["2024-01-01", "2024-01-02", "2024-01-03"]);
    }

    #[test]
    fn test_count_zero_is_empty() {
        assert!(expand(utc(2024, 1, 1, 9), "FREQ=DAILY;COUNT=0", 10).is_empty());
    }

    #[test]
    fn test_horizon_stops_unbounded_rule() {
        let rule: RecurrenceRule = "FREQ=DAILY".parse().unwrap();
        let got: Vec<_> = OccurrenceGenerator::new(&event(utc(2024, 1, 1, 9), "UTC"), &rule, &ExceptionSet::new())
            .with_horizon(utc(2024, 1, 4, 9))
            .collect();
        assert_eq!(dates(&got), ["2024-01-01", "2024-01-02", "2024-01-03"]);
    }

    #[test]
    fn test_impossible_rule_is_cut_off() {
        let rule: RecurrenceRule = "FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=30".parse().unwrap();
        let mut generator = OccurrenceGenerator::new(&event(utc(2024, 1, 1, 9), "UTC"), &rule, &ExceptionSet::new())
            .with_max_barren_years(50);
        assert_eq!(generator.next(), None);
        assert!(generator.was_cut_off());
    }

    #[test]
    fn test_sparse_rule_spanning_decades_is_not_cut_off() {
        // Leap days on a Monday: 2016-02-29, then 2044-02-29.
        let rule: RecurrenceRule = "FREQ=DAILY;BYMONTH=2;BYMONTHDAY=29;BYDAY=MO;COUNT=1"
            .parse()
            .unwrap();
        let mut generator =
            OccurrenceGenerator::new(&event(utc(2016, 3, 1, 9), "UTC"), &rule, &ExceptionSet::new());
        let got: Vec<_> = generator.by_ref().collect();
        assert_eq!(got, vec![utc(2044, 2, 29, 9)]);
        assert!(!generator.was_cut_off());
    }

    #[test]
    fn test_secondly_rule_skips_excluded_day() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        let rule: RecurrenceRule = "FREQ=SECONDLY;COUNT=3".parse().unwrap();
        let exceptions =
            ExceptionSet::new().with_ex_date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let mut generator = OccurrenceGenerator::new(&event(start, "UTC"), &rule, &exceptions);
        let got: Vec<_> = generator.by_ref().collect();
        assert_eq!(
            got,
            vec![
                start,
                Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 1).unwrap(),
            ]
        );
        assert!(!generator.was_cut_off());
    }

    #[test]
    fn test_weekly_month_day_matches_nothing_in_most_weeks() {
        // Only weeks containing a 31st that falls on the anchor weekday match.
        let got = expand(utc(2024, 1, 3, 9), "FREQ=WEEKLY;BYMONTHDAY=31;COUNT=2", 10);
        assert_eq!(dates(&got), ["2024-01-31", "2024-07-31"]);
    }

    // ── exclusions ──────────────────────────────────────────────────────

    #[test]
    fn test_excluded_candidates_do_not_count() {
        let base = event(utc(2024, 1, 1, 9), "UTC");
        let rule: RecurrenceRule = "FREQ=WEEKLY;BYDAY=MO,WE;COUNT=4".parse().unwrap();
        let exceptions =
            ExceptionSet::new().with_ex_date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        let got: Vec<_> = OccurrenceGenerator::new(&base, &rule, &exceptions).collect();
        assert_eq!(dates(&got), ["2024-01-01", "2024-01-08", "2024-01-10", "2024-01-15"]);
    }

    #[test]
    fn test_ex_rule_suppresses_matching_instants() {
        let base = event(utc(2024, 1, 1, 9), "UTC");
        let rule: RecurrenceRule = "FREQ=DAILY;COUNT=5".parse().unwrap();
        let exceptions =
            ExceptionSet::new().with_ex_rule("FREQ=WEEKLY;BYDAY=SA,SU".parse().unwrap());
        let got: Vec<_> = OccurrenceGenerator::new(&base, &rule, &exceptions).collect();
        assert_eq!(
            dates(&got),
            ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05"]
        );
        let exceptions =
            ExceptionSet::new().with_ex_rule("FREQ=DAILY;INTERVAL=2".parse().unwrap());
        let got: Vec<_> = OccurrenceGenerator::new(&base, &rule, &exceptions).collect();
        assert_eq!(
            dates(&got),
            ["2024-01-02", "2024-01-04", "2024-01-06", "2024-01-08", "2024-01-10"]
        );
    }

    // ── civil time ──────────────────────────────────────────────────────

    #[test]
    fn test_daily_keeps_wall_clock_across_dst() {
        // 09:00 in New York; spring forward on 2024-03-10.
        let start = Utc.with_ymd_and_hms(2024, 3, 8, 14, 0, 0).unwrap();
        let rule: RecurrenceRule = "FREQ=DAILY;COUNT=4".parse().unwrap();
        let base = event(start, "America/New_York");
        let got: Vec<_> = OccurrenceGenerator::new(&base, &rule, &ExceptionSet::new()).collect();
        let utc_hours: Vec<u32> = got.iter().map(|t| t.hour()).collect();
        assert_eq!(utc_hours, vec![14, 14, 13, 13]);
        assert!(got.iter().all(|t| to_local(base.zone(), *t).hour() == 9));
    }

    #[test]
    fn test_fake_zone_gap_policies() {
        // 02:30 local daily; 2024-03-10 02:30 does not exist in the fake zone.
        let provider = StaticZones::new().with_zone(spring_forward());
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 7, 30, 0).unwrap();
        let base = BaseEvent::builder(start, "Test/Transition")
            .duration(EventDuration::new(0, 1800))
            .build(&provider)
            .unwrap();
        let rule: RecurrenceRule = "FREQ=DAILY;COUNT=3".parse().unwrap();

        let shifted: Vec<_> = OccurrenceGenerator::new(&base, &rule, &ExceptionSet::new()).collect();
        let hours: Vec<u32> = shifted.iter().map(|t| to_local(base.zone(), *t).hour()).collect();
        assert_eq!(hours, vec![2, 3, 2]);

        let skipped: Vec<_> = OccurrenceGenerator::new(&base, &rule, &ExceptionSet::new())
            .with_dst_policy(DstPolicy::Skip)
            .collect();
        assert_eq!(dates(&skipped), ["2024-03-09", "2024-03-11", "2024-03-12"]);
    }

    // ── helpers ─────────────────────────────────────────────────────────

    #[test]
    fn test_select_positions() {
        let items = [1, 2, 3, 4, 5];
        assert_eq!(select_positions(&items, &[1, -1]), vec![1, 5]);
        assert_eq!(select_positions(&items, &[-1, 1, 1]), vec![1, 5]);
        assert_eq!(select_positions(&items, &[6, -6]), Vec::<i32>::new());
    }

    #[test]
    fn test_expand_weekdays_ordinals() {
        let first = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let got = expand_weekdays(
            first,
            last,
            &[WeekdaySelector::nth(1, Weekday::Fri), WeekdaySelector::nth(-1, Weekday::Sun)],
        );
        assert_eq!(
            got,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            ]
        );
    }

    #[test]
    fn test_resolve_month_day() {
        assert_eq!(resolve_month_day(-1, 29), Some(29));
        assert_eq!(resolve_month_day(31, 30), None);
        assert_eq!(resolve_month_day(-31, 30), None);
        assert_eq!(resolve_month_day(15, 30), Some(15));
    }
}
