//! Exclusions: explicit exception dates plus an optional exclusion rule.

use std::collections::BTreeSet;
use std::iter::Peekable;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::event::BaseEvent;
use crate::generator::OccurrenceGenerator;
use crate::rule::RecurrenceRule;
use crate::zone::to_local;

/// One excluded instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum ExDate {
    /// Suppresses the occurrence starting at exactly this instant.
    Instant(DateTime<Utc>),
    /// Suppresses every occurrence whose start falls on this local date.
    Date(NaiveDate),
}

impl From<DateTime<Utc>> for ExDate {
    fn from(instant: DateTime<Utc>) -> Self {
        ExDate::Instant(instant)
    }
}

impl From<NaiveDate> for ExDate {
    fn from(date: NaiveDate) -> Self {
        ExDate::Date(date)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionSet {
    instants: BTreeSet<DateTime<Utc>>,
    dates: BTreeSet<NaiveDate>,
    ex_rule: Option<RecurrenceRule>,
}

impl ExceptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ex_date(mut self, ex_date: impl Into<ExDate>) -> Self {
        self.insert(ex_date.into());
        self
    }

    #[must_use]
    pub fn with_ex_rule(mut self, rule: RecurrenceRule) -> Self {
        self.ex_rule = Some(rule);
        self
    }

    pub fn insert(&mut self, ex_date: ExDate) {
        match ex_date {
            ExDate::Instant(instant) => {
                self.instants.insert(instant);
            }
            ExDate::Date(date) => {
                self.dates.insert(date);
            }
        }
    }

    pub fn ex_dates(&self) -> impl Iterator<Item = ExDate> + '_ {
        self.instants
            .iter()
            .copied()
            .map(ExDate::Instant)
            .chain(self.dates.iter().copied().map(ExDate::Date))
    }

    pub fn ex_rule(&self) -> Option<&RecurrenceRule> {
        self.ex_rule.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.instants.is_empty() && self.dates.is_empty() && self.ex_rule.is_none()
    }

    /// Whether an exception date suppresses a candidate starting at `instant`
    /// on local date `local_date`. The exclusion rule is not consulted.
    pub fn matches_ex_date(&self, instant: DateTime<Utc>, local_date: NaiveDate) -> bool {
        self.instants.contains(&instant) || self.dates.contains(&local_date)
    }

    /// Whether a date-form exception date suppresses all of `local_date`.
    pub(crate) fn excludes_date(&self, local_date: NaiveDate) -> bool {
        self.dates.contains(&local_date)
    }

    /// Full membership test for a single instant of `base`'s series: exception
    /// dates first, then the exclusion rule expanded from the base's start up
    /// to `instant`.
    ///
    /// The generator does not call this per candidate; it walks the exclusion
    /// rule with an [`ExRuleCursor`] alongside the inclusion rule instead.
    pub fn contains(&self, base: &BaseEvent, instant: DateTime<Utc>) -> bool {
        let local_date = to_local(base.zone(), instant).date();
        if self.matches_ex_date(instant, local_date) {
            return true;
        }
        match &self.ex_rule {
            Some(rule) => OccurrenceGenerator::new(base, rule, &ExceptionSet::new())
                .take_while(|t| *t <= instant)
                .any(|t| t == instant),
            None => false,
        }
    }
}

/// Walks an exclusion rule's occurrences in step with an ascending stream of
/// candidates, so each membership test only advances the cursor.
#[derive(Debug)]
pub(crate) struct ExRuleCursor {
    upcoming: Peekable<OccurrenceGenerator>,
}

impl ExRuleCursor {
    pub(crate) fn new(series: OccurrenceGenerator) -> Self {
        ExRuleCursor {
            upcoming: series.peekable(),
        }
    }

    /// Whether the exclusion series contains `candidate`. Candidates must be
    /// presented in ascending order.
    pub(crate) fn matches(&mut self, candidate: DateTime<Utc>) -> bool {
        while self.upcoming.next_if(|t| *t < candidate).is_some() {}
        self.upcoming.peek() == Some(&candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::IanaZones;
    use chrono::TimeZone;

    fn base(rule: &str) -> BaseEvent {
        BaseEvent::builder(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(), "UTC")
            .duration(crate::duration::EventDuration::new(0, 3600))
            .rule(rule.parse().unwrap())
            .build(&IanaZones)
            .unwrap()
    }

    #[test]
    fn test_instant_ex_date_is_exact() {
        let set = ExceptionSet::new().with_ex_date(Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap());
        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert!(set.matches_ex_date(Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap(), date));
        assert!(!set.matches_ex_date(Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 1).unwrap(), date));
    }

    #[test]
    fn test_date_ex_date_matches_whole_local_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let set = ExceptionSet::new().with_ex_date(date);
        assert!(set.matches_ex_date(Utc.with_ymd_and_hms(2024, 1, 3, 23, 0, 0).unwrap(), date));
        assert!(!set.matches_ex_date(
            Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
        ));
    }

    #[test]
    fn test_ex_dates_listing_and_emptiness() {
        let set = ExceptionSet::new();
        assert!(set.is_empty());
        let set = set
            .with_ex_date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
            .with_ex_date(Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap());
        assert!(!set.is_empty());
        assert_eq!(set.ex_dates().count(), 2);
    }

    #[test]
    fn test_contains_consults_ex_rule() {
        let event = base("FREQ=DAILY");
        let set = ExceptionSet::new().with_ex_rule("FREQ=WEEKLY;BYDAY=SA,SU".parse().unwrap());
        // 2024-01-06 is a Saturday.
        assert!(set.contains(&event, Utc.with_ymd_and_hms(2024, 1, 6, 9, 0, 0).unwrap()));
        assert!(!set.contains(&event, Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap()));
        // Same day, different time of day: exRule occurrences are exact instants.
        assert!(!set.contains(&event, Utc.with_ymd_and_hms(2024, 1, 6, 10, 0, 0).unwrap()));
    }

    #[test]
    fn test_cursor_advances_monotonically() {
        let event = base("FREQ=DAILY");
        let rule: RecurrenceRule = "FREQ=DAILY;INTERVAL=2".parse().unwrap();
        let mut cursor = ExRuleCursor::new(OccurrenceGenerator::new(&event, &rule, &ExceptionSet::new()));
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 9, 0, 0).unwrap();
        assert!(cursor.matches(day(1)));
        assert!(!cursor.matches(day(2)));
        assert!(cursor.matches(day(3)));
        assert!(cursor.matches(day(9)));
        assert!(!cursor.matches(day(10)));
    }
}
