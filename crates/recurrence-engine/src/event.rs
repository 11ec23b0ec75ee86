//! Event inputs and occurrence outputs.
//!
//! A [`BaseEvent`] is validated once, by [`BaseEventBuilder::build`]: the
//! timezone resolves, the event has exactly one authoritative length, and
//! overrides are well formed. Expansion takes it as given.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::EventDuration;
use crate::error::{RecurrenceError, Result};
use crate::exceptions::{ExDate, ExceptionSet};
use crate::rule::RecurrenceRule;
use crate::zone::{instant_for, to_local, DstPolicy, TimeZoneProvider, ZoneRules};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Tentative,
    #[default]
    Confirmed,
    Cancelled,
}

impl EventStatus {
    pub fn is_cancelled(self) -> bool {
        self == EventStatus::Cancelled
    }
}

/// The modified form of a single occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub sequence: u32,
    /// Overrides the base event's status for this instance when set.
    pub status: Option<EventStatus>,
}

/// A per-instance modification or cancellation, keyed by the instance's
/// original start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub recurrence_id: DateTime<Utc>,
    /// `None` cancels the instance.
    pub replacement: Option<Replacement>,
}

impl Override {
    pub fn cancel(recurrence_id: DateTime<Utc>) -> Self {
        Override {
            recurrence_id,
            replacement: None,
        }
    }

    pub fn replace(recurrence_id: DateTime<Utc>, replacement: Replacement) -> Self {
        Override {
            recurrence_id,
            replacement: Some(replacement),
        }
    }
}

/// One concrete instance of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// The canonical, pre-override start; the join key back to overrides.
    pub recurrence_id: DateTime<Utc>,
    pub sequence: u32,
    pub is_cancelled: bool,
    /// Produced from an override's replacement rather than the rule.
    pub is_modified: bool,
    pub status: EventStatus,
}

impl Occurrence {
    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> bool {
        self.end > start && end.is_none_or(|end| self.start < end)
    }

    pub fn start_in<Z: TimeZone>(&self, tz: &Z) -> DateTime<Z> {
        self.start.with_timezone(tz)
    }

    pub fn end_in<Z: TimeZone>(&self, tz: &Z) -> DateTime<Z> {
        self.end.with_timezone(tz)
    }
}

/// A validated event: anchor, length, zone, optional rule, exclusions and
/// per-instance overrides.
#[derive(Clone)]
pub struct BaseEvent {
    start: DateTime<Utc>,
    duration: EventDuration,
    zone: Arc<dyn ZoneRules>,
    all_day: bool,
    rule: Option<RecurrenceRule>,
    exceptions: ExceptionSet,
    overrides: Vec<Override>,
    sequence: u32,
    status: EventStatus,
}

impl fmt::Debug for BaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseEvent")
            .field("start", &self.start)
            .field("duration", &self.duration)
            .field("timezone", &self.zone.name())
            .field("all_day", &self.all_day)
            .field("rule", &self.rule.as_ref().map(ToString::to_string))
            .field("exceptions", &self.exceptions)
            .field("overrides", &self.overrides.len())
            .field("sequence", &self.sequence)
            .field("status", &self.status)
            .finish()
    }
}

impl BaseEvent {
    /// Start building an event anchored at `start` in the named timezone.
    pub fn builder<Z: TimeZone>(start: DateTime<Z>, timezone: &str) -> BaseEventBuilder {
        BaseEventBuilder {
            start: start.with_timezone(&Utc),
            timezone: timezone.to_string(),
            end: None,
            duration: None,
            all_day: false,
            rule: None,
            exceptions: ExceptionSet::new(),
            overrides: Vec::new(),
            sequence: 0,
            status: EventStatus::default(),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the anchor instance.
    pub fn end(&self) -> DateTime<Utc> {
        self.end_for(self.start)
    }

    /// End of an instance starting at `start`, applying the event's length in
    /// its own timezone.
    pub fn end_for(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        // Validated at build time for the anchor; later instants only fail at
        // the edge of chrono's range, where an instant-length event is the
        // least wrong answer.
        self.duration
            .end_from(start, self.zone.as_ref())
            .unwrap_or(start)
    }

    pub fn duration(&self) -> EventDuration {
        self.duration
    }

    pub fn zone(&self) -> &dyn ZoneRules {
        self.zone.as_ref()
    }

    pub(crate) fn shared_zone(&self) -> Arc<dyn ZoneRules> {
        Arc::clone(&self.zone)
    }

    pub fn timezone(&self) -> &str {
        self.zone.name()
    }

    pub fn is_all_day(&self) -> bool {
        self.all_day
    }

    pub fn rule(&self) -> Option<&RecurrenceRule> {
        self.rule.as_ref()
    }

    pub fn is_recurring(&self) -> bool {
        self.rule.is_some()
    }

    pub fn exceptions(&self) -> &ExceptionSet {
        &self.exceptions
    }

    /// Overrides, sorted by recurrence id.
    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }
}

#[derive(Debug, Clone)]
pub struct BaseEventBuilder {
    start: DateTime<Utc>,
    timezone: String,
    end: Option<DateTime<Utc>>,
    duration: Option<EventDuration>,
    all_day: bool,
    rule: Option<RecurrenceRule>,
    exceptions: ExceptionSet,
    overrides: Vec<Override>,
    sequence: u32,
    status: EventStatus,
}

impl BaseEventBuilder {
    #[must_use]
    pub fn end<Z: TimeZone>(mut self, end: DateTime<Z>) -> Self {
        self.end = Some(end.with_timezone(&Utc));
        self
    }

    #[must_use]
    pub fn duration(mut self, duration: EventDuration) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub fn all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: RecurrenceRule) -> Self {
        self.rule = Some(rule);
        self
    }

    #[must_use]
    pub fn ex_date(mut self, ex_date: impl Into<ExDate>) -> Self {
        self.exceptions.insert(ex_date.into());
        self
    }

    #[must_use]
    pub fn ex_rule(mut self, rule: RecurrenceRule) -> Self {
        self.exceptions = self.exceptions.with_ex_rule(rule);
        self
    }

    #[must_use]
    pub fn exceptions(mut self, exceptions: ExceptionSet) -> Self {
        self.exceptions = exceptions;
        self
    }

    #[must_use]
    pub fn with_override(mut self, ov: Override) -> Self {
        self.overrides.push(ov);
        self
    }

    #[must_use]
    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    #[must_use]
    pub fn status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Validate and build the event.
    ///
    /// # Errors
    ///
    /// - [`RecurrenceError::InvalidTimezone`] if `provider` does not know the zone
    /// - [`RecurrenceError::InvalidEvent`] if both or neither of end/duration
    ///   are set, the end is not after the start, an all-day event has a
    ///   sub-day length, or overrides are duplicated or malformed
    /// - [`RecurrenceError::InvalidDuration`] for a non-positive duration
    pub fn build(self, provider: &dyn TimeZoneProvider) -> Result<BaseEvent> {
        let zone = provider
            .lookup(&self.timezone)
            .ok_or_else(|| RecurrenceError::InvalidTimezone(format!("'{}'", self.timezone)))?;

        let start = if self.all_day {
            let midnight = to_local(zone.as_ref(), self.start)
                .date()
                .and_time(NaiveTime::MIN);
            instant_for(zone.as_ref(), midnight, DstPolicy::ShiftForward).ok_or_else(|| {
                RecurrenceError::InvalidDatetime(format!("no local midnight for {}", self.start))
            })?
        } else {
            self.start
        };

        let duration = match (self.end, self.duration) {
            (Some(_), Some(_)) => {
                return Err(RecurrenceError::InvalidEvent(
                    "set either an end or a duration, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(RecurrenceError::InvalidEvent(
                    "an end or a duration is required".to_string(),
                ));
            }
            (Some(end), None) if self.all_day => {
                let first = to_local(zone.as_ref(), start).date();
                let last = to_local(zone.as_ref(), end).date();
                let days = (last - first).num_days();
                if days <= 0 {
                    return Err(RecurrenceError::InvalidEvent(format!(
                        "all-day event must end on a later date than it starts ({first} .. {last})"
                    )));
                }
                EventDuration::days(days)
            }
            (Some(end), None) => {
                if end <= start {
                    return Err(RecurrenceError::InvalidEvent(format!(
                        "end {end} must be after start {start}"
                    )));
                }
                EventDuration::exact(end - start)
            }
            (None, Some(duration)) => {
                if !duration.is_positive() {
                    return Err(RecurrenceError::InvalidDuration(format!(
                        "duration must be positive: {duration}"
                    )));
                }
                if self.all_day && !duration.is_whole_days() {
                    return Err(RecurrenceError::InvalidEvent(format!(
                        "all-day event needs a whole number of days, got {duration}"
                    )));
                }
                duration
            }
        };

        if duration.end_from(start, zone.as_ref()).is_none() {
            return Err(RecurrenceError::InvalidDuration(format!(
                "event end is out of range: {duration}"
            )));
        }

        let mut overrides = self.overrides;
        overrides.sort_by_key(|ov| ov.recurrence_id);
        for pair in overrides.windows(2) {
            if pair[0].recurrence_id == pair[1].recurrence_id {
                return Err(RecurrenceError::InvalidEvent(format!(
                    "duplicate override for {}",
                    pair[0].recurrence_id
                )));
            }
        }
        for ov in &overrides {
            if let Some(replacement) = &ov.replacement {
                if replacement.end <= replacement.start {
                    return Err(RecurrenceError::InvalidEvent(format!(
                        "override for {}: end must be after start",
                        ov.recurrence_id
                    )));
                }
            }
        }

        Ok(BaseEvent {
            start,
            duration,
            zone,
            all_day: self.all_day,
            rule: self.rule,
            exceptions: self.exceptions,
            overrides,
            sequence: self.sequence,
            status: self.status,
        })
    }
}
