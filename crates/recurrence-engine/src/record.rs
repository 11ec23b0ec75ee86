//! Plain serde records as handed over by the persistence layer.
//!
//! Field names follow the stored event entity (`startsAt`, `exDates`,
//! `recurrenceId`, ...). Date-time fields take RFC 3339; `exDates`,
//! `recurrenceId` and the start/end of all-day events also take a bare
//! `YYYY-MM-DD`. Unknown fields (title, location, attendees) are ignored.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::parse_iso_duration;
use crate::error::{RecurrenceError, Result};
use crate::event::{BaseEvent, EventStatus, Override, Replacement};
use crate::exceptions::ExDate;
use crate::parser::parse_rule;
use crate::zone::{instant_for, to_local, DstPolicy, TimeZoneProvider, ZoneRules};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub starts_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    pub timezone: String,
    #[serde(default)]
    pub all_day: bool,
    /// ISO 8601 duration, used when `endsAt` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ex_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ex_dates: Vec<String>,
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<OverrideRecord>,
}

/// A stored instance override. With status `cancelled` and no times it
/// cancels the instance; otherwise `startsAt` and `endsAt` are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
    pub recurrence_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
}

impl EventRecord {
    /// Validate and convert into a [`BaseEvent`].
    ///
    /// # Errors
    ///
    /// Any [`RecurrenceError`]: unknown timezone, unparseable times, rules or
    /// durations, and everything [`BaseEventBuilder::build`] rejects.
    ///
    /// [`BaseEventBuilder::build`]: crate::event::BaseEventBuilder::build
    pub fn into_base_event(self, provider: &dyn TimeZoneProvider) -> Result<BaseEvent> {
        let zone = provider
            .lookup(&self.timezone)
            .ok_or_else(|| RecurrenceError::InvalidTimezone(format!("'{}'", self.timezone)))?;
        let zone = zone.as_ref();

        let start = parse_time_value(&self.starts_at, zone, NaiveTime::MIN)?;
        let anchor_time = if self.all_day {
            NaiveTime::MIN
        } else {
            to_local(zone, start).time()
        };

        let mut builder = BaseEvent::builder(start, &self.timezone)
            .all_day(self.all_day)
            .sequence(self.sequence)
            .status(self.status);

        if let Some(end) = &self.ends_at {
            builder = builder.end(parse_time_value(end, zone, NaiveTime::MIN)?);
        }
        if let Some(duration) = &self.duration {
            builder = builder.duration(parse_iso_duration(duration)?);
        }
        if let Some(rule) = &self.rrule {
            builder = builder.rule(parse_rule(rule)?);
        }
        if let Some(rule) = &self.ex_rule {
            builder = builder.ex_rule(parse_rule(rule)?);
        }
        for ex_date in &self.ex_dates {
            builder = builder.ex_date(parse_ex_date(ex_date)?);
        }
        for record in self.overrides {
            builder = builder.with_override(record.into_override(zone, anchor_time, self.sequence)?);
        }

        builder.build(provider)
    }
}

impl OverrideRecord {
    fn into_override(
        self,
        zone: &dyn ZoneRules,
        anchor_time: NaiveTime,
        base_sequence: u32,
    ) -> Result<Override> {
        let recurrence_id = parse_time_value(&self.recurrence_id, zone, anchor_time)?;
        match (self.starts_at, self.ends_at) {
            (None, None) if self.status == Some(EventStatus::Cancelled) => {
                Ok(Override::cancel(recurrence_id))
            }
            (Some(start), Some(end)) => Ok(Override::replace(
                recurrence_id,
                Replacement {
                    start: parse_time_value(&start, zone, anchor_time)?,
                    end: parse_time_value(&end, zone, anchor_time)?,
                    sequence: self.sequence.unwrap_or(base_sequence),
                    status: self.status,
                },
            )),
            _ => Err(RecurrenceError::InvalidEvent(format!(
                "override {}: needs startsAt and endsAt unless cancelled",
                self.recurrence_id
            ))),
        }
    }
}

/// RFC 3339, or a bare date placed at `time_of_day` in `zone`.
fn parse_time_value(
    text: &str,
    zone: &dyn ZoneRules,
    time_of_day: NaiveTime,
) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| {
        RecurrenceError::InvalidDatetime(format!(
            "expected RFC 3339 or YYYY-MM-DD, got '{text}'"
        ))
    })?;
    let local = NaiveDateTime::new(date, time_of_day);
    instant_for(zone, local, DstPolicy::ShiftForward)
        .ok_or_else(|| RecurrenceError::InvalidDatetime(format!("'{text}' is out of range")))
}

fn parse_ex_date(text: &str) -> Result<ExDate> {
    let text = text.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(ExDate::Instant(instant.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(ExDate::Date)
        .map_err(|_| {
            RecurrenceError::InvalidDatetime(format!(
                "exDate must be RFC 3339 or YYYY-MM-DD, got '{text}'"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::IanaZones;
    use chrono::TimeZone;

    fn record(json: &str) -> EventRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_minimal_record() {
        let event = record(
            r#"{"startsAt":"2024-01-01T09:00:00Z","endsAt":"2024-01-01T10:00:00Z","timezone":"UTC"}"#,
        )
        .into_base_event(&IanaZones)
        .unwrap();
        assert!(!event.is_recurring());
        assert_eq!(event.end(), Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_full_record_with_ignored_fields() {
        let event = record(
            r#"{
                "title": "Standup",
                "startsAt": "2024-01-01T09:00:00-05:00",
                "duration": "PT15M",
                "timezone": "America/New_York",
                "rrule": "FREQ=WEEKLY;BYDAY=MO,WE,FR",
                "exRule": "FREQ=MONTHLY;BYDAY=1MO",
                "exDates": ["2024-01-03", "2024-01-05T14:00:00Z"],
                "sequence": 4,
                "status": "tentative",
                "overrides": [
                    {"recurrenceId": "2024-01-08", "status": "cancelled"},
                    {"recurrenceId": "2024-01-10T14:00:00Z",
                     "startsAt": "2024-01-10T16:00:00Z", "endsAt": "2024-01-10T16:15:00Z"}
                ]
            }"#,
        )
        .into_base_event(&IanaZones)
        .unwrap();
        assert_eq!(event.sequence(), 4);
        assert_eq!(event.status(), EventStatus::Tentative);
        assert_eq!(event.exceptions().ex_dates().count(), 2);
        assert!(event.exceptions().ex_rule().is_some());
        // A date recurrence id lands at the anchor's local time (09:00 EST).
        assert_eq!(
            event.overrides()[0].recurrence_id,
            Utc.with_ymd_and_hms(2024, 1, 8, 14, 0, 0).unwrap()
        );
        let replacement = event.overrides()[1].replacement.as_ref().unwrap();
        assert_eq!(replacement.sequence, 4);
    }

    #[test]
    fn test_all_day_record_with_dates() {
        let event = record(
            r#"{"startsAt":"2024-07-04","endsAt":"2024-07-05","timezone":"Europe/Paris","allDay":true}"#,
        )
        .into_base_event(&IanaZones)
        .unwrap();
        assert!(event.is_all_day());
        assert_eq!(event.start(), Utc.with_ymd_and_hms(2024, 7, 3, 22, 0, 0).unwrap());
        assert_eq!(event.duration().day_count(), 1);
    }

    #[test]
    fn test_record_errors() {
        let bad_zone = record(r#"{"startsAt":"2024-01-01T09:00:00Z","duration":"PT1H","timezone":"Mars/Base"}"#);
        assert!(matches!(
            bad_zone.into_base_event(&IanaZones),
            Err(RecurrenceError::InvalidTimezone(_))
        ));

        let bad_rule = record(
            r#"{"startsAt":"2024-01-01T09:00:00Z","duration":"PT1H","timezone":"UTC","rrule":"FREQ=DAILY;COUNT=2;UNTIL=20240101"}"#,
        );
        assert!(matches!(
            bad_rule.into_base_event(&IanaZones),
            Err(RecurrenceError::Parse(_))
        ));

        let bad_override = record(
            r#"{"startsAt":"2024-01-01T09:00:00Z","duration":"PT1H","timezone":"UTC",
                "overrides":[{"recurrenceId":"2024-01-02T09:00:00Z","startsAt":"2024-01-02T10:00:00Z"}]}"#,
        );
        assert!(matches!(
            bad_override.into_base_event(&IanaZones),
            Err(RecurrenceError::InvalidEvent(_))
        ));

        let bad_date = record(r#"{"startsAt":"tomorrow","duration":"PT1H","timezone":"UTC"}"#);
        assert!(matches!(
            bad_date.into_base_event(&IanaZones),
            Err(RecurrenceError::InvalidDatetime(_))
        ));
    }

    #[test]
    fn test_parse_ex_date_forms() {
        assert_eq!(
            parse_ex_date("2024-01-03").unwrap(),
            ExDate::Date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
        );
        assert_eq!(
            parse_ex_date("2024-01-03T10:00:00+01:00").unwrap(),
            ExDate::Instant(Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap())
        );
        assert!(parse_ex_date("03/01/2024").is_err());
    }
}
