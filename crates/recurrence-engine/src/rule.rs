//! The parsed recurrence rule value type.
//!
//! A [`RecurrenceRule`] can only be obtained through [`parse_rule`] (or
//! [`str::parse`]), so every instance in circulation already satisfies the
//! rule invariants: a frequency is present, `interval >= 1`, COUNT and UNTIL
//! are not both set, and every selector value is in range. Expansion never
//! has to re-validate.
//!
//! The [`Display`](std::fmt::Display) impl renders the canonical rule text,
//! and parsing that text yields a structurally equal rule. Serde uses the same
//! text form, so a rule stored as a string column round-trips unchanged.
//!
//! [`parse_rule`]: crate::parser::parse_rule

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseError;

/// How often the rule's periods repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// The RFC 5545 token (`"DAILY"`, `"WEEKLY"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Secondly => "SECONDLY",
            Frequency::Minutely => "MINUTELY",
            Frequency::Hourly => "HOURLY",
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }

    pub(crate) fn from_token(s: &str) -> Option<Frequency> {
        match s {
            "SECONDLY" => Some(Frequency::Secondly),
            "MINUTELY" => Some(Frequency::Minutely),
            "HOURLY" => Some(Frequency::Hourly),
            "DAILY" => Some(Frequency::Daily),
            "WEEKLY" => Some(Frequency::Weekly),
            "MONTHLY" => Some(Frequency::Monthly),
            "YEARLY" => Some(Frequency::Yearly),
            _ => None,
        }
    }

    /// Whether periods are shorter than a day (stepped in elapsed time).
    pub fn is_sub_daily(self) -> bool {
        matches!(
            self,
            Frequency::Secondly | Frequency::Minutely | Frequency::Hourly
        )
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One BYDAY entry: a weekday with an optional signed ordinal.
///
/// `2TU` is "the second Tuesday" (`ordinal = Some(2)`), `-1FR` is "the last
/// Friday" (`ordinal = Some(-1)`), and a bare `MO` matches every Monday in the
/// period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdaySelector {
    pub ordinal: Option<i8>,
    pub weekday: Weekday,
}

impl WeekdaySelector {
    pub fn every(weekday: Weekday) -> Self {
        WeekdaySelector {
            ordinal: None,
            weekday,
        }
    }

    pub fn nth(ordinal: i8, weekday: Weekday) -> Self {
        WeekdaySelector {
            ordinal: Some(ordinal),
            weekday,
        }
    }
}

impl fmt::Display for WeekdaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.ordinal {
            write!(f, "{n}")?;
        }
        f.write_str(weekday_code(self.weekday))
    }
}

/// The inclusive UNTIL bound, in whichever RFC 5545 value type it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Until {
    /// `20240131T090000Z` — an absolute instant.
    Utc(DateTime<Utc>),
    /// `20240131T090000` — floating wall-clock time in the event's timezone.
    Local(NaiveDateTime),
    /// `20240131` — compared against each occurrence's local date.
    Date(NaiveDate),
}

impl fmt::Display for Until {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Until::Utc(dt) => write!(f, "{}", dt.format("%Y%m%dT%H%M%SZ")),
            Until::Local(naive) => write!(f, "{}", naive.format("%Y%m%dT%H%M%S")),
            Until::Date(date) => write!(f, "{}", date.format("%Y%m%d")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub(crate) frequency: Frequency,
    pub(crate) interval: u32,
    pub(crate) count: Option<u32>,
    pub(crate) until: Option<Until>,
    pub(crate) by_day: Vec<WeekdaySelector>,
    pub(crate) by_month_day: Vec<i8>,
    pub(crate) by_month: Vec<u8>,
    pub(crate) by_set_pos: Vec<i16>,
    pub(crate) week_start: Weekday,
}

impl RecurrenceRule {
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn count(&self) -> Option<u32> {
        self.count
    }

    pub fn until(&self) -> Option<Until> {
        self.until
    }

    pub fn by_day(&self) -> &[WeekdaySelector] {
        &self.by_day
    }

    pub fn by_month_day(&self) -> &[i8] {
        &self.by_month_day
    }

    pub fn by_month(&self) -> &[u8] {
        &self.by_month
    }

    pub fn by_set_pos(&self) -> &[i16] {
        &self.by_set_pos
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    /// Whether the rule terminates on its own (COUNT or UNTIL is set).
    pub fn is_bounded(&self) -> bool {
        self.count.is_some() || self.until.is_some()
    }

    /// Whether any BYxxx part is present.
    pub(crate) fn has_selectors(&self) -> bool {
        !self.by_day.is_empty() || !self.by_month_day.is_empty() || !self.by_month.is_empty()
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.frequency)?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if let Some(count) = self.count {
            write!(f, ";COUNT={count}")?;
        }
        if let Some(until) = self.until {
            write!(f, ";UNTIL={until}")?;
        }
        if !self.by_month.is_empty() {
            write!(f, ";BYMONTH={}", join(&self.by_month))?;
        }
        if !self.by_month_day.is_empty() {
            write!(f, ";BYMONTHDAY={}", join(&self.by_month_day))?;
        }
        if !self.by_day.is_empty() {
            write!(f, ";BYDAY={}", join(&self.by_day))?;
        }
        if !self.by_set_pos.is_empty() {
            write!(f, ";BYSETPOS={}", join(&self.by_set_pos))?;
        }
        if self.week_start != Weekday::Mon {
            write!(f, ";WKST={}", weekday_code(self.week_start))?;
        }
        Ok(())
    }
}

fn join<T: fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl FromStr for RecurrenceRule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_rule(s)
    }
}

impl Serialize for RecurrenceRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecurrenceRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Two-letter RFC 5545 weekday code.
pub(crate) fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

pub(crate) fn parse_weekday_code(s: &str) -> Option<Weekday> {
    match s {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_omits_defaults() {
        let rule: RecurrenceRule = "FREQ=DAILY;INTERVAL=1;WKST=MO".parse().unwrap();
        assert_eq!(rule.to_string(), "FREQ=DAILY");
    }

    #[test]
    fn test_display_canonical_order() {
        let rule: RecurrenceRule = "WKST=SU;BYDAY=-1FR,MO;FREQ=MONTHLY;COUNT=3;BYSETPOS=1"
            .parse()
            .unwrap();
        assert_eq!(
            rule.to_string(),
            "FREQ=MONTHLY;COUNT=3;BYDAY=-1FR,MO;BYSETPOS=1;WKST=SU"
        );
    }

    #[test]
    fn test_display_until_forms() {
        for text in [
            "FREQ=DAILY;UNTIL=20240131T090000Z",
            "FREQ=DAILY;UNTIL=20240131T090000",
            "FREQ=DAILY;UNTIL=20240131",
        ] {
            let rule: RecurrenceRule = text.parse().unwrap();
            assert_eq!(rule.to_string(), text);
        }
    }

    #[test]
    fn test_is_bounded() {
        let unbounded: RecurrenceRule = "FREQ=WEEKLY".parse().unwrap();
        assert!(!unbounded.is_bounded());
        let counted: RecurrenceRule = "FREQ=WEEKLY;COUNT=2".parse().unwrap();
        assert!(counted.is_bounded());
        let until: RecurrenceRule = "FREQ=WEEKLY;UNTIL=20240101".parse().unwrap();
        assert!(until.is_bounded());
    }

    #[test]
    fn test_serde_as_rule_text() {
        let rule: RecurrenceRule = "FREQ=WEEKLY;BYDAY=MO,WE;COUNT=4".parse().unwrap();
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, "\"FREQ=WEEKLY;COUNT=4;BYDAY=MO,WE\"");
        let back: RecurrenceRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_serde_rejects_invalid_rule_text() {
        let result: Result<RecurrenceRule, _> = serde_json::from_str("\"FREQ=SOMETIMES\"");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("FREQ"), "got: {err}");
    }

    #[test]
    fn test_weekday_selector_display() {
        assert_eq!(WeekdaySelector::nth(-1, Weekday::Fri).to_string(), "-1FR");
        assert_eq!(WeekdaySelector::nth(2, Weekday::Tue).to_string(), "2TU");
        assert_eq!(WeekdaySelector::every(Weekday::Sun).to_string(), "SU");
    }
}
