//! RFC 5545 recurrence-rule text → [`RecurrenceRule`].
//!
//! The grammar accepted is the `recur` value: `KEY=VALUE` parts separated by
//! `;`, in any order, with an optional `RRULE:` / `EXRULE:` property prefix.
//! Keys and enumerated values are case-insensitive.
//!
//! Parsing is total: any input string either yields a rule that satisfies
//! every invariant or a specific [`ParseError`]. Nothing is validated later.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::error::ParseError;
use crate::rule::{parse_weekday_code, Frequency, RecurrenceRule, Until, WeekdaySelector};

/// Parse recurrence-rule text into a validated [`RecurrenceRule`].
///
/// # Supported keys
///
/// `FREQ` (required), `INTERVAL`, `COUNT`, `UNTIL`, `BYDAY`, `BYMONTHDAY`,
/// `BYMONTH`, `BYSETPOS`, `WKST`.
///
/// # Errors
///
/// - [`ParseError::UnknownRuleKey`] for any other key
/// - [`ParseError::InvalidRuleValue`] for malformed or out-of-range values,
///   duplicate keys, parts without `=`, and self-contradictory combinations
///   (BYDAY ordinals outside MONTHLY/YEARLY, BYSETPOS with no other BYxxx)
/// - [`ParseError::ConflictingTerminationRule`] if both COUNT and UNTIL are set
/// - [`ParseError::MissingFrequency`] if FREQ is absent
///
/// # Examples
///
/// ```
/// use recurrence_engine::parser::parse_rule;
/// use recurrence_engine::rule::Frequency;
///
/// let rule = parse_rule("FREQ=WEEKLY;BYDAY=MO,WE;COUNT=4").unwrap();
/// assert_eq!(rule.frequency(), Frequency::Weekly);
/// assert_eq!(rule.count(), Some(4));
/// assert_eq!(rule.by_day().len(), 2);
/// ```
pub fn parse_rule(text: &str) -> Result<RecurrenceRule, ParseError> {
    let body = strip_property_prefix(text.trim());

    let mut seen = HashSet::new();
    let mut frequency = None;
    let mut interval = 1;
    let mut count = None;
    let mut until = None;
    let mut by_day = Vec::new();
    let mut by_month_day = Vec::new();
    let mut by_month = Vec::new();
    let mut by_set_pos = Vec::new();
    let mut week_start = Weekday::Mon;

    for part in body.split(';') {
        let part = part.trim();
        // Tolerate a trailing or doubled separator.
        if part.is_empty() {
            continue;
        }

        let (raw_key, raw_value) = part
            .split_once('=')
            .ok_or_else(|| ParseError::invalid(part, "", "expected KEY=VALUE"))?;
        let key = raw_key.trim().to_ascii_uppercase();
        let value = raw_value.trim().to_ascii_uppercase();

        if !is_known_key(&key) {
            return Err(ParseError::UnknownRuleKey(key));
        }
        if !seen.insert(key.clone()) {
            return Err(ParseError::invalid(&key, &value, "duplicate key"));
        }

        match key.as_str() {
            "FREQ" => {
                frequency = Some(
                    Frequency::from_token(&value)
                        .ok_or_else(|| ParseError::invalid(&key, &value, "unknown frequency"))?,
                );
            }
            "INTERVAL" => {
                interval = parse_number::<u32>(&key, &value)?;
                if interval == 0 {
                    return Err(ParseError::invalid(&key, &value, "must be at least 1"));
                }
            }
            "COUNT" => count = Some(parse_number::<u32>(&key, &value)?),
            "UNTIL" => until = Some(parse_until(&value)?),
            "BYDAY" => by_day = parse_list(&key, &value, parse_weekday_selector)?,
            "BYMONTHDAY" => {
                by_month_day = parse_list(&key, &value, |item| {
                    parse_signed_in_range::<i8>(&key, item, 31)
                })?
            }
            "BYMONTH" => {
                by_month = parse_list(&key, &value, |item| {
                    let month = parse_number::<u8>(&key, item)?;
                    if (1..=12).contains(&month) {
                        Ok(month)
                    } else {
                        Err(ParseError::invalid(&key, item, "month must be 1..=12"))
                    }
                })?
            }
            "BYSETPOS" => {
                by_set_pos = parse_list(&key, &value, |item| {
                    parse_signed_in_range::<i16>(&key, item, 366)
                })?
            }
            "WKST" => {
                week_start = parse_weekday_code(&value)
                    .ok_or_else(|| ParseError::invalid(&key, &value, "unknown weekday"))?;
            }
            _ => return Err(ParseError::UnknownRuleKey(key.clone())),
        }
    }

    if count.is_some() && until.is_some() {
        return Err(ParseError::ConflictingTerminationRule);
    }
    let frequency = frequency.ok_or(ParseError::MissingFrequency)?;

    if !matches!(frequency, Frequency::Monthly | Frequency::Yearly)
        && by_day.iter().any(|s| s.ordinal.is_some())
    {
        return Err(ParseError::invalid(
            "BYDAY",
            &join_selectors(&by_day),
            format!("ordinal weekdays require MONTHLY or YEARLY, not {frequency}"),
        ));
    }

    let rule = RecurrenceRule {
        frequency,
        interval,
        count,
        until,
        by_day,
        by_month_day,
        by_month,
        by_set_pos,
        week_start,
    };

    if !rule.by_set_pos.is_empty() && !rule.has_selectors() {
        return Err(ParseError::invalid(
            "BYSETPOS",
            &join_numbers(&rule.by_set_pos),
            "requires another BYxxx part",
        ));
    }

    Ok(rule)
}

// ── Internal helpers ────────────────────────────────────────────────────────

fn strip_property_prefix(s: &str) -> &str {
    for prefix in ["RRULE:", "EXRULE:", "rrule:", "exrule:"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return rest;
        }
    }
    s
}

fn is_known_key(key: &str) -> bool {
    matches!(
        key,
        "FREQ"
            | "INTERVAL"
            | "COUNT"
            | "UNTIL"
            | "BYDAY"
            | "BYMONTHDAY"
            | "BYMONTH"
            | "BYSETPOS"
            | "WKST"
    )
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ParseError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::invalid(key, value, "expected a non-negative integer"));
    }
    value
        .parse::<T>()
        .map_err(|_| ParseError::invalid(key, value, "number out of range"))
}

/// Parse a non-zero signed integer whose magnitude is at most `max`.
fn parse_signed_in_range<T>(key: &str, value: &str, max: i32) -> Result<T, ParseError>
where
    T: TryFrom<i32>,
{
    let (negative, digits) = split_sign(value);
    let magnitude: i32 = parse_number(key, digits)?;
    if magnitude == 0 || magnitude > max {
        return Err(ParseError::invalid(
            key,
            value,
            format!("must be in -{max}..=-1 or 1..={max}"),
        ));
    }
    let signed = if negative { -magnitude } else { magnitude };
    T::try_from(signed).map_err(|_| ParseError::invalid(key, value, "number out of range"))
}

fn split_sign(value: &str) -> (bool, &str) {
    if let Some(rest) = value.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = value.strip_prefix('+') {
        (false, rest)
    } else {
        (false, value)
    }
}

/// Parse a comma-separated list, dropping repeated entries but keeping order.
fn parse_list<T, F>(key: &str, value: &str, mut parse_item: F) -> Result<Vec<T>, ParseError>
where
    T: PartialEq,
    F: FnMut(&str) -> Result<T, ParseError>,
{
    let mut items = Vec::new();
    for item in value.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(ParseError::invalid(key, value, "empty list entry"));
        }
        let parsed = parse_item(item)?;
        if !items.contains(&parsed) {
            items.push(parsed);
        }
    }
    Ok(items)
}

/// Parse `MO`, `2TU`, `+3WE`, `-1FR`.
fn parse_weekday_selector(item: &str) -> Result<WeekdaySelector, ParseError> {
    if item.len() < 2 || !item.is_char_boundary(item.len() - 2) {
        return Err(ParseError::invalid("BYDAY", item, "expected [+/-N]WEEKDAY"));
    }
    let (prefix, code) = item.split_at(item.len() - 2);
    let weekday = parse_weekday_code(code)
        .ok_or_else(|| ParseError::invalid("BYDAY", item, "unknown weekday"))?;

    if prefix.is_empty() {
        return Ok(WeekdaySelector::every(weekday));
    }
    let ordinal = parse_signed_in_range::<i8>("BYDAY", prefix, 53)
        .map_err(|_| ParseError::invalid("BYDAY", item, "ordinal must be in -53..=-1 or 1..=53"))?;
    Ok(WeekdaySelector::nth(ordinal, weekday))
}

/// Parse the three UNTIL value types: `YYYYMMDD`, `YYYYMMDDTHHMMSS`, and
/// `YYYYMMDDTHHMMSSZ`.
fn parse_until(value: &str) -> Result<Until, ParseError> {
    let bad = |reason: &str| ParseError::invalid("UNTIL", value, reason);
    if !value.is_ascii() {
        return Err(bad("expected ASCII digits"));
    }

    match value.len() {
        8 => parse_compact_date(value)
            .map(Until::Date)
            .ok_or_else(|| bad("expected YYYYMMDD")),
        15 | 16 => {
            let (date_part, rest) = value.split_at(8);
            let date = parse_compact_date(date_part).ok_or_else(|| bad("invalid date"))?;
            let rest = rest
                .strip_prefix('T')
                .ok_or_else(|| bad("expected 'T' between date and time"))?;
            let (time_part, utc) = match rest.strip_suffix('Z') {
                Some(t) => (t, true),
                None => (rest, false),
            };
            if utc != (value.len() == 16) {
                return Err(bad("expected YYYYMMDDTHHMMSS with optional trailing Z"));
            }
            let time = parse_compact_time(time_part).ok_or_else(|| bad("invalid time"))?;
            let naive = NaiveDateTime::new(date, time);
            Ok(if utc {
                Until::Utc(naive.and_utc())
            } else {
                Until::Local(naive)
            })
        }
        _ => Err(bad("expected YYYYMMDD, YYYYMMDDTHHMMSS or YYYYMMDDTHHMMSSZ")),
    }
}

fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = s[0..4].parse().ok()?;
    let month = s[4..6].parse().ok()?;
    let day = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_compact_time(s: &str) -> Option<NaiveTime> {
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour = s[0..2].parse().ok()?;
    let minute = s[2..4].parse().ok()?;
    let second = s[4..6].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, second)
}

fn join_selectors(selectors: &[WeekdaySelector]) -> String {
    selectors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn join_numbers(values: &[i16]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
