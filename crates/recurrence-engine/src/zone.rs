//! Timezone capability and civil-time resolution.
//!
//! Expansion never reaches into a global timezone database. It is handed a
//! [`TimeZoneProvider`] that resolves IANA names to [`ZoneRules`], and the
//! only question it ever asks a zone is [`ZoneRules::offset_at`]. Everything
//! else (wall-clock → instant resolution, DST gaps and folds) is derived from
//! that one primitive here, so a fake zone with hand-placed transitions
//! exercises exactly the same code paths as the real database.
//!
//! [`IanaZones`] is the production provider, backed by `chrono-tz`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// The UTC-offset rules of one named timezone.
pub trait ZoneRules: fmt::Debug + Send + Sync {
    /// The zone's identifier (e.g., `"America/New_York"`).
    fn name(&self) -> &str;

    /// The UTC offset in effect at `instant`.
    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset;
}

/// Resolves timezone identifiers to their rules.
pub trait TimeZoneProvider {
    /// Look up `name` exactly; `None` if the identifier is unknown.
    fn zone(&self, name: &str) -> Option<Arc<dyn ZoneRules>>;

    /// Look up a user-supplied name, ignoring surrounding whitespace.
    fn lookup(&self, name: &str) -> Option<Arc<dyn ZoneRules>> {
        self.zone(name.trim())
    }
}

// ── IANA database (chrono-tz) ───────────────────────────────────────────────

/// The IANA timezone database compiled into `chrono-tz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IanaZones;

impl TimeZoneProvider for IanaZones {
    fn zone(&self, name: &str) -> Option<Arc<dyn ZoneRules>> {
        name.parse::<Tz>()
            .ok()
            .map(|tz| Arc::new(IanaZone(tz)) as Arc<dyn ZoneRules>)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IanaZone(pub Tz);

impl ZoneRules for IanaZone {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        self.0.offset_from_utc_datetime(&instant.naive_utc()).fix()
    }
}

// ── Fixed zones ─────────────────────────────────────────────────────────────

/// A zone with a single, never-changing offset.
#[derive(Debug, Clone)]
pub struct FixedZone {
    name: String,
    offset: FixedOffset,
}

impl FixedZone {
    pub fn new(name: impl Into<String>, offset: FixedOffset) -> Self {
        FixedZone {
            name: name.into(),
            offset,
        }
    }

    pub fn utc() -> Self {
        FixedZone::new("UTC", Utc.fix())
    }
}

impl ZoneRules for FixedZone {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset_at(&self, _instant: DateTime<Utc>) -> FixedOffset {
        self.offset
    }
}

/// A provider serving a fixed, caller-supplied set of zones.
///
/// Useful for tests and for hosts that ship their own zone data.
#[derive(Debug, Clone, Default)]
pub struct StaticZones {
    zones: HashMap<String, Arc<dyn ZoneRules>>,
}

impl StaticZones {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_zone(mut self, zone: impl ZoneRules + 'static) -> Self {
        self.zones.insert(zone.name().to_string(), Arc::new(zone));
        self
    }
}

impl TimeZoneProvider for StaticZones {
    fn zone(&self, name: &str) -> Option<Arc<dyn ZoneRules>> {
        self.zones.get(name).cloned()
    }
}

// ── Civil time ──────────────────────────────────────────────────────────────

/// What to do with a wall-clock time that does not exist because a DST
/// transition skipped over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DstPolicy {
    /// Interpret the time with the offset in effect before the gap, which
    /// lands it the length of the gap later (02:30 becomes 03:30 on a US
    /// spring-forward day). This is the RFC 5545 reading.
    #[default]
    ShiftForward,
    /// Drop the occurrence entirely.
    Skip,
}

/// How a wall-clock time maps onto the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocalResolution {
    Single(DateTime<Utc>),
    /// The wall-clock time occurs twice (DST fold).
    Ambiguous {
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
    /// The wall-clock time never occurs (DST gap). `shifted` is the instant
    /// obtained with the pre-gap offset.
    Gap { shifted: DateTime<Utc> },
}

/// Wall-clock time of `instant` in `zone`.
pub(crate) fn to_local(zone: &dyn ZoneRules, instant: DateTime<Utc>) -> NaiveDateTime {
    let offset = zone.offset_at(instant);
    instant.with_timezone(&offset).naive_local()
}

/// Map a wall-clock time onto the timeline using only `offset_at`.
///
/// Probes the offsets a day either side of `local`; each is a candidate, and
/// a candidate is valid when the zone agrees it is in effect at the resulting
/// instant. Two valid candidates mean a fold, none means a gap. Assumes
/// transitions in a zone are more than two days apart.
///
/// Returns `None` only when the arithmetic leaves chrono's range.
pub(crate) fn resolve_local(zone: &dyn ZoneRules, local: NaiveDateTime) -> Option<LocalResolution> {
    let as_utc = local.and_utc();
    let before = zone.offset_at(as_utc.checked_sub_signed(Duration::days(1))?);
    let after = zone.offset_at(as_utc.checked_add_signed(Duration::days(1))?);

    let candidate = |offset: FixedOffset| -> Option<DateTime<Utc>> {
        let instant =
            as_utc.checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))?;
        (zone.offset_at(instant) == offset).then_some(instant)
    };

    let resolution = match (candidate(before), candidate(after)) {
        (Some(a), Some(b)) if a != b => LocalResolution::Ambiguous {
            earliest: a.min(b),
            latest: a.max(b),
        },
        (Some(a), _) | (None, Some(a)) => LocalResolution::Single(a),
        (None, None) => LocalResolution::Gap {
            shifted: as_utc
                .checked_sub_signed(Duration::seconds(i64::from(before.local_minus_utc())))?,
        },
    };
    Some(resolution)
}

/// The instant a wall-clock time denotes under `policy`; folds take the
/// earlier instant. `None` when the time is skipped.
pub(crate) fn instant_for(
    zone: &dyn ZoneRules,
    local: NaiveDateTime,
    policy: DstPolicy,
) -> Option<DateTime<Utc>> {
    match resolve_local(zone, local)? {
        LocalResolution::Single(instant) => Some(instant),
        LocalResolution::Ambiguous { earliest, .. } => Some(earliest),
        LocalResolution::Gap { shifted } => match policy {
            DstPolicy::ShiftForward => Some(shifted),
            DstPolicy::Skip => None,
        },
    }
}

/// Displays a zone's UTC offset as `+HH:MM` / `-HH:MM`. Seconds are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetLabel(pub FixedOffset);

impl OffsetLabel {
    /// The offset `zone` applies at `instant`.
    pub fn at(zone: &dyn ZoneRules, instant: DateTime<Utc>) -> Self {
        OffsetLabel(zone.offset_at(instant))
    }
}

impl fmt::Display for OffsetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let east = self.0.local_minus_utc();
        let sign = if east < 0 { '-' } else { '+' };
        let minutes = east.unsigned_abs() / 60;
        write!(f, "{sign}{:02}:{:02}", minutes / 60, minutes % 60)
    }
}
