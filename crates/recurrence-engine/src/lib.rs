//! # recurrence-engine
//!
//! Deterministic expansion of recurring calendar events.
//!
//! Given a recurrence rule, exclusions and per-instance overrides, the engine
//! produces the concrete, ordered occurrences that overlap a caller's time
//! window. Everything is a pure computation over values: no storage, no
//! clock, no I/O. Timezone rules are injected through [`TimeZoneProvider`].
//!
//! ## Modules
//!
//! - [`parser`] — `FREQ=WEEKLY;BYDAY=MO,WE` text → [`RecurrenceRule`]
//! - [`rule`] — the rule value type and its canonical text form
//! - [`exceptions`] — exception dates and the exclusion rule
//! - [`generator`] — lazy, ascending candidate starts for a rule
//! - [`resolver`] — applies per-instance overrides to candidates
//! - [`query`] — half-open windows, caps, and clipping
//! - [`expand`] — the composed pipeline
//! - [`event`] — validated events and occurrences
//! - [`record`] — serde records from the persistence layer
//! - [`zone`] — timezone capability, civil-time resolution, DST policy
//! - [`duration`] — event lengths and ISO 8601 durations
//! - [`error`] — Error types

pub mod duration;
pub mod error;
pub mod event;
pub mod exceptions;
pub mod expand;
pub mod generator;
pub mod parser;
pub mod query;
pub mod record;
pub mod resolver;
pub mod rule;
pub mod zone;

pub use duration::{parse_iso_duration, EventDuration};
pub use error::{ParseError, RecurrenceError, Result};
pub use event::{BaseEvent, BaseEventBuilder, EventStatus, Occurrence, Override, Replacement};
pub use exceptions::{ExDate, ExceptionSet};
pub use expand::{expand, ExpandOptions, Expander, Expansion};
pub use generator::{OccurrenceGenerator, DEFAULT_MAX_BARREN_YEARS};
pub use parser::parse_rule;
pub use query::{clip, Cap, Clip, Window};
pub use record::{EventRecord, OverrideRecord};
pub use resolver::OverrideResolver;
pub use rule::{Frequency, RecurrenceRule, Until, WeekdaySelector};
pub use zone::{
    DstPolicy, FixedZone, IanaZone, IanaZones, OffsetLabel, StaticZones, TimeZoneProvider,
    ZoneRules,
};
