//! The composed pipeline: generate → resolve overrides → clip to the window.

use std::option;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::event::{BaseEvent, Occurrence};
use crate::generator::{OccurrenceGenerator, DEFAULT_MAX_BARREN_YEARS};
use crate::query::{clip, Window};
use crate::resolver::OverrideResolver;
use crate::zone::{DstPolicy, OffsetLabel};

/// Knobs for [`Expander`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Treatment of wall-clock times that fall in a DST gap.
    pub dst_policy: DstPolicy,
    /// Years of consecutive empty periods after which a series is abandoned.
    pub max_barren_years: u32,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        ExpandOptions {
            dst_policy: DstPolicy::default(),
            max_barren_years: DEFAULT_MAX_BARREN_YEARS,
        }
    }
}

/// Result of expanding one event over one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expansion {
    /// Sorted by start, then recurrence id.
    pub occurrences: Vec<Occurrence>,
    /// Recurrence ids of overrides that match no occurrence of the series.
    pub orphaned_overrides: Vec<DateTime<Utc>>,
    /// A [`Cap::MaxOccurrences`](crate::Cap::MaxOccurrences) limit ended the scan.
    pub truncated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Expander {
    options: ExpandOptions,
}

impl Expander {
    pub fn new(options: ExpandOptions) -> Self {
        Expander { options }
    }

    pub fn options(&self) -> &ExpandOptions {
        &self.options
    }

    /// Expand `base` into the occurrences overlapping `window`.
    ///
    /// # Errors
    ///
    /// [`RecurrenceError::UnboundedQuery`](crate::RecurrenceError::UnboundedQuery)
    /// when the window is open, the rule has no COUNT/UNTIL and no cap is set.
    pub fn expand(&self, base: &BaseEvent, window: &Window) -> Result<Expansion> {
        window.check_bounded(base.rule())?;

        // Replacements may move an instance into the window from a later
        // recurrence id, so scan at least as far as the last override.
        let last_override = base.overrides().last().map(|ov| ov.recurrence_id);
        let horizon = window.effective_end().map(|end| match last_override {
            Some(id) if id >= end => id
                .checked_add_signed(Duration::seconds(1))
                .unwrap_or(id),
            _ => end,
        });

        let candidates = match base.rule() {
            Some(rule) => {
                let mut generator = OccurrenceGenerator::new(base, rule, base.exceptions())
                    .with_dst_policy(self.options.dst_policy)
                    .with_max_barren_years(self.options.max_barren_years);
                if let Some(horizon) = horizon {
                    generator = generator.with_horizon(horizon);
                }
                Candidates::Series(Box::new(generator))
            }
            None => {
                let start = base.start();
                let excluded = base.exceptions().contains(base, start);
                Candidates::Single((!excluded).then_some(start).into_iter())
            }
        };

        let resolver = OverrideResolver::new(candidates, base);
        let mut clipped = clip(resolver, window);
        if let Some(id) = last_override {
            clipped = clipped.extend_to(id);
        }

        let mut occurrences: Vec<Occurrence> = clipped.by_ref().collect();
        let truncated = clipped.hit_cap();
        let resolver = clipped.into_inner();
        let cut_off = resolver.candidates().was_cut_off();
        let orphaned_overrides = resolver.finish();

        occurrences.sort_by_key(|o| (o.start, o.recurrence_id));

        tracing::debug!(
            timezone = base.timezone(),
            anchor_offset = %OffsetLabel::at(base.zone(), base.start()),
            rule = ?base.rule().map(ToString::to_string),
            window_start = %window.start(),
            window_end = ?window.effective_end(),
            occurrences = occurrences.len(),
            orphans = orphaned_overrides.len(),
            truncated,
            cut_off,
            "expanded event"
        );

        Ok(Expansion {
            occurrences,
            orphaned_overrides,
            truncated,
        })
    }
}

/// Expand with default options.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use recurrence_engine::{expand, BaseEvent, EventDuration, IanaZones, Window};
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
/// let event = BaseEvent::builder(start, "UTC")
///     .duration(EventDuration::new(0, 3600))
///     .rule("FREQ=WEEKLY;BYDAY=MO,WE;COUNT=4".parse().unwrap())
///     .build(&IanaZones)
///     .unwrap();
/// let window = Window::between(start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()).unwrap();
/// let expansion = expand(&event, &window).unwrap();
/// assert_eq!(expansion.occurrences.len(), 4);
/// ```
///
/// # Errors
///
/// See [`Expander::expand`].
pub fn expand(base: &BaseEvent, window: &Window) -> Result<Expansion> {
    Expander::default().expand(base, window)
}

/// Either the single instance of a one-off event (unless excluded) or a
/// rule's series.
#[derive(Debug)]
enum Candidates {
    Single(option::IntoIter<DateTime<Utc>>),
    Series(Box<OccurrenceGenerator>),
}

impl Candidates {
    fn was_cut_off(&self) -> bool {
        match self {
            Candidates::Single(_) => false,
            Candidates::Series(generator) => generator.was_cut_off(),
        }
    }
}

impl Iterator for Candidates {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<DateTime<Utc>> {
        match self {
            Candidates::Single(single) => single.next(),
            Candidates::Series(generator) => generator.next(),
        }
    }
}
