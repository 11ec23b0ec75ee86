//! Range queries: clip an occurrence stream to a half-open window.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::{RecurrenceError, Result};
use crate::event::Occurrence;
use crate::rule::RecurrenceRule;

/// Bounds generation when the window itself has no end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cap {
    /// Stop after this many occurrences have been returned.
    MaxOccurrences(usize),
    /// Treat the window as ending this long after its start.
    Lookahead(Duration),
}

/// `[start, end)`, where a missing end means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    cap: Option<Cap>,
}

impl Window {
    /// # Errors
    ///
    /// [`RecurrenceError::InvalidWindow`] when `end` is not after `start`.
    pub fn new<Tz: TimeZone>(start: DateTime<Tz>, end: Option<DateTime<Tz>>) -> Result<Self> {
        let start = start.with_timezone(&Utc);
        let end = end.map(|e| e.with_timezone(&Utc));
        if let Some(end) = end {
            if end <= start {
                return Err(RecurrenceError::InvalidWindow(format!(
                    "end {} is not after start {}",
                    end.to_rfc3339(),
                    start.to_rfc3339()
                )));
            }
        }
        Ok(Window {
            start,
            end,
            cap: None,
        })
    }

    pub fn between<Tz: TimeZone>(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self> {
        Window::new(start, Some(end))
    }

    pub fn starting_at<Tz: TimeZone>(start: DateTime<Tz>) -> Self {
        Window {
            start: start.with_timezone(&Utc),
            end: None,
            cap: None,
        }
    }

    #[must_use]
    pub fn with_cap(mut self, cap: Cap) -> Self {
        self.cap = Some(cap);
        self
    }

    #[must_use]
    pub fn with_max_occurrences(self, max: usize) -> Self {
        self.with_cap(Cap::MaxOccurrences(max))
    }

    #[must_use]
    pub fn with_lookahead(self, lookahead: Duration) -> Self {
        self.with_cap(Cap::Lookahead(lookahead))
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn cap(&self) -> Option<Cap> {
        self.cap
    }

    /// The explicit end, or start + lookahead; the earlier when both apply.
    pub fn effective_end(&self) -> Option<DateTime<Utc>> {
        let lookahead_end = match self.cap {
            Some(Cap::Lookahead(lookahead)) => self.start.checked_add_signed(lookahead),
            _ => None,
        };
        match (self.end, lookahead_end) {
            (Some(end), Some(lookahead)) => Some(end.min(lookahead)),
            (end, lookahead) => end.or(lookahead),
        }
    }

    fn max_occurrences(&self) -> Option<usize> {
        match self.cap {
            Some(Cap::MaxOccurrences(n)) => Some(n),
            _ => None,
        }
    }

    /// Refuse a query that could never finish: open end, unbounded rule and
    /// no cap.
    ///
    /// # Errors
    ///
    /// [`RecurrenceError::UnboundedQuery`].
    pub fn check_bounded(&self, rule: Option<&RecurrenceRule>) -> Result<()> {
        let unbounded_rule = rule.is_some_and(|r| !r.is_bounded());
        if unbounded_rule && self.effective_end().is_none() && self.max_occurrences().is_none() {
            return Err(RecurrenceError::UnboundedQuery);
        }
        Ok(())
    }
}

/// Keep the occurrences of `occurrences` that overlap `window`.
///
/// `occurrences` must be ascending by recurrence id; the returned iterator
/// stops pulling once ids reach the window's effective end.
pub fn clip<I>(occurrences: I, window: &Window) -> Clip<I>
where
    I: Iterator<Item = Occurrence>,
{
    Clip {
        inner: occurrences,
        start: window.start,
        end: window.effective_end(),
        scan_until: window.effective_end(),
        remaining: window.max_occurrences(),
        hit_cap: false,
        done: false,
    }
}

#[derive(Debug)]
pub struct Clip<I> {
    inner: I,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    scan_until: Option<DateTime<Utc>>,
    remaining: Option<usize>,
    hit_cap: bool,
    done: bool,
}

impl<I> Clip<I> {
    /// Keep scanning recurrence ids up to `until` (inclusive) even when it
    /// lies past the window end. A replacement can move a late instance into
    /// the window; this makes sure it is seen.
    #[must_use]
    pub fn extend_to(mut self, until: DateTime<Utc>) -> Self {
        self.scan_until = match self.scan_until {
            Some(current) if current > until => Some(current),
            Some(_) => until.checked_add_signed(Duration::seconds(1)).or(Some(until)),
            None => None,
        };
        self
    }

    /// Whether [`Cap::MaxOccurrences`] stopped the scan.
    pub fn hit_cap(&self) -> bool {
        self.hit_cap
    }

    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I> Iterator for Clip<I>
where
    I: Iterator<Item = Occurrence>,
{
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        if self.done {
            return None;
        }
        if self.remaining == Some(0) {
            self.done = true;
            self.hit_cap = true;
            return None;
        }
        loop {
            let Some(occurrence) = self.inner.next() else {
                self.done = true;
                return None;
            };
            if self.scan_until.is_some_and(|until| occurrence.recurrence_id >= until) {
                self.done = true;
                return None;
            }
            if occurrence.overlaps(self.start, self.end) {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some(occurrence);
            }
        }
    }
}
