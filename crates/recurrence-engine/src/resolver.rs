//! Joins the candidate stream with per-instance overrides.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::event::{BaseEvent, Occurrence, Override, Replacement};

/// Turns ascending candidate starts into [`Occurrence`]s, applying overrides
/// by exact recurrence-id match.
///
/// Overrides whose id the cursor has passed without a match are orphans; so
/// is every unmatched override once the candidates run out. Overrides beyond
/// the last candidate examined are left undecided, since a caller that stops
/// early has not seen the instance they would attach to.
#[derive(Debug)]
pub struct OverrideResolver<'a, I> {
    candidates: I,
    base: &'a BaseEvent,
    pending: BTreeMap<DateTime<Utc>, &'a Override>,
    orphans: Vec<DateTime<Utc>>,
    exhausted: bool,
}

impl<'a, I> OverrideResolver<'a, I>
where
    I: Iterator<Item = DateTime<Utc>>,
{
    pub fn new(candidates: I, base: &'a BaseEvent) -> Self {
        let pending = base
            .overrides()
            .iter()
            .map(|ov| (ov.recurrence_id, ov))
            .collect();
        OverrideResolver {
            candidates,
            base,
            pending,
            orphans: Vec::new(),
            exhausted: false,
        }
    }

    /// Orphaned recurrence ids found so far, ascending.
    pub fn finish(mut self) -> Vec<DateTime<Utc>> {
        if self.exhausted {
            self.orphan_all();
        }
        self.orphans.sort_unstable();
        self.orphans
    }

    /// The underlying candidate stream, e.g. to ask a generator whether it was cut off.
    pub fn candidates(&self) -> &I {
        &self.candidates
    }

    fn orphan_before(&mut self, candidate: DateTime<Utc>) {
        let later = self.pending.split_off(&candidate);
        let passed = std::mem::replace(&mut self.pending, later);
        for id in passed.into_keys() {
            self.orphan(id);
        }
    }

    fn orphan_all(&mut self) {
        let remaining = std::mem::take(&mut self.pending);
        for id in remaining.into_keys() {
            self.orphan(id);
        }
    }

    fn orphan(&mut self, recurrence_id: DateTime<Utc>) {
        tracing::warn!(
            recurrence_id = %recurrence_id,
            timezone = self.base.timezone(),
            "override does not match any occurrence of the series"
        );
        self.orphans.push(recurrence_id);
    }

    fn occurrence(&self, recurrence_id: DateTime<Utc>, ov: Option<&Override>) -> Occurrence {
        let base = self.base;
        match ov.map(|ov| ov.replacement.as_ref()) {
            None => Occurrence {
                start: recurrence_id,
                end: base.end_for(recurrence_id),
                recurrence_id,
                sequence: base.sequence(),
                is_cancelled: base.status().is_cancelled(),
                is_modified: false,
                status: base.status(),
            },
            Some(None) => Occurrence {
                start: recurrence_id,
                end: base.end_for(recurrence_id),
                recurrence_id,
                sequence: base.sequence(),
                is_cancelled: true,
                is_modified: false,
                status: base.status(),
            },
            Some(Some(Replacement {
                start,
                end,
                sequence,
                status,
            })) => {
                let status = status.unwrap_or(base.status());
                Occurrence {
                    start: *start,
                    end: *end,
                    recurrence_id,
                    sequence: *sequence,
                    is_cancelled: status.is_cancelled(),
                    is_modified: true,
                    status,
                }
            }
        }
    }
}

impl<I> Iterator for OverrideResolver<'_, I>
where
    I: Iterator<Item = DateTime<Utc>>,
{
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        if self.exhausted {
            return None;
        }
        let Some(candidate) = self.candidates.next() else {
            self.exhausted = true;
            self.orphan_all();
            return None;
        };
        self.orphan_before(candidate);
        let ov = self.pending.remove(&candidate);
        Some(self.occurrence(candidate, ov))
    }
}
