//! Free-busy computation over a set of calendar components.
//!
//! Events contribute their occurrences, availability components contribute
//! the busy time they imply, and the union is clipped to the query window
//! and merged into a sorted, non-overlapping list.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::availability;
use crate::component::{CalTime, CalendarComponent, ComponentKind};
use crate::config::EngineConfig;
use crate::error::{FreeBusyError, Result};
use crate::expander;
use crate::interval::{self, Interval};

/// A query bound: an absolute instant or a floating local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    Instant(DateTime<Utc>),
    /// Resolved in [`EngineConfig::floating_timezone`].
    Floating(NaiveDateTime),
}

impl When {
    pub fn resolve(&self, config: &EngineConfig) -> Result<DateTime<Utc>> {
        match *self {
            Self::Instant(dt) => Ok(dt),
            Self::Floating(local) => CalTime::Floating(local).to_utc(config),
        }
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for When {
    fn from(dt: DateTime<Tz>) -> Self {
        Self::Instant(dt.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for When {
    fn from(local: NaiveDateTime) -> Self {
        Self::Floating(local)
    }
}

/// The window of a free-busy request. The end is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBusyQuery {
    pub start: When,
    pub end: Option<When>,
}

impl FreeBusyQuery {
    pub fn new(start: impl Into<When>) -> Self {
        Self {
            start: start.into(),
            end: None,
        }
    }

    #[must_use]
    pub fn until(mut self, end: impl Into<When>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// Both bounds as instants.
    pub fn resolve(
        &self,
        config: &EngineConfig,
    ) -> Result<(DateTime<Utc>, Option<DateTime<Utc>>)> {
        let start = self.start.resolve(config)?;
        let end = self.end.map(|e| e.resolve(config)).transpose()?;
        if let Some(end) = end {
            if end < start {
                return Err(FreeBusyError::InvalidInput(format!(
                    "query ends ({end}) before it starts ({start})"
                )));
            }
        }
        Ok((start, end))
    }
}

/// A free time slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl From<Interval> for FreeSlot {
    fn from(i: Interval) -> Self {
        Self {
            start: i.start,
            end: i.end,
            duration_minutes: i.duration_minutes(),
        }
    }
}

/// Busy time within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeBusyResult {
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    /// Sorted by start, non-overlapping, non-touching, inside the window.
    pub busy: Vec<Interval>,
}

impl FreeBusyResult {
    pub fn has_busy(&self) -> bool {
        !self.busy.is_empty()
    }

    /// The gaps between busy intervals. With an open-ended window the time
    /// after the last busy interval is not reported.
    pub fn free_slots(&self) -> Vec<FreeSlot> {
        let mut free = Vec::new();
        let mut cursor = self.window_start;
        for busy in &self.busy {
            if cursor < busy.start {
                free.push(Interval::new(cursor, busy.start).into());
            }
            cursor = cursor.max(busy.end);
        }
        if let Some(end) = self.window_end {
            if cursor < end {
                free.push(Interval::new(cursor, end).into());
            }
        }
        free
    }

    /// The first free slot lasting at least `min_duration_minutes`.
    pub fn first_free_slot(&self, min_duration_minutes: i64) -> Option<FreeSlot> {
        self.free_slots()
            .into_iter()
            .find(|slot| slot.duration_minutes >= min_duration_minutes)
    }
}

/// Compute busy time with the default [`EngineConfig`].
pub fn compute_free_busy(
    query: &FreeBusyQuery,
    components: &[CalendarComponent],
) -> Result<FreeBusyResult> {
    compute_free_busy_with(query, components, &EngineConfig::default())
}

/// Compute busy time for `components` within the query window.
///
/// Transparent and cancelled events, to-dos and journals contribute
/// nothing. An override (same UID, RECURRENCE-ID set) replaces the master
/// occurrence it names.
///
/// # Errors
/// [`FreeBusyError::InvalidInput`] for an inverted window, an event without
/// DTSTART, or an event ending before it starts;
/// [`FreeBusyError::InvalidRule`] for an unparseable RRULE.
pub fn compute_free_busy_with(
    query: &FreeBusyQuery,
    components: &[CalendarComponent],
    config: &EngineConfig,
) -> Result<FreeBusyResult> {
    let (window_start, window_end) = query.resolve(config)?;
    let mut busy = Vec::new();

    if window_end != Some(window_start) {
        busy.extend(event_busy(components, window_start, window_end, config)?);

        let availability: Vec<&CalendarComponent> = components
            .iter()
            .filter(|c| c.kind == ComponentKind::Availability)
            .collect();
        busy.extend(availability::busy_from_availability(
            &availability,
            window_start,
            window_end,
            config,
        )?);
    }

    let busy = interval::merge(busy);
    debug!(
        components = components.len(),
        intervals = busy.len(),
        %window_start,
        "computed free-busy"
    );
    Ok(FreeBusyResult {
        window_start,
        window_end,
        busy,
    })
}

fn event_busy(
    components: &[CalendarComponent],
    window_start: DateTime<Utc>,
    window_end: Option<DateTime<Utc>>,
    config: &EngineConfig,
) -> Result<Vec<Interval>> {
    let events: Vec<&CalendarComponent> = components
        .iter()
        .filter(|c| c.kind == ComponentKind::Event)
        .collect();

    // Instants replaced by overrides, per UID.
    let mut overridden: HashMap<&str, Vec<DateTime<Utc>>> = HashMap::new();
    for event in &events {
        if let Some(rid) = &event.recurrence_id {
            overridden
                .entry(event.uid.as_str())
                .or_default()
                .push(rid.to_utc(config)?);
        }
    }

    let mut busy = Vec::new();
    for event in events {
        if event.is_transparent() || event.is_cancelled() {
            continue;
        }
        let recurrence = match event.recurrence_id {
            Some(_) => None,
            None => event.recurrence.as_ref(),
        };
        let instances =
            expander::occurrences(event, recurrence, window_start, window_end, config)?;
        let skip = match event.recurrence_id {
            None => overridden.get(event.uid.as_str()),
            Some(_) => None,
        };
        busy.extend(
            instances
                .into_iter()
                .filter(|i| skip.is_none_or(|s| !s.contains(&i.start)))
                .filter_map(|i| i.clip(window_start, window_end)),
        );
    }
    Ok(busy)
}
