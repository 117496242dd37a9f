//! VAVAILABILITY resolution.
//!
//! Each availability component declares a span during which its owner is
//! busy except inside the component's AVAILABLE periods. Where spans
//! overlap, the component with the best PRIORITY decides; ties go to the
//! component listed first. Time outside every span contributes nothing.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::component::CalendarComponent;
use crate::config::EngineConfig;
use crate::error::{FreeBusyError, Result};
use crate::expander;
use crate::interval::{self, Interval};

/// An availability component reduced to what the sweep needs.
#[derive(Debug)]
struct Layer {
    span: Interval,
    rank: u8,
    order: usize,
    available: Vec<Interval>,
}

/// Busy time implied by `components` within `[window_start, window_end)`.
///
/// Non-availability components are ignored. An unbounded window end lets
/// busy time run to the end of an unbounded span.
pub fn busy_from_availability(
    components: &[&CalendarComponent],
    window_start: DateTime<Utc>,
    window_end: Option<DateTime<Utc>>,
    config: &EngineConfig,
) -> Result<Vec<Interval>> {
    let mut layers = Vec::new();
    for (order, component) in components.iter().enumerate() {
        if let Some(layer) = layer(component, order, window_start, window_end, config)? {
            layers.push(layer);
        }
    }
    if layers.is_empty() {
        return Ok(Vec::new());
    }

    let mut points: Vec<DateTime<Utc>> = layers
        .iter()
        .flat_map(|l| [l.span.start, l.span.end])
        .collect();
    points.sort_unstable();
    points.dedup();

    let mut busy = Vec::new();
    for pair in points.windows(2) {
        let segment = Interval::new(pair[0], pair[1]);
        let winner = layers
            .iter()
            .filter(|l| l.span.start <= segment.start && segment.end <= l.span.end)
            .min_by_key(|l| (l.rank, l.order));
        if let Some(winner) = winner {
            busy.extend(interval::subtract(&[segment], &winner.available));
        }
    }

    let busy = interval::merge(busy);
    debug!(
        layers = layers.len(),
        intervals = busy.len(),
        "resolved availability"
    );
    Ok(busy)
}

fn layer(
    component: &CalendarComponent,
    order: usize,
    window_start: DateTime<Utc>,
    window_end: Option<DateTime<Utc>>,
    config: &EngineConfig,
) -> Result<Option<Layer>> {
    let span_start = match &component.start {
        Some(start) => start.to_utc(config)?,
        None => DateTime::<Utc>::MIN_UTC,
    };
    let span_end = match (&component.end, component.duration) {
        (Some(end), _) => end.to_utc(config)?,
        (None, Some(duration)) if component.start.is_some() => span_start
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
        _ => DateTime::<Utc>::MAX_UTC,
    };
    if span_end < span_start {
        return Err(FreeBusyError::InvalidInput(format!(
            "availability {} ends before it starts",
            component.uid
        )));
    }

    let upper = window_end.unwrap_or(DateTime::<Utc>::MAX_UTC);
    let Some(span) = Interval::new(span_start, span_end).clip(window_start, Some(upper)) else {
        return Ok(None);
    };

    let to = (span.end < DateTime::<Utc>::MAX_UTC).then_some(span.end);
    let mut available = Vec::new();
    for period in &component.available {
        let instances = expander::occurrences(
            period,
            period.recurrence.as_ref(),
            span.start,
            to,
            config,
        )?;
        available.extend(instances.into_iter().filter_map(|i| i.clip(span.start, Some(span.end))));
    }

    Ok(Some(Layer {
        span,
        rank: component.availability_rank(),
        order,
        available: interval::merge(available),
    }))
}
