//! Recurrence expansion: RRULE, RDATE and EXDATE into concrete start instants.
//!
//! Wraps the `rrule` crate. The rule is evaluated in the zone of DTSTART so
//! wall-clock times stay fixed across DST changes.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::trace;

use crate::component::{CalTime, Recurrence, Timed};
use crate::config::EngineConfig;
use crate::error::{FreeBusyError, Result};
use crate::interval::Interval;

const ICAL_LOCAL: &str = "%Y%m%dT%H%M%S";

/// Start instants of a recurring item that can overlap `[from, to)`.
///
/// `length` bounds the duration of one instance; instances ending at or
/// before `from` are dropped. At most `config.max_instances` rule instances are
/// produced, then RDATEs are added and EXDATEs removed.
///
/// # Errors
/// Returns [`FreeBusyError::InvalidRule`] if the rule text cannot be parsed.
pub fn expand_starts(
    dtstart: &CalTime,
    recurrence: &Recurrence,
    length: Duration,
    from: DateTime<Utc>,
    to: Option<DateTime<Utc>>,
    config: &EngineConfig,
) -> Result<Vec<DateTime<Utc>>> {
    let first = dtstart.to_utc(config)?;
    let mut starts = match recurrence.rule.as_deref() {
        Some(rule) if !rule.trim().is_empty() => {
            rule_instances(dtstart, rule, length, from, to, config)?
        }
        // RDATE/EXDATE without RRULE: DTSTART is still an occurrence.
        _ => vec![first],
    };

    for rdate in &recurrence.rdates {
        starts.push(rdate.to_utc(config)?);
    }

    let exdates = recurrence
        .exdates
        .iter()
        .map(|d| d.to_utc(config))
        .collect::<Result<Vec<_>>>()?;
    starts.retain(|s| !exdates.contains(s));

    starts.retain(|s| {
        s.checked_add_signed(length).is_none_or(|end| end > from) && to.is_none_or(|to| *s < to)
    });
    starts.sort_unstable();
    starts.dedup();
    trace!(count = starts.len(), "expanded recurrence");
    Ok(starts)
}

/// Every instance of `item` that intersects `[from, to)`, unclipped.
pub(crate) fn occurrences<T: Timed>(
    item: &T,
    recurrence: Option<&Recurrence>,
    from: DateTime<Utc>,
    to: Option<DateTime<Utc>>,
    config: &EngineConfig,
) -> Result<Vec<Interval>> {
    let dtstart = item
        .start()
        .ok_or_else(|| FreeBusyError::InvalidInput("component has no DTSTART".to_string()))?;
    let first = dtstart.to_utc(config)?;
    let extent = item.extent(first, config)?;
    let (tz, _) = dtstart.anchor(config);

    let starts = match recurrence {
        Some(recurrence) => {
            expand_starts(dtstart, recurrence, extent.upper_bound(), from, to, config)?
        }
        None => vec![first],
    };
    let mut instances = Vec::with_capacity(starts.len());
    for start in starts {
        let instance = Interval::new(start, extent.end_of(start, tz, config)?);
        if instance.end > from && to.is_none_or(|to| instance.start < to) {
            instances.push(instance);
        }
    }
    Ok(instances)
}

fn rule_instances(
    dtstart: &CalTime,
    rule: &str,
    length: Duration,
    from: DateTime<Utc>,
    to: Option<DateTime<Utc>>,
    config: &EngineConfig,
) -> Result<Vec<DateTime<Utc>>> {
    let (tz, local) = dtstart.anchor(config);
    let rule = normalize_until(rule, tz, config)?;
    let text = format!(
        "DTSTART;TZID={}:{}\nRRULE:{}",
        tz.name(),
        local.format(ICAL_LOCAL),
        rule
    );

    let mut set: RRuleSet = text
        .parse()
        .map_err(|e| FreeBusyError::InvalidRule(format!("{e}")))?;

    // The rrule bounds are widened by a second so either inclusivity works;
    // exact filtering happens in the caller.
    let lower = length
        .checked_add(&Duration::seconds(1))
        .and_then(|margin| from.checked_sub_signed(margin))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    set = set.after(lower.with_timezone(&rrule::Tz::UTC));
    if let Some(to) = to {
        let upper = to.checked_add_signed(Duration::seconds(1)).unwrap_or(to);
        set = set.before(upper.with_timezone(&rrule::Tz::UTC));
    }

    let result = set.all(config.max_instances);
    if result.limited {
        trace!(limit = config.max_instances, "recurrence expansion hit the instance limit");
    }
    Ok(result
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&Utc))
        .collect())
}

/// The rrule crate only accepts a UTC UNTIL once DTSTART carries a TZID.
/// Local and DATE values of UNTIL are read in DTSTART's zone, a DATE
/// covering the whole day.
fn normalize_until(rule: &str, tz: Tz, config: &EngineConfig) -> Result<String> {
    let parts = rule
        .trim()
        .split(';')
        .filter(|p| !p.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                Ok(format!("UNTIL={}", until_in_zone(value, tz, config)?))
            }
            _ => Ok(part.to_string()),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(";"))
}

fn until_in_zone(value: &str, tz: Tz, config: &EngineConfig) -> Result<String> {
    let invalid = || FreeBusyError::InvalidRule(format!("bad UNTIL value {value:?}"));
    let value = value.trim();

    let instant = if let Some(utc) = value.strip_suffix(['Z', 'z']) {
        NaiveDateTime::parse_from_str(utc, ICAL_LOCAL)
            .map_err(|_| invalid())?
            .and_utc()
    } else if value.len() == 8 {
        let date = chrono::NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|_| invalid())?;
        let end_of_day = date.and_hms_opt(23, 59, 59).ok_or_else(invalid)?;
        CalTime::Zoned {
            local: end_of_day,
            tz,
        }
        .to_utc(config)?
    } else {
        let local = NaiveDateTime::parse_from_str(value, ICAL_LOCAL).map_err(|_| invalid())?;
        CalTime::Zoned { local, tz }.to_utc(config)?
    };

    Ok(format!("{}Z", instant.format(ICAL_LOCAL)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_until_stays_utc_for_zoned_rules() {
        let config = EngineConfig::default();
        let tz: Tz = "America/New_York".parse().unwrap();
        let rule = normalize_until("FREQ=DAILY;UNTIL=20260110T150000Z", tz, &config).unwrap();
        assert_eq!(rule, "FREQ=DAILY;UNTIL=20260110T150000Z");
    }

    #[test]
    fn local_and_date_until_resolve_in_dtstart_zone() {
        let config = EngineConfig::default();
        let tz: Tz = "America/New_York".parse().unwrap();
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20260110T100000", tz, &config).unwrap(),
            "FREQ=DAILY;UNTIL=20260110T150000Z"
        );
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20260110", tz, &config).unwrap(),
            "FREQ=DAILY;UNTIL=20260111T045959Z"
        );
    }

    #[test]
    fn date_until_covers_the_day() {
        let config = EngineConfig::default();
        let rule = normalize_until("FREQ=WEEKLY;UNTIL=20180831", Tz::UTC, &config).unwrap();
        assert_eq!(rule, "FREQ=WEEKLY;UNTIL=20180831T235959Z");
    }

    #[test]
    fn malformed_until_is_an_invalid_rule() {
        let config = EngineConfig::default();
        assert!(matches!(
            normalize_until("FREQ=DAILY;UNTIL=tomorrow", Tz::UTC, &config),
            Err(FreeBusyError::InvalidRule(_))
        ));
    }
}
