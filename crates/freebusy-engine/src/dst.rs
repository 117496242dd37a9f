//! DST transition policies for local times.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{FreeBusyError, Result};

/// Policy for local times that fall during DST transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Ambiguous times (fall back) take the earlier instant. Times in the gap
    /// (spring forward) shift forward by the length of the gap.
    #[default]
    Earliest,
    /// Ambiguous times take the later instant. Gaps shift forward.
    Latest,
    /// Ambiguous and non-existent local times are rejected.
    Reject,
}

/// Resolve a wall-clock time in `tz` to an absolute instant.
pub fn resolve_local(local: NaiveDateTime, tz: Tz, policy: DstPolicy) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, latest) => match policy {
            DstPolicy::Earliest => Ok(earliest.with_timezone(&Utc)),
            DstPolicy::Latest => Ok(latest.with_timezone(&Utc)),
            DstPolicy::Reject => Err(FreeBusyError::InvalidInput(format!(
                "local time {local} is ambiguous in {tz}"
            ))),
        },
        LocalResult::None => {
            if policy == DstPolicy::Reject {
                return Err(FreeBusyError::InvalidInput(format!(
                    "local time {local} does not exist in {tz}"
                )));
            }
            // Offset in force before the transition.
            let before = tz
                .offset_from_utc_datetime(&(local - Duration::days(1)))
                .fix();
            let utc = local - Duration::seconds(i64::from(before.local_minus_utc()));
            Ok(Utc.from_utc_datetime(&utc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn gap_shifts_forward() {
        // 2026-03-08 02:30 does not exist in Los Angeles; it becomes 03:30 PDT.
        let tz: Tz = "America/Los_Angeles".parse().unwrap();
        let resolved = resolve_local(local(2026, 3, 8, 2, 30), tz, DstPolicy::Earliest).unwrap();
        assert_eq!(resolved, Utc.with_ymd_and_hms(2026, 3, 8, 10, 30, 0).unwrap());
    }

    #[test]
    fn ambiguous_time_follows_policy() {
        // 2026-11-01 01:30 happens twice in Los Angeles.
        let tz: Tz = "America/Los_Angeles".parse().unwrap();
        let early = resolve_local(local(2026, 11, 1, 1, 30), tz, DstPolicy::Earliest).unwrap();
        let late = resolve_local(local(2026, 11, 1, 1, 30), tz, DstPolicy::Latest).unwrap();
        assert_eq!(early, Utc.with_ymd_and_hms(2026, 11, 1, 8, 30, 0).unwrap());
        assert_eq!(late, Utc.with_ymd_and_hms(2026, 11, 1, 9, 30, 0).unwrap());
        assert!(resolve_local(local(2026, 11, 1, 1, 30), tz, DstPolicy::Reject).is_err());
    }
}
