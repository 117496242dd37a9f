//! Calendar component model consumed by the engine.
//!
//! Components are plain values: the storage collaborator owns them and the
//! engine borrows them read-only for the duration of a query. Optional
//! iCalendar properties are `Option`s and are checked by presence.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::config::EngineConfig;
use crate::dst;
use crate::error::{FreeBusyError, Result};

/// iCalendar component kinds handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Event,
    Todo,
    Journal,
    Availability,
}

impl ComponentKind {
    /// The iCalendar component name (`VEVENT`, ...).
    pub fn ical_name(self) -> &'static str {
        match self {
            Self::Event => "VEVENT",
            Self::Todo => "VTODO",
            Self::Journal => "VJOURNAL",
            Self::Availability => "VAVAILABILITY",
        }
    }

    pub fn from_ical_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "VEVENT" => Some(Self::Event),
            "VTODO" => Some(Self::Todo),
            "VJOURNAL" => Some(Self::Journal),
            "VAVAILABILITY" => Some(Self::Availability),
            _ => None,
        }
    }
}

/// `TRANSP`: whether an event consumes busy time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transparency {
    #[default]
    Opaque,
    Transparent,
}

/// `STATUS` values across VEVENT, VTODO and VJOURNAL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Tentative,
    Confirmed,
    Cancelled,
    NeedsAction,
    Completed,
    InProcess,
    Draft,
    Final,
    Other(String),
}

impl Status {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "TENTATIVE" => Self::Tentative,
            "CONFIRMED" => Self::Confirmed,
            "CANCELLED" => Self::Cancelled,
            "NEEDS-ACTION" => Self::NeedsAction,
            "COMPLETED" => Self::Completed,
            "IN-PROCESS" => Self::InProcess,
            "DRAFT" => Self::Draft,
            "FINAL" => Self::Final,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

/// A DATE or DATE-TIME value as written in the calendar data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalTime {
    /// `...Z`
    Utc(DateTime<Utc>),
    /// `TZID=...:` local time.
    Zoned { local: NaiveDateTime, tz: Tz },
    /// Local time without zone information.
    Floating(NaiveDateTime),
    /// `VALUE=DATE`
    Date(NaiveDate),
}

impl CalTime {
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// The zone and wall-clock time this value is anchored to. Floating
    /// values and dates anchor to the configured floating zone.
    pub(crate) fn anchor(&self, config: &EngineConfig) -> (Tz, NaiveDateTime) {
        match *self {
            Self::Utc(dt) => (Tz::UTC, dt.naive_utc()),
            Self::Zoned { local, tz } => (tz, local),
            Self::Floating(local) => (config.floating_timezone, local),
            Self::Date(date) => (config.floating_timezone, date.and_time(NaiveTime::MIN)),
        }
    }

    /// Resolve to an absolute instant.
    pub fn to_utc(&self, config: &EngineConfig) -> Result<DateTime<Utc>> {
        match *self {
            Self::Utc(dt) => Ok(dt),
            _ => {
                let (tz, local) = self.anchor(config);
                dst::resolve_local(local, tz, config.dst_policy)
            }
        }
    }
}

impl From<DateTime<Utc>> for CalTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::Utc(dt)
    }
}

impl From<NaiveDate> for CalTime {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl From<NaiveDateTime> for CalTime {
    fn from(local: NaiveDateTime) -> Self {
        Self::Floating(local)
    }
}

/// Recurrence properties: `RRULE`, `RDATE`, `EXDATE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recurrence {
    /// RRULE value without the `RRULE:` prefix, e.g. `FREQ=YEARLY`.
    pub rule: Option<String>,
    pub rdates: Vec<CalTime>,
    pub exdates: Vec<CalTime>,
}

impl Recurrence {
    pub fn rule(rule: impl Into<String>) -> Self {
        Self {
            rule: Some(rule.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_exdate(mut self, exdate: impl Into<CalTime>) -> Self {
        self.exdates.push(exdate.into());
        self
    }

    #[must_use]
    pub fn with_rdate(mut self, rdate: impl Into<CalTime>) -> Self {
        self.rdates.push(rdate.into());
        self
    }
}

/// How far one instance reaches past its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Extent {
    /// A fixed absolute length.
    Fixed(Duration),
    /// Whole calendar days in the start's zone, so each instance ends on a
    /// local midnight whatever the DST transitions in between.
    Days(u64),
}

impl Extent {
    /// An absolute length no instance exceeds. Used to widen expansion
    /// bounds before the exact ends are known.
    pub(crate) fn upper_bound(self) -> Duration {
        match self {
            Self::Fixed(length) => length,
            Self::Days(days) => i64::try_from(days)
                .ok()
                .and_then(|d| Duration::try_days(d.checked_add(1)?))
                .unwrap_or(Duration::MAX),
        }
    }

    /// End of the instance starting at `start`, whose wall clock is read in `tz`.
    pub(crate) fn end_of(
        self,
        start: DateTime<Utc>,
        tz: Tz,
        config: &EngineConfig,
    ) -> Result<DateTime<Utc>> {
        let overflow = || FreeBusyError::InvalidInput(format!("instance starting {start} never ends"));
        match self {
            Self::Fixed(length) => start.checked_add_signed(length).ok_or_else(overflow),
            Self::Days(days) => {
                let date = start
                    .with_timezone(&tz)
                    .date_naive()
                    .checked_add_days(Days::new(days))
                    .ok_or_else(overflow)?;
                dst::resolve_local(date.and_time(NaiveTime::MIN), tz, config.dst_policy)
            }
        }
    }
}

/// The time-bearing properties shared by events and AVAILABLE periods.
pub(crate) trait Timed {
    fn start(&self) -> Option<&CalTime>;
    fn end(&self) -> Option<&CalTime>;
    fn duration(&self) -> Option<Duration>;

    /// Extent of one instance.
    ///
    /// DTEND wins over DURATION. A DATE start spans whole local days: up to
    /// a DATE end, for a whole-day DURATION, or one day without either. A
    /// DATE-TIME start with neither is instantaneous.
    fn extent(&self, start: DateTime<Utc>, config: &EngineConfig) -> Result<Extent> {
        let invalid = || FreeBusyError::InvalidInput(format!("end precedes start ({start})"));
        let day = Duration::days(1);
        let extent = match (self.start(), self.end(), self.duration()) {
            (Some(CalTime::Date(first)), Some(CalTime::Date(last)), _) => {
                let days = (*last - *first).num_days();
                Extent::Days(u64::try_from(days).map_err(|_| invalid())?)
            }
            (Some(CalTime::Date(_)), None, None) => Extent::Days(1),
            (Some(CalTime::Date(_)), None, Some(duration))
                if duration >= Duration::zero()
                    && (duration.num_seconds() % day.num_seconds() == 0) =>
            {
                Extent::Days(duration.num_days().unsigned_abs())
            }
            (_, Some(end), _) => Extent::Fixed(end.to_utc(config)? - start),
            (_, None, Some(duration)) => Extent::Fixed(duration),
            _ => Extent::Fixed(Duration::zero()),
        };
        if let Extent::Fixed(length) = extent {
            if length < Duration::zero() {
                return Err(invalid());
            }
        }
        Ok(extent)
    }
}

/// An `AVAILABLE` sub-component of a VAVAILABILITY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailablePeriod {
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub start: CalTime,
    pub end: Option<CalTime>,
    pub duration: Option<Duration>,
    pub recurrence: Option<Recurrence>,
}

impl AvailablePeriod {
    pub fn new(start: impl Into<CalTime>, end: impl Into<CalTime>) -> Self {
        Self {
            uid: None,
            summary: None,
            start: start.into(),
            end: Some(end.into()),
            duration: None,
            recurrence: None,
        }
    }

    #[must_use]
    pub fn with_rrule(mut self, rule: impl Into<String>) -> Self {
        self.recurrence = Some(Recurrence::rule(rule));
        self
    }

    #[must_use]
    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }
}

impl Timed for AvailablePeriod {
    fn start(&self) -> Option<&CalTime> {
        Some(&self.start)
    }

    fn end(&self) -> Option<&CalTime> {
        self.end.as_ref()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

/// A typed calendar object: event, to-do, journal or availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarComponent {
    pub kind: ComponentKind,
    pub uid: String,
    pub summary: Option<String>,
    pub start: Option<CalTime>,
    /// DTEND, or DUE for to-dos.
    pub end: Option<CalTime>,
    pub duration: Option<Duration>,
    pub transparency: Transparency,
    pub status: Option<Status>,
    pub completed: Option<CalTime>,
    /// `PRIORITY`, 0-9. Lower non-zero values take precedence.
    pub priority: Option<u8>,
    pub recurrence: Option<Recurrence>,
    /// Set on a component overriding one instance of a recurring master.
    pub recurrence_id: Option<CalTime>,
    /// `AVAILABLE` periods; only meaningful for availability components.
    pub available: Vec<AvailablePeriod>,
}

impl CalendarComponent {
    pub fn new(kind: ComponentKind, uid: impl Into<String>) -> Self {
        Self {
            kind,
            uid: uid.into(),
            summary: None,
            start: None,
            end: None,
            duration: None,
            transparency: Transparency::Opaque,
            status: None,
            completed: None,
            priority: None,
            recurrence: None,
            recurrence_id: None,
            available: Vec::new(),
        }
    }

    /// An opaque event spanning `[start, end)`.
    pub fn event(uid: impl Into<String>, start: impl Into<CalTime>, end: impl Into<CalTime>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
            ..Self::new(ComponentKind::Event, uid)
        }
    }

    /// An availability component spanning `[start, end)`; either bound may
    /// be `None` for an unbounded span.
    pub fn availability(
        uid: impl Into<String>,
        start: Option<CalTime>,
        end: Option<CalTime>,
    ) -> Self {
        Self {
            start,
            end,
            ..Self::new(ComponentKind::Availability, uid)
        }
    }

    #[must_use]
    pub fn transparent(mut self) -> Self {
        self.transparency = Transparency::Transparent;
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_rrule(mut self, rule: impl Into<String>) -> Self {
        self.recurrence = Some(Recurrence::rule(rule));
        self
    }

    #[must_use]
    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    #[must_use]
    pub fn with_recurrence_id(mut self, recurrence_id: impl Into<CalTime>) -> Self {
        self.recurrence_id = Some(recurrence_id.into());
        self
    }

    #[must_use]
    pub fn with_available(mut self, period: AvailablePeriod) -> Self {
        self.available.push(period);
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.transparency == Transparency::Transparent
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == Some(Status::Cancelled)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.is_some() || self.status == Some(Status::Completed)
    }

    /// Rank used to order overlapping availability: 1 is best, 9 worst, and
    /// an absent or zero priority ranks below 9.
    pub(crate) fn availability_rank(&self) -> u8 {
        match self.priority {
            None | Some(0) => 10,
            Some(p) => p,
        }
    }
}

impl Timed for CalendarComponent {
    fn start(&self) -> Option<&CalTime> {
        self.start.as_ref()
    }

    fn end(&self) -> Option<&CalTime> {
        self.end.as_ref()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}
