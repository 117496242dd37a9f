//! # freebusy-engine
//!
//! Busy-time computation for CalDAV calendars.
//!
//! Given the components of a calendar and a query window, the engine reports
//! the ordered, merged intervals during which the owner is busy. Opaque
//! events (with their recurrences expanded) count as busy, and VAVAILABILITY
//! components mark everything outside their AVAILABLE periods as busy, with
//! overlapping availability resolved by PRIORITY (RFC 7953).
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use freebusy_engine::{compute_free_busy, CalendarComponent, FreeBusyQuery, Interval};
//!
//! let at = |h| Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap();
//! let events = vec![
//!     CalendarComponent::event("standup", at(9), at(10)),
//!     CalendarComponent::event("review", at(10), at(11)),
//! ];
//! let result = compute_free_busy(&FreeBusyQuery::new(at(8)).until(at(18)), &events).unwrap();
//! assert_eq!(result.busy, vec![Interval::new(at(9), at(11))]);
//! ```
//!
//! ## Modules
//!
//! - [`freebusy`] -- query windows, the computation and its result
//! - [`availability`] -- VAVAILABILITY priority resolution
//! - [`expander`] -- RRULE/RDATE/EXDATE expansion
//! - [`interval`] -- half-open intervals, clipping and merging
//! - [`component`] -- the calendar component model
//! - [`ics`] -- iCalendar text reader
//! - [`store`] -- calendar sources and an in-memory store
//! - [`config`], [`dst`], [`error`]

pub mod availability;
pub mod component;
pub mod config;
pub mod dst;
pub mod error;
pub mod expander;
pub mod freebusy;
pub mod ics;
pub mod interval;
pub mod store;

pub use component::{
    AvailablePeriod, CalTime, CalendarComponent, ComponentKind, Recurrence, Status, Transparency,
};
pub use config::EngineConfig;
pub use dst::DstPolicy;
pub use error::FreeBusyError;
pub use freebusy::{
    compute_free_busy, compute_free_busy_with, FreeBusyQuery, FreeBusyResult, FreeSlot, When,
};
pub use ics::parse_calendar;
pub use interval::Interval;
pub use store::{
    freebusy_request, CalendarInfo, CalendarSource, IdentityFactory, MemoryStore, Principal,
    SequentialIdentities, StoredObject, UuidIdentities,
};
