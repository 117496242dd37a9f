//! Storage collaborator: where the engine's components come from.
//!
//! [`CalendarSource`] is the seam a CalDAV transport implements.
//! [`MemoryStore`] is an in-process implementation with CalDAV-shaped URLs:
//! principal `<base>/<name>/`, calendar `<principal>/<cal_id>/`, object
//! `<calendar>/<uid>.ics`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use caldav_core::{IntoResourceUrl, ResourceUrl};
use tracing::debug;

use crate::component::{CalendarComponent, ComponentKind};
use crate::config::EngineConfig;
use crate::error::{FreeBusyError, Result};
use crate::freebusy::{compute_free_busy_with, FreeBusyQuery, FreeBusyResult};
use crate::ics;

/// Anything that can list the components of a calendar collection.
pub trait CalendarSource {
    /// # Errors
    /// [`FreeBusyError::NotFound`] when `calendar` does not exist.
    fn components(&self, calendar: &ResourceUrl) -> Result<Vec<CalendarComponent>>;
}

/// Fetch a calendar's components and compute its busy time.
pub fn freebusy_request<S: CalendarSource + ?Sized>(
    source: &S,
    calendar: &ResourceUrl,
    query: &FreeBusyQuery,
    config: &EngineConfig,
) -> Result<FreeBusyResult> {
    let components = source.components(calendar)?;
    debug!(%calendar, components = components.len(), "free-busy request");
    compute_free_busy_with(query, &components, config)
}

/// Source of fresh principal and calendar identities.
pub trait IdentityFactory {
    fn next_identity(&self) -> String;
}

/// Random identities (UUID v4, simple form).
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdentities;

impl IdentityFactory for UuidIdentities {
    fn next_identity(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Deterministic identities `<prefix>1`, `<prefix>2`, ...
#[derive(Debug)]
pub struct SequentialIdentities {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdentities {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdentityFactory for SequentialIdentities {
    fn next_identity(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.prefix)
    }
}

/// A user whose calendar home is the principal URL itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub url: ResourceUrl,
}

impl Principal {
    pub fn calendar_home(&self) -> &ResourceUrl {
        &self.url
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarInfo {
    pub url: ResourceUrl,
    pub name: String,
    /// Empty means every kind is accepted.
    pub supported: Vec<ComponentKind>,
}

impl CalendarInfo {
    pub fn supports(&self, kind: ComponentKind) -> bool {
        self.supported.is_empty() || self.supported.contains(&kind)
    }
}

/// One calendar object resource: a master component and its overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: ResourceUrl,
    pub uid: String,
    pub components: Vec<CalendarComponent>,
}

impl StoredObject {
    pub fn kind(&self) -> Option<ComponentKind> {
        self.components.first().map(|c| c.kind)
    }
}

#[derive(Debug)]
struct Collection {
    info: CalendarInfo,
    objects: BTreeMap<String, StoredObject>,
}

/// Calendars held in memory, keyed by canonical URL.
#[derive(Debug)]
pub struct MemoryStore {
    base: ResourceUrl,
    calendars: BTreeMap<String, Collection>,
}

impl MemoryStore {
    /// A store rooted at `base`, e.g. `http://localhost:5232/`.
    pub fn new<T: IntoResourceUrl>(base: T) -> Result<Self> {
        Ok(Self {
            base: ResourceUrl::objectify(base)?,
            calendars: BTreeMap::new(),
        })
    }

    pub fn base(&self) -> &ResourceUrl {
        &self.base
    }

    pub fn principal(&self, name: &str) -> Result<Principal> {
        if name.is_empty() || name.contains('/') {
            return Err(FreeBusyError::InvalidInput(format!(
                "invalid principal name {name:?}"
            )));
        }
        Ok(Principal {
            name: name.to_string(),
            url: self.base.join(format!("{name}/"))?,
        })
    }

    /// A principal with a freshly generated name.
    pub fn new_principal(&self, identities: &dyn IdentityFactory) -> Result<Principal> {
        self.principal(&identities.next_identity())
    }

    /// Create a calendar under `principal`'s home. An empty `supported`
    /// list accepts every component kind.
    pub fn make_calendar(
        &mut self,
        principal: &Principal,
        name: &str,
        cal_id: &str,
        supported: &[ComponentKind],
    ) -> Result<ResourceUrl> {
        let url = principal.calendar_home().join(format!("{cal_id}/"))?;
        let key = key(&url);
        if self.calendars.contains_key(&key) {
            return Err(FreeBusyError::InvalidInput(format!(
                "calendar {} already exists",
                url.unauth()
            )));
        }
        debug!(%url, name, "created calendar");
        self.calendars.insert(
            key,
            Collection {
                info: CalendarInfo {
                    url: url.clone(),
                    name: name.to_string(),
                    supported: supported.to_vec(),
                },
                objects: BTreeMap::new(),
            },
        );
        Ok(url)
    }

    /// Calendars under `principal`'s home, in URL order.
    pub fn calendars(&self, principal: &Principal) -> Vec<&CalendarInfo> {
        let home = format!("{}/", key(principal.calendar_home()));
        self.calendars
            .iter()
            .filter(|(k, _)| k.starts_with(&home))
            .map(|(_, c)| &c.info)
            .collect()
    }

    pub fn calendar(&self, url: &ResourceUrl) -> Result<&CalendarInfo> {
        self.collection(url).map(|c| &c.info)
    }

    pub fn delete_calendar(&mut self, url: &ResourceUrl) -> Result<()> {
        self.calendars.remove(&key(url)).ok_or_else(|| not_found(url))?;
        debug!(%url, "deleted calendar");
        Ok(())
    }

    /// Store `component`, returning its object URL. A component sharing the
    /// UID of an existing object joins it, replacing any component with the
    /// same RECURRENCE-ID.
    ///
    /// # Errors
    /// [`FreeBusyError::Unauthorized`] when the calendar does not support the
    /// component's kind.
    pub fn add_component(
        &mut self,
        calendar: &ResourceUrl,
        component: CalendarComponent,
    ) -> Result<ResourceUrl> {
        let collection = self.collection_mut(calendar)?;
        if !collection.info.supports(component.kind) {
            return Err(FreeBusyError::Unauthorized(format!(
                "{} does not accept {}",
                collection.info.url.unauth(),
                component.kind.ical_name()
            )));
        }

        let url = collection
            .info
            .url
            .join(format!("{}.ics", urlencoding::encode(&component.uid)))?;
        let object = collection
            .objects
            .entry(component.uid.clone())
            .or_insert_with(|| StoredObject {
                url: url.clone(),
                uid: component.uid.clone(),
                components: Vec::new(),
            });
        if object.kind().is_some_and(|k| k != component.kind) {
            return Err(FreeBusyError::InvalidInput(format!(
                "UID {} is already used by a {}",
                component.uid,
                object.kind().map_or("", ComponentKind::ical_name)
            )));
        }
        object
            .components
            .retain(|c| c.recurrence_id != component.recurrence_id);
        object.components.push(component);
        Ok(url)
    }

    /// Parse `text` and store every component it contains.
    pub fn add_ics(&mut self, calendar: &ResourceUrl, text: &str) -> Result<Vec<ResourceUrl>> {
        let mut urls: Vec<ResourceUrl> = Vec::new();
        for component in ics::parse_calendar(text)? {
            let url = self.add_component(calendar, component)?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }

    /// Objects whose components are of `kind`.
    pub fn objects(&self, calendar: &ResourceUrl, kind: ComponentKind) -> Result<Vec<&StoredObject>> {
        Ok(self
            .collection(calendar)?
            .objects
            .values()
            .filter(|o| o.kind() == Some(kind))
            .collect())
    }

    /// To-dos, optionally skipping completed ones.
    pub fn todos(&self, calendar: &ResourceUrl, include_completed: bool) -> Result<Vec<&StoredObject>> {
        let mut todos = self.objects(calendar, ComponentKind::Todo)?;
        if !include_completed {
            todos.retain(|o| !o.components.iter().any(CalendarComponent::is_completed));
        }
        Ok(todos)
    }

    pub fn object_by_uid(&self, calendar: &ResourceUrl, uid: &str) -> Result<&StoredObject> {
        self.collection(calendar)?
            .objects
            .get(uid)
            .ok_or_else(|| FreeBusyError::NotFound(format!("no object with UID {uid} in {calendar}")))
    }

    pub fn object_by_url(&self, url: &ResourceUrl) -> Result<&StoredObject> {
        self.calendars
            .values()
            .flat_map(|c| c.objects.values())
            .find(|o| o.url == *url)
            .ok_or_else(|| not_found(url))
    }

    pub fn delete_object(&mut self, url: &ResourceUrl) -> Result<()> {
        for collection in self.calendars.values_mut() {
            let uid = collection
                .objects
                .values()
                .find(|o| o.url == *url)
                .map(|o| o.uid.clone());
            if let Some(uid) = uid {
                collection.objects.remove(&uid);
                debug!(%url, "deleted object");
                return Ok(());
            }
        }
        Err(not_found(url))
    }

    fn collection(&self, url: &ResourceUrl) -> Result<&Collection> {
        self.calendars.get(&key(url)).ok_or_else(|| not_found(url))
    }

    fn collection_mut(&mut self, url: &ResourceUrl) -> Result<&mut Collection> {
        self.calendars.get_mut(&key(url)).ok_or_else(|| not_found(url))
    }
}

impl CalendarSource for MemoryStore {
    fn components(&self, calendar: &ResourceUrl) -> Result<Vec<CalendarComponent>> {
        Ok(self
            .collection(calendar)?
            .objects
            .values()
            .flat_map(|o| o.components.iter().cloned())
            .collect())
    }
}

fn key(url: &ResourceUrl) -> String {
    url.canonical().to_string()
}

fn not_found(url: &ResourceUrl) -> FreeBusyError {
    FreeBusyError::NotFound(url.unauth().to_string())
}
