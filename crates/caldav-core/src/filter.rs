//! CalDAV REPORT bodies: `calendar-query` filters and `free-busy-query`.
//!
//! Filters mirror the RFC 4791 section 9.7 element tree:
//!
//! ```text
//! filter
//! └── comp-filter name="VCALENDAR"
//!     └── comp-filter name="VEVENT"
//!         ├── time-range start=.. end=..
//!         └── prop-filter name="UID"
//!             └── text-match negate-condition="yes"
//! ```
//!
//! Builders never fail; mandatory attributes are checked when the body is
//! rendered, so a `CompFilter` without a name is representable but cannot be
//! written out.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{DavError, Result};

/// XML namespaces used in CalDAV request bodies.
pub mod ns {
    /// WebDAV namespace.
    pub const DAV: &str = "DAV:";

    /// CalDAV namespace.
    pub const CALDAV: &str = "urn:ietf:params:xml:ns:caldav";
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Format an instant the way CalDAV time-range attributes expect it.
pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// `<C:time-range>`; at least one bound must be present when rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// A range starting at `start`, open-ended when `end` is `None`.
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start: Some(start),
            end,
        }
    }

    /// A range with only an upper bound.
    pub fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    fn write(&self, writer: &mut XmlWriter, element: &str) -> Result<()> {
        if self.start.is_none() && self.end.is_none() {
            return Err(DavError::EmptyTimeRange);
        }
        let mut range = BytesStart::new(element);
        if let Some(start) = self.start {
            range.push_attribute(("start", format_utc(start).as_str()));
        }
        if let Some(end) = self.end {
            range.push_attribute(("end", format_utc(end).as_str()));
        }
        writer.write_event(Event::Empty(range))?;
        Ok(())
    }
}

/// `<C:text-match>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    pub text: String,
    pub collation: Option<String>,
    pub negate: bool,
}

impl TextMatch {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            collation: None,
            negate: false,
        }
    }

    /// Match components whose property does NOT contain the text.
    #[must_use]
    pub fn negate(mut self) -> Self {
        self.negate = true;
        self
    }

    #[must_use]
    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    fn write(&self, writer: &mut XmlWriter) -> Result<()> {
        let mut start = BytesStart::new("C:text-match");
        if let Some(collation) = &self.collation {
            start.push_attribute(("collation", collation.as_str()));
        }
        if self.negate {
            start.push_attribute(("negate-condition", "yes"));
        }
        writer.write_event(Event::Start(start))?;
        writer.write_event(Event::Text(BytesText::new(&self.text)))?;
        writer.write_event(Event::End(BytesEnd::new("C:text-match")))?;
        Ok(())
    }
}

/// `<C:prop-filter>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropFilter {
    pub name: String,
    pub is_not_defined: bool,
    pub time_range: Option<TimeRange>,
    pub text_match: Option<TextMatch>,
}

impl PropFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Match components where the property is absent.
    #[must_use]
    pub fn is_not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    #[must_use]
    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    #[must_use]
    pub fn text_match(mut self, text_match: TextMatch) -> Self {
        self.text_match = Some(text_match);
        self
    }

    fn write(&self, writer: &mut XmlWriter) -> Result<()> {
        if self.name.is_empty() {
            return Err(DavError::MissingAttribute {
                element: "prop-filter",
                attribute: "name",
            });
        }
        let mut start = BytesStart::new("C:prop-filter");
        start.push_attribute(("name", self.name.as_str()));

        let has_children =
            self.is_not_defined || self.time_range.is_some() || self.text_match.is_some();
        if !has_children {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        if self.is_not_defined {
            writer.write_event(Event::Empty(BytesStart::new("C:is-not-defined")))?;
        }
        if let Some(range) = &self.time_range {
            range.write(writer, "C:time-range")?;
        }
        if let Some(text_match) = &self.text_match {
            text_match.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("C:prop-filter")))?;
        Ok(())
    }
}

/// `<C:comp-filter>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompFilter {
    pub name: String,
    pub is_not_defined: bool,
    pub time_range: Option<TimeRange>,
    pub prop_filters: Vec<PropFilter>,
    pub comp_filters: Vec<CompFilter>,
}

impl CompFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_not_defined(mut self) -> Self {
        self.is_not_defined = true;
        self
    }

    #[must_use]
    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    #[must_use]
    pub fn prop_filter(mut self, filter: PropFilter) -> Self {
        self.prop_filters.push(filter);
        self
    }

    #[must_use]
    pub fn comp_filter(mut self, filter: CompFilter) -> Self {
        self.comp_filters.push(filter);
        self
    }

    /// Render this element on its own.
    ///
    /// # Errors
    ///
    /// Fails when this element or a descendant lacks a mandatory attribute.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = new_writer();
        self.write(&mut writer)?;
        finish(writer)
    }

    fn write(&self, writer: &mut XmlWriter) -> Result<()> {
        if self.name.is_empty() {
            return Err(DavError::MissingAttribute {
                element: "comp-filter",
                attribute: "name",
            });
        }
        let mut start = BytesStart::new("C:comp-filter");
        start.push_attribute(("name", self.name.as_str()));

        let has_children = self.is_not_defined
            || self.time_range.is_some()
            || !self.prop_filters.is_empty()
            || !self.comp_filters.is_empty();
        if !has_children {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        if self.is_not_defined {
            writer.write_event(Event::Empty(BytesStart::new("C:is-not-defined")))?;
        }
        if let Some(range) = &self.time_range {
            range.write(writer, "C:time-range")?;
        }
        for prop in &self.prop_filters {
            prop.write(writer)?;
        }
        for comp in &self.comp_filters {
            comp.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("C:comp-filter")))?;
        Ok(())
    }
}

/// `<C:filter>`, wrapping the top-level comp-filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub root: CompFilter,
}

impl Filter {
    pub fn new(root: CompFilter) -> Self {
        Self { root }
    }

    /// Render the filter on its own.
    ///
    /// # Errors
    ///
    /// Fails when an element in the tree lacks a mandatory attribute.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = new_writer();
        self.write(&mut writer)?;
        finish(writer)
    }

    fn write(&self, writer: &mut XmlWriter) -> Result<()> {
        writer.write_event(Event::Start(BytesStart::new("C:filter")))?;
        self.root.write(writer)?;
        writer.write_event(Event::End(BytesEnd::new("C:filter")))?;
        Ok(())
    }
}

/// `calendar-query` REPORT body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarQuery {
    filter: Filter,
    expand: Option<TimeRange>,
}

impl CalendarQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            expand: None,
        }
    }

    /// Components of type `component` overlapping `[start, end)`.
    ///
    /// Without `end` the range is open-ended.
    pub fn date_search(component: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self::new(Filter::new(
            CompFilter::new("VCALENDAR")
                .comp_filter(CompFilter::new(component).time_range(TimeRange::new(start, end))),
        ))
    }

    /// Components of type `component` whose UID equals `uid`.
    pub fn uid_search(component: &str, uid: &str) -> Self {
        Self::new(Filter::new(
            CompFilter::new("VCALENDAR").comp_filter(
                CompFilter::new(component).prop_filter(
                    PropFilter::new("UID")
                        .text_match(TextMatch::new(uid).collation("i;octet")),
                ),
            ),
        ))
    }

    /// Ask the server to expand recurrences inside `range`.
    #[must_use]
    pub fn expand(mut self, range: TimeRange) -> Self {
        self.expand = Some(range);
        self
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Render the REPORT body.
    ///
    /// # Errors
    ///
    /// Fails when the filter tree is incomplete or XML writing fails.
    pub fn build(&self) -> Result<String> {
        let mut writer = new_writer();

        let mut root = BytesStart::new("C:calendar-query");
        root.push_attribute(("xmlns:D", ns::DAV));
        root.push_attribute(("xmlns:C", ns::CALDAV));
        writer.write_event(Event::Start(root))?;

        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        writer.write_event(Event::Empty(BytesStart::new("D:getetag")))?;
        match &self.expand {
            Some(range) => {
                writer.write_event(Event::Start(BytesStart::new("C:calendar-data")))?;
                range.write(&mut writer, "C:expand")?;
                writer.write_event(Event::End(BytesEnd::new("C:calendar-data")))?;
            }
            None => {
                writer.write_event(Event::Empty(BytesStart::new("C:calendar-data")))?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        self.filter.write(&mut writer)?;

        writer.write_event(Event::End(BytesEnd::new("C:calendar-query")))?;
        finish(writer)
    }
}

/// `free-busy-query` REPORT body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBusyQueryRequest {
    range: TimeRange,
}

impl FreeBusyQueryRequest {
    pub fn new(range: TimeRange) -> Self {
        Self { range }
    }

    /// Render the REPORT body.
    ///
    /// # Errors
    ///
    /// Fails when the range has no bound or XML writing fails.
    pub fn build(&self) -> Result<String> {
        let mut writer = new_writer();

        let mut root = BytesStart::new("C:free-busy-query");
        root.push_attribute(("xmlns:D", ns::DAV));
        root.push_attribute(("xmlns:C", ns::CALDAV));
        writer.write_event(Event::Start(root))?;
        self.range.write(&mut writer, "C:time-range")?;
        writer.write_event(Event::End(BytesEnd::new("C:free-busy-query")))?;
        finish(writer)
    }
}

fn new_writer() -> XmlWriter {
    Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
}

fn finish(writer: XmlWriter) -> Result<String> {
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| DavError::Xml(format!("UTF-8 error: {e}")))
}

/// Prefix a rendered body with the XML declaration.
///
/// # Errors
///
/// Returns an error if XML writing fails.
pub fn with_declaration(body: &str) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    let mut out = finish(writer)?;
    out.push('\n');
    out.push_str(body);
    Ok(out)
}
