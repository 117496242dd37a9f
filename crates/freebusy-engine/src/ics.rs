//! Reader for the subset of iCalendar (RFC 5545) the engine consumes.
//!
//! Only scheduling-relevant properties are kept. VTIMEZONE definitions are
//! skipped: TZID parameters are resolved as IANA names.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use tracing::trace;

use crate::component::{
    AvailablePeriod, CalTime, CalendarComponent, ComponentKind, Recurrence, Status, Transparency,
};
use crate::error::{FreeBusyError, Result};

/// A property line after unfolding.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContentLine {
    line: usize,
    name: String,
    params: Vec<(String, String)>,
    value: String,
}

impl ContentLine {
    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn error(&self, message: impl Into<String>) -> FreeBusyError {
        FreeBusyError::Parse {
            line: self.line,
            message: message.into(),
        }
    }
}

/// A component block: `BEGIN:<name>` ... `END:<name>`.
#[derive(Debug, Default)]
struct Block {
    line: usize,
    name: String,
    props: Vec<ContentLine>,
    children: Vec<Block>,
}

impl Block {
    fn props<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ContentLine> + 'a {
        self.props.iter().filter(move |p| p.name == name)
    }

    fn prop(&self, name: &str) -> Option<&ContentLine> {
        self.props.iter().find(|p| p.name == name)
    }
}

/// Parse iCalendar text into the components the engine understands.
///
/// Components may be wrapped in `VCALENDAR` or appear at top level.
///
/// # Errors
/// [`FreeBusyError::Parse`] with the line of the offending content line, or
/// [`FreeBusyError::InvalidTimezone`] for an unknown TZID.
pub fn parse_calendar(text: &str) -> Result<Vec<CalendarComponent>> {
    let mut stack: Vec<Block> = vec![Block::default()];

    for (line, raw) in unfold(text) {
        let content = parse_content_line(&raw, line)?;
        match content.name.as_str() {
            "BEGIN" => stack.push(Block {
                line,
                name: content.value.trim().to_ascii_uppercase(),
                ..Block::default()
            }),
            "END" => {
                let name = content.value.trim().to_ascii_uppercase();
                if stack.len() < 2 {
                    return Err(content.error(format!("END:{name} without BEGIN")));
                }
                let block = stack.pop().ok_or_else(|| content.error("unbalanced END"))?;
                if block.name != name {
                    return Err(content.error(format!(
                        "END:{name} closes BEGIN:{} from line {}",
                        block.name, block.line
                    )));
                }
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(block);
                }
            }
            _ => {
                if let Some(current) = stack.last_mut() {
                    current.props.push(content);
                }
            }
        }
    }

    if stack.len() > 1 {
        let open = &stack[stack.len() - 1];
        return Err(FreeBusyError::Parse {
            line: open.line,
            message: format!("BEGIN:{} is never closed", open.name),
        });
    }

    let mut components = Vec::new();
    if let Some(root) = stack.pop() {
        collect(&root, &mut components)?;
    }
    trace!(count = components.len(), "parsed calendar");
    Ok(components)
}

fn collect(block: &Block, out: &mut Vec<CalendarComponent>) -> Result<()> {
    for child in &block.children {
        if child.name == "VCALENDAR" {
            collect(child, out)?;
        } else if let Some(kind) = ComponentKind::from_ical_name(&child.name) {
            out.push(component(kind, child)?);
        }
    }
    Ok(())
}

fn component(kind: ComponentKind, block: &Block) -> Result<CalendarComponent> {
    let uid = block.prop("UID").map(|p| unescape(&p.value)).ok_or_else(|| {
        FreeBusyError::Parse {
            line: block.line,
            message: format!("{} without UID", block.name),
        }
    })?;

    let mut component = CalendarComponent::new(kind, uid);
    component.summary = block.prop("SUMMARY").map(|p| unescape(&p.value));
    component.start = block.prop("DTSTART").map(time).transpose()?;
    component.end = block
        .prop("DTEND")
        .or_else(|| block.prop("DUE"))
        .map(time)
        .transpose()?;
    component.duration = block.prop("DURATION").map(duration).transpose()?;
    component.completed = block.prop("COMPLETED").map(time).transpose()?;
    component.recurrence_id = block.prop("RECURRENCE-ID").map(time).transpose()?;
    component.status = block.prop("STATUS").map(|p| Status::parse(&p.value));
    if let Some(transp) = block.prop("TRANSP") {
        component.transparency = match transp.value.trim().to_ascii_uppercase().as_str() {
            "TRANSPARENT" => Transparency::Transparent,
            "OPAQUE" => Transparency::Opaque,
            other => return Err(transp.error(format!("unknown TRANSP value {other}"))),
        };
    }
    if let Some(priority) = block.prop("PRIORITY") {
        let value = priority
            .value
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= 9)
            .ok_or_else(|| priority.error(format!("PRIORITY {:?} is not 0-9", priority.value)))?;
        component.priority = Some(value);
    }
    component.recurrence = recurrence(block)?;

    if kind == ComponentKind::Availability {
        for child in block.children.iter().filter(|c| c.name == "AVAILABLE") {
            component.available.push(available(child)?);
        }
    }
    Ok(component)
}

fn available(block: &Block) -> Result<AvailablePeriod> {
    let start = block.prop("DTSTART").ok_or_else(|| FreeBusyError::Parse {
        line: block.line,
        message: "AVAILABLE without DTSTART".to_string(),
    })?;
    Ok(AvailablePeriod {
        uid: block.prop("UID").map(|p| unescape(&p.value)),
        summary: block.prop("SUMMARY").map(|p| unescape(&p.value)),
        start: time(start)?,
        end: block.prop("DTEND").map(time).transpose()?,
        duration: block.prop("DURATION").map(duration).transpose()?,
        recurrence: recurrence(block)?,
    })
}

fn recurrence(block: &Block) -> Result<Option<Recurrence>> {
    let mut recurrence = Recurrence {
        rule: block.prop("RRULE").map(|p| p.value.trim().to_string()),
        ..Recurrence::default()
    };
    for prop in block.props("RDATE") {
        recurrence.rdates.extend(time_list(prop)?);
    }
    for prop in block.props("EXDATE") {
        recurrence.exdates.extend(time_list(prop)?);
    }
    Ok((recurrence != Recurrence::default()).then_some(recurrence))
}

/// Comma-separated DATE, DATE-TIME or PERIOD values; periods keep their start.
fn time_list(prop: &ContentLine) -> Result<Vec<CalTime>> {
    prop.value
        .split(',')
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            let start = v.split_once('/').map_or(v, |(s, _)| s);
            time_value(prop, start.trim())
        })
        .collect()
}

fn time(prop: &ContentLine) -> Result<CalTime> {
    time_value(prop, prop.value.trim())
}

fn time_value(prop: &ContentLine, value: &str) -> Result<CalTime> {
    let is_date = prop
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || value.len() == 8;
    if is_date {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(CalTime::Date)
            .map_err(|_| prop.error(format!("bad DATE value {value:?}")));
    }

    let (local, utc) = match value.strip_suffix(['Z', 'z']) {
        Some(stripped) => (stripped, true),
        None => (value, false),
    };
    let local = NaiveDateTime::parse_from_str(local, "%Y%m%dT%H%M%S")
        .map_err(|_| prop.error(format!("bad DATE-TIME value {value:?}")))?;

    if utc {
        return Ok(CalTime::Utc(local.and_utc()));
    }
    match prop.param("TZID") {
        Some(tzid) => {
            let tz: Tz = tzid
                .trim_start_matches('/')
                .parse()
                .map_err(|_| FreeBusyError::InvalidTimezone(tzid.to_string()))?;
            Ok(CalTime::Zoned { local, tz })
        }
        None => Ok(CalTime::Floating(local)),
    }
}

fn duration(prop: &ContentLine) -> Result<Duration> {
    parse_duration(prop.value.trim())
        .ok_or_else(|| prop.error(format!("bad DURATION value {:?}", prop.value)))
}

/// ISO 8601 duration as used by RFC 5545, e.g. `PT1H30M`, `-P1D`, `P2W`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let (negative, rest) = match value.as_bytes().first()? {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };
    let rest = rest.strip_prefix(['P', 'p'])?;

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    let mut seen_unit = false;
    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            '0'..='9' => number.push(c),
            'T' if !in_time && number.is_empty() => in_time = true,
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n),
                    ('D', false) => Duration::try_days(n),
                    ('H', true) => Duration::try_hours(n),
                    ('M', true) => Duration::try_minutes(n),
                    ('S', true) => Duration::try_seconds(n),
                    _ => None,
                }?;
                total = total.checked_add(&part)?;
                seen_unit = true;
            }
        }
    }
    if !number.is_empty() || !seen_unit {
        return None;
    }
    Some(if negative { -total } else { total })
}

/// Join folded lines, keeping the physical line each content line starts on.
fn unfold(text: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if let Some(continuation) = line.strip_prefix([' ', '\t']) {
            if let Some((_, previous)) = lines.last_mut() {
                previous.push_str(continuation);
                continue;
            }
        }
        if !line.trim().is_empty() {
            lines.push((index + 1, line.to_string()));
        }
    }
    lines
}

/// `name *(";" param) ":" value`; parameter values may be quoted.
fn parse_content_line(raw: &str, line: usize) -> Result<ContentLine> {
    let error = |message: &str| FreeBusyError::Parse {
        line,
        message: message.to_string(),
    };

    let mut in_quotes = false;
    let mut colon = None;
    for (i, c) in raw.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                colon = Some(i);
                break;
            }
            _ => {}
        }
    }
    let colon = colon.ok_or_else(|| error("content line has no ':'"))?;
    let (head, value) = (&raw[..colon], &raw[colon + 1..]);

    let mut segments = split_unquoted(head, ';').into_iter();
    let name = segments
        .next()
        .map(|n| n.trim().to_ascii_uppercase())
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .ok_or_else(|| error("missing or invalid property name"))?;

    let mut params = Vec::new();
    for segment in segments {
        let (key, val) = segment
            .split_once('=')
            .ok_or_else(|| error("parameter without '='"))?;
        params.push((key.trim().to_ascii_uppercase(), val.trim().trim_matches('"').to_string()));
    }

    Ok(ContentLine {
        line,
        name,
        params,
        value: value.to_string(),
    })
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut begin = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&s[begin..i]);
            begin = i + c.len_utf8();
        }
    }
    parts.push(&s[begin..]);
    parts
}

/// Undo TEXT escaping: `\n`, `\,`, `\;`, `\\`.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folded_lines_keep_their_first_line_number() {
        let lines = unfold("BEGIN:VEVENT\r\nSUMMARY:long\r\n  text\r\nEND:VEVENT\r\n");
        assert_eq!(
            lines,
            vec![
                (1, "BEGIN:VEVENT".to_string()),
                (2, "SUMMARY:long text".to_string()),
                (4, "END:VEVENT".to_string()),
            ]
        );
    }

    #[test]
    fn quoted_parameter_may_contain_colon() {
        let line = parse_content_line(r#"ATTENDEE;CN="Doe: Jane";ROLE=CHAIR:mailto:j@example.com"#, 1).unwrap();
        assert_eq!(line.name, "ATTENDEE");
        assert_eq!(line.param("cn"), Some("Doe: Jane"));
        assert_eq!(line.param("ROLE"), Some("CHAIR"));
        assert_eq!(line.value, "mailto:j@example.com");
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("PT1H30M"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("P1W"), Some(Duration::days(7)));
        assert_eq!(parse_duration("-P1DT1S"), Some(-(Duration::days(1) + Duration::seconds(1))));
        assert_eq!(parse_duration("P"), None);
        assert_eq!(parse_duration("PT5"), None);
        assert_eq!(parse_duration("P1H"), None);
        assert_eq!(parse_duration("P99999999999999W"), None);
        assert_eq!(parse_duration("P99999999999999999999D"), None);
        assert_eq!(parse_duration("PT9223372036854775S"), None);
        assert_eq!(parse_duration("P15200000000WT1000000000000000S"), None);
    }

    #[test]
    fn text_unescaping() {
        assert_eq!(unescape(r"a\, b\; c\\d\nline"), "a, b; c\\d\nline");
    }
}
