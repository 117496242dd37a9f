//! Resource URL algebra for CalDAV addressing.
//!
//! A [`ResourceUrl`] is either empty, relative (path, query, fragment only) or
//! absolute (scheme, optional credentials, host, port, path, query). It keeps
//! the components it was built from so that [`fmt::Display`] renders the URL
//! the caller wrote, credentials included, while equality and hashing work on
//! the [canonical](ResourceUrl::canonical) form:
//!
//! - scheme and host are compared case-insensitively,
//! - the scheme's default port is made explicit,
//! - credentials and fragments are ignored,
//! - paths are compared after dot-segment removal and percent-decoding, and
//!   trailing slashes do not matter.
//!
//! [`ResourceUrl::join`] resolves a reference against a collection URL the way
//! CalDAV clients address members of a collection: an absolute path replaces
//! the base path, a relative path is appended below it. Joining references
//! that name another server is an error rather than a silent override.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{DavError, Result};

/// A possibly credentialed, possibly relative HTTP(S) resource locator.
#[derive(Debug, Clone, Default)]
pub struct ResourceUrl {
    scheme: Option<String>,
    username: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

/// Conversion into a [`ResourceUrl`].
///
/// Implemented for strings, existing URLs, parsed [`url::Url`] values and
/// `Option`s of those; `None` and `""` produce the empty URL.
pub trait IntoResourceUrl {
    fn into_resource_url(self) -> Result<ResourceUrl>;
}

impl ResourceUrl {
    /// The empty URL. Joining anything with it yields the other operand.
    pub const fn empty() -> Self {
        Self {
            scheme: None,
            username: None,
            password: None,
            host: None,
            port: None,
            path: String::new(),
            query: None,
            fragment: None,
        }
    }

    /// Build a URL from anything that can be turned into one.
    pub fn objectify<T: IntoResourceUrl>(input: T) -> Result<Self> {
        input.into_resource_url()
    }

    /// Parse a URL string. Strings without a `scheme://` prefix are relative.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::empty());
        }
        if input.starts_with("//") {
            return Self::network_path(input);
        }
        if !has_scheme(input) {
            return Ok(Self::relative(input));
        }
        let parsed = ::url::Url::parse(input).map_err(|e| DavError::InvalidUrl {
            input: input.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::from(&parsed))
    }

    /// `//host[:port]/path`: an authority without a scheme. The scheme is
    /// taken from the base URL when joined.
    fn network_path(input: &str) -> Result<Self> {
        let parsed = ::url::Url::parse(&format!("{NETWORK_PATH_SCHEME}:{input}")).map_err(|e| {
            DavError::InvalidUrl {
                input: input.to_string(),
                message: e.to_string(),
            }
        })?;
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(DavError::InvalidUrl {
                input: input.to_string(),
                message: "empty host".to_string(),
            });
        }
        Ok(Self {
            scheme: None,
            ..Self::from(&parsed)
        })
    }

    fn relative(input: &str) -> Self {
        let (rest, fragment) = match input.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment.to_string())),
            None => (input, None),
        };
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (rest, None),
        };
        Self {
            path: path.to_string(),
            query,
            fragment,
            ..Self::empty()
        }
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The explicit port, or the scheme's well-known default.
    pub fn port(&self) -> Option<u16> {
        self.port.or_else(|| self.scheme().and_then(default_port))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// True for the sentinel produced from `None` or `""`.
    pub fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.scheme.is_none()
            && self.path.is_empty()
            && self.query.is_none()
            && self.fragment.is_none()
    }

    /// True when the URL names a server.
    pub fn is_absolute(&self) -> bool {
        self.host.is_some()
    }

    /// True iff the URL carries a username.
    pub fn is_auth(&self) -> bool {
        self.username.is_some()
    }

    /// A copy with username and password stripped.
    pub fn unauth(&self) -> Self {
        Self {
            username: None,
            password: None,
            ..self.clone()
        }
    }

    /// The comparison form of this URL.
    ///
    /// Credentials and fragment are dropped, scheme and host lowercased, the
    /// port made explicit, dot segments removed, every path segment
    /// percent-decoded then re-encoded, and trailing slashes stripped.
    pub fn canonical(&self) -> Self {
        let mut path = normalize_path(&self.path);
        let keep = usize::from(!self.is_absolute());
        while path.len() > keep && path.ends_with('/') {
            path.pop();
        }
        Self {
            scheme: self.scheme.as_ref().map(|s| s.to_ascii_lowercase()),
            username: None,
            password: None,
            host: self.host.as_ref().map(|h| h.to_ascii_lowercase()),
            port: self.port(),
            path,
            query: self.query.clone(),
            fragment: None,
        }
    }

    /// Resolve `other` against `self`.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::InvalidJoin`] when both URLs are absolute and their
    /// scheme, host or port differ, and [`DavError::InvalidUrl`] when `other`
    /// cannot be parsed.
    pub fn join<T: IntoResourceUrl>(&self, other: T) -> Result<Self> {
        let other = other.into_resource_url()?;
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(other);
        }
        if self.conflicts_with(&other) {
            return Err(DavError::InvalidJoin {
                base: self.unauth().to_string(),
                other: other.unauth().to_string(),
            });
        }

        let path = if other.path.starts_with('/') {
            other.path.clone()
        } else if other.path.is_empty() {
            self.path.clone()
        } else {
            let base = if self.path.is_empty() && self.is_absolute() {
                "/"
            } else {
                self.path.as_str()
            };
            if base.is_empty() || base.ends_with('/') {
                format!("{base}{}", other.path)
            } else {
                format!("{base}/{}", other.path)
            }
        };

        let query = if other.path.is_empty() && other.query.is_none() {
            self.query.clone()
        } else {
            other.query.clone()
        };

        let authority = if self.is_absolute() { self } else { &other };
        Ok(Self {
            scheme: self.scheme.clone().or_else(|| other.scheme.clone()),
            username: authority.username.clone(),
            password: authority.password.clone(),
            host: authority.host.clone(),
            port: authority.port,
            path,
            query,
            fragment: other.fragment.clone(),
        })
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        fn differs(a: Option<&str>, b: Option<&str>) -> bool {
            matches!((a, b), (Some(a), Some(b)) if !a.eq_ignore_ascii_case(b))
        }
        differs(self.scheme(), other.scheme())
            || differs(self.host(), other.host())
            || matches!((self.port(), other.port()), (Some(a), Some(b)) if a != b)
    }

    fn canonical_key(&self) -> String {
        self.canonical().to_string()
    }
}

/// Placeholder scheme for parsing network-path references. Non-special, so
/// the parser keeps explicit ports and applies no scheme defaults.
const NETWORK_PATH_SCHEME: &str = "x-network-path";

/// `scheme://` where scheme is ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ).
fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<String> = Vec::new();
    for segment in path.split('/').skip(usize::from(absolute)) {
        match segment {
            "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(canonical_segment(s)),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

fn canonical_segment(segment: &str) -> String {
    let decoded = urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment));
    urlencoding::encode(&decoded).into_owned()
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = &self.host {
            if let Some(scheme) = &self.scheme {
                write!(f, "{scheme}:")?;
            }
            f.write_str("//")?;
            if let Some(username) = &self.username {
                f.write_str(username)?;
                if let Some(password) = &self.password {
                    write!(f, ":{password}")?;
                }
                f.write_str("@")?;
            }
            f.write_str(host)?;
            if let Some(port) = self.port {
                write!(f, ":{port}")?;
            }
        }
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

impl From<&::url::Url> for ResourceUrl {
    fn from(url: &::url::Url) -> Self {
        Self {
            scheme: Some(url.scheme().to_string()),
            username: Some(url.username())
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            password: url.password().map(str::to_string),
            host: url.host_str().map(str::to_string),
            port: url.port(),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
            fragment: url.fragment().map(str::to_string),
        }
    }
}

impl From<::url::Url> for ResourceUrl {
    fn from(url: ::url::Url) -> Self {
        Self::from(&url)
    }
}

impl FromStr for ResourceUrl {
    type Err = DavError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for ResourceUrl {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl Eq for ResourceUrl {}

impl Hash for ResourceUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

impl PartialEq<str> for ResourceUrl {
    fn eq(&self, other: &str) -> bool {
        Self::parse(other).is_ok_and(|other| *self == other)
    }
}

impl PartialEq<&str> for ResourceUrl {
    fn eq(&self, other: &&str) -> bool {
        *self == **other
    }
}

impl PartialEq<String> for ResourceUrl {
    fn eq(&self, other: &String) -> bool {
        *self == *other.as_str()
    }
}

impl IntoResourceUrl for ResourceUrl {
    fn into_resource_url(self) -> Result<ResourceUrl> {
        Ok(self)
    }
}

impl IntoResourceUrl for &ResourceUrl {
    fn into_resource_url(self) -> Result<ResourceUrl> {
        Ok(self.clone())
    }
}

impl IntoResourceUrl for &str {
    fn into_resource_url(self) -> Result<ResourceUrl> {
        ResourceUrl::parse(self)
    }
}

impl IntoResourceUrl for String {
    fn into_resource_url(self) -> Result<ResourceUrl> {
        ResourceUrl::parse(&self)
    }
}

impl IntoResourceUrl for &String {
    fn into_resource_url(self) -> Result<ResourceUrl> {
        ResourceUrl::parse(self)
    }
}

impl IntoResourceUrl for ::url::Url {
    fn into_resource_url(self) -> Result<ResourceUrl> {
        Ok(ResourceUrl::from(&self))
    }
}

impl IntoResourceUrl for &::url::Url {
    fn into_resource_url(self) -> Result<ResourceUrl> {
        Ok(ResourceUrl::from(self))
    }
}

impl<T: IntoResourceUrl> IntoResourceUrl for Option<T> {
    fn into_resource_url(self) -> Result<ResourceUrl> {
        match self {
            Some(inner) => inner.into_resource_url(),
            None => Ok(ResourceUrl::empty()),
        }
    }
}
