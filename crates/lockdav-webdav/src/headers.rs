//! Parsers for the request headers WebDAV adds or reuses.

use crate::locks::LockTimeout;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use std::time::SystemTime;
use thiserror::Error;

/// A header that does not follow its grammar.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed {header} header: {reason}")]
pub struct HeaderError {
    pub header: &'static str,
    pub reason: String,
}

impl HeaderError {
    fn new(header: &'static str, reason: impl Into<String>) -> Self {
        Self {
            header,
            reason: reason.into(),
        }
    }
}

/// Value of a `Depth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Finite(u32),
    Infinity,
}

/// Parse a `Depth` header value (`0`, `1`, any integer, or `infinity`).
pub fn parse_depth(value: &str) -> Result<Depth, HeaderError> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("infinity") || value.eq_ignore_ascii_case("infinite") {
        return Ok(Depth::Infinity);
    }
    value
        .parse()
        .map(Depth::Finite)
        .map_err(|_| HeaderError::new("Depth", value))
}

/// `Overwrite: T` allows replacing an existing destination; anything else does not.
pub fn parse_overwrite(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("T"))
}

/// First usable entry of a `Timeout` header.
pub fn parse_timeout(value: &str) -> Option<LockTimeout> {
    value.split(',').map(str::trim).find_map(|entry| {
        if entry.eq_ignore_ascii_case("infinite") {
            Some(LockTimeout::Infinite)
        } else {
            let (kind, secs) = entry.split_once('-')?;
            if !kind.eq_ignore_ascii_case("second") {
                return None;
            }
            secs.parse().ok().map(LockTimeout::Seconds)
        }
    })
}

/// Render a remaining lifetime for `D:timeout`.
pub fn format_timeout(remaining: Option<std::time::Duration>) -> String {
    match remaining {
        Some(d) => format!("Second-{}", d.as_secs()),
        None => "Infinite".to_string(),
    }
}

/// Extract the bare token from `Lock-Token: <opaquelocktoken:...>`.
pub fn parse_lock_token(value: &str) -> Result<String, HeaderError> {
    let inner = value
        .trim()
        .strip_prefix('<')
        .and_then(|v| v.strip_suffix('>'))
        .ok_or_else(|| HeaderError::new("Lock-Token", "missing angle brackets"))?;
    let token = inner
        .strip_prefix("opaquelocktoken:")
        .ok_or_else(|| HeaderError::new("Lock-Token", "not an opaquelocktoken URI"))?;
    if token.is_empty() {
        return Err(HeaderError::new("Lock-Token", "empty token"));
    }
    Ok(token.to_string())
}

/// User name of an HTTP Basic `Authorization` header.
pub fn basic_auth_user(value: &str) -> Option<String> {
    let (scheme, credentials) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(credentials.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let user = decoded.split_once(':').map_or(decoded.as_str(), |(u, _)| u);
    Some(user.to_string())
}

/// One state token of an `If` header, with the resource tag it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfCondition {
    /// Raw tagged resource URI, `None` for the request URI.
    pub resource: Option<String>,
    /// Token with any `opaquelocktoken:` prefix removed.
    pub token: String,
}

/// Parse an `If` header into its non-negated state tokens.
///
/// Entity tags are accepted but ignored.
pub fn parse_if(value: &str) -> Result<Vec<IfCondition>, HeaderError> {
    let err = |reason: &str| HeaderError::new("If", reason);
    let mut conditions = Vec::new();
    let mut resource: Option<String> = None;
    let mut rest = value.trim_start();
    let mut lists = 0;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('<') {
            let (uri, tail) = after.split_once('>').ok_or_else(|| err("unterminated tag"))?;
            resource = Some(uri.trim().to_string());
            rest = tail.trim_start();
            if !rest.starts_with('(') {
                return Err(err("tag without list"));
            }
            continue;
        }

        let mut list = rest.strip_prefix('(').ok_or_else(|| err("expected '('"))?;
        let mut entries = 0;
        let mut negated = false;
        loop {
            list = list.trim_start();
            if let Some(tail) = list.strip_prefix(')') {
                list = tail;
                break;
            }
            if list.get(..3).is_some_and(|w| w.eq_ignore_ascii_case("not")) {
                negated = true;
                list = &list[3..];
                continue;
            }
            if let Some(after) = list.strip_prefix('<') {
                let (token, tail) = after.split_once('>').ok_or_else(|| err("unterminated token"))?;
                if !negated {
                    let token = token.trim();
                    conditions.push(IfCondition {
                        resource: resource.clone(),
                        token: token
                            .strip_prefix("opaquelocktoken:")
                            .unwrap_or(token)
                            .to_string(),
                    });
                }
                negated = false;
                entries += 1;
                list = tail;
            } else if let Some(after) = list.strip_prefix('[') {
                let (_etag, tail) = after.split_once(']').ok_or_else(|| err("unterminated etag"))?;
                negated = false;
                entries += 1;
                list = tail;
            } else {
                return Err(err("unexpected character in list"));
            }
        }
        if entries == 0 {
            return Err(err("empty list"));
        }
        lists += 1;
        rest = list.trim_start();
    }

    if lists == 0 {
        return Err(err("no condition list"));
    }
    Ok(conditions)
}

/// One `Range` byte-range-spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `first-` or `first-last`.
    From { first: u64, last: Option<u64> },
    /// `-n`: the final `n` bytes.
    Suffix(u64),
}

impl ByteRange {
    /// Inclusive byte bounds within a resource of `len` bytes, or `None`
    /// when the range lies outside it.
    pub fn resolve(self, len: u64) -> Option<(u64, u64)> {
        match self {
            ByteRange::From { first, last } => {
                if first >= len {
                    return None;
                }
                let last = last.map_or(len - 1, |l| l.min(len - 1));
                (first <= last).then_some((first, last))
            }
            ByteRange::Suffix(n) => {
                if n == 0 || len == 0 {
                    return None;
                }
                Some((len.saturating_sub(n), len - 1))
            }
        }
    }
}

/// Parse `bytes=<spec>[,<spec>...]`.
pub fn parse_range(value: &str) -> Result<Vec<ByteRange>, HeaderError> {
    let err = |reason: &str| HeaderError::new("Range", reason);
    let specs = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| err("unsupported unit"))?;

    let mut ranges = Vec::new();
    for spec in specs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (first, last) = spec.split_once('-').ok_or_else(|| err(spec))?;
        let range = if first.is_empty() {
            ByteRange::Suffix(last.parse().map_err(|_| err(spec))?)
        } else {
            let first = first.parse().map_err(|_| err(spec))?;
            let last = if last.is_empty() {
                None
            } else {
                let last: u64 = last.parse().map_err(|_| err(spec))?;
                if last < first {
                    return Err(err(spec));
                }
                Some(last)
            };
            ByteRange::From { first, last }
        };
        ranges.push(range);
    }
    if ranges.is_empty() {
        return Err(err("no ranges"));
    }
    Ok(ranges)
}

/// Format a timestamp as an RFC 1123 HTTP date.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Format a timestamp as RFC 3339 with second precision.
pub fn rfc3339_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Parse an HTTP date.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&Utc)))
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Whether a comma-separated entity-tag list names `etag`.
fn etag_listed(list: &str, etag: &str) -> bool {
    list.split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == etag)
}

/// Conditional GET headers relevant to a resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct Conditionals<'a> {
    pub if_range: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
    pub if_none_match: Option<&'a str>,
}

impl Conditionals<'_> {
    /// Whether the client's copy is current, comparing at one-second
    /// resolution against `modified` and exactly against the quoted `etag`.
    pub fn not_modified(&self, modified: SystemTime, etag: &str) -> bool {
        let mtime = unix_secs(modified);

        if let Some(value) = self.if_range {
            match parse_http_date(value) {
                Some(date) if unix_secs(date) >= mtime => return true,
                Some(_) => {}
                None if etag_listed(value, etag) => return true,
                None => {}
            }
        }

        if let Some(date) = self.if_modified_since.and_then(parse_http_date)
            && unix_secs(date) >= mtime
        {
            return true;
        }

        self.if_none_match
            .is_some_and(|value| etag_listed(value, etag))
    }
}
