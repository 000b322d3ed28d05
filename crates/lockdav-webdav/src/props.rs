//! Live properties computed from the backend and the lock table.
//!
//! Properties are never stored. Each one is computed on demand from the
//! resource metadata; a property that cannot be computed gets its own
//! failing `propstat` while the others are still reported.

use crate::headers::{format_timeout, http_date, rfc3339_date};
use crate::locks::{Lock, LockManager, Owner};
use crate::multistatus::PropStat;
use crate::xml::{Element, PropName};
use http::StatusCode;
use lockdav_vfs::{ResourceProps, Vfs, path};
use tracing::warn;

/// Properties reported for `allprop` on every backend.
pub const ALL_PROPS: [&str; 7] = [
    "creationdate",
    "getlastmodified",
    "getetag",
    "resourcetype",
    "getcontenttype",
    "getcontentlength",
    "displayname",
];

/// Properties added to `allprop` when the backend takes part in locking.
pub const LOCK_PROPS: [&str; 2] = ["supportedlock", "lockdiscovery"];

/// The `allprop` set for a backend.
pub fn all_props(locking: bool) -> Vec<PropName> {
    let lock_props: &[&str] = if locking { &LOCK_PROPS } else { &[] };
    ALL_PROPS
        .iter()
        .chain(lock_props)
        .map(|name| PropName::dav(name))
        .collect()
}

/// Quote an opaque entity tag.
pub fn quote_etag(etag: &str) -> String {
    format!("\"{etag}\"")
}

/// Outcome of computing one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Value(Element),
    /// Left out of the response entirely.
    Omit,
    Failed(StatusCode),
}

/// Computes property values for one request.
pub struct PropertyResolver<'a> {
    vfs: &'a dyn Vfs,
    locks: &'a LockManager,
    user_agent: Option<&'a str>,
}

impl<'a> PropertyResolver<'a> {
    pub fn new(vfs: &'a dyn Vfs, locks: &'a LockManager) -> Self {
        Self {
            vfs,
            locks,
            user_agent: None,
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<&'a str>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Property results for `path`, successes first.
    pub async fn propstats(&self, path: &str, names: &[PropName]) -> Vec<PropStat> {
        let props = match self.vfs.properties(path).await {
            Ok(props) => props,
            Err(e) => {
                warn!(path = %path, error = %e, "failed to load properties");
                return vec![PropStat::new(Vec::new(), StatusCode::INTERNAL_SERVER_ERROR)];
            }
        };

        let mut found = Vec::new();
        let mut failed = Vec::new();
        for name in names {
            match self.resolve(path, &props, name) {
                Resolved::Value(element) => found.push(element),
                Resolved::Omit => {}
                Resolved::Failed(status) => {
                    failed.push(PropStat::new(vec![Element::from_prop_name(name)], status));
                }
            }
        }

        let mut propstats = Vec::with_capacity(failed.len() + 1);
        if !found.is_empty() || failed.is_empty() {
            propstats.push(PropStat::new(found, StatusCode::OK));
        }
        propstats.extend(failed);
        propstats
    }

    /// Compute a single property.
    pub fn resolve(&self, path: &str, props: &ResourceProps, name: &PropName) -> Resolved {
        if !name.is_dav() {
            return Resolved::Failed(StatusCode::NOT_FOUND);
        }
        let element = Element::dav(&name.name);
        match name.name.as_str() {
            "creationdate" => Resolved::Value(element.with_text(rfc3339_date(props.created))),
            "getlastmodified" => {
                let gvfs = self.user_agent.is_some_and(|ua| ua.contains("gvfs"));
                let date = if gvfs {
                    rfc3339_date(props.modified)
                } else {
                    http_date(props.modified)
                };
                Resolved::Value(element.with_text(date))
            }
            "getetag" => Resolved::Value(element.with_text(quote_etag(&props.etag))),
            "resourcetype" => {
                if props.is_collection {
                    Resolved::Value(element.with_child(Element::dav("collection")))
                } else {
                    Resolved::Value(element)
                }
            }
            "getcontenttype" => Resolved::Value(element.with_text(props.content_type.clone())),
            "getcontentlength" => match props.content_length {
                Some(len) => Resolved::Value(element.with_text(len.to_string())),
                None => Resolved::Failed(StatusCode::NOT_FOUND),
            },
            "displayname" => Resolved::Value(element.with_text(path::file_name(path))),
            "supportedlock" if self.vfs.locking() => Resolved::Value(supportedlock()),
            "lockdiscovery" if self.vfs.locking() => match self.locks.locked(path) {
                Some(locks) => Resolved::Value(lockdiscovery(&locks, self.locks)),
                None => Resolved::Omit,
            },
            _ => Resolved::Failed(StatusCode::NOT_FOUND),
        }
    }
}

fn lock_entry(name: &str, scope: &str) -> Element {
    Element::dav(name)
        .with_child(Element::dav("lockscope").with_child(Element::dav(scope)))
        .with_child(Element::dav("locktype").with_child(Element::dav("write")))
}

/// The `supportedlock` property.
pub fn supportedlock() -> Element {
    Element::dav("supportedlock")
        .with_child(lock_entry("lockentry", "exclusive"))
        .with_child(lock_entry("lockentry", "shared"))
}

/// The `lockdiscovery` property for `locks`.
pub fn lockdiscovery(locks: &[Lock], manager: &LockManager) -> Element {
    let mut discovery = Element::dav("lockdiscovery");
    for lock in locks {
        let mut active = lock_entry("activelock", lock.scope.as_str())
            .with_child(Element::dav("depth").with_text(lock.depth.as_str()));
        match &lock.owner {
            Some(Owner::Href(href)) => {
                active.push(Element::dav("owner").with_child(Element::dav("href").with_text(href)));
            }
            Some(Owner::Text(text)) => active.push(Element::dav("owner").with_text(text)),
            None => {}
        }
        active.push(Element::dav("timeout").with_text(format_timeout(manager.remaining(lock))));
        active.push(
            Element::dav("locktoken")
                .with_child(Element::dav("href").with_text(lock.wire_token())),
        );
        discovery.push(active);
    }
    discovery
}
