//! Serde views of the XML documents the server returns.

use serde::Deserialize;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Multistatus {
    pub response: Vec<DavResponse>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DavResponse {
    pub href: String,
    #[serde(default)]
    pub propstat: Vec<Propstat>,
    pub status: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Propstat {
    #[serde(default)]
    pub prop: Prop,
    pub status: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Prop {
    pub creationdate: Option<String>,
    pub getlastmodified: Option<String>,
    pub getetag: Option<String>,
    pub getcontenttype: Option<String>,
    pub getcontentlength: Option<String>,
    pub displayname: Option<String>,
    pub resourcetype: Option<ResourceTypeContainer>,
    pub lockdiscovery: Option<LockDiscovery>,
    pub supportedlock: Option<SupportedLock>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ResourceTypeContainer {
    #[serde(rename = "$value")]
    pub value: Option<ResourceType>,
}

#[derive(Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Collection,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct LockDiscovery {
    pub activelock: Vec<ActiveLock>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ActiveLock {
    pub lockscope: ScopeContainer,
    pub locktype: LockTypeContainer,
    pub depth: String,
    pub timeout: Option<String>,
    pub locktoken: LockTokenHref,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct SupportedLock {
    pub lockentry: Vec<LockEntry>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LockEntry {
    pub lockscope: ScopeContainer,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ScopeContainer {
    #[serde(rename = "$value")]
    pub value: Scope,
}

#[derive(Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Exclusive,
    Shared,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LockTypeContainer {
    #[serde(rename = "$value")]
    pub value: LockType,
}

#[derive(Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    Write,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LockTokenHref {
    pub href: String,
}

/// Parse a `207 Multi-Status` body.
pub fn parse_multistatus(body: &str) -> Multistatus {
    quick_xml::de::from_str(body)
        .unwrap_or_else(|e| panic!("invalid multistatus ({e}):\n{body}"))
}

impl Multistatus {
    /// The response for `href`, if present.
    pub fn find(&self, href: &str) -> Option<&DavResponse> {
        self.response.iter().find(|r| r.href == href)
    }

    pub fn hrefs(&self) -> Vec<&str> {
        self.response.iter().map(|r| r.href.as_str()).collect()
    }
}

impl DavResponse {
    /// Properties reported with `200 OK`.
    pub fn ok_props(&self) -> Option<&Prop> {
        self.propstat
            .iter()
            .find(|p| p.status.contains(" 200 "))
            .map(|p| &p.prop)
    }

    pub fn is_collection(&self) -> bool {
        self.ok_props()
            .and_then(|p| p.resourcetype.as_ref())
            .is_some_and(|r| r.value == Some(ResourceType::Collection))
    }
}
