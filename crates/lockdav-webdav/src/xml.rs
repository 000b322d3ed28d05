//! XML request parsing and response writing.
//!
//! Request bodies are read with a namespace-aware reader into a small
//! [`XmlNode`] tree; only elements in the `DAV:` namespace count as protocol
//! elements. Responses are assembled as [`Element`] trees and serialized
//! with the `D:` prefix bound to `DAV:`.

use crate::locks::{LockScope, Owner};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use thiserror::Error;

/// The WebDAV namespace.
pub const DAV_NS: &str = "DAV:";

/// Malformed or unexpected XML.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),

    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),

    #[error("missing element <{0}>")]
    Missing(&'static str),

    #[error("failed to write XML: {0}")]
    Write(String),
}

/// A parsed request element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub namespace: Option<String>,
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Whether this is the DAV element `name`.
    pub fn is_dav(&self, name: &str) -> bool {
        self.namespace.as_deref() == Some(DAV_NS) && self.name == name
    }

    /// First DAV child named `name`.
    pub fn dav_child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.is_dav(name))
    }
}

/// Parse a request body into its root element.
pub fn parse(body: &[u8]) -> Result<XmlNode, XmlError> {
    let text = std::str::from_utf8(body).map_err(|e| XmlError::Malformed(e.to_string()))?;
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        let namespace = match ns {
            ResolveResult::Bound(Namespace(uri)) => {
                Some(String::from_utf8_lossy(uri).into_owned())
            }
            ResolveResult::Unbound => None,
            ResolveResult::Unknown(prefix) => {
                return Err(XmlError::Malformed(format!(
                    "unknown prefix {}",
                    String::from_utf8_lossy(&prefix)
                )));
            }
        };

        match event {
            Event::Start(e) => stack.push(XmlNode {
                namespace,
                name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ..XmlNode::default()
            }),
            Event::Empty(e) => {
                let node = XmlNode {
                    namespace,
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    ..XmlNode::default()
                };
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, node);
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| XmlError::Malformed(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed("unclosed element".into()));
    }
    root.ok_or_else(|| XmlError::Malformed("empty document".into()))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

/// A property name as requested by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropName {
    pub namespace: Option<String>,
    pub name: String,
}

impl PropName {
    pub fn dav(name: &str) -> Self {
        Self {
            namespace: Some(DAV_NS.to_string()),
            name: name.to_string(),
        }
    }

    pub fn is_dav(&self) -> bool {
        self.namespace.as_deref() == Some(DAV_NS)
    }

    fn from_node(node: &XmlNode) -> Self {
        Self {
            namespace: node.namespace.clone(),
            name: node.name.clone(),
        }
    }
}

/// Body of a PROPFIND request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropfindRequest {
    AllProp,
    PropName,
    Props(Vec<PropName>),
}

impl PropfindRequest {
    /// Interpret a PROPFIND body; an empty body means `allprop`.
    pub fn parse(body: &[u8]) -> Result<Self, XmlError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(PropfindRequest::AllProp);
        }
        let root = parse(body)?;
        if !root.is_dav("propfind") {
            return Err(XmlError::UnexpectedRoot(root.name));
        }
        if root.dav_child("allprop").is_some() {
            Ok(PropfindRequest::AllProp)
        } else if root.dav_child("propname").is_some() {
            Ok(PropfindRequest::PropName)
        } else if let Some(prop) = root.dav_child("prop") {
            Ok(PropfindRequest::Props(
                prop.children.iter().map(PropName::from_node).collect(),
            ))
        } else {
            Err(XmlError::Missing("prop"))
        }
    }
}

/// One `set` or `remove` instruction of a PROPPATCH request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropPatch {
    pub name: PropName,
    /// `Some(value)` for `set`, `None` for `remove`.
    pub value: Option<String>,
}

/// Interpret a `propertyupdate` body, keeping document order.
pub fn parse_propertyupdate(body: &[u8]) -> Result<Vec<PropPatch>, XmlError> {
    let root = parse(body)?;
    if !root.is_dav("propertyupdate") {
        return Err(XmlError::UnexpectedRoot(root.name));
    }
    let mut patches = Vec::new();
    for instruction in &root.children {
        let set = if instruction.is_dav("set") {
            true
        } else if instruction.is_dav("remove") {
            false
        } else {
            continue;
        };
        for prop in instruction.children.iter().filter(|c| c.is_dav("prop")) {
            for node in &prop.children {
                patches.push(PropPatch {
                    name: PropName::from_node(node),
                    value: set.then(|| node.text.clone()),
                });
            }
        }
    }
    Ok(patches)
}

/// Body of a LOCK request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub scope: LockScope,
    pub owner: Option<Owner>,
}

impl LockInfo {
    pub fn parse(body: &[u8]) -> Result<Self, XmlError> {
        let root = parse(body)?;
        if !root.is_dav("lockinfo") {
            return Err(XmlError::UnexpectedRoot(root.name));
        }
        let scope = root
            .dav_child("lockscope")
            .and_then(|s| s.children.first())
            .ok_or(XmlError::Missing("lockscope"))?;
        let scope = if scope.is_dav("shared") {
            LockScope::Shared
        } else {
            LockScope::Exclusive
        };
        root.dav_child("locktype")
            .and_then(|t| t.dav_child("write"))
            .ok_or(XmlError::Missing("write"))?;

        let owner = root.dav_child("owner").and_then(|owner| {
            if let Some(href) = owner.dav_child("href") {
                Some(Owner::Href(href.text.clone()))
            } else if !owner.text.is_empty() {
                Some(Owner::Text(owner.text.clone()))
            } else {
                None
            }
        });
        Ok(Self { scope, owner })
    }
}

/// A response element to be serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// `None` for DAV elements, otherwise the foreign namespace URI
    /// (empty for elements without a namespace).
    pub namespace: Option<String>,
    pub name: String,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    /// An empty DAV element.
    pub fn dav(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
            text: None,
            children: Vec::new(),
        }
    }

    /// An empty element echoing a requested property name.
    pub fn from_prop_name(prop: &PropName) -> Self {
        let mut element = Self::dav(&prop.name);
        if !prop.is_dav() {
            element.namespace = Some(prop.namespace.clone().unwrap_or_default());
        }
        element
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }
}

/// Serialize `root` as a complete document.
pub fn to_document(root: &Element) -> Result<Vec<u8>, XmlError> {
    let mut writer = Writer::new(Vec::new());
    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
    )?;
    write_element(&mut writer, root, true)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element, root: bool) -> Result<(), XmlError> {
    let qualified = match element.namespace {
        None => format!("D:{}", element.name),
        Some(_) => element.name.clone(),
    };
    let mut start = BytesStart::new(qualified.as_str());
    if root {
        start.push_attribute(("xmlns:D", DAV_NS));
    }
    if let Some(ns) = &element.namespace {
        start.push_attribute(("xmlns", ns.as_str()));
    }

    if element.text.is_none() && element.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }
    emit(writer, Event::Start(start))?;
    if let Some(text) = &element.text {
        emit(writer, Event::Text(BytesText::new(text)))?;
    }
    for child in &element.children {
        write_element(writer, child, false)?;
    }
    emit(writer, Event::End(BytesEnd::new(qualified.as_str())))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}
