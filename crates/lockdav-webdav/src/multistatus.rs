//! `207 Multi-Status` documents.

use crate::status::status_line;
use crate::xml::{self, Element, XmlError};
use http::StatusCode;

/// A group of properties sharing one status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropStat {
    pub props: Vec<Element>,
    pub status: StatusCode,
}

impl PropStat {
    pub fn new(props: Vec<Element>, status: StatusCode) -> Self {
        Self { props, status }
    }

    fn to_element(&self) -> Element {
        let mut prop = Element::dav("prop");
        for p in &self.props {
            prop.push(p.clone());
        }
        Element::dav("propstat")
            .with_child(prop)
            .with_child(Element::dav("status").with_text(status_line(self.status)))
    }
}

/// Collects `response` blocks in the order they are added.
#[derive(Debug, Clone)]
pub struct MultistatusBuilder {
    root: Element,
}

impl Default for MultistatusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultistatusBuilder {
    pub fn new() -> Self {
        Self {
            root: Element::dav("multistatus"),
        }
    }

    /// Add a resource with its property results.
    pub fn add_propstats(&mut self, href: &str, propstats: &[PropStat]) {
        let mut response = Element::dav("response").with_child(Element::dav("href").with_text(href));
        for propstat in propstats {
            response.push(propstat.to_element());
        }
        self.root.push(response);
    }

    /// Add a resource with a bare status.
    pub fn add_status(&mut self, href: &str, status: StatusCode) {
        self.root.push(
            Element::dav("response")
                .with_child(Element::dav("href").with_text(href))
                .with_child(Element::dav("status").with_text(status_line(status))),
        );
    }

    pub fn len(&self) -> usize {
        self.root.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Serialize the document.
    pub fn build(&self) -> Result<Vec<u8>, XmlError> {
        xml::to_document(&self.root)
    }
}
