//! In-memory way documents.
//!
//! A [`Document`] is an arena of [`Element`]s stored in document order (preorder), parsed from
//! XHTML/XML text. Because the arena is preorder, every element's subtree is the contiguous
//! index range `[element, element.end)`, which lets branch walks skip whole subtrees in O(1).

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{config::WayConfig, error::WaylinkError, location::Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(ElementId),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub parent: Option<ElementId>,
    pub content: Vec<Node>,
    /// One past the arena index of the last element in this subtree
    end: usize,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn children(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.content.iter().filter_map(|node| match node {
            Node::Element(id) => Some(*id),
            Node::Text(_) => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    location: Location,
    elements: Vec<Element>,
    identifiers: HashMap<String, Vec<ElementId>>,
    id_attribute: String,
    link_attribute: String,
}

impl Document {
    pub fn parse(
        location: Location,
        source: &str,
        config: &WayConfig,
    ) -> Result<Document, WaylinkError> {
        let mut doc = Document {
            location,
            elements: Vec::new(),
            identifiers: HashMap::new(),
            id_attribute: config.id_attribute.clone(),
            link_attribute: config.link_attribute.clone(),
        };
        let mut reader = Reader::from_str(source);
        let mut open: Vec<ElementId> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let id = doc.push_element(&start, open.last().copied())?;
                    open.push(id);
                }
                Event::Empty(start) => {
                    let id = doc.push_element(&start, open.last().copied())?;
                    doc.elements[id.0].end = id.0 + 1;
                }
                Event::End(_) => {
                    if let Some(id) = open.pop() {
                        doc.elements[id.0].end = doc.elements.len();
                    }
                }
                Event::Text(text) => {
                    if let Some(parent) = open.last() {
                        let text = text
                            .unescape()
                            .map(|cow| cow.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                        if !text.is_empty() {
                            doc.elements[parent.0].content.push(Node::Text(text));
                        }
                    }
                }
                Event::CData(cdata) => {
                    if let Some(parent) = open.last() {
                        let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                        doc.elements[parent.0].content.push(Node::Text(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(WaylinkError::Parse(format!(
                "{}: {} element(s) left unclosed",
                doc.location,
                open.len()
            )));
        }
        if doc.elements.is_empty() {
            return Err(WaylinkError::Parse(format!(
                "{}: document has no root element",
                doc.location
            )));
        }
        tracing::debug!(
            "Parsed {} ({} elements, {} identifiers)",
            doc.location,
            doc.elements.len(),
            doc.identifiers.len()
        );
        Ok(doc)
    }

    fn push_element(
        &mut self,
        start: &BytesStart<'_>,
        parent: Option<ElementId>,
    ) -> Result<ElementId, WaylinkError> {
        let id = ElementId(self.elements.len());
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            if key == self.id_attribute && !value.is_empty() {
                self.identifiers.entry(value.clone()).or_default().push(id);
            }
            attributes.push((key, value));
        }
        if parent.is_none() && !self.elements.is_empty() {
            return Err(WaylinkError::Parse(format!(
                "{}: more than one root element",
                self.location
            )));
        }
        self.elements.push(Element {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            parent,
            content: Vec::new(),
            end: id.0 + 1,
        });
        if let Some(parent) = parent {
            self.elements[parent.0].content.push(Node::Element(id));
        }
        Ok(id)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn root(&self) -> ElementId {
        ElementId(0)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Panics if `id` does not belong to this document; see [`Document::get`].
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0)
    }

    /// All elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = ElementId> {
        (0..self.elements.len()).map(ElementId)
    }

    /// The branch rooted at `branch`, in document order, including `branch` itself.
    /// Empty when `branch` is out of range.
    pub fn descendants(&self, branch: ElementId) -> impl Iterator<Item = ElementId> {
        (branch.0..self.subtree_end(branch)).map(ElementId)
    }

    /// Index one past the last element of `element`'s subtree. Continuing a document-order walk
    /// from here skips the subtree.
    pub fn subtree_end(&self, element: ElementId) -> usize {
        self.get(element).map_or(element.0, |found| found.end)
    }

    /// Strict ancestors, nearest first.
    pub fn ancestors(&self, element: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        std::iter::successors(self.get(element).and_then(|found| found.parent), |id| {
            self.elements[id.0].parent
        })
    }

    /// Value of the identifier attribute, if any.
    pub fn identifier(&self, element: ElementId) -> Option<&str> {
        self.get(element)?
            .attribute(&self.id_attribute)
            .filter(|value| !value.is_empty())
    }

    /// Raw waylink declaration carried by the element, if any.
    pub fn link_declaration(&self, element: ElementId) -> Option<&str> {
        self.get(element)?.attribute(&self.link_attribute)
    }

    /// First element (in document order) claiming `identifier`.
    pub fn element_by_identifier(&self, identifier: &str) -> Option<ElementId> {
        self.claimants(identifier).first().copied()
    }

    /// Every element claiming `identifier`, in document order.
    pub fn claimants(&self, identifier: &str) -> &[ElementId] {
        self.identifiers
            .get(identifier)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Concatenated text of the subtree, in document order.
    pub fn text_content(&self, element: ElementId) -> String {
        let mut out = String::new();
        self.collect_text(element, &mut out);
        out
    }

    fn collect_text(&self, element: ElementId, out: &mut String) {
        let Some(found) = self.get(element) else {
            return;
        };
        for node in found.content.iter() {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(child) => self.collect_text(*child, out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    const SOURCE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
  <body id="body">
    <section id="a">
      <p>Alpha &amp; <em>beta</em></p>
      <a data-waylink="#b">to b</a>
    </section>
    <section id="b"><br/>Bravo</section>
    <p id="a">Shadow</p>
  </body>
</html>
"##;

    fn parse() -> Document {
        Document::parse(
            Location::parse("file:///srv/way.xht").unwrap(),
            SOURCE,
            &WayConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_document_order() {
        let doc = parse();
        let names = doc
            .elements()
            .map(|id| doc.element(id).name.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["html", "body", "section", "p", "em", "a", "section", "br", "p"]
        );
        assert_eq!(doc.element(doc.root()).parent, None);
    }

    #[test]
    fn test_descendants_are_contiguous() {
        let doc = parse();
        let a = doc.element_by_identifier("a").unwrap();
        let branch = doc.descendants(a).collect::<Vec<_>>();
        assert_eq!(branch, vec![ElementId(2), ElementId(3), ElementId(4), ElementId(5)]);
        assert_eq!(doc.subtree_end(a), 6);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let doc = parse();
        let em = ElementId(4);
        let chain = doc.ancestors(em).collect::<Vec<_>>();
        assert_eq!(chain, vec![ElementId(3), ElementId(2), ElementId(1), ElementId(0)]);
    }

    #[test]
    fn test_identifiers_and_links() {
        let doc = parse();
        assert_eq!(doc.claimants("a"), &[ElementId(2), ElementId(8)]);
        assert_eq!(doc.element_by_identifier("b"), Some(ElementId(6)));
        assert_eq!(doc.element_by_identifier("missing"), None);
        assert_eq!(doc.link_declaration(ElementId(5)), Some("#b"));
        assert_eq!(doc.identifier(ElementId(3)), None);
    }

    #[test]
    fn test_foreign_element_ids() {
        let doc = parse();
        let foreign = ElementId(999);
        assert!(doc.get(foreign).is_none());
        assert!(doc.get(ElementId(8)).is_some());
        assert_eq!(doc.link_declaration(foreign), None);
        assert_eq!(doc.identifier(foreign), None);
        assert_eq!(doc.descendants(foreign).count(), 0);
        assert_eq!(doc.ancestors(foreign).count(), 0);
        assert_eq!(doc.text_content(foreign), "");
    }

    #[test]
    fn test_text_content_unescapes() {
        let doc = parse();
        let p = ElementId(3);
        assert_eq!(doc.text_content(p), "Alpha & beta");
    }

    #[test]
    fn test_unclosed_document_fails() {
        let res = Document::parse(
            Location::parse("file:///srv/way.xht").unwrap(),
            "<html><body>",
            &WayConfig::default(),
        );
        assert!(matches!(res, Err(WaylinkError::Parse(_))));
    }

    #[test]
    fn test_empty_document_fails() {
        let res = Document::parse(
            Location::parse("file:///srv/way.xht").unwrap(),
            "<?xml version=\"1.0\"?>",
            &WayConfig::default(),
        );
        assert!(matches!(res, Err(WaylinkError::Parse(_))));
    }
}
