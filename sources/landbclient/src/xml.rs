//! A minimal element tree, enough to build SOAP requests and pick values out of replies.
//!
//! Namespace prefixes are dropped when parsing, so `soap:Body` and `SOAP-ENV:Body` both become
//! `Body`. Mixed content is not preserved: all text directly inside an element is concatenated.

use crate::error::{self, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use snafu::{OptionExt, ResultExt};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// An element holding only text.
    pub fn text_element<S1, S2>(name: S1, text: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            name: name.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute<S1, S2>(mut self, name: S1, value: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Follows a path of child names.
    pub fn find(&self, path: &[&str]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |element, name| element.child(name))
    }

    /// The first element called `name` in a depth-first walk, including this one.
    pub fn descendant(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.descendant(name))
    }

    /// Text of the child called `name`, if it exists and isn't empty.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|text| !text.is_empty())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replaces the child called `child.name`, or appends it.
    pub fn set_child(&mut self, child: Element) {
        match self.child_mut(&child.name) {
            Some(existing) => *existing = child,
            None => self.children.push(child),
        }
    }

    /// Parses a document and returns its root element.
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event().context(error::XmlSnafu)? {
                Event::Start(start) => stack.push(start_element(&start)?),
                Event::Empty(start) => {
                    let element = start_element(&start)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack.pop().context(error::XmlStructureSnafu {
                        reason: "unbalanced end tag",
                    })?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&text.unescape().context(error::XmlSnafu)?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        snafu::ensure!(
            stack.is_empty(),
            error::XmlStructureSnafu {
                reason: "document ended inside an element",
            }
        );
        root.context(error::XmlStructureSnafu {
            reason: "document has no root element",
        })
    }

    /// Serializes the element and its children.
    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", key, escape(value)));
        }
        if self.text.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape(&self.text));
        for child in &self.children {
            child.write_to(out);
        }
        out.push_str(&format!("</{}>", self.name));
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

fn start_element(start: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attribute in start.attributes() {
        let attribute = attribute
            .map_err(quick_xml::Error::from)
            .context(error::XmlSnafu)?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .context(error::XmlSnafu)?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const REPLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <soap:Body>
    <getDeviceInfoResponse xmlns="urn:NetworkService">
      <DeviceInfo xsi:type="types:DeviceInfo">
        <DeviceName>FOO</DeviceName>
        <Description>Web &amp; mail</Description>
        <Tag xsi:nil="true"/>
        <ResponsiblePerson>
          <Name>DOE</Name>
          <FirstName>JANE</FirstName>
        </ResponsiblePerson>
      </DeviceInfo>
    </getDeviceInfoResponse>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn parse_drops_prefixes() {
        let root = Element::parse(REPLY).unwrap();
        assert_eq!(root.name, "Envelope");
        let info = root
            .find(&["Body", "getDeviceInfoResponse", "DeviceInfo"])
            .unwrap();
        assert_eq!(info.attribute("type"), Some("types:DeviceInfo"));
        assert_eq!(info.child_text("DeviceName"), Some("FOO"));
        assert_eq!(info.child_text("Description"), Some("Web & mail"));
        assert_eq!(info.child_text("Tag"), None);
        assert_eq!(info.child("Tag").and_then(|t| t.attribute("nil")), Some("true"));
        assert_eq!(
            root.descendant("FirstName").map(|e| e.text.as_str()),
            Some("JANE")
        );
    }

    #[test]
    fn write_escapes() {
        let element = Element::new("DeviceInput")
            .with_attribute("note", "a\"b")
            .with_child(Element::text_element("Description", "R&D <lab>"))
            .with_child(Element::new("Tag"));
        assert_eq!(
            element.to_xml(),
            "<DeviceInput note=\"a&quot;b\"><Description>R&amp;D &lt;lab&gt;</Description><Tag/></DeviceInput>"
        );
    }

    #[test]
    fn write_then_parse() {
        let element = Element::new("a")
            .with_child(Element::text_element("b", "x & y"))
            .with_child(Element::new("c").with_child(Element::text_element("d", "1")));
        assert_eq!(Element::parse(&element.to_xml()).unwrap(), element);
    }

    #[test]
    fn set_child_replaces() {
        let mut element = Element::new("p").with_child(Element::text_element("Name", "OLD"));
        element.set_child(Element::text_element("Name", "NEW"));
        element.set_child(Element::text_element("FirstName", "E-GROUP"));
        assert_eq!(element.children.len(), 2);
        assert_eq!(element.child_text("Name"), Some("NEW"));
    }

    #[test]
    fn malformed() {
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(Element::parse("").is_err());
    }
}
