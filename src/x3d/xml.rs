// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! In-memory XML element tree and its quick-xml serialization

use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// One XML element: name, ordered attributes and child elements
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style child
    pub fn child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// Replace or append an attribute
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn push(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child named `name`
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Every element named `name` in this subtree, in document order
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a XmlNode> {
        let mut found = Vec::new();
        self.collect(name, &mut found);
        found
    }

    fn collect<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlNode>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.collect(name, found);
        }
    }

    /// Indented markup of this subtree without a declaration
    pub fn to_markup(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        self.write(&mut writer, Markup::Xml)?;
        into_string(writer)
    }

    /// Markup for embedding in an HTML page. HTML parsers ignore the
    /// self-closing slash on custom elements, so every element gets an
    /// explicit end tag.
    pub fn to_html_markup(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        self.write(&mut writer, Markup::Html)?;
        into_string(writer)
    }

    /// Standalone document: declaration, optional doctype, then this element
    pub fn to_document(&self, doctype: Option<&str>) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        if let Some(doctype) = doctype {
            writer
                .write_event(Event::DocType(BytesText::from_escaped(doctype)))
                .map_err(xml_error)?;
        }
        self.write(&mut writer, Markup::Xml)?;
        into_string(writer)
    }

    fn write(&self, writer: &mut Writer<Cursor<Vec<u8>>>, markup: Markup) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() && markup == Markup::Xml {
            writer.write_event(Event::Empty(start)).map_err(xml_error)?;
            return Ok(());
        }
        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        for child in &self.children {
            child.write(writer, markup)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Markup {
    Xml,
    Html,
}

fn into_string(writer: Writer<Cursor<Vec<u8>>>) -> Result<String> {
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| Error::format(format!("XML output is not UTF-8: {}", e)))
}

fn xml_error(err: impl std::fmt::Display) -> Error {
    Error::Io(std::io::Error::other(err.to_string()))
}
