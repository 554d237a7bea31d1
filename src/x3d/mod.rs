// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! X3D 3.3 and X3DOM HTML output
//!
//! Every exporter produces an [`XmlNode`] tree first, so callers can inspect
//! or post-process the graph before it is serialized.

pub mod exporters;
pub mod nodes;
pub mod xml;

pub use exporters::{X3dCurveExporter, X3dFromSceneGraph, X3dSceneExporter, X3dShapeExporter};
pub use xml::XmlNode;

use crate::error::Result;
use crate::io::write_atomic;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const X3D_VERSION: &str = "3.3";
pub const X3D_DOCTYPE: &str =
    "X3D PUBLIC \"ISO//Web3D//DTD X3D 3.3//EN\" \"http://www.web3d.org/specifications/x3d-3.3.dtd\"";
pub const X3DOM_SCRIPT: &str = "https://www.x3dom.org/download/x3dom.js";
pub const X3DOM_STYLESHEET: &str = "https://www.x3dom.org/download/x3dom.css";

/// Wrap scene content in an `X3D` document element
pub fn x3d_document(title: &str, content: Vec<XmlNode>) -> XmlNode {
    let head = XmlNode::new("head")
        .child(
            XmlNode::new("meta")
                .attr("name", "title")
                .attr("content", title),
        )
        .child(
            XmlNode::new("meta")
                .attr("name", "generator")
                .attr("content", concat!("cadex ", env!("CARGO_PKG_VERSION"))),
        );
    let mut scene = XmlNode::new("Scene")
        .child(XmlNode::new("NavigationInfo").attr("type", "\"EXAMINE\" \"ANY\""));
    scene.children.extend(content);

    XmlNode::new("X3D")
        .attr("profile", "Immersive")
        .attr("version", X3D_VERSION)
        .attr("xmlns:xsd", "http://www.w3.org/2001/XMLSchema-instance")
        .attr(
            "xsd:noNamespaceSchemaLocation",
            "http://www.web3d.org/specifications/x3d-3.3.xsd",
        )
        .child(head)
        .child(scene)
}

/// Serialization shared by all exporters
pub trait X3dExport {
    /// Nodes placed in the `Scene` element
    fn scene_content(&self) -> Result<Vec<XmlNode>>;

    fn title(&self) -> &str {
        "cadex"
    }

    /// Complete `X3D` element tree
    fn to_x3d_graph(&self) -> Result<XmlNode> {
        Ok(x3d_document(self.title(), self.scene_content()?))
    }

    /// X3D XML text
    fn to_xml(&self) -> Result<String> {
        self.to_x3d_graph()?.to_document(Some(X3D_DOCTYPE))
    }

    /// Standalone HTML page rendering the scene with X3DOM
    fn to_x3dom_html(&self) -> Result<String> {
        let graph = self.to_x3d_graph()?;
        let scene = match graph.find("Scene") {
            Some(scene) => scene.to_html_markup()?,
            None => String::new(),
        };
        let title = quick_xml::escape::escape(self.title());
        Ok(format!(
            "<!DOCTYPE html>\n\
             <html>\n\
             <head>\n\
             <meta charset=\"utf-8\">\n\
             <title>{title}</title>\n\
             <script type=\"text/javascript\" src=\"{X3DOM_SCRIPT}\"></script>\n\
             <link rel=\"stylesheet\" type=\"text/css\" href=\"{X3DOM_STYLESHEET}\">\n\
             <style>x3d {{ width: 100%; height: 100vh; border: none; }}</style>\n\
             </head>\n\
             <body>\n\
             <x3d>\n\
             {scene}\n\
             </x3d>\n\
             </body>\n\
             </html>\n"
        ))
    }

    fn write_x3d(&self, path: impl AsRef<Path>) -> Result<()>
    where
        Self: Sized,
    {
        write_text(path.as_ref(), &self.to_xml()?, "X3D")
    }

    fn write_html(&self, path: impl AsRef<Path>) -> Result<()>
    where
        Self: Sized,
    {
        write_text(path.as_ref(), &self.to_x3dom_html()?, "X3DOM HTML")
    }
}

fn write_text(path: &Path, text: &str, kind: &str) -> Result<()> {
    write_atomic(path, |out| {
        out.write_all(text.as_bytes())?;
        Ok(())
    })?;
    info!(path = %path.display(), bytes = text.len(), "wrote {}", kind);
    Ok(())
}
