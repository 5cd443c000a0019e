//! `DomTree` over the live browser DOM.
//!
//! Nodes are `web_sys::Node` handles, compared by identity. Text offsets are
//! UTF-16 code units, matching what `Range` and `Selection` report.

use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Node, Text};

use weaver_annotate_core::{AnnotateError, DomPoint, DomRange, DomTree, NodeKind, Result};

/// Browser DOM access for one document.
#[derive(Clone, Debug)]
pub struct BrowserDom {
    document: Document,
}

impl BrowserDom {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    /// Use the document of the current window.
    pub fn from_window() -> Result<Self> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or("no document")?;
        Ok(Self::new(document))
    }

    /// The document that owns `node`, falling back to the window's.
    pub fn for_node(node: &Node) -> Result<Self> {
        match node.owner_document() {
            Some(document) => Ok(Self::new(document)),
            None => Self::from_window(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Build a live `Range` from a boundary pair.
    pub fn to_range(&self, range: &DomRange<Node>) -> Result<web_sys::Range> {
        let live = self
            .document
            .create_range()
            .map_err(|e| format!("create_range failed: {:?}", e))?;
        live.set_start(&range.start.node, range.start.offset as u32)
            .map_err(|e| format!("set_start failed: {:?}", e))?;
        live.set_end(&range.end.node, range.end.offset as u32)
            .map_err(|e| format!("set_end failed: {:?}", e))?;
        Ok(live)
    }

    /// Read the boundary points of a live `Range`.
    pub fn from_range(range: &web_sys::Range) -> Result<DomRange<Node>> {
        let start_node = range
            .start_container()
            .map_err(|e| format!("start_container failed: {:?}", e))?;
        let start_offset = range
            .start_offset()
            .map_err(|e| format!("start_offset failed: {:?}", e))?;
        let end_node = range
            .end_container()
            .map_err(|e| format!("end_container failed: {:?}", e))?;
        let end_offset = range
            .end_offset()
            .map_err(|e| format!("end_offset failed: {:?}", e))?;
        Ok(DomRange::new(
            DomPoint::new(start_node, start_offset as usize),
            DomPoint::new(end_node, end_offset as usize),
        ))
    }
}

fn element(node: &Node) -> Result<&Element> {
    node.dyn_ref::<Element>()
        .ok_or_else(|| AnnotateError::Platform("node is not an element".into()))
}

impl DomTree for BrowserDom {
    type Node = Node;

    fn kind(&self, node: &Node) -> NodeKind {
        match node.node_type() {
            Node::ELEMENT_NODE => NodeKind::Element,
            Node::TEXT_NODE | Node::CDATA_SECTION_NODE => NodeKind::Text,
            _ => NodeKind::Other,
        }
    }

    fn parent(&self, node: &Node) -> Option<Node> {
        node.parent_node()
    }

    fn children(&self, node: &Node) -> Vec<Node> {
        let list = node.child_nodes();
        (0..list.length()).filter_map(|i| list.item(i)).collect()
    }

    fn tag_name(&self, node: &Node) -> Option<String> {
        node.dyn_ref::<Element>()
            .map(|el| el.local_name().to_lowercase())
    }

    fn text(&self, node: &Node) -> String {
        node.text_content().unwrap_or_default()
    }

    fn attribute(&self, node: &Node, name: &str) -> Option<String> {
        node.dyn_ref::<Element>()?.get_attribute(name)
    }

    fn set_attribute(&mut self, node: &Node, name: &str, value: &str) -> Result<()> {
        element(node)?
            .set_attribute(name, value)
            .map_err(|e| format!("set_attribute {name} failed: {:?}", e))?;
        Ok(())
    }

    fn remove_attribute(&mut self, node: &Node, name: &str) -> Result<()> {
        element(node)?
            .remove_attribute(name)
            .map_err(|e| format!("remove_attribute {name} failed: {:?}", e))?;
        Ok(())
    }

    fn create_element(&mut self, tag: &str) -> Result<Node> {
        let el = self
            .document
            .create_element(tag)
            .map_err(|e| format!("create_element {tag} failed: {:?}", e))?;
        Ok(el.into())
    }

    fn create_text(&mut self, text: &str) -> Result<Node> {
        Ok(self.document.create_text_node(text).into())
    }

    fn insert_before(&mut self, parent: &Node, child: &Node, reference: Option<&Node>) -> Result<()> {
        parent
            .insert_before(child, reference)
            .map_err(|e| format!("insert_before failed: {:?}", e))?;
        Ok(())
    }

    fn remove(&mut self, node: &Node) -> Result<()> {
        if let Some(parent) = node.parent_node() {
            parent
                .remove_child(node)
                .map_err(|e| format!("remove_child failed: {:?}", e))?;
        }
        Ok(())
    }

    fn split_text(&mut self, node: &Node, offset: usize) -> Result<Node> {
        let text = node
            .dyn_ref::<Text>()
            .ok_or_else(|| AnnotateError::Platform("node is not a text node".into()))?;
        let tail = text
            .split_text(offset as u32)
            .map_err(|e| format!("split_text failed: {:?}", e))?;
        Ok(tail.into())
    }

    fn set_text_content(&mut self, node: &Node, text: &str) -> Result<()> {
        node.set_text_content(Some(text));
        Ok(())
    }

    fn normalize(&mut self, node: &Node) -> Result<()> {
        node.normalize();
        Ok(())
    }

    fn measure(&self, text: &str) -> usize {
        text.encode_utf16().count()
    }
}
