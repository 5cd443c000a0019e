//! In-memory DOM for headless rendering and tests.
//!
//! An arena of element and text nodes. Detached nodes stay in the arena, so
//! handles never dangle. Offsets are in chars.

use smol_str::SmolStr;

use crate::dom::{DomTree, NodeKind};
use crate::error::{AnnotateError, Result};

/// Handle to a node in a [`MemoryDom`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

#[derive(Clone, Debug)]
enum NodeData {
    Element {
        tag: SmolStr,
        attrs: Vec<(SmolStr, String)>,
    },
    Text(String),
}

#[derive(Clone, Debug)]
struct NodeEntry {
    data: NodeData,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

/// Arena-backed DOM tree.
#[derive(Clone, Debug)]
pub struct MemoryDom {
    nodes: Vec<NodeEntry>,
    root: NodeHandle,
}

impl MemoryDom {
    /// Create a tree holding a single empty root element.
    pub fn new(root_tag: &str) -> Self {
        Self {
            nodes: vec![NodeEntry {
                data: NodeData::Element {
                    tag: root_tag.into(),
                    attrs: Vec::new(),
                },
                parent: None,
                children: Vec::new(),
            }],
            root: NodeHandle(0),
        }
    }

    /// Build a tree from well-formed (X)HTML markup with a single root element.
    ///
    /// Whitespace-only text is kept, comments and processing instructions
    /// are dropped.
    pub fn from_markup(markup: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(markup)?;
        let source_root = doc.root_element();
        let mut dom = MemoryDom::new(source_root.tag_name().name());
        let root = dom.root;
        dom.copy_attributes(root, &source_root);
        dom.copy_children(root, &source_root);
        Ok(dom)
    }

    fn copy_attributes(&mut self, target: NodeHandle, source: &roxmltree::Node<'_, '_>) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[target.0].data {
            for attr in source.attributes() {
                attrs.push((attr.name().into(), attr.value().to_string()));
            }
        }
    }

    fn copy_children(&mut self, target: NodeHandle, source: &roxmltree::Node<'_, '_>) {
        for child in source.children() {
            if child.is_element() {
                let handle = self.alloc(NodeData::Element {
                    tag: child.tag_name().name().into(),
                    attrs: Vec::new(),
                });
                self.copy_attributes(handle, &child);
                self.append(target, handle);
                self.copy_children(handle, &child);
            } else if child.is_text() {
                let handle = self.alloc(NodeData::Text(child.text().unwrap_or_default().to_string()));
                self.append(target, handle);
            }
        }
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    fn alloc(&mut self, data: NodeData) -> NodeHandle {
        self.nodes.push(NodeEntry {
            data,
            parent: None,
            children: Vec::new(),
        });
        NodeHandle(self.nodes.len() - 1)
    }

    fn detach(&mut self, node: NodeHandle) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    /// Append `child` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeHandle, child: NodeHandle) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Serialize a subtree back to markup.
    pub fn to_html(&self, node: &NodeHandle) -> String {
        let mut out = String::new();
        self.write_html(*node, &mut out);
        out
    }

    fn write_html(&self, node: NodeHandle, out: &mut String) {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => out.push_str(&escape_text(text)),
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                out.push('>');
                for child in &self.nodes[node.0].children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    fn entry(&self, node: &NodeHandle) -> Result<&NodeEntry> {
        self.nodes
            .get(node.0)
            .ok_or_else(|| AnnotateError::Platform(format!("unknown node {}", node.0)))
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

impl DomTree for MemoryDom {
    type Node = NodeHandle;

    fn kind(&self, node: &NodeHandle) -> NodeKind {
        match self.nodes.get(node.0).map(|e| &e.data) {
            Some(NodeData::Element { .. }) => NodeKind::Element,
            Some(NodeData::Text(_)) => NodeKind::Text,
            None => NodeKind::Other,
        }
    }

    fn parent(&self, node: &NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(node.0)?.parent
    }

    fn children(&self, node: &NodeHandle) -> Vec<NodeHandle> {
        self.nodes
            .get(node.0)
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }

    fn tag_name(&self, node: &NodeHandle) -> Option<String> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Element { tag, .. } => Some(tag.to_lowercase()),
            NodeData::Text(_) => None,
        }
    }

    fn text(&self, node: &NodeHandle) -> String {
        match self.nodes.get(node.0).map(|e| &e.data) {
            Some(NodeData::Text(text)) => text.clone(),
            Some(NodeData::Element { .. }) => {
                let mut out = String::new();
                for child in &self.nodes[node.0].children {
                    out.push_str(&self.text(child));
                }
                out
            }
            None => String::new(),
        }
    }

    fn attribute(&self, node: &NodeHandle, name: &str) -> Option<String> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            NodeData::Text(_) => None,
        }
    }

    fn set_attribute(&mut self, node: &NodeHandle, name: &str, value: &str) -> Result<()> {
        self.entry(node)?;
        match &mut self.nodes[node.0].data {
            NodeData::Element { attrs, .. } => {
                match attrs.iter_mut().find(|(n, _)| n == name) {
                    Some((_, v)) => *v = value.to_string(),
                    None => attrs.push((name.into(), value.to_string())),
                }
                Ok(())
            }
            NodeData::Text(_) => Err("cannot set an attribute on a text node".into()),
        }
    }

    fn remove_attribute(&mut self, node: &NodeHandle, name: &str) -> Result<()> {
        self.entry(node)?;
        if let NodeData::Element { attrs, .. } = &mut self.nodes[node.0].data {
            attrs.retain(|(n, _)| n != name);
        }
        Ok(())
    }

    fn create_element(&mut self, tag: &str) -> Result<NodeHandle> {
        Ok(self.alloc(NodeData::Element {
            tag: tag.into(),
            attrs: Vec::new(),
        }))
    }

    fn create_text(&mut self, text: &str) -> Result<NodeHandle> {
        Ok(self.alloc(NodeData::Text(text.to_string())))
    }

    fn insert_before(
        &mut self,
        parent: &NodeHandle,
        child: &NodeHandle,
        reference: Option<&NodeHandle>,
    ) -> Result<()> {
        self.entry(parent)?;
        self.entry(child)?;
        if crate::dom::contains(self, child, parent) {
            return Err("cannot insert a node into its own subtree".into());
        }
        self.detach(*child);
        let siblings = &mut self.nodes[parent.0].children;
        let index = match reference {
            Some(r) => siblings
                .iter()
                .position(|c| c == r)
                .ok_or_else(|| AnnotateError::Platform("reference is not a child".into()))?,
            None => siblings.len(),
        };
        siblings.insert(index, *child);
        self.nodes[child.0].parent = Some(*parent);
        Ok(())
    }

    fn remove(&mut self, node: &NodeHandle) -> Result<()> {
        self.entry(node)?;
        self.detach(*node);
        Ok(())
    }

    fn split_text(&mut self, node: &NodeHandle, offset: usize) -> Result<NodeHandle> {
        let text = match &self.entry(node)?.data {
            NodeData::Text(text) => text.clone(),
            NodeData::Element { .. } => return Err("cannot split an element".into()),
        };
        let split_at = text
            .char_indices()
            .nth(offset)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let (head, tail) = text.split_at(split_at);
        self.nodes[node.0].data = NodeData::Text(head.to_string());
        let tail = self.alloc(NodeData::Text(tail.to_string()));
        if let Some(parent) = self.parent(node) {
            let next = crate::dom::next_sibling(self, node);
            self.insert_before(&parent, &tail, next.as_ref())?;
        }
        Ok(tail)
    }

    fn set_text_content(&mut self, node: &NodeHandle, text: &str) -> Result<()> {
        for child in self.children(node) {
            self.detach(child);
        }
        if !text.is_empty() {
            let text = self.alloc(NodeData::Text(text.to_string()));
            self.append(*node, text);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_round_trip() {
        let markup = r##"<div id="view"><p data-tei="p1">a &amp; b<a href="#fn_1">1</a></p></div>"##;
        let dom = MemoryDom::from_markup(markup).unwrap();
        assert_eq!(dom.to_html(&dom.root()), markup);
        assert_eq!(dom.text(&dom.root()), "a & b1");
    }

    #[test]
    fn test_split_text_keeps_head_in_place() {
        let mut dom = MemoryDom::from_markup("<p>hello world</p>").unwrap();
        let text = dom.children(&dom.root())[0];
        let tail = dom.split_text(&text, 5).unwrap();
        assert_eq!(dom.text(&text), "hello");
        assert_eq!(dom.text(&tail), " world");
        assert_eq!(dom.children(&dom.root()), vec![text, tail]);
    }

    #[test]
    fn test_insert_before_moves_node() {
        let mut dom = MemoryDom::from_markup("<p><b>x</b><i>y</i></p>").unwrap();
        let root = dom.root();
        let children = dom.children(&root);
        dom.insert_before(&root, &children[1], Some(&children[0])).unwrap();
        assert_eq!(dom.to_html(&root), "<p><i>y</i><b>x</b></p>");
        assert!(dom.insert_before(&children[0], &root, None).is_err());
    }

    #[test]
    fn test_set_text_content() {
        let mut dom = MemoryDom::from_markup("<p><b>x</b>y</p>").unwrap();
        let root = dom.root();
        dom.set_text_content(&root, "z").unwrap();
        assert_eq!(dom.to_html(&root), "<p>z</p>");
    }
}
