//! DOM tree abstraction.
//!
//! The `DomTree` trait provides the small set of node operations the overlay
//! needs, allowing the same mapping and rendering code to run against the
//! live browser DOM and the in-memory [`MemoryDom`](crate::MemoryDom).
//!
//! Positions follow the browser Range model: a [`DomPoint`] on a text node
//! counts text units into that node, a point on an element counts children.

use std::fmt::Debug;

use crate::error::Result;

/// Kind of a DOM node, as far as the overlay cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    /// Comments, processing instructions, documents, fragments.
    Other,
}

/// A mutable DOM-like tree.
///
/// Offsets are in the tree's own text unit: Unicode scalar values for
/// `MemoryDom`, UTF-16 code units in the browser. [`DomTree::measure`]
/// converts a string length into that unit.
pub trait DomTree {
    /// Handle to a node. Cheap to clone, compared by identity.
    type Node: Clone + PartialEq + Debug;

    fn kind(&self, node: &Self::Node) -> NodeKind;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    /// Lowercase local name of an element.
    fn tag_name(&self, node: &Self::Node) -> Option<String>;

    /// Text of a text node, or the concatenated descendant text of an element.
    fn text(&self, node: &Self::Node) -> String;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str) -> Result<()>;

    fn remove_attribute(&mut self, node: &Self::Node, name: &str) -> Result<()>;

    fn create_element(&mut self, tag: &str) -> Result<Self::Node>;

    fn create_text(&mut self, text: &str) -> Result<Self::Node>;

    /// Insert `child` into `parent` before `reference`, or append when
    /// `reference` is `None`. Detaches `child` from its old parent first.
    fn insert_before(
        &mut self,
        parent: &Self::Node,
        child: &Self::Node,
        reference: Option<&Self::Node>,
    ) -> Result<()>;

    /// Detach a node from its parent.
    fn remove(&mut self, node: &Self::Node) -> Result<()>;

    /// Split a text node at `offset`. The original node keeps the head; the
    /// returned node holds the tail and is inserted right after it.
    fn split_text(&mut self, node: &Self::Node, offset: usize) -> Result<Self::Node>;

    /// Replace all children of an element with a single text node.
    fn set_text_content(&mut self, node: &Self::Node, text: &str) -> Result<()>;

    /// Merge adjacent text children of `node` and drop empty ones, like
    /// `Node.normalize`. Merged text nodes are replaced, so handles to them
    /// go stale.
    fn normalize(&mut self, node: &Self::Node) -> Result<()> {
        let mut previous: Option<Self::Node> = None;
        for child in self.children(node) {
            if !self.is_text(&child) {
                previous = None;
                continue;
            }
            if self.text(&child).is_empty() {
                self.remove(&child)?;
                continue;
            }
            match previous.take() {
                Some(prev) => {
                    let merged = format!("{}{}", self.text(&prev), self.text(&child));
                    let text = self.create_text(&merged)?;
                    self.insert_before(node, &text, Some(&prev))?;
                    self.remove(&prev)?;
                    self.remove(&child)?;
                    previous = Some(text);
                }
                None => previous = Some(child),
            }
        }
        Ok(())
    }

    /// Length of `text` in this tree's offset unit.
    fn measure(&self, text: &str) -> usize {
        text.chars().count()
    }

    /// Length of a node's text in this tree's offset unit.
    fn text_len(&self, node: &Self::Node) -> usize {
        self.measure(&self.text(node))
    }

    fn is_element(&self, node: &Self::Node) -> bool {
        self.kind(node) == NodeKind::Element
    }

    fn is_text(&self, node: &Self::Node) -> bool {
        self.kind(node) == NodeKind::Text
    }

    /// Check the whitespace-separated `class` attribute.
    fn has_class(&self, node: &Self::Node, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

/// A boundary point: a node plus an offset into it.
#[derive(Clone, Debug, PartialEq)]
pub struct DomPoint<N> {
    pub node: N,
    pub offset: usize,
}

impl<N> DomPoint<N> {
    pub fn new(node: N, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A pair of boundary points, start before end in document order.
#[derive(Clone, Debug, PartialEq)]
pub struct DomRange<N> {
    pub start: DomPoint<N>,
    pub end: DomPoint<N>,
}

impl<N: PartialEq> DomRange<N> {
    pub fn new(start: DomPoint<N>, end: DomPoint<N>) -> Self {
        Self { start, end }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Point immediately before `node` in its parent.
pub fn point_before<D: DomTree>(dom: &D, node: &D::Node) -> Option<DomPoint<D::Node>> {
    let parent = dom.parent(node)?;
    let index = child_index(dom, node)?;
    Some(DomPoint::new(parent, index))
}

/// Point immediately after `node` in its parent.
pub fn point_after<D: DomTree>(dom: &D, node: &D::Node) -> Option<DomPoint<D::Node>> {
    let parent = dom.parent(node)?;
    let index = child_index(dom, node)?;
    Some(DomPoint::new(parent, index + 1))
}

/// Index of `node` among its parent's children.
pub fn child_index<D: DomTree>(dom: &D, node: &D::Node) -> Option<usize> {
    let parent = dom.parent(node)?;
    dom.children(&parent).iter().position(|c| c == node)
}

pub fn next_sibling<D: DomTree>(dom: &D, node: &D::Node) -> Option<D::Node> {
    let parent = dom.parent(node)?;
    let siblings = dom.children(&parent);
    let index = siblings.iter().position(|c| c == node)?;
    siblings.get(index + 1).cloned()
}

/// Whether `node` is `ancestor` or one of its descendants.
pub fn contains<D: DomTree>(dom: &D, ancestor: &D::Node, node: &D::Node) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if &n == ancestor {
            return true;
        }
        current = dom.parent(&n);
    }
    false
}

/// Nearest element, starting at `node` itself, that satisfies `pred`.
pub fn closest<D, F>(dom: &D, node: &D::Node, mut pred: F) -> Option<D::Node>
where
    D: DomTree,
    F: FnMut(&D::Node) -> bool,
{
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if dom.is_element(&n) && pred(&n) {
            return Some(n);
        }
        current = dom.parent(&n);
    }
    None
}

/// Ancestors of `node`, nearest first, excluding `node` itself.
pub fn ancestors<D: DomTree>(dom: &D, node: &D::Node) -> Vec<D::Node> {
    let mut out = Vec::new();
    let mut current = dom.parent(node);
    while let Some(n) = current {
        current = dom.parent(&n);
        out.push(n);
    }
    out
}

/// Deepest node containing both `a` and `b`.
pub fn common_ancestor<D: DomTree>(dom: &D, a: &D::Node, b: &D::Node) -> Option<D::Node> {
    let mut chain_a = ancestors(dom, a);
    chain_a.insert(0, a.clone());
    let mut current = Some(b.clone());
    while let Some(n) = current {
        if chain_a.contains(&n) {
            return Some(n);
        }
        current = dom.parent(&n);
    }
    None
}

/// Next node after `node` in preorder, staying inside `root`.
pub fn next_in_order<D: DomTree>(dom: &D, root: &D::Node, node: &D::Node) -> Option<D::Node> {
    if let Some(first) = dom.children(node).into_iter().next() {
        return Some(first);
    }
    next_skipping_children(dom, root, node)
}

/// Next node after `node` in preorder, not descending into `node`.
pub fn next_skipping_children<D: DomTree>(
    dom: &D,
    root: &D::Node,
    node: &D::Node,
) -> Option<D::Node> {
    let mut current = node.clone();
    loop {
        if &current == root {
            return None;
        }
        if let Some(sibling) = next_sibling(dom, &current) {
            return Some(sibling);
        }
        current = dom.parent(&current)?;
    }
}

/// Descendants of `root` in preorder, excluding `root`.
pub fn descendants<D: DomTree>(dom: &D, root: &D::Node) -> Vec<D::Node> {
    let mut out = Vec::new();
    let mut current = next_in_order(dom, root, root);
    while let Some(n) = current {
        current = next_in_order(dom, root, &n);
        out.push(n);
    }
    out
}

/// Text nodes under `root` in document order.
pub fn text_nodes<D: DomTree>(dom: &D, root: &D::Node) -> Vec<D::Node> {
    descendants(dom, root)
        .into_iter()
        .filter(|n| dom.is_text(n))
        .collect()
}

/// Elements under `root` (in preorder) that satisfy `pred`.
pub fn query_all<D, F>(dom: &D, root: &D::Node, mut pred: F) -> Vec<D::Node>
where
    D: DomTree,
    F: FnMut(&D::Node) -> bool,
{
    descendants(dom, root)
        .into_iter()
        .filter(|n| dom.is_element(n) && pred(n))
        .collect()
}

/// First element under `root` whose attribute `name` equals `value`.
pub fn find_by_attribute<D: DomTree>(
    dom: &D,
    root: &D::Node,
    name: &str,
    value: &str,
) -> Option<D::Node> {
    query_all(dom, root, |n| dom.attribute(n, name).as_deref() == Some(value))
        .into_iter()
        .next()
}

/// Verbatim text covered by a range, markup ignored.
pub fn range_text<D: DomTree>(dom: &D, range: &DomRange<D::Node>) -> String {
    let Some(root) = common_ancestor(dom, &range.start.node, &range.end.node) else {
        return String::new();
    };
    let start = flat_offset(dom, &root, &range.start);
    let end = flat_offset(dom, &root, &range.end);
    if end <= start {
        return String::new();
    }

    let mut out = String::new();
    let mut position = 0;
    let mut nodes = text_nodes(dom, &root);
    if dom.is_text(&root) {
        nodes = vec![root.clone()];
    }
    for node in nodes {
        let text = dom.text(&node);
        let len = dom.measure(&text);
        let (from, to) = (start.max(position), end.min(position + len));
        if from < to {
            out.push_str(&slice_units(dom, &text, from - position, to - position));
        }
        position += len;
        if position >= end {
            break;
        }
    }
    out
}

/// Offset of a point counted over every text node under `root`.
fn flat_offset<D: DomTree>(dom: &D, root: &D::Node, point: &DomPoint<D::Node>) -> usize {
    let before = |target: &D::Node| -> usize {
        let mut total = 0;
        for n in text_nodes(dom, root) {
            if &n == target || contains(dom, target, &n) {
                break;
            }
            total += dom.text_len(&n);
        }
        total
    };

    if dom.is_text(&point.node) {
        if &point.node == root {
            return point.offset;
        }
        return before(&point.node) + point.offset;
    }
    let children = dom.children(&point.node);
    match children.get(point.offset) {
        Some(child) => {
            if &point.node == root && point.offset == 0 {
                0
            } else {
                before(child)
            }
        }
        None if &point.node == root => dom.text_len(root),
        None => before(&point.node) + dom.text_len(&point.node),
    }
}

/// Substring of `text` between two offsets in the tree's unit.
fn slice_units<D: DomTree>(dom: &D, text: &str, from: usize, to: usize) -> String {
    let mut out = String::new();
    let mut position = 0;
    for c in text.chars() {
        if position >= to {
            break;
        }
        if position >= from {
            out.push(c);
        }
        position += dom.measure(c.encode_utf8(&mut [0; 4]));
    }
    out
}

/// Boundary resolved to "insert before `reference` in `parent`".
struct Boundary<N> {
    parent: N,
    reference: Option<N>,
}

/// Resolve a point to a sibling boundary, splitting a text node when the
/// point falls strictly inside it.
fn resolve_boundary<D: DomTree>(
    dom: &mut D,
    point: &DomPoint<D::Node>,
) -> Result<Boundary<D::Node>> {
    if !dom.is_text(&point.node) {
        let reference = dom.children(&point.node).get(point.offset).cloned();
        return Ok(Boundary {
            parent: point.node.clone(),
            reference,
        });
    }

    let parent = dom
        .parent(&point.node)
        .ok_or(crate::error::AnnotateError::PartialSelection)?;
    let len = dom.text_len(&point.node);
    if point.offset == 0 {
        return Ok(Boundary {
            parent,
            reference: Some(point.node.clone()),
        });
    }
    if point.offset >= len {
        return Ok(Boundary {
            reference: next_sibling(dom, &point.node),
            parent,
        });
    }
    let tail = dom.split_text(&point.node, point.offset)?;
    Ok(Boundary {
        parent,
        reference: Some(tail),
    })
}

/// Move the contents of `range` into `wrapper` and put `wrapper` in their
/// place, like `Range.surroundContents`.
///
/// Fails with `PartialSelection` when the two boundaries do not share a
/// parent after text splitting; the tree may then hold split text nodes but
/// its text is unchanged.
pub fn wrap_range<D: DomTree>(
    dom: &mut D,
    range: &DomRange<D::Node>,
    wrapper: &D::Node,
) -> Result<()> {
    // End first so that splitting the start node cannot shift it.
    let end = resolve_boundary(dom, &range.end)?;
    let start = resolve_boundary(dom, &range.start)?;
    if start.parent != end.parent {
        return Err(crate::error::AnnotateError::PartialSelection);
    }

    let mut covered = Vec::new();
    let mut current = start.reference.clone();
    while let Some(node) = current {
        if Some(&node) == end.reference.as_ref() {
            break;
        }
        current = next_sibling(dom, &node);
        covered.push(node);
    }

    dom.insert_before(&start.parent, wrapper, start.reference.as_ref())?;
    for node in &covered {
        dom.insert_before(wrapper, node, None)?;
    }
    Ok(())
}

/// Move an element's children in front of it, remove the element and merge
/// the text it leaves behind.
pub fn unwrap<D: DomTree>(dom: &mut D, element: &D::Node) -> Result<()> {
    let Some(parent) = dom.parent(element) else {
        return Ok(());
    };
    for child in dom.children(element) {
        dom.insert_before(&parent, &child, Some(element))?;
    }
    dom.remove(element)?;
    dom.normalize(&parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDom;

    fn fixture(markup: &str) -> MemoryDom {
        MemoryDom::from_markup(markup).unwrap()
    }

    #[test]
    fn test_wrap_inside_single_text_node() {
        let mut dom = fixture(r#"<div><p>The quick brown fox</p></div>"#);
        let p = query_all(&dom, &dom.root(), |n| dom.tag_name(n).as_deref() == Some("p"))[0];
        let text = dom.children(&p)[0];
        let span = dom.create_element("span").unwrap();

        let range = DomRange::new(DomPoint::new(text, 4), DomPoint::new(text, 9));
        wrap_range(&mut dom, &range, &span).unwrap();

        insta::assert_snapshot!(
            dom.to_html(&dom.root()),
            @"<div><p>The <span>quick</span> brown fox</p></div>"
        );
    }

    #[test]
    fn test_wrap_across_siblings() {
        let mut dom = fixture(r#"<p>ab<hi>cd</hi>ef</p>"#);
        let p = dom.root();
        let children = dom.children(&p);
        let span = dom.create_element("span").unwrap();

        let range = DomRange::new(DomPoint::new(children[0], 1), DomPoint::new(children[2], 1));
        wrap_range(&mut dom, &range, &span).unwrap();

        insta::assert_snapshot!(dom.to_html(&p), @"<p>a<span>b<hi>cd</hi>e</span>f</p>");
    }

    #[test]
    fn test_wrap_rejects_partial_markup() {
        let mut dom = fixture(r#"<p>ab<hi>cd</hi>ef</p>"#);
        let p = dom.root();
        let children = dom.children(&p);
        let inner = dom.children(&children[1])[0];
        let span = dom.create_element("span").unwrap();

        let range = DomRange::new(DomPoint::new(children[0], 1), DomPoint::new(inner, 1));
        let err = wrap_range(&mut dom, &range, &span).unwrap_err();
        assert!(matches!(err, crate::AnnotateError::PartialSelection));
        assert_eq!(dom.text(&p), "abcdef");
    }

    #[test]
    fn test_unwrap_restores_children_in_place() {
        let mut dom = fixture(r#"<p>a<span class="annotation">b<i>c</i></span>d</p>"#);
        let p = dom.root();
        let span = dom.children(&p)[1];
        unwrap(&mut dom, &span).unwrap();
        insta::assert_snapshot!(dom.to_html(&p), @"<p>ab<i>c</i>d</p>");
        assert_eq!(dom.children(&p).len(), 3);
    }

    #[test]
    fn test_range_text_spans_markup() {
        let dom = fixture(r#"<p>ab<hi>cd</hi>ef</p>"#);
        let p = dom.root();
        let children = dom.children(&p);
        let range = DomRange::new(DomPoint::new(children[0], 1), DomPoint::new(p, 2));
        assert_eq!(range_text(&dom, &range), "bcd");

        let same = DomRange::new(DomPoint::new(children[2], 0), DomPoint::new(children[2], 2));
        assert_eq!(range_text(&dom, &same), "ef");
    }

    #[test]
    fn test_common_ancestor_and_closest() {
        let dom = fixture(r#"<div><p data-tei="p1">a<b>c</b></p><p>d</p></div>"#);
        let root = dom.root();
        let p1 = find_by_attribute(&dom, &root, "data-tei", "p1").unwrap();
        let b_text = dom.children(&dom.children(&p1)[1])[0];
        let d_text = text_nodes(&dom, &root)[2];

        assert_eq!(common_ancestor(&dom, &b_text, &d_text), Some(root));
        assert_eq!(
            closest(&dom, &b_text, |n| dom.attribute(n, "data-tei").is_some()),
            Some(p1)
        );
        assert!(contains(&dom, &p1, &b_text));
        assert!(!contains(&dom, &p1, &d_text));
    }
}
