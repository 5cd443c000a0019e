//! Mapping between DOM positions and logical container offsets.
//!
//! A logical offset counts the text of a container, ignoring markup and any
//! node matched by the [`SkipRule`]. DOM positions are volatile: rendering an
//! annotation splits text nodes and wraps ranges, so a DOM position is only
//! valid until the next mutation. Logical positions survive re-rendering.
//!
//! Skipped text never counts in either direction, which keeps offsets the
//! same whether or not footnote markers are rendered.

use std::sync::LazyLock;

use regex::Regex;
use smol_str::SmolStr;

use crate::config::AnnotatorConfig;
use crate::dom::{
    DomPoint, DomRange, DomTree, closest, common_ancestor, contains, point_after, point_before,
    text_nodes,
};
use crate::error::{AnnotateError, Result};
use crate::types::LogicalPosition;

static FOOTNOTE_HREF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#fn_.*$").unwrap());

/// Which end of a range a point is.
///
/// An element boundary point used as a range end is pulled back by one, so
/// that it addresses the last character inside the range rather than the
/// first one after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryPolicy {
    Start,
    End,
}

/// Predicate excluding nodes from offset counting.
///
/// A text node is skipped when its parent element has an `href` matching the
/// pattern; an element is skipped when its own `href` matches.
#[derive(Clone, Debug)]
pub struct SkipRule {
    href: Regex,
}

impl SkipRule {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            href: Regex::new(pattern)?,
        })
    }

    pub fn is_skipped<D: DomTree>(&self, dom: &D, node: &D::Node) -> bool {
        let element = if dom.is_text(node) {
            match dom.parent(node) {
                Some(parent) => parent,
                None => return false,
            }
        } else {
            node.clone()
        };
        dom.attribute(&element, "href")
            .is_some_and(|href| self.href.is_match(&href))
    }
}

impl Default for SkipRule {
    fn default() -> Self {
        Self {
            href: FOOTNOTE_HREF.clone(),
        }
    }
}

/// Converts between [`DomPoint`]s and [`LogicalPosition`]s.
#[derive(Clone, Debug)]
pub struct OffsetMapper {
    container_attribute: SmolStr,
    skip: SkipRule,
}

impl Default for OffsetMapper {
    fn default() -> Self {
        Self {
            container_attribute: SmolStr::new_static("data-tei"),
            skip: SkipRule::default(),
        }
    }
}

impl OffsetMapper {
    pub fn new(container_attribute: impl Into<SmolStr>, skip: SkipRule) -> Self {
        Self {
            container_attribute: container_attribute.into(),
            skip,
        }
    }

    pub fn from_config(config: &AnnotatorConfig) -> Result<Self> {
        Ok(Self::new(
            config.container_attribute.clone(),
            SkipRule::new(&config.skip_href_pattern)?,
        ))
    }

    pub fn container_attribute(&self) -> &str {
        &self.container_attribute
    }

    pub fn skip_rule(&self) -> &SkipRule {
        &self.skip
    }

    /// Nearest container at or above `node`.
    pub fn container_of<D: DomTree>(&self, dom: &D, node: &D::Node) -> Option<D::Node> {
        closest(dom, node, |n| {
            dom.attribute(n, &self.container_attribute).is_some()
        })
    }

    /// Container id carried by an element.
    pub fn container_id<D: DomTree>(&self, dom: &D, container: &D::Node) -> Option<SmolStr> {
        dom.attribute(container, &self.container_attribute)
            .map(SmolStr::from)
    }

    /// Counted text length of a subtree.
    pub fn counted_len<D: DomTree>(&self, dom: &D, node: &D::Node) -> usize {
        if dom.is_text(node) {
            return if self.skip.is_skipped(dom, node) {
                0
            } else {
                dom.text_len(node)
            };
        }
        text_nodes(dom, node)
            .iter()
            .filter(|n| !self.skip.is_skipped(dom, n))
            .map(|n| dom.text_len(n))
            .sum()
    }

    /// Counted text inside `container` that precedes `target` in document
    /// order.
    fn counted_before<D: DomTree>(&self, dom: &D, container: &D::Node, target: &D::Node) -> usize {
        let mut total = 0;
        for n in text_nodes(dom, container) {
            if &n == target || contains(dom, target, &n) {
                break;
            }
            if !self.skip.is_skipped(dom, &n) {
                total += dom.text_len(&n);
            }
        }
        total
    }

    /// Convert a DOM point into a logical position in its nearest container.
    pub fn to_logical<D: DomTree>(
        &self,
        dom: &D,
        point: &DomPoint<D::Node>,
        policy: BoundaryPolicy,
    ) -> Result<LogicalPosition> {
        let container = self
            .container_of(dom, &point.node)
            .ok_or(AnnotateError::NotInContainer)?;
        let id = self
            .container_id(dom, &container)
            .ok_or(AnnotateError::NotInContainer)?;

        if dom.is_text(&point.node) {
            let before = self.counted_before(dom, &container, &point.node);
            let inner = if self.skip.is_skipped(dom, &point.node) {
                0
            } else {
                point.offset.min(dom.text_len(&point.node))
            };
            tracing::trace!(target: "weaver::annotate", container = %id, before, inner, "text point to logical");
            return Ok(LogicalPosition::new(id, before + inner));
        }

        if point.node == container && point.offset == 0 {
            return Ok(LogicalPosition::new(id, 0));
        }

        let children = dom.children(&point.node);
        let raw = match children.get(point.offset) {
            Some(child) => self.counted_before(dom, &container, child),
            None => {
                self.counted_before(dom, &container, &point.node)
                    + self.counted_len(dom, &point.node)
            }
        };
        let offset = match policy {
            BoundaryPolicy::End if point.offset > 0 => raw.saturating_sub(1),
            _ => raw,
        };
        tracing::trace!(target: "weaver::annotate", container = %id, raw, offset, ?policy, "element point to logical");
        Ok(LogicalPosition::new(id, offset))
    }

    /// Convert a logical offset into a point on a text node of `container`.
    ///
    /// An offset at the end of a text node stays in that node. Returns `None`
    /// when the offset exceeds the counted text.
    pub fn to_dom<D: DomTree>(
        &self,
        dom: &D,
        container: &D::Node,
        offset: usize,
    ) -> Option<DomPoint<D::Node>> {
        let mut remaining = offset;
        for node in text_nodes(dom, container) {
            if self.skip.is_skipped(dom, &node) {
                continue;
            }
            let len = dom.text_len(&node);
            if remaining <= len {
                return Some(DomPoint::new(node, remaining));
            }
            remaining -= len;
        }
        None
    }
}

/// The child of `ancestor` that contains `node`.
pub fn extend_to_child<D: DomTree>(dom: &D, node: &D::Node, ancestor: &D::Node) -> Option<D::Node> {
    let mut current = node.clone();
    loop {
        let parent = dom.parent(&current)?;
        if &parent == ancestor {
            return Some(current);
        }
        current = parent;
    }
}

/// Widen a range so that both ends sit directly in the common ancestor.
///
/// A boundary whose container is nested deeper than a child of the common
/// ancestor is moved outside that child. Returns the range and whether it
/// changed.
pub fn normalize_to_ancestor<D: DomTree>(
    dom: &D,
    range: &DomRange<D::Node>,
) -> (DomRange<D::Node>, bool) {
    let Some(ancestor) = common_ancestor(dom, &range.start.node, &range.end.node) else {
        return (range.clone(), false);
    };
    if !dom.is_element(&ancestor) {
        return (range.clone(), false);
    }

    let mut adjusted = range.clone();
    let mut changed = false;
    if let Some(start) = widen(dom, &range.start, &ancestor, true) {
        adjusted.start = start;
        changed = true;
    }
    if let Some(end) = widen(dom, &range.end, &ancestor, false) {
        adjusted.end = end;
        changed = true;
    }
    (adjusted, changed)
}

/// Point before (or after) the child of `ancestor` holding `point`, when the
/// point's node is not itself a child of `ancestor`.
fn widen<D: DomTree>(
    dom: &D,
    point: &DomPoint<D::Node>,
    ancestor: &D::Node,
    before: bool,
) -> Option<DomPoint<D::Node>> {
    if &point.node == ancestor || dom.parent(&point.node).as_ref() == Some(ancestor) {
        return None;
    }
    let child = extend_to_child(dom, &point.node, ancestor)?;
    if before {
        point_before(dom, &child)
    } else {
        point_after(dom, &child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::find_by_attribute;
    use crate::memory::{MemoryDom, NodeHandle};

    fn fixture(markup: &str) -> MemoryDom {
        MemoryDom::from_markup(markup).unwrap()
    }

    #[test]
    fn test_plain_text_round_trip() {
        let dom = fixture(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#);
        let mapper = OffsetMapper::default();
        let p = find_by_attribute(&dom, &dom.root(), "data-tei", "p1").unwrap();
        let len = mapper.counted_len(&dom, &p);

        for start in 0..=len {
            for end in start..=len {
                let s = mapper.to_dom(&dom, &p, start).unwrap();
                let e = mapper.to_dom(&dom, &p, end).unwrap();
                let s = mapper.to_logical(&dom, &s, BoundaryPolicy::Start).unwrap();
                let e = mapper.to_logical(&dom, &e, BoundaryPolicy::End).unwrap();
                assert_eq!((s.offset, e.offset), (start, end));
                assert_eq!(s.container, "p1");
            }
        }
        assert!(mapper.to_dom(&dom, &p, len + 1).is_none());
    }

    #[test]
    fn test_round_trip_across_markup() {
        let dom = fixture(r#"<p data-tei="p1">ab<hi>cd<b>e</b></hi>fg</p>"#);
        let mapper = OffsetMapper::default();
        let p = dom.root();
        for offset in 0..=7 {
            let point = mapper.to_dom(&dom, &p, offset).unwrap();
            let back = mapper.to_logical(&dom, &point, BoundaryPolicy::Start).unwrap();
            assert_eq!(back.offset, offset);
        }
    }

    #[test]
    fn test_skipped_marker_does_not_shift_offsets() {
        let plain = fixture(r#"<p data-tei="p1">Hello world</p>"#);
        let marked = fixture(r##"<p data-tei="p1">Hello<a href="#fn_3">3</a> world</p>"##);
        let mapper = OffsetMapper::default();

        assert_eq!(
            mapper.counted_len(&plain, &plain.root()),
            mapper.counted_len(&marked, &marked.root())
        );

        let world = dom_text_node(&marked, " world");
        let logical = mapper
            .to_logical(&marked, &DomPoint::new(world, 1), BoundaryPolicy::Start)
            .unwrap();
        assert_eq!(logical.offset, 6);

        for offset in 0..=11 {
            let a = mapper.to_dom(&plain, &plain.root(), offset).unwrap();
            let b = mapper.to_dom(&marked, &marked.root(), offset).unwrap();
            assert!(!mapper.skip_rule().is_skipped(&marked, &b.node));
            let a = mapper.to_logical(&plain, &a, BoundaryPolicy::Start).unwrap();
            let b = mapper.to_logical(&marked, &b, BoundaryPolicy::Start).unwrap();
            assert_eq!(a.offset, b.offset);
        }
    }

    fn dom_text_node(dom: &MemoryDom, text: &str) -> NodeHandle {
        text_nodes(dom, &dom.root())
            .into_iter()
            .find(|n| dom.text(n) == text)
            .unwrap()
    }

    #[test]
    fn test_element_points() {
        let dom = fixture(r#"<div><p data-tei="p1">ab<hi>cd</hi>ef</p></div>"#);
        let mapper = OffsetMapper::default();
        let p = find_by_attribute(&dom, &dom.root(), "data-tei", "p1").unwrap();
        let hi = dom.children(&p)[1];

        let at = |node: NodeHandle, offset: usize, policy: BoundaryPolicy| {
            mapper
                .to_logical(&dom, &DomPoint::new(node, offset), policy)
                .unwrap()
                .offset
        };
        assert_eq!(at(p, 0, BoundaryPolicy::End), 0);
        assert_eq!(at(p, 2, BoundaryPolicy::Start), 4);
        assert_eq!(at(p, 2, BoundaryPolicy::End), 3);
        assert_eq!(at(p, 3, BoundaryPolicy::Start), 6);
        // Past the last child of a nested element: end of that element.
        assert_eq!(at(hi, 1, BoundaryPolicy::Start), 4);
        assert_eq!(at(hi, 0, BoundaryPolicy::Start), 2);
    }

    #[test]
    fn test_point_outside_container() {
        let dom = fixture(r#"<div>loose<p data-tei="p1">x</p></div>"#);
        let mapper = OffsetMapper::default();
        let loose = dom.children(&dom.root())[0];
        let err = mapper
            .to_logical(&dom, &DomPoint::new(loose, 1), BoundaryPolicy::Start)
            .unwrap_err();
        assert!(matches!(err, AnnotateError::NotInContainer));
    }

    #[test]
    fn test_custom_skip_rule() {
        let dom = fixture(r##"<p data-tei="p1">a<a href="#note-1">*</a>b</p>"##);
        let default = OffsetMapper::default();
        let custom = OffsetMapper::new("data-tei", SkipRule::new("^#note-").unwrap());
        assert_eq!(default.counted_len(&dom, &dom.root()), 3);
        assert_eq!(custom.counted_len(&dom, &dom.root()), 2);
    }

    #[test]
    fn test_normalize_to_ancestor() {
        let dom = fixture(r#"<p data-tei="p1">ab<hi>cd</hi>ef<i>gh</i></p>"#);
        let p = dom.root();
        let children = dom.children(&p);
        let cd = dom.children(&children[1])[0];
        let gh = dom.children(&children[3])[0];

        let range = DomRange::new(DomPoint::new(cd, 1), DomPoint::new(gh, 1));
        let (adjusted, changed) = normalize_to_ancestor(&dom, &range);
        assert!(changed);
        assert_eq!(adjusted.start, DomPoint::new(p, 1));
        assert_eq!(adjusted.end, DomPoint::new(p, 4));

        let flat = DomRange::new(DomPoint::new(children[0], 1), DomPoint::new(children[2], 1));
        let (same, changed) = normalize_to_ancestor(&dom, &flat);
        assert!(!changed);
        assert_eq!(same, flat);

        let inside = DomRange::new(DomPoint::new(cd, 0), DomPoint::new(cd, 2));
        assert!(!normalize_to_ancestor(&dom, &inside).1);
    }

    #[test]
    fn test_extend_to_child() {
        let dom = fixture(r#"<div><p><b><i>x</i></b></p></div>"#);
        let root = dom.root();
        let p = dom.children(&root)[0];
        let x = text_nodes(&dom, &root)[0];
        assert_eq!(extend_to_child(&dom, &x, &root), Some(p));
        assert_eq!(extend_to_child(&dom, &p, &x), None);
    }
}
