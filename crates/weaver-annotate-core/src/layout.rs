//! Geometry of rendered nodes.
//!
//! Marker bars, popups and the search highlight are positioned from client
//! rectangles. [`LayoutPlatform`] abstracts where those come from: the browser
//! measures the live layout, [`GridLayout`] lays text out on a fixed grid.

use serde::{Deserialize, Serialize};

use crate::dom::{DomPoint, DomRange, DomTree, contains, text_nodes};

/// Axis-aligned rectangle in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 && self.height <= 0.0
    }

    /// Smallest rectangle containing both. Empty rectangles are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }
}

/// Source of layout geometry for a [`DomTree`].
pub trait LayoutPlatform<D: DomTree> {
    /// One rectangle per line box the node occupies.
    fn client_rects(&self, dom: &D, node: &D::Node) -> Vec<Rect>;

    fn bounding_rect(&self, dom: &D, node: &D::Node) -> Rect;

    fn range_rect(&self, dom: &D, range: &DomRange<D::Node>) -> Rect;

    /// Bring a node into view. Headless layouts have nothing to scroll.
    fn scroll_into_view(&self, _dom: &D, _node: &D::Node) {}
}

/// Monospace layout: text flows through `columns` cells per line, every cell
/// `char_width` wide and every line `line_height` tall. Markup takes no
/// space; subtrees carrying a `hidden` attribute are not laid out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    pub columns: usize,
    pub char_width: f64,
    pub line_height: f64,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            columns: 80,
            char_width: 8.0,
            line_height: 16.0,
        }
    }
}

impl GridLayout {
    pub fn new(columns: usize, char_width: f64, line_height: f64) -> Self {
        Self {
            columns: columns.max(1),
            char_width,
            line_height,
        }
    }

    fn top<D: DomTree>(dom: &D, node: &D::Node) -> D::Node {
        let mut current = node.clone();
        while let Some(parent) = dom.parent(&current) {
            current = parent;
        }
        current
    }

    fn is_hidden<D: DomTree>(dom: &D, node: &D::Node) -> bool {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if dom.is_element(&n) && dom.attribute(&n, "hidden").is_some() {
                return true;
            }
            current = dom.parent(&n);
        }
        false
    }

    /// Laid-out text nodes of the whole tree, with their start cell.
    fn cells<D: DomTree>(dom: &D, node: &D::Node) -> Vec<(D::Node, usize, usize)> {
        let top = Self::top(dom, node);
        let mut position = 0;
        let mut out = Vec::new();
        for text in text_nodes(dom, &top) {
            if Self::is_hidden(dom, &text) {
                continue;
            }
            let len = dom.text_len(&text);
            out.push((text, position, len));
            position += len;
        }
        out
    }

    /// First and one-past-last cell of a node's text.
    fn extent<D: DomTree>(dom: &D, node: &D::Node) -> Option<(usize, usize)> {
        let mut extent: Option<(usize, usize)> = None;
        for (text, start, len) in Self::cells(dom, node) {
            if contains(dom, node, &text) {
                let first = extent.map_or(start, |(s, _)| s);
                extent = Some((first, start + len));
            }
        }
        extent
    }

    /// Cell index of a boundary point.
    fn cell_of<D: DomTree>(dom: &D, point: &DomPoint<D::Node>) -> usize {
        let cells = Self::cells(dom, &point.node);
        let before = |target: &D::Node| -> usize {
            cells
                .iter()
                .find(|(text, _, _)| text == target || contains(dom, target, text))
                .map(|(_, start, _)| *start)
                .unwrap_or_else(|| Self::cells_end_before(dom, &cells, target))
        };

        if dom.is_text(&point.node) {
            return before(&point.node) + point.offset.min(dom.text_len(&point.node));
        }
        match dom.children(&point.node).get(point.offset) {
            Some(child) => before(child),
            None => Self::extent(dom, &point.node)
                .map(|(_, end)| end)
                .unwrap_or_else(|| before(&point.node)),
        }
    }

    /// End of the last laid-out text preceding `target` when `target` itself
    /// holds no laid-out text.
    fn cells_end_before<D: DomTree>(
        dom: &D,
        cells: &[(D::Node, usize, usize)],
        target: &D::Node,
    ) -> usize {
        let top = Self::top(dom, target);
        let mut end = 0;
        let mut current = crate::dom::next_in_order(dom, &top, &top);
        while let Some(n) = current {
            if &n == target {
                break;
            }
            if let Some((_, start, len)) = cells.iter().find(|(t, _, _)| t == &n) {
                end = start + len;
            }
            current = crate::dom::next_in_order(dom, &top, &n);
        }
        end
    }

    /// Rectangles covering cells `start..end`, one per line.
    fn segments(&self, start: usize, end: usize) -> Vec<Rect> {
        let columns = self.columns.max(1);
        let mut out = Vec::new();
        let mut i = start;
        while i < end {
            let row = i / columns;
            let row_end = ((row + 1) * columns).min(end);
            let column = i % columns;
            out.push(Rect::new(
                column as f64 * self.char_width,
                row as f64 * self.line_height,
                (row_end - i) as f64 * self.char_width,
                self.line_height,
            ));
            i = row_end;
        }
        out
    }

    fn union_all(rects: &[Rect]) -> Rect {
        rects.iter().fold(Rect::default(), |acc, r| acc.union(r))
    }
}

impl<D: DomTree> LayoutPlatform<D> for GridLayout {
    fn client_rects(&self, dom: &D, node: &D::Node) -> Vec<Rect> {
        match Self::extent(dom, node) {
            Some((start, end)) => self.segments(start, end),
            None => Vec::new(),
        }
    }

    fn bounding_rect(&self, dom: &D, node: &D::Node) -> Rect {
        if dom.parent(node).is_none() {
            let total: usize = Self::cells(dom, node).iter().map(|(_, _, len)| len).sum();
            let lines = total.div_ceil(self.columns.max(1)).max(1);
            return Rect::new(
                0.0,
                0.0,
                self.columns as f64 * self.char_width,
                lines as f64 * self.line_height,
            );
        }
        Self::union_all(&self.client_rects(dom, node))
    }

    fn range_rect(&self, dom: &D, range: &DomRange<D::Node>) -> Rect {
        let start = Self::cell_of(dom, &range.start);
        let end = Self::cell_of(dom, &range.end);
        Self::union_all(&self.segments(start, end))
    }
}
