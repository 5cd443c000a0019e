//! Geometry from the browser's layout engine.

use wasm_bindgen::JsCast;
use web_sys::{DomRect, DomRectList, Element, Node};

use weaver_annotate_core::{DomRange, LayoutPlatform, Rect};

use crate::dom::BrowserDom;

/// `LayoutPlatform` backed by client rects.
///
/// Elements are measured directly; text nodes through a range selecting
/// their contents. Anything else (documents, shadow roots) has no box.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserLayout;

fn to_rect(rect: &DomRect) -> Rect {
    Rect::new(rect.x(), rect.y(), rect.width(), rect.height())
}

fn to_rects(list: &DomRectList) -> Vec<Rect> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .map(|r| to_rect(&r))
        .collect()
}

fn contents_range(dom: &BrowserDom, node: &Node) -> Option<web_sys::Range> {
    let range = dom.document().create_range().ok()?;
    range.select_node_contents(node).ok()?;
    Some(range)
}

impl LayoutPlatform<BrowserDom> for BrowserLayout {
    fn client_rects(&self, dom: &BrowserDom, node: &Node) -> Vec<Rect> {
        if let Some(el) = node.dyn_ref::<Element>() {
            return to_rects(&el.get_client_rects());
        }
        contents_range(dom, node)
            .and_then(|range| range.get_client_rects())
            .map(|list| to_rects(&list))
            .unwrap_or_default()
    }

    fn bounding_rect(&self, dom: &BrowserDom, node: &Node) -> Rect {
        if let Some(el) = node.dyn_ref::<Element>() {
            return to_rect(&el.get_bounding_client_rect());
        }
        if node.node_type() != Node::TEXT_NODE {
            return Rect::default();
        }
        contents_range(dom, node)
            .map(|range| to_rect(&range.get_bounding_client_rect()))
            .unwrap_or_default()
    }

    fn range_rect(&self, dom: &BrowserDom, range: &DomRange<Node>) -> Rect {
        match dom.to_range(range) {
            Ok(live) => to_rect(&live.get_bounding_client_rect()),
            Err(e) => {
                tracing::debug!(target: "weaver::annotate", error = %e, "range has no geometry");
                Rect::default()
            }
        }
    }

    fn scroll_into_view(&self, _dom: &BrowserDom, node: &Node) {
        if let Some(el) = node.dyn_ref::<Element>() {
            el.scroll_into_view_with_bool(true);
        }
    }
}
