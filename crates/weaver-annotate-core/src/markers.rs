//! Marker bars and annotation popups.
//!
//! Every rendered annotation span gets a thin bar under each of its line
//! boxes. Nested spans push their bars down by a fixed step per nesting
//! level so that overlapping annotations stay distinguishable.

use crate::config::AnnotatorConfig;
use crate::dom::{DomTree, ancestors, contains, query_all};
use crate::error::Result;
use crate::layout::{LayoutPlatform, Rect};

pub const ANNOTATION_CLASS: &str = "annotation";
pub const MARKER_CLASS: &str = "marker";
pub const POPUP_CLASS: &str = "annotation-popup";

/// Geometry of one marker bar, relative to the view root.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerBar {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub margin_top: f64,
    /// The span's `annotation-*` classes, also used for the colour variable.
    pub class: String,
}

impl MarkerBar {
    pub fn style(&self) -> String {
        format!(
            "position:absolute;left:{}px;top:{}px;margin-top:{}px;width:{}px;height:{}px;background-color:var(--pb-{})",
            self.left, self.top, self.margin_top, self.width, self.height, self.class
        )
    }
}

/// Annotation spans under `root` in reverse document order.
pub fn annotation_spans<D: DomTree>(dom: &D, root: &D::Node) -> Vec<D::Node> {
    let mut spans = query_all(dom, root, |n| dom.has_class(n, ANNOTATION_CLASS));
    spans.reverse();
    spans
}

/// Number of annotation spans enclosing `span`.
pub fn nesting_depth<D: DomTree>(dom: &D, span: &D::Node) -> usize {
    ancestors(dom, span)
        .iter()
        .filter(|n| dom.has_class(n, ANNOTATION_CLASS))
        .count()
}

fn type_classes<D: DomTree>(dom: &D, span: &D::Node) -> String {
    dom.attribute(span, "class")
        .map(|classes| {
            classes
                .split_whitespace()
                .filter(|c| c.starts_with("annotation-"))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Bars for a single span.
pub fn bars_for_span<D, L>(
    dom: &D,
    layout: &L,
    root_rect: &Rect,
    span: &D::Node,
    config: &AnnotatorConfig,
) -> Vec<MarkerBar>
where
    D: DomTree,
    L: LayoutPlatform<D>,
{
    let margin_top = nesting_depth(dom, span) as f64 * config.marker_margin_step;
    let class = type_classes(dom, span);
    layout
        .client_rects(dom, span)
        .into_iter()
        .map(|rect| MarkerBar {
            left: rect.x - root_rect.x,
            top: rect.y - root_rect.y + rect.height,
            width: rect.width,
            height: config.marker_height,
            margin_top,
            class: class.clone(),
        })
        .collect()
}

/// Bars for every span under `root`.
pub fn marker_bars<D, L>(
    dom: &D,
    layout: &L,
    root: &D::Node,
    config: &AnnotatorConfig,
) -> Vec<MarkerBar>
where
    D: DomTree,
    L: LayoutPlatform<D>,
{
    let root_rect = layout.bounding_rect(dom, root);
    annotation_spans(dom, root)
        .iter()
        .flat_map(|span| bars_for_span(dom, layout, &root_rect, span, config))
        .collect()
}

/// Remove every rendered marker bar under `root`.
pub fn clear_marker_bars<D: DomTree>(dom: &mut D, root: &D::Node) -> Result<()> {
    for marker in query_all(dom, root, |n| dom.has_class(n, MARKER_CLASS)) {
        dom.remove(&marker)?;
    }
    Ok(())
}

/// Append one bar element to `root`.
pub fn render_bar<D: DomTree>(dom: &mut D, root: &D::Node, bar: &MarkerBar) -> Result<D::Node> {
    let div = dom.create_element("div")?;
    let class = if bar.class.is_empty() {
        MARKER_CLASS.to_string()
    } else {
        format!("{MARKER_CLASS} {}", bar.class)
    };
    dom.set_attribute(&div, "class", &class)?;
    dom.set_attribute(&div, "part", "annotation")?;
    dom.set_attribute(&div, "style", &bar.style())?;
    dom.insert_before(root, &div, None)?;
    Ok(div)
}

/// Actions offered by a popup toolbar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopupAction {
    Edit,
    Delete,
}

impl PopupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopupAction::Edit => "edit",
            PopupAction::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "edit" => Some(PopupAction::Edit),
            "delete" => Some(PopupAction::Delete),
            _ => None,
        }
    }
}

/// Interactive popup attached to one annotation span.
#[derive(Clone, Debug, PartialEq)]
pub struct Popup<N> {
    pub target: N,
    pub wrapper: N,
    /// Filled by the host in response to a detail request.
    pub info: N,
    pub type_indicator: N,
    pub edit: Option<N>,
    pub delete: N,
}

fn element<D: DomTree>(dom: &mut D, tag: &str, class: &str) -> Result<D::Node> {
    let el = dom.create_element(tag)?;
    dom.set_attribute(&el, "class", class)?;
    Ok(el)
}

fn button<D: DomTree>(dom: &mut D, action: PopupAction) -> Result<D::Node> {
    let button = dom.create_element("button")?;
    dom.set_attribute(&button, "type", "button")?;
    dom.set_attribute(&button, "data-action", action.as_str())?;
    dom.set_attribute(&button, "title", action.as_str())?;
    Ok(button)
}

/// Build the popup for `span` and append it, hidden, to `root`.
///
/// The edit button is only offered when the span carries annotation data.
pub fn build_popup<D: DomTree>(dom: &mut D, root: &D::Node, span: &D::Node) -> Result<Popup<D::Node>> {
    let wrapper = element(dom, "div", POPUP_CLASS)?;
    dom.set_attribute(&wrapper, "hidden", "")?;
    let info = element(dom, "div", "info")?;
    dom.insert_before(&wrapper, &info, None)?;

    let toolbar = element(dom, "div", "toolbar")?;
    let type_indicator = element(dom, "span", "annotation-type")?;
    dom.insert_before(&toolbar, &type_indicator, None)?;
    let edit = if dom.attribute(span, "data-annotation").is_some() {
        let edit = button(dom, PopupAction::Edit)?;
        dom.insert_before(&toolbar, &edit, None)?;
        Some(edit)
    } else {
        None
    };
    let delete = button(dom, PopupAction::Delete)?;
    dom.insert_before(&toolbar, &delete, None)?;
    dom.insert_before(&wrapper, &toolbar, None)?;
    dom.insert_before(root, &wrapper, None)?;

    Ok(Popup {
        target: span.clone(),
        wrapper,
        info,
        type_indicator,
        edit,
        delete,
    })
}

/// Whether a node lies inside a popup.
pub fn in_popup<D: DomTree>(dom: &D, node: &D::Node) -> bool {
    crate::dom::closest(dom, node, |n| dom.has_class(n, POPUP_CLASS)).is_some()
}

/// Whether the popup's target is still rendered under `root`.
pub fn is_attached<D: DomTree>(dom: &D, root: &D::Node, popup: &Popup<D::Node>) -> bool {
    contains(dom, root, &popup.target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::GridLayout;
    use crate::memory::MemoryDom;

    const NESTED: &str = r#"<div id="view"><p data-tei="p1"><span class="annotation annotation-place place">The <span class="annotation annotation-person person">quick</span></span> brown fox</p></div>"#;

    #[test]
    fn test_nested_spans_get_distinct_offsets() {
        let dom = MemoryDom::from_markup(NESTED).unwrap();
        let layout = GridLayout::new(80, 10.0, 20.0);
        let bars = marker_bars(&dom, &layout, &dom.root(), &AnnotatorConfig::default());

        assert_eq!(
            bars,
            vec![
                MarkerBar {
                    left: 40.0,
                    top: 20.0,
                    width: 50.0,
                    height: 3.0,
                    margin_top: 5.0,
                    class: "annotation-person".into(),
                },
                MarkerBar {
                    left: 0.0,
                    top: 20.0,
                    width: 90.0,
                    height: 3.0,
                    margin_top: 0.0,
                    class: "annotation-place".into(),
                },
            ]
        );
    }

    #[test]
    fn test_rendered_bars_replace_previous_ones() {
        let mut dom = MemoryDom::from_markup(NESTED).unwrap();
        let root = dom.root();
        let layout = GridLayout::new(80, 10.0, 20.0);
        let config = AnnotatorConfig::default();

        for _ in 0..2 {
            clear_marker_bars(&mut dom, &root).unwrap();
            for bar in marker_bars(&dom, &layout, &root, &config) {
                render_bar(&mut dom, &root, &bar).unwrap();
            }
        }
        let markers = query_all(&dom, &root, |n| dom.has_class(n, MARKER_CLASS));
        assert_eq!(markers.len(), 2);
        insta::assert_snapshot!(
            dom.to_html(&markers[0]),
            @r#"<div class="marker annotation-person" part="annotation" style="position:absolute;left:40px;top:20px;margin-top:5px;width:50px;height:3px;background-color:var(--pb-annotation-person)"></div>"#
        );
    }

    #[test]
    fn test_popup_structure() {
        let mut dom = MemoryDom::from_markup(
            r#"<div><span class="annotation" data-annotation="{}">a</span><span class="annotation">b</span></div>"#,
        )
        .unwrap();
        let root = dom.root();
        let spans = dom.children(&root);

        let with_data = build_popup(&mut dom, &root, &spans[0]).unwrap();
        let without = build_popup(&mut dom, &root, &spans[1]).unwrap();
        assert!(with_data.edit.is_some());
        assert!(without.edit.is_none());
        assert!(in_popup(&dom, &with_data.delete));
        assert!(!in_popup(&dom, &spans[0]));

        insta::assert_snapshot!(
            dom.to_html(&with_data.wrapper),
            @r#"<div class="annotation-popup" hidden=""><div class="info"></div><div class="toolbar"><span class="annotation-type"></span><button type="button" data-action="edit" title="edit"></button><button type="button" data-action="delete" title="delete"></button></div></div>"#
        );
    }
}
