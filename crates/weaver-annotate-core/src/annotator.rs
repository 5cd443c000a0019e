//! The annotation overlay.
//!
//! [`Annotator`] owns a view root inside a [`DomTree`] and keeps the
//! annotation list, the rendered marker spans and the marker bars in sync.
//! Every mutation of the list is followed by an
//! [`AnnotationEvent::AnnotationsChanged`] in the outbox.
//!
//! Rendering restructures the tree that offsets are measured against, so
//! records are always rendered one at a time, measure then mutate, never by
//! precomputing positions for a batch.

use crate::config::AnnotatorConfig;
use crate::dom::{
    DomPoint, DomRange, DomTree, child_index, closest, point_after, point_before, query_all,
    range_text, unwrap, wrap_range,
};
use crate::error::{AnnotateError, Result};
use crate::events::{AddAnnotation, AnnotationEvent, Command};
use crate::layout::{LayoutPlatform, Rect};
use crate::markers::{
    self, ANNOTATION_CLASS, MarkerBar, Popup, PopupAction, annotation_spans, build_popup,
    clear_marker_bars, in_popup, render_bar,
};
use crate::offset_map::{BoundaryPolicy, OffsetMapper, extend_to_child, normalize_to_ancestor};
use crate::search::{self, SearchMatch};
use crate::selection::SelectionNotice;
use crate::store::AnnotationStore;
use crate::types::{
    AnnotationData, AnnotationRange, AnnotationRecord, MarkerId, Properties, RecordId,
};

const MARKER_ATTRIBUTE: &str = "data-marker";
const DATA_ATTRIBUTE: &str = "data-annotation";
const HIGHLIGHT_PART: &str = "highlight";

/// Annotation overlay over one view root.
pub struct Annotator<D: DomTree, L> {
    dom: D,
    layout: L,
    root: D::Node,
    config: AnnotatorConfig,
    mapper: OffsetMapper,
    store: AnnotationStore,
    popups: Vec<Popup<D::Node>>,
    current_selection: Option<DomRange<D::Node>>,
    events: Vec<AnnotationEvent<D::Node>>,
}

impl<D, L> Annotator<D, L>
where
    D: DomTree,
    L: LayoutPlatform<D>,
{
    pub fn new(dom: D, layout: L, root: D::Node, config: AnnotatorConfig) -> Result<Self> {
        let mapper = OffsetMapper::from_config(&config)?;
        Ok(Self {
            dom,
            layout,
            root,
            config,
            mapper,
            store: AnnotationStore::new(),
            popups: Vec::new(),
            current_selection: None,
            events: Vec::new(),
        })
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    pub fn root(&self) -> &D::Node {
        &self.root
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn mapper(&self) -> &OffsetMapper {
        &self.mapper
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// The current annotation list.
    pub fn annotations(&self) -> impl Iterator<Item = &AnnotationRecord> {
        self.store.records()
    }

    pub fn to_list(&self) -> Vec<AnnotationRecord> {
        self.store.to_list()
    }

    pub fn current_selection(&self) -> Option<&DomRange<D::Node>> {
        self.current_selection.as_ref()
    }

    pub fn popups(&self) -> &[Popup<D::Node>] {
        &self.popups
    }

    /// Drain pending notifications.
    pub fn take_events(&mut self) -> Vec<AnnotationEvent<D::Node>> {
        std::mem::take(&mut self.events)
    }

    fn emit_changed(&mut self, kind: Option<String>, text: Option<String>) {
        self.events.push(AnnotationEvent::AnnotationsChanged {
            kind,
            text,
            ranges: self.store.to_list(),
        });
    }

    /// Record a settled selection from the tracker.
    ///
    /// A cleared selection is reported but the last non-empty range is kept,
    /// so an "add" triggered from outside the view still has a target.
    pub fn set_selection(&mut self, notice: SelectionNotice<D::Node>) {
        match notice {
            SelectionNotice::Changed { range, .. } => {
                self.current_selection = Some(range.clone());
                self.events.push(AnnotationEvent::SelectionChanged {
                    has_content: true,
                    range: Some(range),
                });
            }
            SelectionNotice::Cleared => {
                self.events.push(AnnotationEvent::SelectionChanged {
                    has_content: false,
                    range: None,
                });
            }
        }
    }

    /// Find the renderable element with container id `id`.
    ///
    /// Copies of a container inside popovers, popups or footnote bodies are
    /// never targets.
    pub fn find_container(&self, id: &str) -> Option<D::Node> {
        let attribute = self.mapper.container_attribute();
        let popover = self.config.popover_tag.as_str();
        query_all(&self.dom, &self.root, |n| {
            self.dom.attribute(n, attribute).as_deref() == Some(id)
        })
        .into_iter()
        .find(|n| {
            closest(&self.dom, n, |a| self.dom.tag_name(a).as_deref() == Some(popover)).is_none()
                && !in_popup(&self.dom, n)
                && self.dom.attribute(n, "rel").as_deref() != Some("footnote")
        })
    }

    /// Map a stored range onto the current DOM, applying the boundary
    /// heuristics: a range starting at the beginning of one text node or
    /// ending on the last character of another is widened to the enclosing
    /// child of the container.
    fn dom_range(&self, context: &D::Node, range: &AnnotationRange) -> Option<DomRange<D::Node>> {
        let start = self.mapper.to_dom(&self.dom, context, range.start)?;
        let end = self.mapper.to_dom(&self.dom, context, range.end)?;
        tracing::trace!(target: "weaver::annotate", ?start, ?end, "range before adjust");

        let distinct = start.node != end.node;
        let mut result = DomRange::new(start.clone(), end.clone());
        if distinct && start.offset == 0 {
            if let Some(point) =
                extend_to_child(&self.dom, &start.node, context).and_then(|c| point_before(&self.dom, &c))
            {
                result.start = point;
            }
        }
        if distinct && end.offset + 1 == self.dom.text_len(&end.node) {
            if let Some(point) =
                extend_to_child(&self.dom, &end.node, context).and_then(|c| point_after(&self.dom, &c))
            {
                result.end = point;
            }
        }
        Some(result)
    }

    fn marker_class(kind: Option<&str>) -> String {
        match kind {
            Some(kind) => format!("{ANNOTATION_CLASS} {ANNOTATION_CLASS}-{kind} {kind}"),
            None => ANNOTATION_CLASS.to_string(),
        }
    }

    /// Render one range as a marker span bound to `record`.
    ///
    /// Returns `None` when the container is not rendered or an offset does
    /// not map; the record is left as it is.
    fn render(&mut self, record: RecordId, range: &AnnotationRange) -> Result<Option<D::Node>> {
        let Some(context) = self.find_container(&range.context) else {
            tracing::warn!(target: "weaver::annotate", context = %range.context, "container not rendered, skipping annotation");
            return Ok(None);
        };
        let Some(dom_range) = self.dom_range(&context, range) else {
            tracing::warn!(
                target: "weaver::annotate",
                context = %range.context,
                start = range.start,
                end = range.end,
                "invalid range for container"
            );
            return Ok(None);
        };

        let marker = self.store.next_marker_id();
        let span = self.dom.create_element("span")?;
        self.dom
            .set_attribute(&span, "class", &Self::marker_class(range.kind.as_deref()))?;
        self.dom
            .set_attribute(&span, DATA_ATTRIBUTE, &range.data().to_json())?;
        self.dom
            .set_attribute(&span, MARKER_ATTRIBUTE, &marker.to_string())?;

        match wrap_range(&mut self.dom, &dom_range, &span) {
            Ok(()) => {}
            Err(AnnotateError::PartialSelection) => {
                let (widened, _) = normalize_to_ancestor(&self.dom, &dom_range);
                tracing::debug!(target: "weaver::annotate", ?widened, "range crosses markup, widening");
                wrap_range(&mut self.dom, &widened, &span)?;
            }
            Err(e) => return Err(e),
        }
        self.store.bind_marker(marker, record);
        tracing::debug!(target: "weaver::annotate", %marker, context = %range.context, "annotation rendered");
        Ok(Some(span))
    }

    /// Render a range and, if it rendered, append it to the list.
    pub fn update_annotation(&mut self, range: AnnotationRange) -> Result<Option<D::Node>> {
        let id = self.store.push(range.clone().into());
        match self.render(id, &range) {
            Ok(Some(span)) => {
                self.emit_changed(range.kind.clone(), Some(range.text.clone()));
                self.show_markers()?;
                Ok(Some(span))
            }
            Ok(None) => {
                self.store.remove(id);
                Ok(None)
            }
            Err(e) => {
                self.store.remove(id);
                Err(e)
            }
        }
    }

    /// Annotate the explicit range of `info`, or the current selection.
    ///
    /// The record is appended and announced before rendering; a record that
    /// fails to render stays in the list.
    pub fn add_annotation(&mut self, info: AddAnnotation<D::Node>) -> Result<Option<D::Node>> {
        let range = info
            .range
            .or_else(|| self.current_selection.clone())
            .ok_or(AnnotateError::NoSelection)?;

        let start = self
            .mapper
            .to_logical(&self.dom, &range.start, BoundaryPolicy::Start)?;
        let end = self
            .mapper
            .to_logical(&self.dom, &range.end, BoundaryPolicy::End)?;
        let (range, end_offset) = if start.container == end.container {
            (range, end.offset)
        } else {
            // Both offsets must lie in the start container: cut the range at
            // its end.
            let container = self
                .mapper
                .container_of(&self.dom, &range.start.node)
                .ok_or(AnnotateError::NotInContainer)?;
            tracing::debug!(
                target: "weaver::annotate",
                start = %start.container,
                end = %end.container,
                "selection spans containers, clamping to the start container"
            );
            let len = self.mapper.counted_len(&self.dom, &container);
            let end = DomPoint::new(container.clone(), self.dom.children(&container).len());
            (DomRange::new(range.start, end), len)
        };

        let annotation = AnnotationRange {
            context: start.container,
            start: start.offset,
            end: end_offset.max(start.offset),
            text: range_text(&self.dom, &range),
            kind: info.kind,
            properties: info.properties,
        };
        tracing::debug!(target: "weaver::annotate", ?annotation, "range adjusted");

        let id = self.store.push(annotation.clone().into());
        self.emit_changed(annotation.kind.clone(), Some(annotation.text.clone()));
        let span = self.render(id, &annotation)?;
        if span.is_some() {
            self.show_markers()?;
        }
        Ok(span)
    }

    /// Unwrap every marker span this annotator rendered.
    fn clear_rendered(&mut self) -> Result<()> {
        let spans = query_all(&self.dom, &self.root, |n| {
            self.dom.attribute(n, MARKER_ATTRIBUTE).is_some()
        });
        for span in spans.iter().rev() {
            self.discard_popup(span)?;
            unwrap(&mut self.dom, span)?;
        }
        self.store.clear_markers();
        Ok(())
    }

    /// Re-render the whole list, in order.
    ///
    /// Spans from a previous pass are removed first, so calling this twice
    /// renders each range once. Delete and modify records are replayed
    /// against the structural elements they name.
    pub fn update_annotations(&mut self) -> Result<()> {
        self.clear_rendered()?;
        let entries: Vec<(RecordId, AnnotationRecord)> = self
            .store
            .entries()
            .map(|(id, record)| (id, record.clone()))
            .collect();

        for (id, record) in entries {
            match record {
                AnnotationRecord::Range(range) => {
                    if let Err(e) = self.render(id, &range) {
                        tracing::warn!(target: "weaver::annotate", error = %e, context = %range.context, "failed to render annotation");
                    }
                }
                AnnotationRecord::Delete(delete) => {
                    if let Some(element) = self.find_container(&delete.node) {
                        self.discard_popup(&element)?;
                        unwrap(&mut self.dom, &element)?;
                    }
                }
                AnnotationRecord::Modify(modify) => {
                    if let Some(element) = self.find_container(&modify.node) {
                        self.set_properties(&element, modify.properties.clone())?;
                    }
                }
            }
        }
        self.show_markers()
    }

    /// Replace the list with `list` and render it.
    pub fn load_annotations(&mut self, list: Vec<AnnotationRecord>) -> Result<()> {
        self.clear_rendered()?;
        self.store.replace_all(list);
        self.update_annotations()
    }

    fn set_properties(&mut self, element: &D::Node, properties: Properties) -> Result<()> {
        let mut data =
            AnnotationData::parse(self.dom.attribute(element, DATA_ATTRIBUTE).as_deref())
                .unwrap_or_default();
        data.properties = Some(properties);
        self.dom.set_attribute(element, DATA_ATTRIBUTE, &data.to_json())
    }

    fn structural_id(&self, element: &D::Node) -> Option<String> {
        self.dom
            .attribute(element, self.mapper.container_attribute())
    }

    /// Context of a structural element: the nearest container above it.
    fn structural_context(&self, element: &D::Node) -> Result<String> {
        self.dom
            .parent(element)
            .and_then(|parent| self.mapper.container_of(&self.dom, &parent))
            .and_then(|container| self.structural_id(&container))
            .ok_or(AnnotateError::NotInContainer)
    }

    /// Delete the annotation rendered as `span`.
    ///
    /// A structural element is recorded as deleted, superseding any pending
    /// modification. A user annotation is dropped from the list. Either way
    /// the span is unwrapped in place.
    pub fn delete_annotation(&mut self, span: &D::Node) -> Result<()> {
        if let Some(node) = self.structural_id(span) {
            let context = self.structural_context(span)?;
            self.store.record_delete(node.into(), context.into());
        } else {
            let marker = self
                .dom
                .attribute(span, MARKER_ATTRIBUTE)
                .and_then(|raw| MarkerId::parse(&raw))
                .ok_or(AnnotateError::NotAnAnnotation)?;
            let record = self
                .store
                .unbind_marker(marker)
                .ok_or(AnnotateError::NotAnAnnotation)?;
            let removed = self.store.remove(record);
            tracing::debug!(target: "weaver::annotate", %marker, ?removed, "deleting annotation");
        }

        self.discard_popup(span)?;
        unwrap(&mut self.dom, span)?;
        self.emit_changed(None, None);
        self.show_markers()
    }

    /// Replace the properties of the annotation rendered as `span`.
    ///
    /// Structural elements get a modify record (created once, then updated)
    /// and a change notification. User annotations only have their span data
    /// updated.
    pub fn modify_annotation(&mut self, span: &D::Node, properties: Properties) -> Result<()> {
        if let Some(node) = self.structural_id(span) {
            let context = self.structural_context(span)?;
            self.store
                .upsert_modify(node.into(), context.into(), properties.clone());
            self.emit_changed(None, None);
        } else if self.dom.attribute(span, MARKER_ATTRIBUTE).is_none()
            && self.dom.attribute(span, DATA_ATTRIBUTE).is_none()
        {
            return Err(AnnotateError::NotAnAnnotation);
        }
        self.set_properties(span, properties)
    }

    /// Forget the list, the markers and the current selection.
    pub fn refresh(&mut self) -> Result<()> {
        self.store.clear();
        self.current_selection = None;
        clear_marker_bars(&mut self.dom, &self.root)?;
        for popup in std::mem::take(&mut self.popups) {
            self.dom.remove(&popup.wrapper)?;
        }
        self.emit_changed(None, None);
        Ok(())
    }

    /// Apply a host command.
    pub fn dispatch(&mut self, command: Command<D::Node>) -> Result<()> {
        match command {
            Command::Refresh => self.refresh(),
            Command::AddAnnotation(info) => self.add_annotation(info).map(|_| ()),
            Command::EditAnnotation { marker, properties } => {
                self.modify_annotation(&marker, properties)
            }
        }
    }

    /// Geometry of the bars for the current spans.
    pub fn marker_bars(&self) -> Vec<MarkerBar> {
        markers::marker_bars(&self.dom, &self.layout, &self.root, &self.config)
    }

    /// Redraw every marker bar and attach missing popups.
    pub fn show_markers(&mut self) -> Result<()> {
        clear_marker_bars(&mut self.dom, &self.root)?;

        let stale: Vec<_> = self
            .popups
            .iter()
            .filter(|p| !markers::is_attached(&self.dom, &self.root, p))
            .map(|p| p.target.clone())
            .collect();
        for target in &stale {
            self.discard_popup(target)?;
        }

        let root_rect = self.layout.bounding_rect(&self.dom, &self.root);
        for span in annotation_spans(&self.dom, &self.root) {
            let bars = markers::bars_for_span(&self.dom, &self.layout, &root_rect, &span, &self.config);
            for bar in &bars {
                render_bar(&mut self.dom, &self.root, bar)?;
            }
            if !self.popups.iter().any(|p| p.target == span) {
                let popup = build_popup(&mut self.dom, &self.root, &span)?;
                self.popups.push(popup);
            }
        }
        Ok(())
    }

    fn discard_popup(&mut self, span: &D::Node) -> Result<()> {
        if let Some(index) = self.popups.iter().position(|p| &p.target == span) {
            let popup = self.popups.remove(index);
            self.dom.remove(&popup.wrapper)?;
        }
        Ok(())
    }

    pub fn popup_for(&self, span: &D::Node) -> Option<&Popup<D::Node>> {
        self.popups.iter().find(|p| &p.target == span)
    }

    /// The span whose popup contains `node`.
    pub fn popup_target(&self, node: &D::Node) -> Option<D::Node> {
        self.popups
            .iter()
            .find(|p| crate::dom::contains(&self.dom, &p.wrapper, node))
            .map(|p| p.target.clone())
    }

    /// Show the popup of `span` below it and request details from the host.
    pub fn show_popup(&mut self, span: &D::Node) -> Result<()> {
        let Some(popup) = self.popup_for(span).cloned() else {
            return Ok(());
        };
        let root_rect = self.layout.bounding_rect(&self.dom, &self.root);
        let rect = self.layout.bounding_rect(&self.dom, span);
        self.dom.set_attribute(
            &popup.wrapper,
            "style",
            &format!(
                "position:absolute;left:{}px;top:{}px",
                rect.x - root_rect.x,
                rect.bottom() - root_rect.y
            ),
        )?;
        self.dom.remove_attribute(&popup.wrapper, "hidden")?;

        let Some(data) = AnnotationData::parse(self.dom.attribute(span, DATA_ATTRIBUTE).as_deref())
        else {
            return Ok(());
        };
        self.dom.set_text_content(
            &popup.type_indicator,
            data.kind.as_deref().unwrap_or_default(),
        )?;
        self.events.push(AnnotationEvent::DetailRequested {
            kind: data.kind.clone(),
            key: data.property(&self.config.key).cloned(),
            container: popup.info.clone(),
            marker: span.clone(),
        });
        Ok(())
    }

    pub fn hide_popup(&mut self, span: &D::Node) -> Result<()> {
        if let Some(popup) = self.popup_for(span) {
            let wrapper = popup.wrapper.clone();
            self.dom.set_attribute(&wrapper, "hidden", "")?;
        }
        Ok(())
    }

    /// Run a toolbar action of the popup attached to `span`.
    pub fn popup_action(&mut self, span: &D::Node, action: PopupAction) -> Result<()> {
        match action {
            PopupAction::Edit => {
                if let Some(data) =
                    AnnotationData::parse(self.dom.attribute(span, DATA_ATTRIBUTE).as_deref())
                {
                    self.events.push(AnnotationEvent::EditRequested {
                        data,
                        marker: span.clone(),
                    });
                }
                Ok(())
            }
            PopupAction::Delete => self.delete_annotation(span),
        }
    }

    /// Search the view for `tokens`.
    pub fn search<S: AsRef<str>>(&self, kind: &str, tokens: &[S]) -> Result<Vec<SearchMatch<D::Node>>> {
        search::search(&self.dom, &self.root, &self.mapper, &self.config, kind, tokens)
    }

    fn match_range(&self, m: &SearchMatch<D::Node>) -> Result<DomRange<D::Node>> {
        if m.annotated {
            let parent = self
                .dom
                .parent(&m.text_node)
                .ok_or(AnnotateError::NotInContainer)?;
            let index = child_index(&self.dom, &m.text_node).ok_or(AnnotateError::NotInContainer)?;
            return Ok(DomRange::new(
                DomPoint::new(parent.clone(), index),
                DomPoint::new(parent, index + 1),
            ));
        }
        let context = self
            .find_container(&m.context)
            .ok_or_else(|| AnnotateError::ContainerNotFound(m.context.clone()))?;
        let point = |offset| {
            self.mapper
                .to_dom(&self.dom, &context, offset)
                .ok_or_else(|| AnnotateError::OffsetOutOfRange {
                    container: m.context.clone(),
                    offset,
                })
        };
        Ok(DomRange::new(point(m.start)?, point(m.end)?))
    }

    /// Highlight a search match and scroll it into view. Returns the
    /// highlight rectangle relative to the view root.
    pub fn scroll_to(&mut self, m: &SearchMatch<D::Node>) -> Result<Rect> {
        let range = self.match_range(m)?;
        let root_rect = self.layout.bounding_rect(&self.dom, &self.root);
        let rect = self.layout.range_rect(&self.dom, &range);
        let relative = Rect::new(
            rect.x - root_rect.x,
            rect.y - root_rect.y - self.config.highlight_offset,
            rect.width,
            rect.height,
        );

        let highlight = match self.highlight() {
            Some(existing) => existing,
            None => {
                let div = self.dom.create_element("div")?;
                self.dom.set_attribute(&div, "part", HIGHLIGHT_PART)?;
                self.dom.insert_before(&self.root, &div, None)?;
                div
            }
        };
        self.dom.set_attribute(
            &highlight,
            "style",
            &format!(
                "position:absolute;left:{}px;top:{}px;width:{}px;height:{}px",
                relative.x, relative.y, relative.width, relative.height
            ),
        )?;

        if let Some(parent) = self.dom.parent(&range.start.node) {
            self.layout.scroll_into_view(&self.dom, &parent);
        }
        Ok(relative)
    }

    fn highlight(&self) -> Option<D::Node> {
        query_all(&self.dom, &self.root, |n| {
            self.dom.attribute(n, "part").as_deref() == Some(HIGHLIGHT_PART)
        })
        .into_iter()
        .next()
    }

    /// Move the search highlight out of view.
    pub fn hide_highlight(&mut self) -> Result<()> {
        if let Some(highlight) = self.highlight() {
            self.dom
                .set_attribute(&highlight, "style", "position:absolute;top:-1000px")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_by_attribute, text_nodes};
    use crate::layout::GridLayout;
    use crate::memory::{MemoryDom, NodeHandle};
    use serde_json::json;

    type TestAnnotator = Annotator<MemoryDom, GridLayout>;

    fn annotator(markup: &str) -> TestAnnotator {
        let dom = MemoryDom::from_markup(markup).unwrap();
        let root = dom.root();
        Annotator::new(dom, GridLayout::new(80, 10.0, 20.0), root, AnnotatorConfig::default())
            .unwrap()
    }

    fn text_node(a: &TestAnnotator, text: &str) -> NodeHandle {
        text_nodes(a.dom(), a.root())
            .into_iter()
            .find(|n| a.dom().text(n) == text)
            .unwrap()
    }

    fn range(context: &str, start: usize, end: usize, kind: &str) -> AnnotationRange {
        AnnotationRange {
            context: context.into(),
            start,
            end,
            text: String::new(),
            kind: Some(kind.into()),
            properties: Some(json!({ "ref": "r1" }).as_object().cloned().unwrap()),
        }
    }

    /// Rendered view content without popups and bars.
    fn content(a: &TestAnnotator) -> String {
        let p = query_all(a.dom(), a.root(), |n| a.dom().tag_name(n).as_deref() == Some("p"));
        p.iter().map(|n| a.dom().to_html(n)).collect()
    }

    fn without_marker_ids(html: &str) -> String {
        regex::Regex::new(r#" data-marker="\d+""#)
            .unwrap()
            .replace_all(html, "")
            .into_owned()
    }

    fn changed_lists(events: &[AnnotationEvent<NodeHandle>]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                AnnotationEvent::AnnotationsChanged { ranges, .. } => Some(ranges.len()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_add_annotation_from_selection() {
        let mut a = annotator(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#);
        let text = text_node(&a, "The quick brown fox");
        a.set_selection(SelectionNotice::Changed {
            range: DomRange::new(DomPoint::new(text, 4), DomPoint::new(text, 9)),
            adjusted: false,
        });

        let span = a
            .add_annotation(AddAnnotation::of_kind("hi"))
            .unwrap()
            .unwrap();

        assert_eq!(
            serde_json::to_value(a.to_list()).unwrap(),
            json!([{ "context": "p1", "start": 4, "end": 9, "text": "quick", "type": "hi" }])
        );
        assert_eq!(a.dom().text(&span), "quick");
        insta::assert_snapshot!(
            content(&a),
            @r#"<p data-tei="p1">The <span class="annotation annotation-hi hi" data-annotation="{&quot;type&quot;:&quot;hi&quot;}" data-marker="0">quick</span> brown fox</p>"#
        );

        let events = a.take_events();
        assert!(matches!(events[0], AnnotationEvent::SelectionChanged { has_content: true, .. }));
        assert!(matches!(
            &events[1],
            AnnotationEvent::AnnotationsChanged { kind: Some(k), text: Some(t), .. } if k == "hi" && t == "quick"
        ));
        assert_eq!(a.marker_bars().len(), 1);
        assert_eq!(a.popups().len(), 1);
    }

    #[test]
    fn test_add_without_selection_fails() {
        let mut a = annotator(r#"<div><p data-tei="p1">text</p></div>"#);
        a.set_selection(SelectionNotice::Cleared);
        let err = a.add_annotation(AddAnnotation::of_kind("hi")).unwrap_err();
        assert!(matches!(err, AnnotateError::NoSelection));
        assert!(a.to_list().is_empty());
    }

    #[test]
    fn test_selection_across_markup_is_stored_and_rendered() {
        let mut a = annotator(r#"<div><p data-tei="p1">ab<hi>cd</hi>ef</p></div>"#);
        let p = find_by_attribute(a.dom(), a.root(), "data-tei", "p1").unwrap();
        let ab = text_node(&a, "ab");
        let range = DomRange::new(DomPoint::new(ab, 1), DomPoint::new(p, 2));

        a.add_annotation(AddAnnotation::of_kind("x").with_range(range))
            .unwrap()
            .unwrap();

        let stored = a.to_list()[0].as_range().cloned().unwrap();
        assert_eq!((stored.start, stored.end, stored.text.as_str()), (1, 3, "bcd"));
        insta::assert_snapshot!(
            content(&a),
            @r#"<p data-tei="p1">a<span class="annotation annotation-x x" data-annotation="{&quot;type&quot;:&quot;x&quot;}" data-marker="0">b<hi>cd</hi></span>ef</p>"#
        );
    }

    #[test]
    fn test_selection_across_containers_is_clamped_to_start() {
        let mut a =
            annotator(r#"<div><p data-tei="p1">abc</p><p data-tei="p2">defgh</p></div>"#);
        let abc = text_node(&a, "abc");
        let defgh = text_node(&a, "defgh");
        let range = DomRange::new(DomPoint::new(abc, 1), DomPoint::new(defgh, 4));

        let span = a
            .add_annotation(AddAnnotation::of_kind("x").with_range(range))
            .unwrap()
            .unwrap();

        assert_eq!(a.dom().text(&span), "bc");
        assert_eq!(
            serde_json::to_value(a.to_list()).unwrap(),
            json!([{ "context": "p1", "start": 1, "end": 3, "text": "bc", "type": "x" }])
        );
        insta::assert_snapshot!(
            content(&a),
            @r#"<p data-tei="p1">a<span class="annotation annotation-x x" data-annotation="{&quot;type&quot;:&quot;x&quot;}" data-marker="0">bc</span></p><p data-tei="p2">defgh</p>"#
        );
    }

    #[test]
    fn test_range_ending_inside_markup_is_widened() {
        let mut a = annotator(r#"<div><p data-tei="p1">ab<hi>cde</hi>ef</p></div>"#);
        let range = AnnotationRange {
            properties: None,
            ..range("p1", 1, 3, "x")
        };

        let span = a.update_annotation(range).unwrap().unwrap();

        assert_eq!(a.dom().text(&span), "bcde");
        assert_eq!(a.to_list().len(), 1);
        insta::assert_snapshot!(
            content(&a),
            @r#"<p data-tei="p1">a<span class="annotation annotation-x x" data-annotation="{&quot;type&quot;:&quot;x&quot;}" data-marker="0">b<hi>cde</hi></span>ef</p>"#
        );
    }

    #[test]
    fn test_update_annotations_is_idempotent() {
        let mut a = annotator(
            r#"<div><p data-tei="p1">The quick brown fox</p><p data-tei="p2">jumps over</p></div>"#,
        );
        a.update_annotation(range("p1", 4, 9, "hi")).unwrap().unwrap();
        a.update_annotation(range("p2", 0, 5, "verb")).unwrap().unwrap();
        let first = content(&a);

        a.update_annotations().unwrap();
        a.update_annotations().unwrap();

        let spans = query_all(a.dom(), a.root(), |n| a.dom().has_class(n, "annotation"));
        assert_eq!(spans.len(), 2);
        assert_eq!(a.store().marker_count(), 2);
        assert_eq!(a.popups().len(), 2);
        assert_eq!(a.marker_bars().len(), 2);
        assert_eq!(without_marker_ids(&content(&a)), without_marker_ids(&first));
        assert_eq!(a.to_list().len(), 2);
    }

    #[test]
    fn test_load_annotations_renders_list() {
        let mut a = annotator(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#);
        let list: Vec<AnnotationRecord> = serde_json::from_value(json!([
            { "context": "p1", "start": 4, "end": 9, "text": "quick", "type": "hi" },
            { "context": "missing", "start": 0, "end": 1, "text": "x", "type": "hi" },
        ]))
        .unwrap();
        a.load_annotations(list).unwrap();

        assert_eq!(a.to_list().len(), 2);
        assert_eq!(a.store().marker_count(), 1);
        assert!(a.take_events().is_empty());
    }

    #[test]
    fn test_update_annotation_rejects_unmappable_range() {
        let mut a = annotator(r#"<div><p data-tei="p1">short</p></div>"#);
        assert!(a.update_annotation(range("p1", 2, 40, "hi")).unwrap().is_none());
        assert!(a.update_annotation(range("nope", 0, 1, "hi")).unwrap().is_none());
        assert!(a.to_list().is_empty());
        assert!(a.take_events().is_empty());
    }

    #[test]
    fn test_containers_in_popovers_and_footnotes_are_ignored() {
        let a = annotator(
            r#"<div><pb-popover><p data-tei="p1">copy</p></pb-popover><p data-tei="p1" rel="footnote">note</p><p data-tei="p1">real</p></div>"#,
        );
        let found = a.find_container("p1").unwrap();
        assert_eq!(a.dom().text(&found), "real");
    }

    #[test]
    fn test_delete_user_annotation() {
        let mut a = annotator(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#);
        let span = a.update_annotation(range("p1", 4, 9, "hi")).unwrap().unwrap();
        a.take_events();

        a.delete_annotation(&span).unwrap();

        assert!(a.to_list().is_empty());
        assert_eq!(a.store().marker_count(), 0);
        assert!(a.popups().is_empty());
        assert!(a.marker_bars().is_empty());
        assert_eq!(content(&a), r#"<p data-tei="p1">The quick brown fox</p>"#);
        assert_eq!(changed_lists(&a.take_events()), vec![0]);

        let err = a.delete_annotation(&span).unwrap_err();
        assert!(matches!(err, AnnotateError::NotAnAnnotation));
    }

    const STRUCTURAL: &str = r#"<div><p data-tei="p1">Hello <span class="annotation annotation-person person" data-tei="n7" data-annotation='{"type":"person","properties":{"ref":"old"}}'>Alice</span>!</p></div>"#;

    #[test]
    fn test_delete_supersedes_modify_for_structural_element() {
        let mut a = annotator(STRUCTURAL);
        let span = find_by_attribute(a.dom(), a.root(), "data-tei", "n7").unwrap();

        a.modify_annotation(&span, json!({ "ref": "new" }).as_object().cloned().unwrap())
            .unwrap();
        a.modify_annotation(&span, json!({ "ref": "newer" }).as_object().cloned().unwrap())
            .unwrap();
        assert_eq!(
            serde_json::to_value(a.to_list()).unwrap(),
            json!([{ "type": "modify", "node": "n7", "context": "p1", "properties": { "ref": "newer" } }])
        );
        assert_eq!(
            a.dom().attribute(&span, "data-annotation").as_deref(),
            Some(r#"{"type":"person","properties":{"ref":"newer"}}"#)
        );

        a.delete_annotation(&span).unwrap();
        assert_eq!(
            serde_json::to_value(a.to_list()).unwrap(),
            json!([{ "type": "delete", "node": "n7", "context": "p1" }])
        );
        assert_eq!(content(&a), r#"<p data-tei="p1">Hello Alice!</p>"#);
        assert_eq!(changed_lists(&a.take_events()), vec![1, 1, 1]);
    }

    #[test]
    fn test_structural_records_replay_on_reload() {
        let mut a = annotator(STRUCTURAL);
        let list: Vec<AnnotationRecord> = serde_json::from_value(json!([
            { "type": "modify", "node": "n7", "context": "p1", "properties": { "ref": "P9" } },
        ]))
        .unwrap();
        a.load_annotations(list).unwrap();
        let span = find_by_attribute(a.dom(), a.root(), "data-tei", "n7").unwrap();
        assert_eq!(
            a.dom().attribute(&span, "data-annotation").as_deref(),
            Some(r#"{"type":"person","properties":{"ref":"P9"}}"#)
        );

        let mut b = annotator(STRUCTURAL);
        b.load_annotations(vec![AnnotationRecord::delete("n7", "p1")]).unwrap();
        assert_eq!(content(&b), r#"<p data-tei="p1">Hello Alice!</p>"#);
    }

    #[test]
    fn test_modify_user_annotation_updates_span_only() {
        let mut a = annotator(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#);
        let span = a.update_annotation(range("p1", 4, 9, "hi")).unwrap().unwrap();
        a.take_events();

        a.dispatch(Command::EditAnnotation {
            marker: span,
            properties: json!({ "ref": "r2" }).as_object().cloned().unwrap(),
        })
        .unwrap();

        assert!(a.take_events().is_empty());
        let data = AnnotationData::parse(a.dom().attribute(&span, "data-annotation").as_deref())
            .unwrap();
        assert_eq!(data.property("ref"), Some(&json!("r2")));

        let root = *a.root();
        assert!(matches!(
            a.modify_annotation(&root, Properties::new()),
            Err(AnnotateError::NotAnAnnotation)
        ));
    }

    #[test]
    fn test_refresh_clears_state() {
        let mut a = annotator(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#);
        a.update_annotation(range("p1", 4, 9, "hi")).unwrap();
        a.take_events();

        a.dispatch(Command::Refresh).unwrap();

        assert!(a.to_list().is_empty());
        assert!(a.current_selection().is_none());
        assert!(a.popups().is_empty());
        assert!(query_all(a.dom(), a.root(), |n| a.dom().has_class(n, "marker")).is_empty());
        assert_eq!(changed_lists(&a.take_events()), vec![0]);
    }

    #[test]
    fn test_popup_detail_and_actions() {
        let mut a = annotator(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#);
        let span = a.update_annotation(range("p1", 4, 9, "hi")).unwrap().unwrap();
        a.take_events();

        a.show_popup(&span).unwrap();
        let popup = a.popup_for(&span).cloned().unwrap();
        assert_eq!(a.dom().attribute(&popup.wrapper, "hidden"), None);
        assert_eq!(a.dom().text(&popup.type_indicator), "hi");
        assert_eq!(a.popup_target(&popup.delete), Some(span));

        let events = a.take_events();
        assert_eq!(
            events,
            vec![AnnotationEvent::DetailRequested {
                kind: Some("hi".into()),
                key: Some(json!("r1")),
                container: popup.info,
                marker: span,
            }]
        );

        a.popup_action(&span, PopupAction::Edit).unwrap();
        assert!(matches!(
            &a.take_events()[..],
            [AnnotationEvent::EditRequested { data, .. }] if data.kind.as_deref() == Some("hi")
        ));

        a.popup_action(&span, PopupAction::Delete).unwrap();
        assert!(a.to_list().is_empty());
        assert!(a.popups().is_empty());
    }

    #[test]
    fn test_search_and_scroll_to() {
        let mut a = annotator(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#);
        let results = a.search("hi", &["quick"]).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kwic, "... The <mark>quick</mark> brown fox ...");

        let rect = a.scroll_to(&results[0]).unwrap();
        assert_eq!(rect, Rect::new(40.0, -4.0, 50.0, 20.0));
        let highlight = a.highlight().unwrap();
        assert_eq!(
            a.dom().attribute(&highlight, "style").as_deref(),
            Some("position:absolute;left:40px;top:-4px;width:50px;height:20px")
        );

        a.scroll_to(&results[0]).unwrap();
        let highlights = query_all(a.dom(), a.root(), |n| a.dom().attribute(n, "part").as_deref() == Some("highlight"));
        assert_eq!(highlights.len(), 1);

        a.hide_highlight().unwrap();
        assert_eq!(
            a.dom().attribute(&highlight, "style").as_deref(),
            Some("position:absolute;top:-1000px")
        );
    }

    #[test]
    fn test_scroll_to_annotated_match_covers_text_node() {
        let mut a = annotator(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#);
        a.update_annotation(range("p1", 4, 9, "hi")).unwrap();
        let results = a.search("hi", &["quick"]).unwrap();
        assert!(results[0].annotated);
        assert_eq!(results[0].key, Some(json!("r1")));
        let rect = a.scroll_to(&results[0]).unwrap();
        assert_eq!(rect.width, 50.0);
    }
}
