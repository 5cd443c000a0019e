//! JsAnnotateView - the annotation overlay wrapper for JavaScript.

use serde::Serialize;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{EventTarget, HtmlElement, Node};

use weaver_annotate_browser::events::add_annotation_of;
use weaver_annotate_browser::{AnnotateView, BrowserDom, dispatch_event};
use weaver_annotate_core::{
    AnnotateError, AnnotationRange, AnnotationRecord, AnnotatorConfig, SmolStr,
};

use crate::types::{JsRect, JsSearchMatch};

fn js_error(e: AnnotateError) -> JsError {
    JsError::new(&e.to_string())
}

fn parse_config(config: JsValue) -> Result<AnnotatorConfig, JsError> {
    if config.is_undefined() || config.is_null() {
        return Ok(AnnotatorConfig::default());
    }
    serde_wasm_bindgen::from_value(config)
        .map_err(|e| JsError::new(&format!("Invalid config: {}", e)))
}

/// Parse a JS value by way of its JSON text.
fn from_json<T: serde::de::DeserializeOwned>(value: &JsValue, what: &str) -> Result<T, JsError> {
    let json = js_sys::JSON::stringify(value)
        .ok()
        .and_then(|s| s.as_string())
        .ok_or_else(|| JsError::new(&format!("Invalid {}: not serializable", what)))?;
    serde_json::from_str(&json).map_err(|e| JsError::new(&format!("Invalid {}: {}", what, e)))
}

fn to_json<T: Serialize>(value: &T) -> Result<JsValue, JsError> {
    let json = serde_json::to_string(value)
        .map_err(|e| JsError::new(&format!("Serialization error: {}", e)))?;
    js_sys::JSON::parse(&json).map_err(|_| JsError::new("Serialization error"))
}

/// An annotation overlay exposed to JavaScript.
///
/// Outbound `pb-*` events are dispatched on the root element; they bubble
/// and cross shadow boundaries. Inbound `pb-refresh`, `pb-add-annotation`
/// and `pb-edit-annotation` events are taken from the events target, the
/// document by default.
#[wasm_bindgen]
pub struct JsAnnotateView {
    view: AnnotateView,
    key: SmolStr,
}

#[wasm_bindgen]
impl JsAnnotateView {
    /// Attach to `root`. `config` is an optional annotator config object.
    #[wasm_bindgen(constructor)]
    pub fn new(
        root: HtmlElement,
        config: JsValue,
        events: Option<EventTarget>,
    ) -> Result<JsAnnotateView, JsError> {
        let config = parse_config(config)?;
        let key = config.key.clone();
        let mut view = AnnotateView::new(&root, config).map_err(js_error)?;

        let dom = BrowserDom::for_node(&root).map_err(js_error)?;
        let inbound: EventTarget = match events {
            Some(target) => target,
            None => dom.document().clone().into(),
        };
        let outbound: EventTarget = root.into();
        view.on_event(move |event| {
            if let Err(e) = dispatch_event(&outbound, &dom, &event) {
                tracing::warn!(target: "weaver::annotate", error = %e, "could not dispatch event");
            }
        });
        view.listen_commands(&inbound);

        Ok(Self { view, key })
    }

    // === Annotation list ===

    /// The current annotation list.
    #[wasm_bindgen(getter)]
    pub fn annotations(&self) -> Result<JsValue, JsError> {
        to_json(&self.view.annotations())
    }

    /// Replace the list and render it.
    #[wasm_bindgen(js_name = loadAnnotations)]
    pub fn load_annotations(&self, list: JsValue) -> Result<(), JsError> {
        let list: Vec<AnnotationRecord> = from_json(&list, "annotation list")?;
        self.view.load_annotations(list).map_err(js_error)
    }

    /// Re-render the current list, e.g. after the content was replaced.
    #[wasm_bindgen(js_name = updateAnnotations)]
    pub fn update_annotations(&self) -> Result<(), JsError> {
        self.view.update_annotations().map_err(js_error)
    }

    /// Render one range and append it to the list.
    ///
    /// Returns the marker span, or `undefined` when the range cannot be
    /// placed.
    #[wasm_bindgen(js_name = updateAnnotation)]
    pub fn update_annotation(&self, range: JsValue) -> Result<Option<Node>, JsError> {
        let range: AnnotationRange = from_json(&range, "annotation range")?;
        self.view.update_annotation(range).map_err(js_error)
    }

    /// Annotate `{ range?, type?, properties? }`; without a range the last
    /// selection is used.
    #[wasm_bindgen(js_name = addAnnotation)]
    pub fn add_annotation(&self, info: JsValue) -> Result<Option<Node>, JsError> {
        let info = add_annotation_of(&info).map_err(js_error)?;
        self.view.add_annotation(info).map_err(js_error)
    }

    #[wasm_bindgen(js_name = deleteAnnotation)]
    pub fn delete_annotation(&self, span: Node) -> Result<(), JsError> {
        self.view.delete_annotation(&span).map_err(js_error)
    }

    /// Replace the properties of an annotation span.
    #[wasm_bindgen(js_name = editAnnotation)]
    pub fn edit_annotation(&self, span: Node, properties: JsValue) -> Result<(), JsError> {
        let properties = from_json(&properties, "properties")?;
        self.view
            .modify_annotation(&span, properties)
            .map_err(js_error)
    }

    /// Clear the list, the markers and the selection.
    pub fn refresh(&self) -> Result<(), JsError> {
        self.view.refresh().map_err(js_error)
    }

    #[wasm_bindgen(js_name = showMarkers)]
    pub fn show_markers(&self) -> Result<(), JsError> {
        self.view.show_markers().map_err(js_error)
    }

    // === Search ===

    /// Search the view for `tokens` and report which hits already carry an
    /// annotation of type `kind`.
    pub fn search(&self, kind: &str, tokens: Vec<String>) -> Result<js_sys::Array, JsError> {
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let results = js_sys::Array::new();
        for m in self.view.search(kind, &tokens).map_err(js_error)? {
            let entry = JsSearchMatch::from_match(&m)
                .serialize(&serializer)
                .map_err(|e| JsError::new(&format!("Serialization error: {}", e)))?;
            set(&entry, "textNode", &m.text_node)?;
            if self.key.as_str() != "key" {
                let key = match &m.key {
                    Some(key) => to_json(key)?,
                    None => JsValue::NULL,
                };
                set(&entry, &self.key, &key)?;
            }
            results.push(&entry);
        }
        Ok(results)
    }

    /// Highlight a search hit and scroll it into view.
    #[wasm_bindgen(js_name = scrollTo)]
    pub fn scroll_to(&self, hit: JsValue) -> Result<JsRect, JsError> {
        let text_node = js_sys::Reflect::get(&hit, &"textNode".into())
            .ok()
            .and_then(|n| n.dyn_into::<Node>().ok())
            .ok_or_else(|| JsError::new("Invalid search hit: missing textNode"))?;
        let parsed: JsSearchMatch = serde_wasm_bindgen::from_value(hit)
            .map_err(|e| JsError::new(&format!("Invalid search hit: {}", e)))?;
        let rect = self
            .view
            .scroll_to(&parsed.into_match(text_node))
            .map_err(js_error)?;
        Ok(rect.into())
    }

    /// Move the search highlight out of view.
    #[wasm_bindgen(js_name = hideMarker)]
    pub fn hide_marker(&self) -> Result<(), JsError> {
        self.view.hide_highlight().map_err(js_error)
    }

    // === Selection ===

    /// Whether a selection is available to annotate.
    #[wasm_bindgen(js_name = hasSelection)]
    pub fn has_selection(&self) -> bool {
        self.view.current_selection().is_some()
    }
}

fn set(target: &JsValue, key: &str, value: &JsValue) -> Result<(), JsError> {
    js_sys::Reflect::set(target, &key.into(), value)
        .map(|_| ())
        .map_err(|_| JsError::new(&format!("Could not set {}", key)))
}
