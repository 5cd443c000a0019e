//! DOM `CustomEvent` bridging.
//!
//! Outbound [`AnnotationEvent`]s become bubbling, composed `pb-*` events whose
//! `detail` mirrors the payload. Inbound `pb-*` events are parsed back into
//! [`Command`]s.

use gloo_utils::format::JsValueSerdeExt;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CustomEvent, CustomEventInit, EventTarget, Node};

use weaver_annotate_core::{
    ADD_ANNOTATION_EVENT, AddAnnotation, AnnotationEvent, Command, EDIT_ANNOTATION_EVENT,
    Properties, REFRESH_EVENT, Result,
};

use crate::dom::BrowserDom;

fn set(target: &js_sys::Object, key: &str, value: &JsValue) -> Result<()> {
    js_sys::Reflect::set(target, &key.into(), value)
        .map_err(|e| format!("setting {key} failed: {:?}", e))?;
    Ok(())
}

fn optional_string(value: &Option<String>) -> JsValue {
    value.as_deref().map(JsValue::from_str).unwrap_or(JsValue::UNDEFINED)
}

/// Build the `detail` object of an outbound event.
pub fn event_detail(dom: &BrowserDom, event: &AnnotationEvent<Node>) -> Result<JsValue> {
    let detail = js_sys::Object::new();
    match event {
        AnnotationEvent::SelectionChanged { has_content, range } => {
            set(&detail, "hasContent", &JsValue::from_bool(*has_content))?;
            if let Some(range) = range {
                set(&detail, "range", &dom.to_range(range)?.into())?;
            }
        }
        AnnotationEvent::AnnotationsChanged { kind, text, ranges } => {
            set(&detail, "type", &optional_string(kind))?;
            set(&detail, "text", &optional_string(text))?;
            set(&detail, "ranges", &JsValue::from_serde(ranges)?)?;
        }
        AnnotationEvent::DetailRequested {
            kind,
            key,
            container,
            marker,
        } => {
            set(&detail, "type", &optional_string(kind))?;
            set(&detail, "id", &JsValue::from_serde(key)?)?;
            set(&detail, "container", container)?;
            set(&detail, "span", marker)?;
        }
        AnnotationEvent::EditRequested { data, marker } => {
            set(&detail, "type", &optional_string(&data.kind))?;
            set(&detail, "properties", &JsValue::from_serde(&data.properties)?)?;
            set(&detail, "target", marker)?;
        }
    }
    Ok(detail.into())
}

/// Dispatch `event` on `target` as a bubbling, composed `CustomEvent`.
pub fn dispatch_event(
    target: &EventTarget,
    dom: &BrowserDom,
    event: &AnnotationEvent<Node>,
) -> Result<()> {
    let init = CustomEventInit::new();
    init.set_bubbles(true);
    init.set_composed(true);
    init.set_detail(&event_detail(dom, event)?);
    let custom = CustomEvent::new_with_event_init_dict(event.name(), &init)
        .map_err(|e| format!("creating {} failed: {:?}", event.name(), e))?;
    target
        .dispatch_event(&custom)
        .map_err(|e| format!("dispatching {} failed: {:?}", event.name(), e))?;
    tracing::trace!(target: "weaver::annotate", event = event.name(), "dispatched");
    Ok(())
}

fn field(detail: &JsValue, key: &str) -> Option<JsValue> {
    if !detail.is_object() {
        return None;
    }
    js_sys::Reflect::get(detail, &key.into())
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

/// Read a `properties` object from an event detail.
pub fn properties_of(detail: &JsValue) -> Option<Properties> {
    let value = field(detail, "properties")?;
    match value.into_serde::<Properties>() {
        Ok(properties) => Some(properties),
        Err(e) => {
            tracing::debug!(target: "weaver::annotate", error = %e, "ignoring malformed properties");
            None
        }
    }
}

/// Parse the detail of an add request: `{ range?, type?, properties? }`.
pub fn add_annotation_of(detail: &JsValue) -> Result<AddAnnotation<Node>> {
    let range = match field(detail, "range").and_then(|r| r.dyn_into::<web_sys::Range>().ok()) {
        Some(range) => Some(BrowserDom::from_range(&range)?),
        None => None,
    };
    Ok(AddAnnotation {
        range,
        kind: field(detail, "type").and_then(|t| t.as_string()),
        properties: properties_of(detail),
    })
}

/// Parse an inbound event into a command.
///
/// Returns `None` for unknown event types and for edit requests without a
/// target node.
pub fn command_of(event_type: &str, detail: &JsValue) -> Result<Option<Command<Node>>> {
    let command = match event_type {
        REFRESH_EVENT => Command::Refresh,
        ADD_ANNOTATION_EVENT => Command::AddAnnotation(add_annotation_of(detail)?),
        EDIT_ANNOTATION_EVENT => {
            let Some(marker) = field(detail, "target").and_then(|t| t.dyn_into::<Node>().ok())
            else {
                return Ok(None);
            };
            Command::EditAnnotation {
                marker,
                properties: properties_of(detail).unwrap_or_default(),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(command))
}

/// The `detail` of a DOM event, if it is a `CustomEvent`.
pub fn detail_of(event: &web_sys::Event) -> JsValue {
    event
        .dyn_ref::<CustomEvent>()
        .map(|e| e.detail())
        .unwrap_or(JsValue::UNDEFINED)
}
