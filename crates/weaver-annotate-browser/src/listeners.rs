//! DOM listener registrations.
//!
//! Each group owns its `EventListener`s; dropping the group unregisters them.

use std::rc::Rc;

use gloo_events::EventListener;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventTarget, Node};

use weaver_annotate_core::{
    ADD_ANNOTATION_EVENT, EDIT_ANNOTATION_EVENT, REFRESH_EVENT, TrackerInput,
};

/// Selection and mouse listeners feeding a selection tracker.
///
/// `selectionchange` only fires on documents, while mouse events are taken
/// from the view's own scope so that presses elsewhere do not hold the
/// tracker back.
pub struct SelectionListeners {
    _listeners: [EventListener; 3],
}

impl SelectionListeners {
    pub fn attach(
        document: &EventTarget,
        scope: &EventTarget,
        on_input: impl Fn(TrackerInput) + 'static,
    ) -> Self {
        let on_input = Rc::new(on_input);
        let listen = |target: &EventTarget, name: &'static str, input: TrackerInput| {
            let on_input = on_input.clone();
            EventListener::new(target, name, move |_event| on_input(input))
        };
        Self {
            _listeners: [
                listen(document, "selectionchange", TrackerInput::SelectionChange),
                listen(scope, "mousedown", TrackerInput::MouseDown),
                listen(scope, "mouseup", TrackerInput::MouseUp),
            ],
        }
    }
}

fn event_node(event: &Event) -> Option<Node> {
    event.target()?.dyn_into::<Node>().ok()
}

/// Hover and click listeners on the view root, driving popups.
pub struct PopupListeners {
    _hover: EventListener,
    _click: EventListener,
}

impl PopupListeners {
    /// Both callbacks receive the node the event was dispatched to.
    pub fn attach(
        root: &EventTarget,
        on_hover: impl Fn(Node) + 'static,
        on_click: impl Fn(Node) + 'static,
    ) -> Self {
        let hover = EventListener::new(root, "mouseover", move |event| {
            if let Some(node) = event_node(event) {
                on_hover(node);
            }
        });
        let click = EventListener::new(root, "click", move |event| {
            if let Some(node) = event_node(event) {
                on_click(node);
            }
        });
        Self {
            _hover: hover,
            _click: click,
        }
    }
}

/// Listeners for the inbound `pb-refresh`, `pb-add-annotation` and
/// `pb-edit-annotation` events.
pub struct CommandListeners {
    _listeners: Vec<EventListener>,
}

impl CommandListeners {
    /// `on_event` receives the event type and the event itself.
    pub fn attach(target: &EventTarget, on_event: impl Fn(&str, &Event) + 'static) -> Self {
        let on_event = Rc::new(on_event);
        let listeners = [REFRESH_EVENT, ADD_ANNOTATION_EVENT, EDIT_ANNOTATION_EVENT]
            .into_iter()
            .map(|name| {
                let on_event = on_event.clone();
                EventListener::new(target, name, move |event| on_event(name, event))
            })
            .collect();
        Self {
            _listeners: listeners,
        }
    }
}
