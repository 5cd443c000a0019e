//! A live annotation view over one DOM element.
//!
//! [`AnnotateView`] glues an [`Annotator`] on the browser DOM to the selection
//! tracker, timers and listeners. State lives behind `Rc<RefCell<_>>` so that
//! listeners and timeouts can reach it; they hold weak references and do
//! nothing once the view is dropped.
//!
//! Outbound events are drained from the annotator after every operation and
//! handed to the event callback with no borrow held, so the callback may call
//! back into the view.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use web_sys::{Element, Event, EventTarget, Node};

use weaver_annotate_core::dom::closest;
use weaver_annotate_core::markers::ANNOTATION_CLASS;
use weaver_annotate_core::{
    AddAnnotation, AnnotateError, AnnotationEvent, AnnotationRange, AnnotationRecord, Annotator,
    AnnotatorConfig, Command, DomRange, DomTree, PopupAction, Properties, Rect, Result,
    SearchMatch, SelectionTracker, TimerToken, TrackerInput, TrackerOutput,
};

use crate::dom::BrowserDom;
use crate::events::{command_of, detail_of};
use crate::layout::BrowserLayout;
use crate::listeners::{CommandListeners, PopupListeners, SelectionListeners};
use crate::selection::{apply_selection, live_selection};
use crate::timers::BrowserScheduler;

pub type BrowserAnnotator = Annotator<BrowserDom, BrowserLayout>;

type EventCallback = Box<dyn FnMut(AnnotationEvent<Node>)>;

struct ViewState {
    annotator: BrowserAnnotator,
    tracker: SelectionTracker<Node>,
    scheduler: BrowserScheduler,
    /// Shadow root or document the view is rendered in.
    scope: Node,
    /// Span whose popup is showing.
    shown: Option<Node>,
    on_event: Option<EventCallback>,
    dispatching: bool,
}

/// Annotation overlay attached to a live element.
pub struct AnnotateView {
    state: Rc<RefCell<ViewState>>,
    _selection: SelectionListeners,
    _popups: PopupListeners,
    commands: Option<CommandListeners>,
}

impl AnnotateView {
    /// Attach to `root`. Selection tracking and popups are live immediately.
    pub fn new(root: &Element, config: AnnotatorConfig) -> Result<Self> {
        let node: Node = root.clone().into();
        let dom = BrowserDom::for_node(&node)?;
        let document: EventTarget = dom.document().clone().into();
        let scope = node.get_root_node();
        let tracker = SelectionTracker::new(&config);
        let annotator = Annotator::new(dom, BrowserLayout, node, config)?;

        let state = Rc::new_cyclic(|weak: &Weak<RefCell<ViewState>>| {
            let weak = weak.clone();
            let scheduler = BrowserScheduler::new(move |token| {
                if let Some(state) = weak.upgrade() {
                    fire(&state, token);
                }
            });
            RefCell::new(ViewState {
                annotator,
                tracker,
                scheduler,
                scope: scope.clone(),
                shown: None,
                on_event: None,
                dispatching: false,
            })
        });

        let weak = Rc::downgrade(&state);
        let selection = SelectionListeners::attach(&document, &scope, move |input| {
            if let Some(state) = weak.upgrade() {
                handle_input(&state, input);
            }
        });

        let hover_state = Rc::downgrade(&state);
        let click_state = Rc::downgrade(&state);
        let popups = PopupListeners::attach(
            root,
            move |node| {
                if let Some(state) = hover_state.upgrade() {
                    report(run(&state, |s| hover(s, &node)));
                }
            },
            move |node| {
                if let Some(state) = click_state.upgrade() {
                    report(run(&state, |s| click(s, &node)));
                }
            },
        );

        tracing::debug!(target: "weaver::annotate", "view attached");
        Ok(Self {
            state,
            _selection: selection,
            _popups: popups,
            commands: None,
        })
    }

    /// Set the callback receiving every outbound event.
    pub fn on_event(&self, callback: impl FnMut(AnnotationEvent<Node>) + 'static) {
        self.state.borrow_mut().on_event = Some(Box::new(callback));
    }

    /// Listen on `target` for inbound commands. Replaces earlier listeners.
    pub fn listen_commands(&mut self, target: &EventTarget) {
        let weak = Rc::downgrade(&self.state);
        self.commands = Some(CommandListeners::attach(
            target,
            move |name: &str, event: &Event| {
                let Some(state) = weak.upgrade() else {
                    return;
                };
                match command_of(name, &detail_of(event)) {
                    Ok(Some(command)) => report(run(&state, |s| apply(s, command))),
                    Ok(None) => {
                        tracing::debug!(target: "weaver::annotate", event = name, "ignoring incomplete command");
                    }
                    Err(e) => report(Err(e)),
                }
            },
        ));
    }

    /// Run `f` against the annotator, then deliver the events it produced.
    pub fn with_annotator<R>(&self, f: impl FnOnce(&mut BrowserAnnotator) -> R) -> R {
        run(&self.state, |s| f(&mut s.annotator))
    }

    pub fn annotations(&self) -> Vec<AnnotationRecord> {
        self.state.borrow().annotator.to_list()
    }

    pub fn current_selection(&self) -> Option<DomRange<Node>> {
        self.state.borrow().annotator.current_selection().cloned()
    }

    pub fn root(&self) -> Node {
        self.state.borrow().annotator.root().clone()
    }

    /// Feed a selection or mouse event by hand.
    pub fn handle_input(&self, input: TrackerInput) {
        handle_input(&self.state, input);
    }

    pub fn dispatch(&self, command: Command<Node>) -> Result<()> {
        run(&self.state, |s| apply(s, command))
    }

    pub fn load_annotations(&self, list: Vec<AnnotationRecord>) -> Result<()> {
        run(&self.state, |s| {
            s.shown = None;
            s.annotator.load_annotations(list)
        })
    }

    pub fn update_annotations(&self) -> Result<()> {
        run(&self.state, |s| {
            s.shown = None;
            s.annotator.update_annotations()
        })
    }

    pub fn add_annotation(&self, info: AddAnnotation<Node>) -> Result<Option<Node>> {
        run(&self.state, |s| s.annotator.add_annotation(info))
    }

    pub fn update_annotation(&self, range: AnnotationRange) -> Result<Option<Node>> {
        run(&self.state, |s| s.annotator.update_annotation(range))
    }

    pub fn delete_annotation(&self, span: &Node) -> Result<()> {
        run(&self.state, |s| {
            if s.shown.as_ref() == Some(span) {
                s.shown = None;
            }
            s.annotator.delete_annotation(span)
        })
    }

    pub fn modify_annotation(&self, span: &Node, properties: Properties) -> Result<()> {
        run(&self.state, |s| s.annotator.modify_annotation(span, properties))
    }

    pub fn show_markers(&self) -> Result<()> {
        run(&self.state, |s| s.annotator.show_markers())
    }

    pub fn search(&self, kind: &str, tokens: &[String]) -> Result<Vec<SearchMatch<Node>>> {
        self.state.borrow().annotator.search(kind, tokens)
    }

    pub fn scroll_to(&self, m: &SearchMatch<Node>) -> Result<Rect> {
        run(&self.state, |s| s.annotator.scroll_to(m))
    }

    pub fn hide_highlight(&self) -> Result<()> {
        run(&self.state, |s| s.annotator.hide_highlight())
    }

    pub fn refresh(&self) -> Result<()> {
        self.dispatch(Command::Refresh)
    }
}

impl Drop for AnnotateView {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            let ViewState {
                tracker, scheduler, ..
            } = &mut *state;
            tracker.reset(scheduler);
        }
        tracing::debug!(target: "weaver::annotate", "view detached");
    }
}

fn report(result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(target: "weaver::annotate", error = %e, "annotation view operation failed");
    }
}

/// Run `f` with the state borrowed, then flush events.
fn run<R>(state: &Rc<RefCell<ViewState>>, f: impl FnOnce(&mut ViewState) -> R) -> R {
    let result = f(&mut *state.borrow_mut());
    flush(state);
    result
}

/// Deliver queued events. Nested calls from inside the callback leave their
/// events to the outermost flush.
fn flush(state: &Rc<RefCell<ViewState>>) {
    {
        let mut s = state.borrow_mut();
        if s.dispatching {
            return;
        }
        s.dispatching = true;
    }
    loop {
        let (events, callback) = {
            let mut s = state.borrow_mut();
            let events = s.annotator.take_events();
            if events.is_empty() {
                s.dispatching = false;
                return;
            }
            (events, s.on_event.take())
        };
        let Some(mut callback) = callback else {
            continue;
        };
        for event in events {
            callback(event);
        }
        let mut s = state.borrow_mut();
        if s.on_event.is_none() {
            s.on_event = Some(callback);
        }
    }
}

fn apply(s: &mut ViewState, command: Command<Node>) -> Result<()> {
    if matches!(command, Command::Refresh) {
        s.shown = None;
    }
    s.annotator.dispatch(command)
}

fn handle_input(state: &Rc<RefCell<ViewState>>, input: TrackerInput) {
    let mut s = state.borrow_mut();
    let ViewState {
        tracker, scheduler, ..
    } = &mut *s;
    tracker.handle(input, scheduler);
}

fn fire(state: &Rc<RefCell<ViewState>>, token: TimerToken) {
    run(state, |s| {
        let live = live_selection(&s.scope);
        let ViewState {
            annotator,
            tracker,
            scheduler,
            scope,
            ..
        } = s;
        match tracker.fire(token, annotator.dom(), live, scheduler) {
            Some(TrackerOutput::Notice(notice)) => annotator.set_selection(notice),
            Some(TrackerOutput::Reapply(range)) => {
                if let Err(e) = apply_selection(annotator.dom(), scope, &range) {
                    tracing::warn!(target: "weaver::annotate", error = %e, "could not restore selection");
                }
            }
            None => {}
        }
    })
}

fn hover(s: &mut ViewState, node: &Node) -> Result<()> {
    if s.annotator.popup_target(node).is_some() {
        return Ok(());
    }
    let dom = s.annotator.dom();
    let span = closest(dom, node, |n| dom.has_class(n, ANNOTATION_CLASS));
    if span == s.shown {
        return Ok(());
    }
    if let Some(previous) = s.shown.take() {
        s.annotator.hide_popup(&previous)?;
    }
    if let Some(span) = span {
        s.annotator.show_popup(&span)?;
        s.shown = Some(span);
    }
    Ok(())
}

fn click(s: &mut ViewState, node: &Node) -> Result<()> {
    let dom = s.annotator.dom();
    let Some(button) = closest(dom, node, |n| dom.attribute(n, "data-action").is_some()) else {
        return Ok(());
    };
    let Some(action) = dom
        .attribute(&button, "data-action")
        .and_then(|raw| PopupAction::parse(&raw))
    else {
        return Ok(());
    };
    let span = s
        .annotator
        .popup_target(&button)
        .ok_or(AnnotateError::NotAnAnnotation)?;
    if action == PopupAction::Delete {
        s.shown = None;
    }
    s.annotator.popup_action(&span, action)
}
