//! Browser DOM layer for weaver annotations.
//!
//! This crate runs the annotation overlay against the live DOM. It assumes a
//! `wasm32-unknown-unknown` target environment.
//!
//! # Architecture
//!
//! - `dom`: `DomTree` over `web_sys::Node`, UTF-16 offsets
//! - `layout`: client rects and scrolling
//! - `timers`: `Scheduler` on `setTimeout`
//! - `selection`: shadow-root aware selection reading and restoring
//! - `listeners`: selection, popup and command listener groups
//! - `events`: `CustomEvent` payloads in both directions
//! - `view`: `AnnotateView`, the live overlay tying it all together
//!
//! # Re-exports
//!
//! This crate re-exports `weaver-annotate-core` for convenience, so consumers
//! only need to depend on `weaver-annotate-browser`.

// Re-export core crate
pub use weaver_annotate_core;
pub use weaver_annotate_core::*;

pub mod dom;
pub mod events;
pub mod layout;
pub mod listeners;
pub mod selection;
pub mod timers;
pub mod view;

pub use dom::BrowserDom;
pub use events::{command_of, dispatch_event, event_detail};
pub use layout::BrowserLayout;
pub use selection::{apply_selection, live_selection};
pub use timers::BrowserScheduler;
pub use view::{AnnotateView, BrowserAnnotator};
