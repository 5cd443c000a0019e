//! Reading and restoring the live selection of a view.
//!
//! A view rendered into a shadow root has its own selection, reachable only
//! through the non-standard `ShadowRoot.getSelection()`. Where that is not
//! available the window selection is used, and ownership is decided by the
//! root node of the selection's anchor.

use wasm_bindgen::JsCast;
use web_sys::{Node, Selection};

use weaver_annotate_core::{DomRange, LiveSelection, Result};

use crate::dom::BrowserDom;

/// Selection object responsible for `scope` (a shadow root or a document).
pub fn scope_selection(scope: &Node) -> Option<Selection> {
    let from_scope = js_sys::Reflect::get(scope, &"getSelection".into())
        .ok()
        .and_then(|f| f.dyn_into::<js_sys::Function>().ok())
        .and_then(|f| f.call0(scope).ok())
        .and_then(|s| s.dyn_into::<Selection>().ok());
    if from_scope.is_some() {
        return from_scope;
    }
    web_sys::window()?.get_selection().ok().flatten()
}

/// The live selection as seen from `scope`.
pub fn live_selection(scope: &Node) -> LiveSelection<Node> {
    let Some(selection) = scope_selection(scope) else {
        return LiveSelection::Empty;
    };
    if selection.range_count() == 0 {
        return LiveSelection::Empty;
    }
    let Some(anchor) = selection.anchor_node() else {
        return LiveSelection::Empty;
    };
    if anchor.get_root_node() != *scope {
        return LiveSelection::Foreign;
    }
    let Ok(range) = selection.get_range_at(0) else {
        return LiveSelection::Empty;
    };
    if range.collapsed() {
        return LiveSelection::Empty;
    }
    match BrowserDom::from_range(&range) {
        Ok(range) => LiveSelection::Range(range),
        Err(e) => {
            tracing::debug!(target: "weaver::annotate", error = %e, "unreadable selection range");
            LiveSelection::Empty
        }
    }
}

/// Replace the selection of `scope` with `range`.
pub fn apply_selection(dom: &BrowserDom, scope: &Node, range: &DomRange<Node>) -> Result<()> {
    let selection = scope_selection(scope).ok_or("no selection object")?;
    let live = dom.to_range(range)?;
    selection
        .remove_all_ranges()
        .map_err(|e| format!("remove_all_ranges failed: {:?}", e))?;
    selection
        .add_range(&live)
        .map_err(|e| format!("add_range failed: {:?}", e))?;
    Ok(())
}
