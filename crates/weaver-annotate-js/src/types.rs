//! Types exposed to JavaScript via wasm-bindgen.

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;
use wasm_bindgen::prelude::*;

use weaver_annotate_core::{Rect, SearchMatch};

/// One search hit.
///
/// On the JS side the object also carries `textNode`, the text node the match
/// was found in, and the external key under the configured key name.
#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct JsSearchMatch {
    pub annotated: bool,
    pub context: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub kwic: String,
    #[tsify(type = "unknown")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<serde_json::Value>,
}

impl JsSearchMatch {
    pub fn from_match<N>(m: &SearchMatch<N>) -> Self {
        Self {
            annotated: m.annotated,
            context: m.context.to_string(),
            start: m.start,
            end: m.end,
            kwic: m.kwic.clone(),
            key: m.key.clone(),
        }
    }

    pub fn into_match<N>(self, text_node: N) -> SearchMatch<N> {
        SearchMatch {
            annotated: self.annotated,
            context: self.context.into(),
            start: self.start,
            end: self.end,
            kwic: self.kwic,
            key: self.key,
            text_node,
        }
    }
}

/// Rectangle relative to the view root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct JsRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Rect> for JsRect {
    fn from(rect: Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}
