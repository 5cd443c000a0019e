//! Annotator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::Result;

/// Tunables for an annotator instance.
///
/// Every field has a default, so an empty JSON object is a valid
/// configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnnotatorConfig {
    /// Property name carrying the external key of an annotation.
    pub key: SmolStr,
    /// Attribute marking anchor containers.
    pub container_attribute: SmolStr,
    /// Pattern on `href` identifying nodes excluded from offset counting.
    pub skip_href_pattern: String,
    /// Tag of popover elements whose containers are never render targets.
    pub popover_tag: SmolStr,
    pub mouse_delay_ms: u64,
    pub input_delay_ms: u64,
    pub reapply_delay_ms: u64,
    pub marker_height: f64,
    pub marker_margin_step: f64,
    /// Words of context on each side of a search match.
    pub kwic_words: usize,
    /// Minimum parent text length before the snippet widens to the grandparent.
    pub kwic_min_context: usize,
    /// Vertical lift of the scroll-to highlight.
    pub highlight_offset: f64,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            key: SmolStr::new_static("ref"),
            container_attribute: SmolStr::new_static("data-tei"),
            skip_href_pattern: "^#fn_.*$".to_string(),
            popover_tag: SmolStr::new_static("pb-popover"),
            mouse_delay_ms: 10,
            input_delay_ms: 100,
            reapply_delay_ms: 100,
            marker_height: 3.0,
            marker_margin_step: 5.0,
            kwic_words: 3,
            kwic_min_context: 40,
            highlight_offset: 4.0,
        }
    }
}

impl AnnotatorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn mouse_delay(&self) -> Duration {
        Duration::from_millis(self.mouse_delay_ms)
    }

    pub fn input_delay(&self) -> Duration {
        Duration::from_millis(self.input_delay_ms)
    }

    pub fn reapply_delay(&self) -> Duration {
        Duration::from_millis(self.reapply_delay_ms)
    }
}
