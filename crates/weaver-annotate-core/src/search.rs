//! Token search over the rendered view.
//!
//! Matches are reported as logical positions with a keyword-in-context
//! snippet, so that a host can list them, check whether they already carry
//! an annotation, and later scroll to them.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::AnnotatorConfig;
use crate::dom::{DomPoint, DomTree, closest, next_in_order, next_skipping_children, text_nodes};
use crate::error::{AnnotateError, Result};
use crate::markers::{POPUP_CLASS, in_popup};
use crate::offset_map::{BoundaryPolicy, OffsetMapper};
use crate::types::{AnnotationData, ContainerId};

static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{P}\s]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// One search hit.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchMatch<N> {
    /// The match sits inside an annotation of the requested type.
    pub annotated: bool,
    pub context: ContainerId,
    pub start: usize,
    pub end: usize,
    pub kwic: String,
    /// External key property of the enclosing annotation, if any.
    pub key: Option<serde_json::Value>,
    pub text_node: N,
}

/// Build a case-insensitive alternation of the tokens.
///
/// Each token is a phrase: its words are matched literally, separated by any
/// run of whitespace, and anchored at word boundaries. Returns `None` when no
/// token has any words.
pub fn build_pattern<S: AsRef<str>>(tokens: &[S]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = tokens
        .iter()
        .filter_map(|token| {
            let words: Vec<String> = WHITESPACE
                .split(token.as_ref().trim())
                .filter(|w| !w.is_empty())
                .map(regex::escape)
                .collect();
            (!words.is_empty()).then(|| format!(r"\b{}\b", words.join(r"\s+")))
        })
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    Ok(Some(Regex::new(&format!("(?i){}", alternatives.join("|")))?))
}

fn is_separator(c: char) -> bool {
    let mut buf = [0; 4];
    SEPARATOR.is_match(c.encode_utf8(&mut buf))
}

/// Snippet of `text` around the chars `start..end`, with up to `words`
/// words of context on each side and the match wrapped in `<mark>`.
pub fn kwic_text(text: &str, start: usize, end: usize, words: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let start = start.min(len);
    let end = end.clamp(start, len);

    let mut left = start as isize - 1;
    let mut count = 0;
    while left >= 0 {
        if is_separator(chars[left as usize]) {
            while left > 1 && is_separator(chars[left as usize - 1]) {
                left -= 1;
            }
            count += 1;
            if count == words {
                break;
            }
        }
        left -= 1;
    }
    let left = left.max(0) as usize;

    let mut right = end + 1;
    count = 0;
    while right < len {
        if is_separator(chars[right]) {
            while right + 1 < len && is_separator(chars[right + 1]) {
                right += 1;
            }
            count += 1;
            if count == words {
                break;
            }
        }
        right += 1;
    }
    let right = (right + 1).min(len);

    let slice = |a: usize, b: usize| chars[a..b].iter().collect::<String>();
    format!(
        "... {}<mark>{}</mark>{} ...",
        slice(left, start),
        slice(start, end),
        slice(end, right)
    )
}

/// Text surrounding `node` for the snippet, and the char offset of `node`'s
/// text within it.
///
/// Uses the parent element, or the grandparent when the parent holds fewer
/// than `min_context` chars. Text inside popups is left out.
pub fn collect_text<D: DomTree>(dom: &D, node: &D::Node, min_context: usize) -> (String, usize) {
    let Some(mut scope) = dom.parent(node) else {
        return (dom.text(node), 0);
    };
    let visible = |scope: &D::Node| -> Vec<D::Node> {
        text_nodes(dom, scope)
            .into_iter()
            .filter(|n| !in_popup(dom, n))
            .collect()
    };
    let parent_len: usize = visible(&scope)
        .iter()
        .map(|n| dom.text(n).chars().count())
        .sum();
    if parent_len < min_context {
        if let Some(grandparent) = dom.parent(&scope) {
            scope = grandparent;
        }
    }

    let mut out = String::new();
    let mut start = 0;
    let mut position = 0;
    for text in visible(&scope) {
        let content = dom.text(&text);
        if &text == node {
            start = position;
        }
        position += content.chars().count();
        out.push_str(&content);
    }
    (out, start)
}

/// Search the text under `root` for `tokens`.
///
/// Popup subtrees are skipped. A match counts as annotated when the nearest
/// element carrying annotation data is of type `kind`.
pub fn search<D: DomTree, S: AsRef<str>>(
    dom: &D,
    root: &D::Node,
    mapper: &OffsetMapper,
    config: &AnnotatorConfig,
    kind: &str,
    tokens: &[S],
) -> Result<Vec<SearchMatch<D::Node>>> {
    let Some(pattern) = build_pattern(tokens)? else {
        return Ok(Vec::new());
    };

    let mut results = Vec::new();
    let mut current = next_in_order(dom, root, root);
    while let Some(node) = current {
        if dom.is_element(&node) && dom.has_class(&node, POPUP_CLASS) {
            current = next_skipping_children(dom, root, &node);
            continue;
        }
        current = next_in_order(dom, root, &node);
        if !dom.is_text(&node) {
            continue;
        }

        let text = dom.text(&node);
        for found in pattern.find_iter(&text) {
            match match_at(dom, mapper, config, kind, &node, &text, found.start(), found.end()) {
                Ok(m) => results.push(m),
                Err(AnnotateError::NotInContainer) => {
                    tracing::debug!(target: "weaver::annotate", text = found.as_str(), "search match outside any container");
                }
                Err(e) => return Err(e),
            }
        }
    }
    tracing::debug!(target: "weaver::annotate", kind, matches = results.len(), "search finished");
    Ok(results)
}

#[allow(clippy::too_many_arguments)]
fn match_at<D: DomTree>(
    dom: &D,
    mapper: &OffsetMapper,
    config: &AnnotatorConfig,
    kind: &str,
    node: &D::Node,
    text: &str,
    byte_start: usize,
    byte_end: usize,
) -> Result<SearchMatch<D::Node>> {
    let unit_start = dom.measure(&text[..byte_start]);
    let unit_end = dom.measure(&text[..byte_end]);
    let start = mapper.to_logical(dom, &DomPoint::new(node.clone(), unit_start), BoundaryPolicy::Start)?;
    let end = mapper.to_logical(dom, &DomPoint::new(node.clone(), unit_end), BoundaryPolicy::End)?;

    let data = closest(dom, node, |n| dom.attribute(n, "data-annotation").is_some())
        .and_then(|el| AnnotationData::parse(dom.attribute(&el, "data-annotation").as_deref()));
    let (annotated, key) = match &data {
        Some(data) => (
            data.kind.as_deref() == Some(kind),
            data.property(&config.key).cloned(),
        ),
        None => (false, None),
    };

    let (context_text, offset) = collect_text(dom, node, config.kwic_min_context);
    let char_start = offset + text[..byte_start].chars().count();
    let char_end = offset + text[..byte_end].chars().count();

    Ok(SearchMatch {
        annotated,
        context: start.container,
        start: start.offset,
        end: end.offset,
        kwic: kwic_text(&context_text, char_start, char_end, config.kwic_words),
        key,
        text_node: node.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDom;

    fn run(markup: &str, kind: &str, tokens: &[&str]) -> Vec<SearchMatch<crate::memory::NodeHandle>> {
        let dom = MemoryDom::from_markup(markup).unwrap();
        search(
            &dom,
            &dom.root(),
            &OffsetMapper::default(),
            &AnnotatorConfig::default(),
            kind,
            tokens,
        )
        .unwrap()
    }

    #[test]
    fn test_single_match_with_kwic() {
        let results = run(r#"<div><p data-tei="p1">The quick brown fox</p></div>"#, "hi", &["quick"]);
        assert_eq!(results.len(), 1);
        let m = &results[0];
        assert_eq!((m.context.as_str(), m.start, m.end), ("p1", 4, 9));
        assert!(!m.annotated);
        assert_eq!(m.kwic, "... The <mark>quick</mark> brown fox ...");
    }

    #[test]
    fn test_phrases_are_case_insensitive_and_whitespace_tolerant() {
        let results = run(
            r#"<div><p data-tei="p1">Quick  Brown fox, quick brown dog.</p></div>"#,
            "hi",
            &["quick brown", "  "],
        );
        let spans: Vec<_> = results.iter().map(|m| (m.start, m.end)).collect();
        assert_eq!(spans, vec![(0, 12), (18, 29)]);
    }

    #[test]
    fn test_tokens_are_literal() {
        assert!(build_pattern::<&str>(&[]).unwrap().is_none());
        let pattern = build_pattern(&["a.c"]).unwrap().unwrap();
        assert!(pattern.is_match("x a.c y"));
        assert!(!pattern.is_match("x abc y"));
    }

    #[test]
    fn test_annotated_matches_carry_key() {
        let markup = r#"<div><p data-tei="p1">Meet <span class="annotation annotation-person person" data-annotation='{"type":"person","properties":{"ref":"P1"}}'>Alice</span> and Alice.</p><div class="annotation-popup" hidden=""><div class="info">Alice</div></div></div>"#;
        let results = run(markup, "person", &["alice"]);
        assert_eq!(results.len(), 2);
        assert!(results[0].annotated);
        assert_eq!(results[0].key, Some(serde_json::json!("P1")));
        assert_eq!((results[0].start, results[0].end), (5, 10));
        assert!(!results[1].annotated);
        assert_eq!((results[1].start, results[1].end), (15, 20));
    }

    #[test]
    fn test_kwic_leaves_out_popup_text() {
        let markup = r#"<div><p data-tei="p1">Meet Alice.</p><div class="annotation-popup" hidden=""><div class="info">Person Alice</div><span class="annotation-type">person</span></div></div>"#;
        let results = run(markup, "person", &["alice"]);
        assert_eq!(results.len(), 1);
        insta::assert_snapshot!(results[0].kwic, @"... Meet <mark>Alice</mark>. ...");
    }

    #[test]
    fn test_matches_outside_containers_are_skipped() {
        let results = run(r#"<div><h1>fox</h1><p data-tei="p1">fox</p></div>"#, "hi", &["fox"]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].context, "p1");
    }

    #[test]
    fn test_kwic_limits_context_words() {
        let text = "one two three four five six seven eight nine";
        let start = text.find("five").unwrap();
        insta::assert_snapshot!(
            kwic_text(text, start, start + 4, 2),
            @"...  four <mark>five</mark> six seven  ..."
        );
    }
}
