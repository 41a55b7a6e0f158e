//! An in-memory document for headless rendering and tests.
//!
//! Painting HTML into an element registers every element with an `id`
//! attribute found in that HTML, remembering which element it was painted
//! into. Repainting an element drops everything that lived inside it,
//! listeners included. [`MemoryDom::document_html`] stitches all painted
//! content back together into one document.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::dom::{ClickHandler, Dom, InputHandler};
use crate::error::{Result, SpaError};

/// Id of the element every [`MemoryDom`] starts with.
pub const ROOT_ID: &str = "root";

/// Elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

// Patterns are literals, compiling them cannot fail.
#[allow(clippy::expect_used)]
static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(/?)([A-Za-z][A-Za-z0-9-]*)((?:[^>"']|"[^"]*"|'[^']*')*?)(/?)>"#)
        .expect("tag pattern")
});

#[allow(clippy::expect_used)]
static ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)id\s*=\s*"([^"]*)""#).expect("id pattern"));

#[allow(clippy::expect_used)]
static VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)value\s*=\s*"([^"]*)""#).expect("value pattern"));

#[derive(Debug)]
struct Element {
    tag: String,
    /// Element whose content declared this element.
    parent: Option<String>,
    /// Byte range of this element's inner HTML within the parent's content.
    span: (usize, usize),
    content: String,
    value: String,
}

#[derive(Default)]
struct DocState {
    elements: HashMap<String, Element>,
    clicks: HashMap<String, ClickHandler>,
    inputs: HashMap<String, InputHandler>,
    title: String,
}

/// An element with an id found while scanning HTML.
struct Scanned {
    id: String,
    tag: String,
    inner_start: usize,
    inner_end: Option<usize>,
    value: Option<String>,
}

/// A complete document held in memory.
pub struct MemoryDom {
    root_id: String,
    state: RefCell<DocState>,
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    /// Creates a document containing a single empty `div#root`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(ROOT_ID)
    }

    /// Creates a document whose only element has the given id.
    #[must_use]
    pub fn with_root(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let mut state = DocState::default();
        state.elements.insert(
            root_id.clone(),
            Element {
                tag: "div".to_string(),
                parent: None,
                span: (0, 0),
                content: String::new(),
                value: String::new(),
            },
        );
        Self {
            root_id,
            state: RefCell::new(state),
        }
    }

    /// Id of the document's root element.
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Returns the whole document as HTML.
    pub fn document_html(&self) -> String {
        let state = self.state.borrow();
        let inner = compose(&state, &self.root_id);
        format!(r#"<div id="{}">{inner}</div>"#, self.root_id)
    }

    /// Returns the current document title.
    pub fn title(&self) -> String {
        self.state.borrow().title.clone()
    }

    /// Returns the tag name of an element.
    pub fn tag_name(&self, id: &str) -> Option<String> {
        self.state.borrow().elements.get(id).map(|e| e.tag.clone())
    }

    /// Returns `true` if the element has a click listener.
    pub fn has_click_listener(&self, id: &str) -> bool {
        self.state.borrow().clicks.contains_key(id)
    }

    /// Simulates a click and waits for the listener to finish.
    pub async fn click(&self, id: &str) -> Result<()> {
        let handler = {
            let state = self.state.borrow();
            if !state.elements.contains_key(id) {
                return Err(SpaError::ElementNotFound(id.to_string()));
            }
            state.clicks.get(id).cloned()
        };
        let Some(handler) = handler else {
            return Err(SpaError::NoListener {
                id: id.to_string(),
                event: "click",
            });
        };
        debug!(id, "Dispatching click");
        handler().await;
        Ok(())
    }

    /// Simulates typing: sets the value of an input and notifies its listener.
    pub fn input(&self, id: &str, text: &str) -> Result<()> {
        self.set_value(id, text)?;
        let handler = self.state.borrow().inputs.get(id).cloned();
        let Some(handler) = handler else {
            return Err(SpaError::NoListener {
                id: id.to_string(),
                event: "input",
            });
        };
        handler(text.to_string());
        Ok(())
    }
}

impl Dom for MemoryDom {
    fn contains(&self, id: &str) -> bool {
        self.state.borrow().elements.contains_key(id)
    }

    fn set_inner_html(&self, id: &str, html: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.elements.contains_key(id) {
            return Err(SpaError::ElementNotFound(id.to_string()));
        }

        for gone in descendants(&state, id) {
            state.elements.remove(&gone);
            state.clicks.remove(&gone);
            state.inputs.remove(&gone);
        }

        if let Some(element) = state.elements.get_mut(id) {
            element.content = html.to_string();
        }
        register(&mut state, id, html);
        Ok(())
    }

    fn inner_html(&self, id: &str) -> Result<String> {
        let state = self.state.borrow();
        if !state.elements.contains_key(id) {
            return Err(SpaError::ElementNotFound(id.to_string()));
        }
        Ok(compose(&state, id))
    }

    fn value(&self, id: &str) -> Result<String> {
        self.state
            .borrow()
            .elements
            .get(id)
            .map(|e| e.value.clone())
            .ok_or_else(|| SpaError::ElementNotFound(id.to_string()))
    }

    fn set_value(&self, id: &str, value: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let element = state
            .elements
            .get_mut(id)
            .ok_or_else(|| SpaError::ElementNotFound(id.to_string()))?;
        element.value = value.to_string();
        Ok(())
    }

    fn on_click(&self, id: &str, handler: ClickHandler) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.elements.contains_key(id) {
            return Err(SpaError::ElementNotFound(id.to_string()));
        }
        state.clicks.insert(id.to_string(), handler);
        Ok(())
    }

    fn on_input(&self, id: &str, handler: InputHandler) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.elements.contains_key(id) {
            return Err(SpaError::ElementNotFound(id.to_string()));
        }
        state.inputs.insert(id.to_string(), handler);
        Ok(())
    }

    fn set_title(&self, title: &str) {
        self.state.borrow_mut().title = title.to_string();
    }
}

// ============================================================================
// Document bookkeeping
// ============================================================================

/// Registers the id-carrying elements of `html`, painted into `owner`.
fn register(state: &mut DocState, owner: &str, html: &str) {
    for scanned in scan(html) {
        let end = scanned.inner_end.unwrap_or(html.len());
        let content = html[scanned.inner_start..end].to_string();
        if state.elements.contains_key(&scanned.id) {
            warn!(id = %scanned.id, "Duplicate element id in painted HTML");
        }
        state.elements.insert(
            scanned.id.clone(),
            Element {
                tag: scanned.tag,
                parent: Some(owner.to_string()),
                span: (scanned.inner_start, end),
                content: content.clone(),
                value: scanned.value.map(|v| unescape(&v)).unwrap_or_default(),
            },
        );
        register(state, &scanned.id, &content);
    }
}

/// Finds the outermost elements with an id in `html`.
///
/// Elements nested inside another id-carrying element are left for the
/// recursive scan of that element's content.
fn scan(html: &str) -> Vec<Scanned> {
    let mut found: Vec<Scanned> = Vec::new();
    // Open tags, with the index into `found` for id-carrying ones
    let mut stack: Vec<(String, Option<usize>)> = Vec::new();

    for caps in TAG_RE.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let tag = caps
            .get(2)
            .map_or_else(String::new, |m| m.as_str().to_ascii_lowercase());
        let attrs = caps.get(3).map_or("", |m| m.as_str());
        let self_closing = caps.get(4).is_some_and(|m| !m.as_str().is_empty())
            || VOID_ELEMENTS.contains(&tag.as_str());

        if closing {
            if let Some(pos) = stack.iter().rposition(|(open, _)| *open == tag) {
                for (_, idx) in stack.drain(pos..) {
                    if let Some(idx) = idx {
                        found[idx].inner_end = Some(whole.start());
                    }
                }
            }
            continue;
        }

        let inside_id = stack.iter().any(|(_, idx)| idx.is_some());
        let idx = if inside_id {
            None
        } else {
            capture(&ID_RE, attrs).map(|id| {
                found.push(Scanned {
                    id,
                    tag: tag.clone(),
                    inner_start: whole.end(),
                    inner_end: None,
                    value: capture(&VALUE_RE, attrs),
                });
                found.len() - 1
            })
        };

        if self_closing {
            if let Some(idx) = idx {
                found[idx].inner_end = Some(whole.end());
            }
        } else {
            stack.push((tag, idx));
        }
    }

    found
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn unescape(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// All elements painted (directly or transitively) into `id`.
fn descendants(state: &DocState, id: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut frontier = vec![id.to_string()];
    while let Some(current) = frontier.pop() {
        for (child_id, element) in &state.elements {
            if element.parent.as_deref() == Some(current.as_str()) {
                result.push(child_id.clone());
                frontier.push(child_id.clone());
            }
        }
    }
    result
}

/// Returns the content of `id` with every nested element's current content
/// spliced in.
fn compose(state: &DocState, id: &str) -> String {
    let Some(element) = state.elements.get(id) else {
        return String::new();
    };

    let mut children: Vec<(&String, &Element)> = state
        .elements
        .iter()
        .filter(|(_, e)| e.parent.as_deref() == Some(id))
        .collect();
    children.sort_by_key(|(_, e)| e.span.0);

    let content = &element.content;
    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for (child_id, child) in children {
        let (start, end) = child.span;
        if start < cursor || end > content.len() {
            continue;
        }
        out.push_str(&content[cursor..start]);
        out.push_str(&compose(state, child_id));
        cursor = end;
    }
    out.push_str(&content[cursor..]);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::dom::click_handler;

    #[test]
    fn test_paint_registers_nested_elements() {
        let dom = MemoryDom::new();
        dom.set_inner_html(
            ROOT_ID,
            r#"<div id="a"><span id="b">hi</span></div><p id="c"></p>"#,
        )
        .unwrap();

        assert!(dom.contains("a"));
        assert!(dom.contains("b"));
        assert!(dom.contains("c"));
        assert_eq!(dom.tag_name("b").as_deref(), Some("span"));
        assert_eq!(dom.inner_html("a").unwrap(), r#"<span id="b">hi</span>"#);
    }

    #[test]
    fn test_missing_element_is_an_error() {
        let dom = MemoryDom::new();
        let err = dom.set_inner_html("nope", "<p></p>").unwrap_err();
        assert!(matches!(err, SpaError::ElementNotFound(id) if id == "nope"));
    }

    #[test]
    fn test_repaint_drops_nested_elements_and_listeners() {
        let dom = MemoryDom::new();
        dom.set_inner_html(ROOT_ID, r#"<div id="a"><button id="btn">Go</button></div>"#)
            .unwrap();
        dom.on_click("btn", click_handler(|| async {})).unwrap();
        assert!(dom.has_click_listener("btn"));

        dom.set_inner_html("a", "<p>replaced</p>").unwrap();
        assert!(!dom.contains("btn"));
        assert!(!dom.has_click_listener("btn"));
        assert!(dom.contains("a"));
    }

    #[test]
    fn test_document_html_splices_painted_children() {
        let dom = MemoryDom::new();
        dom.set_inner_html(ROOT_ID, r#"<h1>T</h1><div id="slot">loading</div><p>end</p>"#)
            .unwrap();
        dom.set_inner_html("slot", r#"<ul id="list"></ul>"#).unwrap();
        dom.set_inner_html("list", "<li>one</li>").unwrap();

        assert_eq!(
            dom.document_html(),
            r#"<div id="root"><h1>T</h1><div id="slot"><ul id="list"><li>one</li></ul></div><p>end</p></div>"#
        );
    }

    #[test]
    fn test_input_value_from_markup_and_events() {
        let dom = MemoryDom::new();
        dom.set_inner_html(ROOT_ID, r#"<input id="f" type="text" value="a &amp; b">"#)
            .unwrap();
        assert_eq!(dom.value("f").unwrap(), "a & b");

        let seen = Rc::new(RefCell::new(String::new()));
        let sink = Rc::clone(&seen);
        dom.on_input("f", Rc::new(move |v: String| *sink.borrow_mut() = v))
            .unwrap();
        dom.input("f", "typed").unwrap();

        assert_eq!(dom.value("f").unwrap(), "typed");
        assert_eq!(*seen.borrow(), "typed");
    }

    #[tokio::test]
    async fn test_click_runs_listener() {
        let dom = MemoryDom::new();
        dom.set_inner_html(ROOT_ID, r#"<button id="b"></button>"#).unwrap();
        let clicks = Rc::new(Cell::new(0));
        let counter = Rc::clone(&clicks);
        dom.on_click(
            "b",
            click_handler(move || {
                let counter = Rc::clone(&counter);
                async move { counter.set(counter.get() + 1) }
            }),
        )
        .unwrap();

        dom.click("b").await.unwrap();
        dom.click("b").await.unwrap();
        assert_eq!(clicks.get(), 2);

        let err = dom.click("root").await.unwrap_err();
        assert!(matches!(err, SpaError::NoListener { .. }));
    }

    #[test]
    fn test_unclosed_and_self_closing_elements() {
        let dom = MemoryDom::new();
        dom.set_inner_html(ROOT_ID, r#"<br id="x"/><div id="open"><i>text"#)
            .unwrap();
        assert!(dom.contains("x"));
        assert_eq!(dom.inner_html("open").unwrap(), "<i>text");
    }
}
