//! Shared rendering environment.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::dom::Dom;
use crate::error::Result;
use crate::template::TemplateEngine;

/// Generates unique element ids of the form `ez-<n>`.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: Rc<Cell<u64>>,
}

impl IdGenerator {
    /// Returns the next unused id.
    pub fn next_id(&self) -> String {
        let n = self.next.get();
        self.next.set(n + 1);
        format!("ez-{n}")
    }
}

/// Everything a component needs to paint itself.
///
/// Cloning is cheap; all clones share the same document, templates and id
/// sequence.
#[derive(Clone)]
pub struct Env {
    dom: Rc<dyn Dom>,
    templates: Rc<dyn TemplateEngine>,
    ids: IdGenerator,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env").field("ids", &self.ids).finish_non_exhaustive()
    }
}

impl Env {
    /// Creates an environment over a document and a template engine.
    pub fn new(dom: Rc<dyn Dom>, templates: Rc<dyn TemplateEngine>) -> Self {
        Self {
            dom,
            templates,
            ids: IdGenerator::default(),
        }
    }

    /// The document.
    pub fn dom(&self) -> &dyn Dom {
        self.dom.as_ref()
    }

    /// The template engine.
    pub fn templates(&self) -> &dyn TemplateEngine {
        self.templates.as_ref()
    }

    /// Renders a named template.
    pub fn render(&self, name: &str, values: &Value) -> Result<String> {
        self.templates.render(name, values)
    }

    /// Returns a fresh element id.
    pub fn next_id(&self) -> String {
        self.ids.next_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_shared_between_clones() {
        let ids = IdGenerator::default();
        let other = ids.clone();
        assert_eq!(ids.next_id(), "ez-0");
        assert_eq!(other.next_id(), "ez-1");
        assert_eq!(ids.next_id(), "ez-2");
    }
}
