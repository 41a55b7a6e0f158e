//! Document title.
//!
//! Formats, most specific first:
//!
//! ```text
//! Lahendus
//! Page title - Lahendus
//! Course title - Lahendus
//! Page title - Course title - Lahendus
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use lahendus_spa::Env;

/// Parts of the title that change between pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleSpec {
    /// Title of the current page.
    pub page_title: Option<String>,
    /// Title of the enclosing entity, usually a course.
    pub parent_page_title: Option<String>,
}

/// Shared handle for updating the document title.
#[derive(Debug, Clone)]
pub struct Title {
    app_name: Rc<str>,
    spec: Rc<RefCell<TitleSpec>>,
}

impl Title {
    /// Creates a title showing only the app name.
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.into(),
            spec: Rc::default(),
        }
    }

    /// Replaces the whole spec.
    pub fn replace(&self, env: &Env, spec: TitleSpec) {
        *self.spec.borrow_mut() = spec;
        self.refresh(env);
    }

    /// Edits the current spec in place.
    pub fn update(&self, env: &Env, updater: impl FnOnce(&mut TitleSpec)) {
        updater(&mut *self.spec.borrow_mut());
        self.refresh(env);
    }

    /// The title for the current spec.
    pub fn text(&self) -> String {
        let spec = self.spec.borrow();
        [
            spec.page_title.as_deref(),
            spec.parent_page_title.as_deref(),
            Some(&*self.app_name),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" - ")
    }

    fn refresh(&self, env: &Env) {
        env.dom().set_title(&self.text());
    }
}

#[cfg(test)]
mod tests {
    use lahendus_spa::MemoryDom;

    use super::*;
    use crate::templates::Templates;

    #[test]
    fn test_title_formats() {
        let dom = Rc::new(MemoryDom::new());
        let env = Env::new(dom.clone(), Rc::new(Templates::new()));
        let title = Title::new("Lahendus");
        assert_eq!(title.text(), "Lahendus");

        title.update(&env, |spec| {
            spec.parent_page_title = Some("Programming".to_string());
        });
        assert_eq!(dom.title(), "Programming - Lahendus");

        title.update(&env, |spec| spec.page_title = Some("Participants".to_string()));
        assert_eq!(dom.title(), "Participants - Programming - Lahendus");

        title.replace(&env, TitleSpec::default());
        assert_eq!(dom.title(), "Lahendus");
    }
}
