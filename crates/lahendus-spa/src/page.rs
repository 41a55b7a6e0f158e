//! Pages and navigation.
//!
//! A [`Page`] is bound to a path schema such as
//! `/courses/{courseId}/exercises`. The [`PageManager`] keeps a history of
//! visited paths, picks the page matching the current path and builds it.
//! Each history entry remembers the state string the page returned from its
//! last build, so going back can restore a page without refetching.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, error, info, instrument};

use crate::env::Env;
use crate::error::{Result, SpaError};
use crate::slot::StateCallback;

// ============================================================================
// Path schemas
// ============================================================================

/// A path pattern with `{name}` placeholders.
#[derive(Debug, Clone)]
pub struct PathSchema {
    schema: String,
    regex: Regex,
    names: Vec<String>,
}

impl PathSchema {
    /// Compiles a schema such as `/courses/{courseId}/participants`.
    ///
    /// Placeholders match one path segment. A trailing slash and a query
    /// string are tolerated when matching.
    pub fn new(schema: &str) -> Result<Self> {
        let mut pattern = String::from("^");
        let mut names = Vec::new();
        let mut rest = schema;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                return Err(SpaError::Page(format!(
                    "Unclosed placeholder in path schema '{schema}'"
                )));
            };
            pattern.push_str(&regex::escape(&rest[..open]));
            pattern.push_str("([^/?#]+)");
            names.push(rest[open + 1..close].to_string());
            rest = &rest[close + 1..];
        }
        pattern.push_str(&regex::escape(rest.trim_end_matches('/')));
        pattern.push_str("/?$");

        let regex = Regex::new(&pattern)
            .map_err(|e| SpaError::Page(format!("Invalid path schema '{schema}': {e}")))?;
        Ok(Self {
            schema: schema.to_string(),
            regex,
            names,
        })
    }

    /// The schema string.
    pub fn as_str(&self) -> &str {
        &self.schema
    }

    /// Returns `true` if the path matches this schema.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(strip_query(path))
    }

    /// Extracts placeholder values from a matching path.
    pub fn params(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(strip_query(path))?;
        Some(
            self.names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    caps.get(i + 1)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }

    /// Builds a concrete path by substituting placeholders.
    pub fn link(&self, params: &[(&str, &str)]) -> String {
        params.iter().fold(self.schema.clone(), |path, (name, value)| {
            path.replace(&format!("{{{name}}}"), value)
        })
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

// ============================================================================
// Pages
// ============================================================================

/// Shared flag used by root components to request a page rebuild.
#[derive(Debug, Clone, Default)]
pub struct RebuildHandle(Rc<Cell<bool>>);

impl RebuildHandle {
    /// Requests a rebuild of the current page.
    pub fn request(&self) {
        self.0.set(true);
    }

    /// Returns `true` if a rebuild has been requested.
    pub fn is_requested(&self) -> bool {
        self.0.get()
    }

    fn take(&self) -> bool {
        self.0.replace(false)
    }

    /// A state-change callback that requests a rebuild.
    pub fn callback(&self) -> StateCallback {
        let handle = self.clone();
        Rc::new(move || {
            debug!("Page rebuild requested");
            handle.request();
        })
    }
}

/// Everything a page needs to build itself for one path.
#[derive(Debug, Clone)]
pub struct PageContext {
    /// The full path being built.
    pub path: String,
    /// Placeholder values from the page's path schema.
    pub params: HashMap<String, String>,
    /// State stored by this page's previous build of this history entry.
    pub state: Option<String>,
    rebuild: RebuildHandle,
}

impl PageContext {
    /// Returns a placeholder value.
    pub fn param(&self, name: &str) -> Result<&str> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SpaError::Page(format!("Missing path parameter '{name}'")))
    }

    /// Handle for requesting a rebuild of this page.
    pub const fn rebuild_handle(&self) -> &RebuildHandle {
        &self.rebuild
    }
}

/// A top-level view bound to a path schema.
#[async_trait(?Send)]
pub trait Page {
    /// Human-readable page name, used in logs.
    fn name(&self) -> &str;

    /// The path schema this page is served at.
    fn path_schema(&self) -> &PathSchema;

    /// Builds the page. Returns a state string to remember in history, if any.
    async fn build(&mut self, env: &Env, ctx: PageContext) -> Result<Option<String>>;

    /// Tears the page down before another page is built.
    fn clear(&mut self, _env: &Env) -> Result<()> {
        Ok(())
    }
}

/// How a page update ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page was built.
    Built,
    /// No page matches the path.
    NotFound,
    /// The build stopped because a fetch was aborted or its error handled.
    Abandoned,
    /// The build failed and the broken-page view was shown.
    Broken(String),
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    path: String,
    state: Option<String>,
}

type EnvHook = Box<dyn Fn(&Env)>;
type NotFoundHandler = Box<dyn Fn(&Env, &str) -> Result<()>>;
type BrokenHandler = Box<dyn Fn(&Env, &SpaError) -> Result<()>>;

/// Routes paths to pages and keeps navigation history.
pub struct PageManager {
    env: Env,
    pages: Vec<Box<dyn Page>>,
    history: Vec<HistoryEntry>,
    active: Option<usize>,
    rebuild: RebuildHandle,
    pre_update: Option<EnvHook>,
    not_found: Option<NotFoundHandler>,
    broken: Option<BrokenHandler>,
}

impl fmt::Debug for PageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageManager")
            .field("pages", &self.pages.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("history", &self.history)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl PageManager {
    /// Creates a manager without pages.
    pub fn new(env: Env) -> Self {
        Self {
            env,
            pages: Vec::new(),
            history: Vec::new(),
            active: None,
            rebuild: RebuildHandle::default(),
            pre_update: None,
            not_found: None,
            broken: None,
        }
    }

    /// The rendering environment.
    pub const fn env(&self) -> &Env {
        &self.env
    }

    /// Registers a page. Earlier registrations win when schemas overlap.
    pub fn register(&mut self, page: Box<dyn Page>) {
        debug!(page = page.name(), schema = page.path_schema().as_str(), "Registering page");
        self.pages.push(page);
    }

    /// Installs a hook run before every page update.
    pub fn set_pre_update_hook(&mut self, hook: impl Fn(&Env) + 'static) {
        self.pre_update = Some(Box::new(hook));
    }

    /// Installs the handler painting the view for unknown paths.
    pub fn set_not_found_handler(&mut self, handler: impl Fn(&Env, &str) -> Result<()> + 'static) {
        self.not_found = Some(Box::new(handler));
    }

    /// Installs the handler painting the fallback view for failed builds.
    pub fn set_broken_page_handler(
        &mut self,
        handler: impl Fn(&Env, &SpaError) -> Result<()> + 'static,
    ) {
        self.broken = Some(Box::new(handler));
    }

    /// Handle root components use to request a page rebuild.
    pub fn rebuild_handle(&self) -> RebuildHandle {
        self.rebuild.clone()
    }

    /// The path of the current history entry.
    pub fn current_path(&self) -> Option<&str> {
        self.history.last().map(|e| e.path.as_str())
    }

    /// The stored state of the current history entry.
    pub fn current_state(&self) -> Option<&str> {
        self.history.last().and_then(|e| e.state.as_deref())
    }

    /// Number of history entries.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Name of the page currently shown.
    pub fn active_page(&self) -> Option<&str> {
        self.active.map(|i| self.pages[i].name())
    }

    /// Pushes a history entry for `path` and builds it.
    pub async fn navigate(&mut self, path: &str) -> Result<PageOutcome> {
        info!(path, "Navigating");
        self.history.push(HistoryEntry {
            path: path.to_string(),
            state: None,
        });
        self.update_page().await
    }

    /// Returns to the previous history entry and rebuilds it with its stored state.
    ///
    /// Returns `None` if there is nothing to go back to.
    pub async fn back(&mut self) -> Result<Option<PageOutcome>> {
        if self.history.len() < 2 {
            return Ok(None);
        }
        self.history.pop();
        self.update_page().await.map(Some)
    }

    /// Rebuilds the current page if a root component requested it.
    pub async fn rebuild_if_requested(&mut self) -> Result<Option<PageOutcome>> {
        if !self.rebuild.take() {
            return Ok(None);
        }
        self.update_page().await.map(Some)
    }

    /// Builds the page for the current history entry.
    ///
    /// Aborted fetches and handled fetch errors end the build quietly. Any
    /// other failure is logged and the broken-page view painted; only a
    /// failure of that handler itself is returned as an error.
    #[instrument(level = "debug", skip_all)]
    pub async fn update_page(&mut self) -> Result<PageOutcome> {
        let Some(entry) = self.history.last().cloned() else {
            return Ok(PageOutcome::NotFound);
        };

        if let Some(hook) = &self.pre_update {
            hook(&self.env);
        }

        let next = self
            .pages
            .iter()
            .position(|p| p.path_schema().matches(&entry.path));

        if let Some(active) = self.active {
            if Some(active) != next {
                self.pages[active].clear(&self.env)?;
            }
        }
        self.active = next;

        let Some(index) = next else {
            info!(path = %entry.path, "No page matches path");
            if let Some(handler) = &self.not_found {
                handler(&self.env, &entry.path)?;
            }
            return Ok(PageOutcome::NotFound);
        };

        let page = &mut self.pages[index];
        let ctx = PageContext {
            params: page
                .path_schema()
                .params(&entry.path)
                .unwrap_or_default(),
            path: entry.path.clone(),
            state: entry.state.clone(),
            rebuild: self.rebuild.clone(),
        };

        match page.build(&self.env, ctx).await {
            Ok(state) => {
                if let Some(last) = self.history.last_mut() {
                    if state.is_some() {
                        last.state = state;
                    }
                }
                Ok(PageOutcome::Built)
            }
            Err(e) if e.is_aborted() || e.is_handled() => {
                debug!(page = page.name(), error = %e, "Page build abandoned");
                Ok(PageOutcome::Abandoned)
            }
            Err(e) => {
                error!(page = page.name(), error = %e, "Page build failed");
                if let Some(handler) = &self.broken {
                    handler(&self.env, &e)?;
                }
                Ok(PageOutcome::Broken(e.to_string()))
            }
        }
    }
}
