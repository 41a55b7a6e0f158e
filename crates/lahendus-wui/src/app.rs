//! Application bootstrap.

use std::rc::Rc;

use lahendus_spa::{values, Env, Fetcher, PageManager, PageOutcome, Result, ROOT_ID};
use tracing::{info, warn};

use crate::api::EmsClient;
use crate::notify::{show_message_or_log, MessageKind};
use crate::pages::{CourseExercisesPage, ParticipantsPage};
use crate::session::Session;
use crate::templates::CONTENT_CONTAINER_ID;
use crate::title::{Title, TitleSpec};

/// Message shown for request failures nothing else handled.
const UNHANDLED_ERROR_MESSAGE: &str = "Something went wrong. Try again or reload the page.";

/// The whole UI: static chrome plus routed pages.
pub struct App {
    env: Env,
    manager: PageManager,
    api: EmsClient,
    title: Title,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("manager", &self.manager)
            .field("session", self.api.session())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Paints the static chrome into the root element and registers pages.
    pub fn new(env: Env, fetcher: Fetcher, session: Session, app_name: &str) -> Result<Self> {
        info!(user = %session.user_id, role = %session.role, "Starting app");

        let statics = env.render(
            "tm-statics",
            &values([
                ("appName", app_name.into()),
                ("userId", session.user_id.clone().into()),
                ("role", session.role.as_str().into()),
            ]),
        )?;
        env.dom().set_inner_html(ROOT_ID, &statics)?;

        let title = Title::new(app_name);
        title.replace(&env, TitleSpec::default());

        let hook_env = env.clone();
        fetcher.set_on_unhandled(Rc::new(move |err| {
            warn!(error = %err, "Showing unhandled request failure");
            show_message_or_log(&hook_env, MessageKind::Error, UNHANDLED_ERROR_MESSAGE);
        }));

        let api = EmsClient::new(fetcher.clone(), session);
        let mut manager = PageManager::new(env.clone());
        manager.register(Box::new(ParticipantsPage::new(api.clone(), title.clone())?));
        manager.register(Box::new(CourseExercisesPage::new(api.clone(), title.clone())?));

        let hook_title = title.clone();
        manager.set_pre_update_hook(move |env| {
            fetcher.abort_all();
            hook_title.replace(env, TitleSpec::default());
            let painted = env
                .render("tm-loading-placeholders", &values([]))
                .and_then(|html| env.dom().set_inner_html(CONTENT_CONTAINER_ID, &html));
            if let Err(e) = painted {
                warn!(error = %e, "Failed to paint loading placeholders");
            }
        });
        manager.set_not_found_handler(|env, path| {
            let html = env.render("tm-not-found", &values([("path", path.into())]))?;
            env.dom().set_inner_html(CONTENT_CONTAINER_ID, &html)
        });
        manager.set_broken_page_handler(|env, err| {
            let html = env.render("tm-broken-page", &values([("detail", err.to_string().into())]))?;
            env.dom().set_inner_html(CONTENT_CONTAINER_ID, &html)
        });

        Ok(Self {
            env,
            manager,
            api,
            title,
        })
    }

    /// The rendering environment.
    pub const fn env(&self) -> &Env {
        &self.env
    }

    /// The API client shared by all pages.
    pub const fn api(&self) -> &EmsClient {
        &self.api
    }

    /// The document title.
    pub const fn title(&self) -> &Title {
        &self.title
    }

    /// The page manager.
    pub const fn manager(&self) -> &PageManager {
        &self.manager
    }

    /// Opens a path.
    pub async fn navigate(&mut self, path: &str) -> Result<PageOutcome> {
        self.manager.navigate(path).await
    }

    /// Returns to the previous path, if any.
    pub async fn back(&mut self) -> Result<Option<PageOutcome>> {
        self.manager.back().await
    }

    /// Rebuilds the current page if one of its components asked for it.
    pub async fn rebuild_if_requested(&mut self) -> Result<Option<PageOutcome>> {
        self.manager.rebuild_if_requested().await
    }
}
