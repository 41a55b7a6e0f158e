//! Headless Lahendus.
//!
//! Runs the web UI against the HTTP API in the same process: requests go
//! straight into the axum router and pages paint into a [`MemoryDom`].

use std::rc::Rc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{self, header::CONTENT_TYPE},
    Router,
};
use lahendus_spa::{
    Env, Fetcher, MemoryDom, Method, PageOutcome, Request, Response, Result, Transport,
};
use lahendus_wui::{App, Session, Templates};
use serde_json::Value;
use tower::util::ServiceExt;
use tracing::debug;

/// Prefix of all API routes.
pub const API_PREFIX: &str = "/v2";

/// Sends UI requests to a router without a network in between.
#[derive(Debug, Clone)]
pub struct RouterTransport {
    router: Router,
}

impl RouterTransport {
    /// Creates a transport for the given router.
    pub const fn new(router: Router) -> Self {
        Self { router }
    }
}

const fn http_method(method: Method) -> http::Method {
    match method {
        Method::Get => http::Method::GET,
        Method::Post => http::Method::POST,
        Method::Put => http::Method::PUT,
        Method::Delete => http::Method::DELETE,
    }
}

#[async_trait(?Send)]
impl Transport for RouterTransport {
    async fn send(&self, request: Request) -> std::result::Result<Response, String> {
        let uri = format!("{API_PREFIX}{}", request.path);
        debug!(method = %request.method, %uri, "Routing request in process");

        let mut builder = http::Request::builder()
            .method(http_method(request.method))
            .uri(&uri);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = match request.body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let http_request = builder.body(body).map_err(|e| e.to_string())?;

        let response = self
            .router
            .clone()
            .oneshot(http_request)
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;

        // Extractor rejections answer in plain text
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        Ok(Response { status, body })
    }
}

/// The UI running against an in-process router.
pub struct Headless {
    dom: Rc<MemoryDom>,
    app: App,
}

impl std::fmt::Debug for Headless {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Headless").field("app", &self.app).finish_non_exhaustive()
    }
}

impl Headless {
    /// Starts the UI for a session.
    pub fn new(router: Router, session: Session, app_name: &str) -> Result<Self> {
        let dom = Rc::new(MemoryDom::new());
        let env = Env::new(dom.clone(), Rc::new(Templates::new()));
        let fetcher = Fetcher::new(Rc::new(RouterTransport::new(router)));
        let app = App::new(env, fetcher, session, app_name)?;
        Ok(Self { dom, app })
    }

    /// The document the UI paints into.
    pub const fn dom(&self) -> &Rc<MemoryDom> {
        &self.dom
    }

    /// The running app.
    pub const fn app(&self) -> &App {
        &self.app
    }

    /// Opens a path.
    pub async fn navigate(&mut self, path: &str) -> Result<PageOutcome> {
        self.app.navigate(path).await
    }

    /// Rebuilds the current page if one of its components asked for it.
    pub async fn rebuild_if_requested(&mut self) -> Result<Option<PageOutcome>> {
        self.app.rebuild_if_requested().await
    }

    /// The whole document as HTML.
    pub fn html(&self) -> String {
        self.dom.document_html()
    }
}

/// A page rendered headlessly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// How building the page went.
    pub outcome: PageOutcome,
    /// Document title.
    pub title: String,
    /// The whole document.
    pub html: String,
}

/// Builds the page at `path` for a session and returns the document.
pub async fn render_page(
    router: Router,
    session: Session,
    app_name: &str,
    path: &str,
) -> Result<RenderedPage> {
    let mut headless = Headless::new(router, session, app_name)?;
    let outcome = headless.navigate(path).await?;
    Ok(RenderedPage {
        outcome,
        title: headless.dom.title(),
        html: headless.html(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use lahendus_core::{create_router, AppState, Config};
    use lahendus_wui::Role;
    use serde_json::json;

    use super::*;

    fn router() -> Router {
        create_router(AppState::open(Config::in_memory_demo()).unwrap())
    }

    fn request(method: Method, path: &str, role: &str, body: Option<Value>) -> Request {
        Request {
            method,
            path: path.to_string(),
            headers: vec![
                ("x-lahendus-user".to_string(), "ago".to_string()),
                ("x-lahendus-role".to_string(), role.to_string()),
            ],
            body,
        }
    }

    #[tokio::test]
    async fn test_transport_prefixes_api_root() {
        let transport = RouterTransport::new(router());

        let response = transport
            .send(request(Method::Get, "/courses/1/basic", "teacher", None))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "title": "Programming" }));
    }

    #[tokio::test]
    async fn test_transport_passes_errors_and_plain_text() {
        let transport = RouterTransport::new(router());

        let forbidden = transport
            .send(request(Method::Get, "/courses/2/basic", "teacher", None))
            .await
            .unwrap();
        assert_eq!(forbidden.status, 403);
        assert_eq!(forbidden.body["code"], "NO_COURSE_ACCESS");

        let malformed = transport
            .send(request(
                Method::Post,
                "/courses/1/students",
                "teacher",
                Some(json!({ "wrong": true })),
            ))
            .await
            .unwrap();
        assert!(malformed.status >= 400);
        assert!(malformed.body.is_string());
    }

    #[tokio::test]
    async fn test_render_page() {
        let page = render_page(
            router(),
            Session::new("mari", Role::Student),
            "Lahendus",
            "/courses/1/exercises",
        )
        .await
        .unwrap();

        assert_eq!(page.outcome, PageOutcome::Built);
        assert_eq!(page.title, "Programming - Lahendus");
        assert!(page.html.contains("Loops and lists"));
        assert!(!page.html.contains("Exam"));
    }
}
