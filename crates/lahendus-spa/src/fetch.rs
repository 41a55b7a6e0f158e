//! The fetch boundary.
//!
//! Pages issue logical requests ("GET this resource") through a
//! [`Fetcher`]. The transport underneath is pluggable. Each request carries
//! a success predicate, error handlers keyed by backend error code, and a
//! cancellability flag: cancellable requests are aborted by
//! [`Fetcher::abort_all`], which pages call when navigating away.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use futures::future::{AbortHandle, Abortable};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ErrorBody, FetchError};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// A request as handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Path relative to the API root, e.g. `/courses/1/participants`.
    pub path: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

/// A response as returned by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// JSON body, `Value::Null` if the response was empty.
    pub body: Value,
}

impl Response {
    /// Deserializes the body.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        T::deserialize(&self.body).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// Delivers requests to the backend.
#[async_trait(?Send)]
pub trait Transport {
    /// Sends a request. `Err` means the request never produced a response.
    async fn send(&self, request: Request) -> Result<Response, String>;
}

/// Handler invoked with the error body of a matching failed response.
pub type ErrorHandler = Rc<dyn Fn(&ErrorBody)>;

/// Callback invoked for failures no handler dealt with.
pub type UnhandledHook = Rc<dyn Fn(&FetchError)>;

/// A request plus the policy for interpreting its outcome.
pub struct FetchRequest {
    request: Request,
    success: Box<dyn Fn(u16) -> bool>,
    handlers: Vec<(String, ErrorHandler)>,
    cancellable: bool,
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("request", &self.request)
            .field("cancellable", &self.cancellable)
            .finish_non_exhaustive()
    }
}

impl FetchRequest {
    /// Creates a request. Succeeds on status 200 and is cancellable by default.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request {
                method,
                path: path.into(),
                headers: Vec::new(),
                body: None,
            },
            success: Box::new(|status| status == 200),
            handlers: Vec::new(),
            cancellable: true,
        }
    }

    /// Creates a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Creates a `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Creates a `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// Creates a `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.request.body = Some(body);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the predicate deciding which statuses count as success.
    #[must_use]
    pub fn success(mut self, predicate: impl Fn(u16) -> bool + 'static) -> Self {
        self.success = Box::new(predicate);
        self
    }

    /// Registers a handler for responses carrying the given error code.
    #[must_use]
    pub fn on_error(mut self, code: impl Into<String>, handler: ErrorHandler) -> Self {
        self.handlers.push((code.into(), handler));
        self
    }

    /// Sets whether [`Fetcher::abort_all`] may abort this request.
    #[must_use]
    pub const fn cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }

    /// The underlying request.
    pub const fn request(&self) -> &Request {
        &self.request
    }
}

#[derive(Default)]
struct FetcherState {
    in_flight: RefCell<HashMap<u64, AbortHandle>>,
    next_key: Cell<u64>,
    default_headers: RefCell<Vec<(String, String)>>,
    on_unhandled: RefCell<Option<UnhandledHook>>,
}

/// Issues requests through a transport and interprets their outcomes.
///
/// Clones share in-flight bookkeeping, default headers and hooks.
#[derive(Clone)]
pub struct Fetcher {
    transport: Rc<dyn Transport>,
    state: Rc<FetcherState>,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher over a transport.
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Rc::new(FetcherState::default()),
        }
    }

    /// Adds a header sent with every request, replacing a previous value.
    pub fn set_default_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let mut headers = self.state.default_headers.borrow_mut();
        headers.retain(|(existing, _)| *existing != name);
        headers.push((name, value.into()));
    }

    /// Installs the hook invoked for failures no handler dealt with.
    pub fn set_on_unhandled(&self, hook: UnhandledHook) {
        *self.state.on_unhandled.borrow_mut() = Some(hook);
    }

    /// Number of cancellable requests currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.state.in_flight.borrow().len()
    }

    /// Aborts every cancellable request in flight. Returns how many were aborted.
    pub fn abort_all(&self) -> usize {
        let handles: Vec<AbortHandle> = self
            .state
            .in_flight
            .borrow_mut()
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in &handles {
            handle.abort();
        }
        if !handles.is_empty() {
            debug!(count = handles.len(), "Aborted in-flight requests");
        }
        handles.len()
    }

    /// Sends a request and interprets the response.
    ///
    /// Returns the response if it satisfies the success predicate. Otherwise
    /// runs the handler registered for the response's error code and returns
    /// [`FetchError::Handled`], or invokes the unhandled hook and returns the
    /// failure.
    pub async fn fetch(&self, fetch: FetchRequest) -> Result<Response, FetchError> {
        let FetchRequest {
            mut request,
            success,
            handlers,
            cancellable,
        } = fetch;

        let mut headers = self.state.default_headers.borrow().clone();
        headers.append(&mut request.headers);
        request.headers = headers;

        let method = request.method;
        let path = request.path.clone();
        debug!(%method, %path, cancellable, "Fetching");

        let sent = if cancellable {
            let (handle, registration) = AbortHandle::new_pair();
            let key = self.state.next_key.get();
            self.state.next_key.set(key + 1);
            self.state.in_flight.borrow_mut().insert(key, handle);

            let outcome = Abortable::new(self.transport.send(request), registration).await;
            self.state.in_flight.borrow_mut().remove(&key);

            if let Ok(sent) = outcome {
                sent
            } else {
                debug!(%method, %path, "Request aborted");
                return Err(FetchError::Aborted);
            }
        } else {
            self.transport.send(request).await
        };

        let response = match sent {
            Ok(response) => response,
            Err(message) => {
                let err = FetchError::Network(message);
                warn!(%method, %path, error = %err, "Request failed");
                self.notify_unhandled(&err);
                return Err(err);
            }
        };

        if success(response.status) {
            return Ok(response);
        }

        let body = ErrorBody::deserialize(&response.body).ok();
        if let Some(body) = &body {
            if let Some(code) = &body.code {
                if let Some((_, handler)) = handlers.iter().find(|(c, _)| c == code) {
                    debug!(%method, %path, %code, "Error handled by registered handler");
                    handler(body);
                    return Err(FetchError::Handled { code: code.clone() });
                }
            }
        }

        let err = FetchError::Unsuccessful {
            status: response.status,
            body,
        };
        warn!(%method, %path, error = %err, "Unhandled request failure");
        self.notify_unhandled(&err);
        Err(err)
    }

    fn notify_unhandled(&self, err: &FetchError) {
        let hook = self.state.on_unhandled.borrow().clone();
        if let Some(hook) = hook {
            hook(err);
        }
    }
}
