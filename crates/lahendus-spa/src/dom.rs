//! The document boundary.
//!
//! Components never touch a concrete document. They paint through the
//! [`Dom`] trait, which addresses elements by id and reports a missing
//! element as [`SpaError::ElementNotFound`] instead of ignoring it.

use std::cell::Cell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::error::Result;

/// Handler invoked when an element is clicked.
///
/// Click handlers are asynchronous so that they can fetch data or wait for
/// user confirmation before repainting.
pub type ClickHandler = Rc<dyn Fn() -> LocalBoxFuture<'static, ()>>;

/// Handler invoked with the new value when an input element changes.
pub type InputHandler = Rc<dyn Fn(String)>;

/// Operations the framework needs from a document.
pub trait Dom {
    /// Returns `true` if an element with the given id exists.
    fn contains(&self, id: &str) -> bool;

    /// Replaces the content of an element.
    ///
    /// Elements that lived inside the previous content, and their listeners,
    /// are dropped.
    fn set_inner_html(&self, id: &str, html: &str) -> Result<()>;

    /// Returns the current content of an element, including everything
    /// painted into nested elements.
    fn inner_html(&self, id: &str) -> Result<String>;

    /// Empties an element.
    fn clear(&self, id: &str) -> Result<()> {
        self.set_inner_html(id, "")
    }

    /// Returns the current value of an input element.
    fn value(&self, id: &str) -> Result<String>;

    /// Sets the value of an input element.
    fn set_value(&self, id: &str, value: &str) -> Result<()>;

    /// Installs the click listener of an element, replacing any previous one.
    fn on_click(&self, id: &str, handler: ClickHandler) -> Result<()>;

    /// Installs the input listener of an element, replacing any previous one.
    fn on_input(&self, id: &str, handler: InputHandler) -> Result<()>;

    /// Sets the document title.
    fn set_title(&self, title: &str);
}

/// Wraps a click handler so that clicks arriving while a previous click is
/// still being handled are ignored.
pub fn single_click<F, Fut>(handler: F) -> ClickHandler
where
    F: Fn() -> Fut + 'static,
    Fut: std::future::Future<Output = ()> + 'static,
{
    let busy = Rc::new(Cell::new(false));
    let handler = Rc::new(handler);
    Rc::new(move || {
        if busy.get() {
            tracing::debug!("Ignoring click while previous click is in progress");
            return async {}.boxed_local();
        }
        busy.set(true);
        let guard = ClickGuard(Rc::clone(&busy));
        let fut = handler();
        async move {
            let _guard = guard;
            fut.await;
        }
        .boxed_local()
    })
}

/// Releases a [`single_click`] handler when its click finishes or is dropped.
struct ClickGuard(Rc<Cell<bool>>);

impl Drop for ClickGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Creates a click handler from an async closure.
pub fn click_handler<F, Fut>(handler: F) -> ClickHandler
where
    F: Fn() -> Fut + 'static,
    Fut: std::future::Future<Output = ()> + 'static,
{
    Rc::new(move || handler().boxed_local())
}
