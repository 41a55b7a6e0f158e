//! Lahendus SPA framework
//!
//! A small component-tree renderer. Components load data asynchronously,
//! paint HTML into named slots through a [`Dom`], and build their children
//! concurrently. Pages bind component trees to URL paths.

pub mod component;
pub mod dom;
pub mod env;
pub mod error;
pub mod fetch;
pub mod memory_dom;
pub mod page;
pub mod slot;
pub mod template;

pub use component::{
    build_this, clear, create_and_build, paint, rebuild, rebuild_and_recreate_children, Component,
};
pub use dom::{click_handler, single_click, ClickHandler, Dom, InputHandler};
pub use env::{Env, IdGenerator};
pub use error::{ErrorBody, FetchError, Result, SpaError};
pub use fetch::{FetchRequest, Fetcher, Method, Request, Response, Transport};
pub use memory_dom::{MemoryDom, ROOT_ID};
pub use page::{Page, PageContext, PageManager, PageOutcome, PathSchema, RebuildHandle};
pub use slot::{Slot, StateCallback};
pub use template::{values, TemplateEngine, Values};

/// Re-exported so implementors of [`Component`], [`Page`] and [`Transport`]
/// use the same attribute macro.
pub use async_trait::async_trait;
