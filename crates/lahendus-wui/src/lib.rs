//! Lahendus web UI
//!
//! Components and pages of the Lahendus exercise environment, built on the
//! [`lahendus_spa`] component tree:
//!
//! - [`form`]: validated input fields
//! - [`coll`]: filterable, sortable collections with single and mass actions
//! - [`modal`]: confirmation dialogs awaited by actions
//! - [`pages`]: the participants and course exercises pages
//! - [`app`]: bootstrap wiring pages, hooks and the API client together

pub mod api;
pub mod app;
pub mod coll;
pub mod form;
pub mod modal;
pub mod notify;
pub mod pages;
pub mod session;
pub mod shares;
pub mod templates;
pub mod title;

pub use api::EmsClient;
pub use app::App;
pub use session::{Role, Session};
pub use templates::Templates;
