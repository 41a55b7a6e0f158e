//! Lahendus exercise management service
//!
//! REST services over courses, exercises, participants and grades, stored in
//! SQLite. Every service call runs in one transaction and answers with a DTO.
//!
//! - [`api`]: axum router and handlers under `/v2`
//! - [`services`]: the request services themselves
//! - [`caller`]: caller identification and course access checks
//! - [`db`]: schema and demo data
//! - [`config`]: `lahendus.json`

pub mod api;
pub mod caller;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use api::{create_router, AppState};
pub use caller::{Caller, Role, ROLE_HEADER, USER_HEADER};
pub use config::Config;
pub use error::{CoreError, ReqError, Result};
