//! Articles written by admins.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{check_not_blank, check_opt_len, CreatedId};
use crate::caller::{Caller, Role};
use crate::error::Result;

/// Body of the create article request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateArticleReq {
    /// Title.
    pub title: String,
    /// AsciiDoc source, stored as given.
    #[serde(default)]
    pub text_adoc: Option<String>,
    /// Whether the content is public.
    pub public: bool,
}

/// Creates an article with its first version.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id))]
pub fn create_article(conn: &mut Connection, caller: &Caller, req: &CreateArticleReq) -> Result<CreatedId> {
    caller.require_role(&[Role::Admin])?;
    debug!(title = %req.title, "Creating article");
    check_not_blank("title", &req.title, 100)?;
    check_opt_len("text_adoc", req.text_adoc.as_deref(), 300_000)?;

    let now = Utc::now();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO article (owner_id, public, created_at) VALUES (?1, ?2, ?3)",
        params![caller.id, req.public, now],
    )?;
    let article_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO article_version (article_id, author_id, valid_from, title, text_adoc)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![article_id, caller.id, now, req.title, req.text_adoc],
    )?;
    tx.commit()?;

    info!(article_id, "Created article");
    Ok(CreatedId {
        id: article_id.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ReqError;

    fn article(title: &str) -> CreateArticleReq {
        CreateArticleReq {
            title: title.into(),
            text_adoc: Some("= Welcome".into()),
            public: true,
        }
    }

    #[test]
    fn test_admin_creates_article() {
        let mut conn = db::open_in_memory().unwrap();
        let created = create_article(&mut conn, &Caller::new("admin", Role::Admin), &article("News")).unwrap();
        assert_eq!(created.id, "1");

        let (title, adoc): (String, Option<String>) = conn
            .query_row(
                "SELECT title, text_adoc FROM article_version WHERE article_id = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(title, "News");
        assert_eq!(adoc.as_deref(), Some("= Welcome"));
    }

    #[test]
    fn test_only_admins_create_articles() {
        let mut conn = db::open_in_memory().unwrap();
        let err = create_article(&mut conn, &Caller::new("ago", Role::Teacher), &article("News")).unwrap_err();
        assert_eq!(err.code(), Some(ReqError::RoleNotAllowed));

        let err = create_article(&mut conn, &Caller::new("admin", Role::Admin), &article(" ")).unwrap_err();
        assert_eq!(err.code(), Some(ReqError::InvalidParameterValue));
    }
}
