//! Automatic assessment executors.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::caller::{Caller, Role};
use crate::error::Result;

/// A machine that runs automatic assessments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorResp {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Where the executor accepts jobs.
    pub base_url: String,
    /// Assessments currently running.
    pub load: i32,
    /// Assessments it can run at once.
    pub max_load: i32,
}

/// All executors, ordered by id.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id))]
pub fn all_executors(conn: &mut Connection, caller: &Caller) -> Result<Vec<ExecutorResp>> {
    caller.require_role(&[Role::Teacher, Role::Admin])?;
    let tx = conn.transaction()?;
    let executors = {
        let mut stmt = tx.prepare("SELECT id, name, base_url, load, max_load FROM executor ORDER BY id")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ExecutorResp {
                    id: r.get::<_, i64>(0)?.to_string(),
                    name: r.get(1)?,
                    base_url: r.get(2)?,
                    load: r.get(3)?,
                    max_load: r.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };
    tx.commit()?;

    debug!(count = executors.len(), "Read executors");
    Ok(executors)
}
