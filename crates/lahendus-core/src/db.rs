//! SQLite schema and connection setup.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS student (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    given_name TEXT NOT NULL,
    family_name TEXT NOT NULL,
    moodle_username TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS teacher (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    given_name TEXT NOT NULL,
    family_name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS admin (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    given_name TEXT NOT NULL,
    family_name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS course (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    moodle_short_name TEXT,
    moodle_sync_students INTEGER NOT NULL DEFAULT 0,
    moodle_sync_grades INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS course_group (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id INTEGER NOT NULL REFERENCES course(id),
    name TEXT NOT NULL,
    UNIQUE (course_id, name)
);

CREATE TABLE IF NOT EXISTS student_course_access (
    student_id TEXT NOT NULL REFERENCES student(id),
    course_id INTEGER NOT NULL REFERENCES course(id),
    PRIMARY KEY (student_id, course_id)
);

CREATE TABLE IF NOT EXISTS student_group_access (
    student_id TEXT NOT NULL REFERENCES student(id),
    course_id INTEGER NOT NULL REFERENCES course(id),
    group_id INTEGER NOT NULL REFERENCES course_group(id),
    PRIMARY KEY (student_id, group_id)
);

CREATE TABLE IF NOT EXISTS student_pending_access (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id INTEGER NOT NULL REFERENCES course(id),
    email TEXT NOT NULL,
    valid_from TEXT NOT NULL,
    UNIQUE (course_id, email)
);

CREATE TABLE IF NOT EXISTS student_pending_group (
    pending_access_id INTEGER NOT NULL REFERENCES student_pending_access(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES course_group(id),
    PRIMARY KEY (pending_access_id, group_id)
);

CREATE TABLE IF NOT EXISTS student_moodle_pending_access (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id INTEGER NOT NULL REFERENCES course(id),
    moodle_username TEXT NOT NULL,
    email TEXT NOT NULL,
    UNIQUE (course_id, moodle_username)
);

CREATE TABLE IF NOT EXISTS teacher_course_access (
    teacher_id TEXT NOT NULL REFERENCES teacher(id),
    course_id INTEGER NOT NULL REFERENCES course(id),
    PRIMARY KEY (teacher_id, course_id)
);

CREATE TABLE IF NOT EXISTS teacher_group_access (
    teacher_id TEXT NOT NULL REFERENCES teacher(id),
    course_id INTEGER NOT NULL REFERENCES course(id),
    group_id INTEGER NOT NULL REFERENCES course_group(id),
    PRIMARY KEY (teacher_id, group_id)
);

CREATE TABLE IF NOT EXISTS executor (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    base_url TEXT NOT NULL,
    load INTEGER NOT NULL DEFAULT 0,
    max_load INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS auto_exercise (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    grading_script TEXT,
    container_image TEXT,
    max_time_sec INTEGER,
    max_mem_mb INTEGER
);

CREATE TABLE IF NOT EXISTS asset (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    auto_exercise_id INTEGER NOT NULL REFERENCES auto_exercise(id),
    file_name TEXT NOT NULL,
    file_content TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS auto_exercise_executor (
    auto_exercise_id INTEGER NOT NULL REFERENCES auto_exercise(id),
    executor_id INTEGER NOT NULL REFERENCES executor(id),
    PRIMARY KEY (auto_exercise_id, executor_id)
);

CREATE TABLE IF NOT EXISTS exercise (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    public INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS exercise_ver (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exercise_id INTEGER NOT NULL REFERENCES exercise(id),
    author_id TEXT NOT NULL,
    valid_from TEXT NOT NULL,
    valid_to TEXT,
    grader_type TEXT NOT NULL,
    title TEXT NOT NULL,
    text_html TEXT,
    text_adoc TEXT,
    auto_exercise_id INTEGER REFERENCES auto_exercise(id)
);

CREATE TABLE IF NOT EXISTS course_exercise (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id INTEGER NOT NULL REFERENCES course(id),
    exercise_id INTEGER NOT NULL REFERENCES exercise(id),
    grade_threshold INTEGER NOT NULL,
    student_visible INTEGER NOT NULL,
    soft_deadline TEXT,
    hard_deadline TEXT,
    order_idx INTEGER NOT NULL,
    title_alias TEXT
);

CREATE TABLE IF NOT EXISTS submission (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_exercise_id INTEGER NOT NULL REFERENCES course_exercise(id),
    student_id TEXT NOT NULL REFERENCES student(id),
    solution TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS teacher_assessment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id INTEGER NOT NULL REFERENCES submission(id),
    teacher_id TEXT NOT NULL,
    grade INTEGER NOT NULL,
    feedback TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS automatic_assessment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submission_id INTEGER NOT NULL REFERENCES submission(id),
    grade INTEGER NOT NULL,
    feedback TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS article (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    public INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS article_version (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL REFERENCES article(id),
    author_id TEXT NOT NULL,
    valid_from TEXT NOT NULL,
    valid_to TEXT,
    title TEXT NOT NULL,
    text_html TEXT,
    text_adoc TEXT
);
";

/// Opens the database named in the configuration and creates missing tables.
///
/// Seeds the demo course when `seedDemoData` is set and the database has no
/// courses yet.
pub fn open(config: &Config) -> Result<Connection> {
    let mut conn = if config.is_in_memory() {
        Connection::open_in_memory()?
    } else {
        Connection::open(&config.database)?
    };
    init(&conn)?;
    info!(database = %config.database, "Database ready");

    if config.seed_demo_data {
        let courses: i64 = conn.query_row("SELECT COUNT(*) FROM course", [], |r| r.get(0))?;
        if courses == 0 {
            seed_demo_data(&mut conn)?;
        } else {
            debug!(courses, "Database already has courses, not seeding");
        }
    }
    Ok(conn)
}

/// Opens an empty in-memory database with the schema in place.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn insert_person(
    tx: &Transaction<'_>,
    table: &str,
    id: &str,
    given_name: &str,
    family_name: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    tx.execute(
        &format!(
            "INSERT INTO {table} (id, email, given_name, family_name, created_at) VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        params![id, format!("{id}@example.com"), given_name, family_name, now],
    )?;
    Ok(())
}

fn insert_submission(
    tx: &Transaction<'_>,
    course_exercise_id: i64,
    student_id: &str,
    at: DateTime<Utc>,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO submission (course_exercise_id, student_id, solution, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![course_exercise_id, student_id, "print('hello')", at],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_auto_grade(tx: &Transaction<'_>, submission_id: i64, grade: i32, at: DateTime<Utc>) -> Result<()> {
    tx.execute(
        "INSERT INTO automatic_assessment (submission_id, grade, feedback, created_at) VALUES (?1, ?2, NULL, ?3)",
        params![submission_id, grade, at],
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn insert_exercise(
    tx: &Transaction<'_>,
    title: &str,
    grader_type: &str,
    auto_exercise_id: Option<i64>,
    order_idx: i32,
    student_visible: bool,
    title_alias: Option<&str>,
    soft_deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO exercise (owner_id, public, created_at) VALUES ('ago', 1, ?1)",
        params![now],
    )?;
    let exercise_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO exercise_ver (exercise_id, author_id, valid_from, grader_type, title, text_html, auto_exercise_id)
         VALUES (?1, 'ago', ?2, ?3, ?4, ?5, ?6)",
        params![exercise_id, now, grader_type, title, format!("<p>{title}</p>"), auto_exercise_id],
    )?;
    tx.execute(
        "INSERT INTO course_exercise (course_id, exercise_id, grade_threshold, student_visible, soft_deadline, order_idx, title_alias)
         VALUES (1, ?1, 90, ?2, ?3, ?4, ?5)",
        params![exercise_id, student_visible, soft_deadline, order_idx, title_alias],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Inserts a demo course with a teacher, three students and three exercises.
///
/// Course 1 "Programming" is taught by `ago`. Students `mari` (group A),
/// `jaan` (group B) and `kati` are on it; `uus@example.com` and the Moodle
/// user `peeter` have pending access. Course 2 "Databases" has nobody on it.
pub fn seed_demo_data(conn: &mut Connection) -> Result<()> {
    let now = Utc::now();
    let tx = conn.transaction()?;

    insert_person(&tx, "admin", "admin", "Ada", "Admin", now)?;
    insert_person(&tx, "teacher", "ago", "Ago", "Tamm", now)?;
    insert_person(&tx, "student", "mari", "Mari", "Maasikas", now)?;
    insert_person(&tx, "student", "jaan", "Jaan", "Kask", now)?;
    insert_person(&tx, "student", "kati", "Kati", "Karu", now)?;

    tx.execute(
        "INSERT INTO course (id, title, created_at) VALUES (1, 'Programming', ?1), (2, 'Databases', ?1)",
        params![now],
    )?;
    tx.execute(
        "INSERT INTO course_group (id, course_id, name) VALUES (1, 1, 'A'), (2, 1, 'B')",
        [],
    )?;
    tx.execute(
        "INSERT INTO teacher_course_access (teacher_id, course_id) VALUES ('ago', 1)",
        [],
    )?;
    tx.execute(
        "INSERT INTO student_course_access (student_id, course_id) VALUES ('mari', 1), ('jaan', 1), ('kati', 1)",
        [],
    )?;
    tx.execute(
        "INSERT INTO student_group_access (student_id, course_id, group_id) VALUES ('mari', 1, 1), ('jaan', 1, 2)",
        [],
    )?;
    tx.execute(
        "INSERT INTO student_pending_access (id, course_id, email, valid_from) VALUES (1, 1, 'uus@example.com', ?1)",
        params![now],
    )?;
    tx.execute(
        "INSERT INTO student_pending_group (pending_access_id, group_id) VALUES (1, 1)",
        [],
    )?;
    tx.execute(
        "INSERT INTO student_moodle_pending_access (course_id, moodle_username, email) VALUES (1, 'peeter', 'peeter@example.com')",
        [],
    )?;

    tx.execute(
        "INSERT INTO executor (id, name, base_url, load, max_load) VALUES (1, 'local', 'http://localhost:8081', 0, 4)",
        [],
    )?;
    tx.execute(
        "INSERT INTO auto_exercise (id, grading_script, container_image, max_time_sec, max_mem_mb)
         VALUES (1, 'grade.py', 'lahendus/python:latest', 5, 64)",
        [],
    )?;
    tx.execute(
        "INSERT INTO asset (auto_exercise_id, file_name, file_content) VALUES (1, 'tests.py', 'assert True')",
        [],
    )?;
    tx.execute(
        "INSERT INTO auto_exercise_executor (auto_exercise_id, executor_id) VALUES (1, 1)",
        [],
    )?;

    let deadline = NaiveDate::from_ymd_opt(2026, 3, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .map(|d| d.and_utc());
    let hello = insert_exercise(&tx, "Hello", "AUTO", Some(1), 0, true, None, deadline, now)?;
    let loops = insert_exercise(
        &tx,
        "Loops",
        "TEACHER",
        None,
        1,
        true,
        Some("Loops and lists"),
        None,
        now,
    )?;
    insert_exercise(&tx, "Exam", "TEACHER", None, 2, false, None, None, now)?;

    let earlier = now - Duration::minutes(30);
    let later = now - Duration::minutes(10);

    // Hello: mari and jaan completed it, kati started
    let sub = insert_submission(&tx, hello, "mari", earlier)?;
    insert_auto_grade(&tx, sub, 100, earlier)?;
    let sub = insert_submission(&tx, hello, "jaan", earlier)?;
    insert_auto_grade(&tx, sub, 20, earlier)?;
    let sub = insert_submission(&tx, hello, "jaan", later)?;
    insert_auto_grade(&tx, sub, 50, later)?;
    tx.execute(
        "INSERT INTO teacher_assessment (submission_id, teacher_id, grade, feedback, created_at) VALUES (?1, 'ago', 95, 'Good enough', ?2)",
        params![sub, now],
    )?;
    let sub = insert_submission(&tx, hello, "kati", later)?;
    insert_auto_grade(&tx, sub, 30, later)?;

    // Loops: mari is waiting for a grade
    insert_submission(&tx, loops, "mari", later)?;

    tx.commit()?;
    info!("Seeded demo course");
    Ok(())
}
