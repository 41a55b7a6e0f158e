//! HTTP API of the exercise management service.
//!
//! # Endpoints
//!
//! All under `/v2`. Callers identify themselves with the `x-lahendus-user`
//! and `x-lahendus-role` headers.
//!
//! - `GET /courses/:courseId/basic` - Course title
//! - `GET /courses/:courseId/participants?role=` - Students, teachers and pending accesses
//! - `POST /courses/:courseId/students` - Add students by email
//! - `DELETE /courses/:courseId/students` - Remove students and pending accesses
//! - `PUT /courses/:courseId/students/groups` - Set the groups of students
//! - `GET /teacher/courses/:courseId/exercises` - Exercises with student counts
//! - `GET /student/courses/:courseId/exercises` - Exercises with own progress
//! - `GET /courses/teacher/:courseId/grades` - Grade table
//! - `POST /exercises` - Create an exercise
//! - `GET /executors` - List executors
//! - `POST /articles` - Create an article
//!
//! # Example
//!
//! ```no_run
//! use lahendus_core::{create_router, AppState, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::open(Config::in_memory_demo())?;
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use rusqlite::Connection;
use serde::Deserialize;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::caller::Caller;
use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::services::articles::{self, CreateArticleReq};
use crate::services::courses::{
    self, AddStudentsReq, AddStudentsResp, BasicCourseInfo, ParticipantsFilter, ParticipantsResp,
    RemoveStudentsReq, SetStudentGroupsReq,
};
use crate::services::executors::{self, ExecutorResp};
use crate::services::exercises::{
    self, CreateExerciseReq, StudentExercisesResp, TeacherExercisesResp,
};
use crate::services::grades::{self, GradesQuery, GradesResp};
use crate::services::CreatedId;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The database, one request at a time.
    pub db: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Wraps an already opened connection.
    pub fn new(config: Config, conn: Connection) -> Self {
        Self {
            config,
            db: Arc::new(Mutex::new(conn)),
        }
    }

    /// Opens the configured database.
    pub fn open(config: Config) -> Result<Self> {
        let conn = db::open(&config)?;
        Ok(Self::new(config, conn))
    }
}

/// Query of the participants endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
struct ParticipantsQuery {
    role: Option<String>,
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router has:
/// - All API routes under `/v2`
/// - Tracing middleware for request logging
/// - CORS middleware allowing any origin, if `corsAllowAll` is set
pub fn create_router(state: AppState) -> Router {
    let cors_allow_all = state.config.cors_allow_all;

    let api_routes = Router::new()
        .route("/courses/:course_id/basic", get(handle_basic_info))
        .route("/courses/:course_id/participants", get(handle_participants))
        .route(
            "/courses/:course_id/students",
            post(handle_add_students).delete(handle_remove_students),
        )
        .route("/courses/:course_id/students/groups", put(handle_set_student_groups))
        .route("/courses/teacher/:course_id/grades", get(handle_grades))
        .route("/teacher/courses/:course_id/exercises", get(handle_teacher_exercises))
        .route("/student/courses/:course_id/exercises", get(handle_student_exercises))
        .route("/exercises", post(handle_create_exercise))
        .route("/executors", get(handle_executors))
        .route("/articles", post(handle_create_article));

    let router = Router::new()
        .nest("/v2", api_routes)
        .layer(TraceLayer::new_for_http());
    let router = if cors_allow_all {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };
    router.with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /v2/courses/:courseId/basic`.
async fn handle_basic_info(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    caller: Caller,
) -> Result<Json<BasicCourseInfo>> {
    let mut db = state.db.lock().await;
    courses::basic_info(&mut db, &caller, &course_id).map(Json)
}

/// Handler for `GET /v2/courses/:courseId/participants`.
async fn handle_participants(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    Query(query): Query<ParticipantsQuery>,
    caller: Caller,
) -> Result<Json<ParticipantsResp>> {
    let filter = ParticipantsFilter::from_query(query.role.as_deref())?;
    let mut db = state.db.lock().await;
    courses::participants(&mut db, &caller, &course_id, filter).map(Json)
}

/// Handler for `POST /v2/courses/:courseId/students`.
async fn handle_add_students(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    caller: Caller,
    Json(req): Json<AddStudentsReq>,
) -> Result<Json<AddStudentsResp>> {
    info!(caller = %caller.id, %course_id, count = req.students.len(), "Adding students");
    let mut db = state.db.lock().await;
    courses::add_students(&mut db, &caller, &course_id, &req).map(Json)
}

/// Handler for `DELETE /v2/courses/:courseId/students`.
async fn handle_remove_students(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    caller: Caller,
    Json(req): Json<RemoveStudentsReq>,
) -> Result<StatusCode> {
    info!(
        caller = %caller.id,
        %course_id,
        active = req.active_students.len(),
        pending = req.pending_students.len(),
        moodle_pending = req.moodle_pending_students.len(),
        "Removing students"
    );
    let mut db = state.db.lock().await;
    courses::remove_students(&mut db, &caller, &course_id, &req)?;
    Ok(StatusCode::OK)
}

/// Handler for `PUT /v2/courses/:courseId/students/groups`.
async fn handle_set_student_groups(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    caller: Caller,
    Json(req): Json<SetStudentGroupsReq>,
) -> Result<StatusCode> {
    let mut db = state.db.lock().await;
    courses::set_student_groups(&mut db, &caller, &course_id, &req)?;
    Ok(StatusCode::OK)
}

/// Handler for `GET /v2/courses/teacher/:courseId/grades`.
async fn handle_grades(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    Query(query): Query<GradesQuery>,
    caller: Caller,
) -> Result<Json<GradesResp>> {
    let mut db = state.db.lock().await;
    grades::teacher_grades(&mut db, &caller, &course_id, &query).map(Json)
}

/// Handler for `GET /v2/teacher/courses/:courseId/exercises`.
async fn handle_teacher_exercises(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    caller: Caller,
) -> Result<Json<TeacherExercisesResp>> {
    let mut db = state.db.lock().await;
    exercises::teacher_exercises(&mut db, &caller, &course_id).map(Json)
}

/// Handler for `GET /v2/student/courses/:courseId/exercises`.
async fn handle_student_exercises(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    caller: Caller,
) -> Result<Json<StudentExercisesResp>> {
    let mut db = state.db.lock().await;
    exercises::student_exercises(&mut db, &caller, &course_id).map(Json)
}

/// Handler for `POST /v2/exercises`.
async fn handle_create_exercise(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateExerciseReq>,
) -> Result<Json<CreatedId>> {
    let mut db = state.db.lock().await;
    exercises::create_exercise(&mut db, &caller, &req).map(Json)
}

/// Handler for `GET /v2/executors`.
async fn handle_executors(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<ExecutorResp>>> {
    let mut db = state.db.lock().await;
    executors::all_executors(&mut db, &caller).map(Json)
}

/// Handler for `POST /v2/articles`.
async fn handle_create_article(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateArticleReq>,
) -> Result<Json<CreatedId>> {
    let mut db = state.db.lock().await;
    articles::create_article(&mut db, &caller, &req).map(Json)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Method, Request},
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use super::*;
    use crate::caller::{ROLE_HEADER, USER_HEADER};

    fn router() -> Router {
        create_router(AppState::open(Config::in_memory_demo()).unwrap())
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        caller: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user, role)) = caller {
            builder = builder.header(USER_HEADER, user).header(ROLE_HEADER, role);
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    // ------------------------------------------------------------------------
    // Caller identification
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_missing_caller_is_unauthorized() {
        let router = router();
        let (status, _) = send(&router, Method::GET, "/v2/courses/1/basic", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_basic_info_and_no_access() {
        let router = router();
        let student = Some(("mari", "student"));

        let (status, body) = send(&router, Method::GET, "/v2/courses/1/basic", student, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "title": "Programming" }));

        let (status, body) = send(&router, Method::GET, "/v2/courses/2/basic", student, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "NO_COURSE_ACCESS");
    }

    // ------------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_participants_role_parameter() {
        let router = router();
        let teacher = Some(("ago", "teacher"));

        let (status, body) = send(
            &router,
            Method::GET,
            "/v2/courses/1/participants?role=teacher",
            teacher,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["teachers"][0]["id"], "ago");
        assert!(body.get("students").is_none());

        let (status, body) = send(
            &router,
            Method::GET,
            "/v2/courses/1/participants?role=parent",
            teacher,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PARAMETER_VALUE");
        assert_eq!(body["attrs"]["parameter"], "role");
    }

    #[tokio::test]
    async fn test_students_cannot_read_participants() {
        let router = router();
        let (status, body) = send(
            &router,
            Method::GET,
            "/v2/courses/1/participants",
            Some(("mari", "student")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "ROLE_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_add_then_remove_students() {
        let router = router();
        let teacher = Some(("ago", "teacher"));

        let (status, body) = send(
            &router,
            Method::POST,
            "/v2/courses/1/students",
            teacher,
            Some(json!({ "students": [{ "email": "new@example.com", "groups": [] }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "accesses_added": 0, "pending_accesses_added_updated": 1 }));

        let (status, body) = send(
            &router,
            Method::DELETE,
            "/v2/courses/1/students",
            teacher,
            Some(json!({
                "active_students": [{ "id": "kati" }],
                "pending_students": [{ "email": "new@example.com" }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);

        let (_, body) = send(&router, Method::GET, "/v2/courses/1/participants", teacher, None).await;
        assert_eq!(body["students"].as_array().unwrap().len(), 2);
        assert_eq!(body["students_pending"].as_array().unwrap().len(), 1);

        let (status, _) = send(
            &router,
            Method::DELETE,
            "/v2/courses/1/students",
            teacher,
            Some(json!({ "moodle_pending_students": [{ "ut_username": "peeter" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&router, Method::GET, "/v2/courses/1/participants", teacher, None).await;
        assert_eq!(body["students_moodle_pending"], json!([]));
    }

    #[tokio::test]
    async fn test_set_student_groups() {
        let router = router();
        let teacher = Some(("ago", "teacher"));

        let (status, _) = send(
            &router,
            Method::PUT,
            "/v2/courses/1/students/groups",
            teacher,
            Some(json!({
                "active_students": [{ "id": "kati" }],
                "groups": [{ "id": "1" }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&router, Method::GET, "/v2/courses/1/participants", teacher, None).await;
        let kati = body["students"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["id"] == "kati")
            .unwrap();
        assert_eq!(kati["groups"], json!([{ "id": "1", "name": "A" }]));

        let (status, _) = send(
            &router,
            Method::PUT,
            "/v2/courses/1/students/groups",
            Some(("mari", "student")),
            Some(json!({ "active_students": [{ "id": "mari" }], "groups": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    // ------------------------------------------------------------------------
    // Exercises and grades
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_exercise_lists() {
        let router = router();

        let (status, body) = send(
            &router,
            Method::GET,
            "/v2/teacher/courses/1/exercises",
            Some(("ago", "teacher")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exercises"][0]["completed_count"], 2);
        assert_eq!(body["exercises"][0]["grader_type"], "AUTO");

        let (status, body) = send(
            &router,
            Method::GET,
            "/v2/student/courses/1/exercises",
            Some(("mari", "student")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exercises"].as_array().unwrap().len(), 2);
        assert_eq!(body["exercises"][0]["status"], "COMPLETED");
        assert_eq!(body["exercises"][1]["status"], "STARTED");
    }

    #[tokio::test]
    async fn test_grades_route_is_not_shadowed_by_course_routes() {
        let router = router();
        let (status, body) = send(
            &router,
            Method::GET,
            "/v2/courses/teacher/1/grades?limit=2",
            Some(("admin", "admin")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["student_count"], 3);
        assert_eq!(body["students"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_exercise_and_list_executors() {
        let router = router();
        let teacher = Some(("ago", "teacher"));

        let (status, body) = send(
            &router,
            Method::POST,
            "/v2/exercises",
            teacher,
            Some(json!({
                "title": "Recursion",
                "public": false,
                "grader_type": "AUTO",
                "executors": [{ "executor_id": "1" }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "4");

        let (status, body) = send(
            &router,
            Method::POST,
            "/v2/exercises",
            teacher,
            Some(json!({ "title": "", "public": false, "grader_type": "TEACHER" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["attrs"]["field"], "title");

        let (status, body) = send(&router, Method::GET, "/v2/executors", teacher, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["base_url"], "http://localhost:8081");
    }

    #[tokio::test]
    async fn test_create_article_admin_only() {
        let router = router();
        let body = json!({ "title": "News", "public": true });

        let (status, _) = send(
            &router,
            Method::POST,
            "/v2/articles",
            Some(("ago", "teacher")),
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) = send(
            &router,
            Method::POST,
            "/v2/articles",
            Some(("admin", "admin")),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["id"], "1");
    }
}
