//! Template registry.
//!
//! Every template is a `maud` function from [`Values`] to markup, looked up
//! by name. Values are escaped by `maud`; fragments that are already HTML
//! (nested renders) are spliced in with [`PreEscaped`].

use std::collections::HashMap;

use lahendus_spa::{Result, SpaError, TemplateEngine, Values};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use serde_json::Value;

/// Id of the element pages paint into.
pub const CONTENT_CONTAINER_ID: &str = "content-container";

/// Id of the element messages are painted into.
pub const MESSAGES_ID: &str = "messages";

type TemplateFn = fn(Values<'_>) -> Markup;

/// All templates of the UI.
#[derive(Debug, Clone)]
pub struct Templates {
    registry: HashMap<&'static str, TemplateFn>,
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

impl Templates {
    /// Creates the registry.
    #[must_use]
    pub fn new() -> Self {
        let entries: [(&'static str, TemplateFn); 20] = [
            ("tm-statics", statics),
            ("tm-loading-placeholders", loading_placeholders),
            ("tm-broken-page", broken_page),
            ("tm-not-found", not_found),
            ("tm-no-access", no_access),
            ("t-message", message),
            ("t-c-slots", slots),
            ("t-c-string-field", string_field),
            ("t-c-field-helper", field_helper),
            ("t-c-coll", coll),
            ("t-c-coll-toolbar", coll_toolbar),
            ("t-c-coll-item", coll_item),
            ("t-c-modal", modal),
            ("t-c-participants", participants),
            ("t-c-add-students", add_students),
            ("t-c-teach-course-exercises", teach_course_exercises),
            ("t-c-stud-course-exercises", stud_course_exercises),
            ("t-document", document),
            ("t-c-loading", loading),
            ("t-c-breadcrumbs", breadcrumbs),
        ];
        Self {
            registry: entries.into_iter().collect(),
        }
    }

    /// Returns `true` if a template with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }
}

impl TemplateEngine for Templates {
    fn render(&self, name: &str, values: &Value) -> Result<String> {
        let template = self
            .registry
            .get(name)
            .ok_or_else(|| SpaError::TemplateNotFound(name.to_string()))?;
        Ok(template(Values::new(values)).into_string())
    }
}

/// String elements of an array value.
fn strs<'a>(v: Values<'a>, key: &str) -> Vec<&'a str> {
    v.raw()
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn document(v: Values<'_>) -> Markup {
    html! {
        (DOCTYPE)
        html lang="et" {
            head {
                meta charset="utf-8";
                title { (v.str("title")) }
            }
            body { (PreEscaped(v.str("body"))) }
        }
    }
}

fn statics(v: Values<'_>) -> Markup {
    html! {
        header.navbar {
            a.brand href="/" { (v.str("appName")) }
            span.user { (v.str("userId")) " (" (v.str("role")) ")" }
        }
        div id=(MESSAGES_ID) {}
        main id=(CONTENT_CONTAINER_ID) {}
    }
}

fn loading_placeholders(_v: Values<'_>) -> Markup {
    html! {
        div.loading-placeholders {
            div.placeholder.title {}
            div.placeholder.line {}
            div.placeholder.line {}
        }
    }
}

fn loading(v: Values<'_>) -> Markup {
    html! { div.loading { (v.str("text")) } }
}

fn broken_page(v: Values<'_>) -> Markup {
    html! {
        div.broken-page {
            h2 { "Something went wrong" }
            p { "Try reloading the page. If the problem persists, let us know." }
            @if let Some(detail) = v.opt_str("detail") {
                pre.detail { (detail) }
            }
        }
    }
}

fn not_found(v: Values<'_>) -> Markup {
    html! {
        div.not-found {
            h2 { "Page not found" }
            p { "Nothing lives at " code { (v.str("path")) } "." }
        }
    }
}

fn no_access(_v: Values<'_>) -> Markup {
    html! {
        div.no-access {
            h2 { "No access" }
            p { "You do not have access to this course." }
        }
    }
}

fn message(v: Values<'_>) -> Markup {
    html! { div class={ "message " (v.str("kind")) } { (v.str("text")) } }
}

fn slots(v: Values<'_>) -> Markup {
    html! {
        @for id in strs(v, "ids") {
            div id=(id) {}
        }
    }
}

fn breadcrumbs(v: Values<'_>) -> Markup {
    html! {
        nav.breadcrumbs {
            @for crumb in v.list("crumbs") {
                @if let Some(href) = crumb.opt_str("href") {
                    a.crumb href=(href) { (crumb.str("label")) }
                } @else {
                    span.crumb { (crumb.str("label")) }
                }
            }
        }
    }
}

fn string_field(v: Values<'_>) -> Markup {
    html! {
        div.input-field {
            label for=(v.str("id")) {
                (v.str("label"))
                @if v.bool("required") { span.required-marker { "*" } }
            }
            input type="text" id=(v.str("id")) value=(v.str("value"));
            div.field-helper id=(v.str("helperId")) {
                @if !v.str("helpText").is_empty() {
                    span.helper-text { (v.str("helpText")) }
                }
            }
        }
    }
}

fn field_helper(v: Values<'_>) -> Markup {
    html! {
        @if let Some(message) = v.opt_str("message") {
            span.helper-text.error { (message) }
        } @else if !v.str("helpText").is_empty() {
            span.helper-text { (v.str("helpText")) }
        }
    }
}

fn coll(v: Values<'_>) -> Markup {
    html! {
        div.coll {
            div.coll-toolbar id=(v.str("toolbarId")) { (PreEscaped(v.str("toolbarHtml"))) }
            div.coll-items {
                @for row in v.list("rows") {
                    div.coll-item id=(row.str("id")) { (PreEscaped(row.str("html"))) }
                }
            }
        }
    }
}

fn coll_toolbar(v: Values<'_>) -> Markup {
    html! {
        div.coll-toolbar-row {
            input.coll-select-all type="checkbox" id=(v.str("selectAllId")) checked[v.bool("allSelected")];
            span.coll-count { (v.str("countLabel")) }
            @if v.int("selectedCount") > 0 {
                span.coll-selected-count { (v.int("selectedCount")) " selected" }
            }
            div.coll-mass-actions {
                @for action in v.list("massActions") {
                    button.coll-mass-action id=(action.str("id")) data-icon=(action.str("icon")) {
                        (action.str("label"))
                    }
                }
            }
        }
        @for group in v.list("filterGroups") {
            div.coll-filter-group {
                span.coll-filter-group-label { (group.str("label")) }
                @for filter in group.list("filters") {
                    button.coll-filter.active[filter.bool("active")] id=(filter.str("id")) {
                        (filter.str("label"))
                    }
                }
            }
        }
        @if !v.list("sorters").is_empty() {
            div.coll-sorters {
                @for sorter in v.list("sorters") {
                    button.coll-sorter.active[sorter.bool("active")] id=(sorter.str("id")) {
                        (sorter.str("label"))
                    }
                }
            }
        }
    }
}

fn coll_item(v: Values<'_>) -> Markup {
    let top = v.field("topAttr");
    html! {
        @if v.bool("selectable") {
            input.coll-select type="checkbox" id=(v.str("selectId")) checked[v.bool("selected")];
        }
        i.type-icon data-icon=(v.str("typeIcon")) {}
        div.coll-item-main {
            div.coll-title.inactive[v.bool("inactive")] {
                @if let Some(link) = v.opt_str("titleLink") {
                    a href=(link) { (v.str("title")) }
                } @else {
                    (v.str("title"))
                }
            }
            @if !top.raw().is_null() {
                @if let Some(click_id) = top.opt_str("clickId") {
                    button.coll-top-attr.clickable id=(click_id) data-icon=(top.str("icon")) {
                        span.attr-key { (top.str("key")) }
                        @for value in strs(top, "items") {
                            span.attr-item { (value) }
                        }
                    }
                } @else {
                    div.coll-top-attr data-icon=(top.str("icon")) {
                        span.attr-key { (top.str("key")) }
                        @for value in strs(top, "items") {
                            span.attr-item { (value) }
                        }
                    }
                }
            }
            @for attr in v.list("bottomAttrs") {
                div.coll-attr data-icon=(attr.str("icon")) {
                    span.attr-key { (attr.str("key")) }
                    span.attr-value { (attr.str("value")) }
                }
            }
        }
        div.coll-actions {
            @for action in v.list("actions") {
                button.coll-action id=(action.str("id")) data-icon=(action.str("icon")) {
                    (action.str("label"))
                }
            }
        }
    }
}

fn modal(v: Values<'_>) -> Markup {
    let waiting = v.bool("waiting");
    html! {
        div.modal.open[v.bool("open")] id=(v.str("dialogId")) hidden[!v.bool("open")] {
            h4.modal-title { (v.str("title")) }
            p.modal-text { (v.str("text")) }
            div.modal-footer {
                button.btn-primary id=(v.str("primaryId")) disabled[waiting] {
                    @if waiting { (v.str("waitLabel")) } @else { (v.str("primaryLabel")) }
                }
                button.btn-secondary id=(v.str("secondaryId")) disabled[waiting] {
                    (v.str("secondaryLabel"))
                }
            }
        }
    }
}

fn participants(v: Values<'_>) -> Markup {
    html! {
        (PreEscaped(v.str("crumbsHtml")))
        h2.course-title { (v.str("courseTitle")) }
        @if v.bool("moodleSynced") {
            p.moodle-info {
                "Moodle course: " span.moodle-short-name { (v.str("moodleShortName")) }
                @if v.bool("studentsSynced") {
                    " (students are synchronised from Moodle)"
                }
            }
        }
        h3 { "Teachers" }
        table.teachers {
            thead { tr { th { "Name" } th { "Username" } th { "Email" } th { "Groups" } } }
            tbody {
                @for teacher in v.list("teachers") {
                    tr {
                        td { (teacher.str("name")) }
                        td { (teacher.str("username")) }
                        td { (teacher.str("email")) }
                        td { (teacher.str("groups")) }
                    }
                }
            }
        }
        h3 { "Students" }
        @if let Some(id) = v.opt_str("addStudentsId") {
            div.add-students id=(id) {}
        }
        div.students id=(v.str("studentsId")) {}
    }
}

fn add_students(v: Values<'_>) -> Markup {
    html! {
        p.add-students-help { (v.str("help")) }
        div id=(v.str("fieldId")) {}
        button.btn id=(v.str("buttonId")) { (v.str("buttonLabel")) }
    }
}

fn teach_course_exercises(v: Values<'_>) -> Markup {
    html! {
        (PreEscaped(v.str("crumbsHtml")))
        h2.course-title { (v.str("courseTitle")) }
        a.grades-link href=(v.str("gradesHref")) { "Grades" }
        ol.exercises {
            @for ex in v.list("exercises") {
                li.exercise {
                    a.exercise-title href=(ex.str("href")) { (ex.str("title")) }
                    @if let Some(deadline) = ex.opt_str("deadline") {
                        span.deadline { "Deadline: " (deadline) }
                    }
                    @if ex.bool("studentsExist") {
                        @if ex.bool("noBb") {
                            div.progress.empty {}
                        } @else {
                            div.progress {
                                span.completed style={ "width: " (ex.num("completedPc")) "%" } title="Completed" { (ex.int("completedCount")) }
                                span.started style={ "width: " (ex.num("startedPc")) "%" } title="Started" { (ex.int("startedCount")) }
                                span.ungraded style={ "width: " (ex.num("ungradedPc")) "%" } title="Ungraded" { (ex.int("ungradedCount")) }
                                span.unstarted style={ "width: " (ex.num("unstartedPc")) "%" } title="Unstarted" { (ex.int("unstartedCount")) }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn stud_course_exercises(v: Values<'_>) -> Markup {
    html! {
        (PreEscaped(v.str("crumbsHtml")))
        h2.course-title { (v.str("courseTitle")) }
        ol.exercises {
            @for ex in v.list("exercises") {
                li.exercise.unstarted[ex.bool("unstarted")].started[ex.bool("started")].completed[ex.bool("completed")] {
                    a.exercise-title href=(ex.str("href")) { (ex.str("title")) }
                    @if let Some(deadline) = ex.opt_str("deadline") {
                        span.deadline { "Deadline: " (deadline) }
                    }
                    @if ex.bool("evalAuto") {
                        span.grade.auto title="Graded automatically" { (ex.str("points")) "/100" }
                    }
                    @if ex.bool("evalTeacher") {
                        span.grade.teacher title="Graded by teacher" { (ex.str("points")) "/100" }
                    }
                    @if ex.bool("evalMissing") {
                        span.grade.missing { "Not graded yet" }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use lahendus_spa::values;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_unknown_template() {
        let err = Templates::new().render("t-nope", &json!({})).unwrap_err();
        assert!(matches!(err, SpaError::TemplateNotFound(name) if name == "t-nope"));
    }

    #[test]
    fn test_message_is_escaped() {
        let html = Templates::new()
            .render(
                "t-message",
                &values([("kind", "error".into()), ("text", "Oops <b>".into())]),
            )
            .unwrap();
        insta::assert_snapshot!(html, @r#"<div class="message error">Oops &lt;b&gt;</div>"#);
    }

    #[test]
    fn test_field_helper_prefers_violation() {
        let templates = Templates::new();
        let html = templates
            .render(
                "t-c-field-helper",
                &json!({ "message": "Email is required", "helpText": "Your address" }),
            )
            .unwrap();
        insta::assert_snapshot!(html, @r#"<span class="helper-text error">Email is required</span>"#);

        let html = templates
            .render("t-c-field-helper", &json!({ "message": null, "helpText": "Your address" }))
            .unwrap();
        insta::assert_snapshot!(html, @r#"<span class="helper-text">Your address</span>"#);
    }

    #[test]
    fn test_slots() {
        let html = Templates::new()
            .render("t-c-slots", &json!({ "ids": ["ez-1", "ez-2"] }))
            .unwrap();
        insta::assert_snapshot!(html, @r#"<div id="ez-1"></div><div id="ez-2"></div>"#);
    }

    #[test]
    fn test_modal_waiting_label() {
        let html = Templates::new()
            .render(
                "t-c-modal",
                &json!({
                    "dialogId": "m-dialog", "title": "Remove", "text": "Sure?",
                    "primaryId": "m-primary", "primaryLabel": "Remove",
                    "secondaryId": "m-secondary", "secondaryLabel": "Cancel",
                    "waitLabel": "Working...", "open": true, "waiting": true,
                }),
            )
            .unwrap();
        assert!(html.contains("Working..."));
        assert!(html.contains(r#"class="modal open""#));
        assert!(!html.contains("hidden"));
    }

    #[test]
    fn test_every_page_template_renders_with_empty_values() {
        let templates = Templates::new();
        for name in [
            "tm-statics",
            "tm-loading-placeholders",
            "tm-broken-page",
            "t-c-participants",
            "t-c-teach-course-exercises",
            "t-c-stud-course-exercises",
        ] {
            assert!(templates.contains(name));
            templates.render(name, &json!({})).unwrap();
        }
    }
}
