use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lahendus_spa::{async_trait, values, Component, Env, Result, Slot};
use tracing::debug;

use super::{FieldConstraint, StringConstraints, ValidChangeCallback, Validator, Validity};

/// Callback receiving the field value after every input.
pub type ValueChangeCallback = Rc<dyn Fn(&str)>;

/// Builder for [`StringField`].
pub struct StringFieldBuilder {
    label: String,
    required: bool,
    paint_required_on_create: bool,
    paint_required_on_input: bool,
    field_name_for_message: Option<String>,
    initial_value: String,
    help_text: String,
    constraints: Vec<Box<dyn FieldConstraint<str>>>,
    on_valid_change: Option<ValidChangeCallback>,
    on_value_change: Option<ValueChangeCallback>,
    trim_value: bool,
}

impl fmt::Debug for StringFieldBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringFieldBuilder")
            .field("label", &self.label)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

impl StringFieldBuilder {
    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Paint a required violation right after the first render.
    #[must_use]
    pub const fn paint_required_on_create(mut self, paint: bool) -> Self {
        self.paint_required_on_create = paint;
        self
    }

    /// Paint a required violation while the user types.
    #[must_use]
    pub const fn paint_required_on_input(mut self, paint: bool) -> Self {
        self.paint_required_on_input = paint;
        self
    }

    /// Name used in violation messages instead of the label.
    #[must_use]
    pub fn field_name_for_message(mut self, name: impl Into<String>) -> Self {
        self.field_name_for_message = Some(name.into());
        self
    }

    /// Value the input starts with.
    #[must_use]
    pub fn initial_value(mut self, value: impl Into<String>) -> Self {
        self.initial_value = value.into();
        self
    }

    /// Help text shown under the field while there is no violation.
    #[must_use]
    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    /// Adds a constraint, evaluated after the ones added before it.
    #[must_use]
    pub fn constraint(mut self, constraint: impl FieldConstraint<str> + 'static) -> Self {
        self.constraints.push(Box::new(constraint));
        self
    }

    /// Callback receiving the validity after every evaluation.
    #[must_use]
    pub fn on_valid_change(mut self, callback: impl Fn(bool) + 'static) -> Self {
        self.on_valid_change = Some(Rc::new(callback));
        self
    }

    /// Callback receiving the value after every input.
    #[must_use]
    pub fn on_value_change(mut self, callback: impl Fn(&str) + 'static) -> Self {
        self.on_value_change = Some(Rc::new(callback));
        self
    }

    /// Whether surrounding whitespace is stripped from the value.
    #[must_use]
    pub const fn trim_value(mut self, trim: bool) -> Self {
        self.trim_value = trim;
        self
    }

    /// Creates the field as a child of `parent`.
    pub fn build(self, parent: &Slot, env: &Env) -> StringField {
        let field_name = self
            .field_name_for_message
            .unwrap_or_else(|| self.label.clone());
        let required: Option<Box<dyn FieldConstraint<str>>> = if self.required {
            Some(Box::new(StringConstraints::NotBlank))
        } else {
            None
        };
        let input_id = env.next_id();
        StringField {
            slot: Slot::child(parent, env),
            state: Rc::new(FieldState {
                helper_id: format!("field-helper-{input_id}"),
                input_id,
                label: self.label,
                help_text: self.help_text,
                initial_value: self.initial_value,
                required: self.required,
                paint_required_on_create: self.paint_required_on_create,
                paint_required_on_input: self.paint_required_on_input,
                trim_value: self.trim_value,
                validator: Validator::new(field_name, required, self.constraints),
                validity: RefCell::new(Validity::Pristine),
                on_valid_change: self.on_valid_change,
                on_value_change: self.on_value_change,
            }),
        }
    }
}

struct FieldState {
    input_id: String,
    helper_id: String,
    label: String,
    help_text: String,
    initial_value: String,
    required: bool,
    paint_required_on_create: bool,
    paint_required_on_input: bool,
    trim_value: bool,
    validator: Validator<str>,
    validity: RefCell<Validity>,
    on_valid_change: Option<ValidChangeCallback>,
    on_value_change: Option<ValueChangeCallback>,
}

impl FieldState {
    fn value(&self, env: &Env) -> Result<String> {
        let raw = env.dom().value(&self.input_id)?;
        Ok(if self.trim_value {
            raw.trim().to_string()
        } else {
            raw
        })
    }

    /// Touches the field, evaluates constraints and paints the outcome.
    ///
    /// A failed required check is painted only if `paint_required` is set;
    /// the field is invalid either way.
    fn validate_and_paint(&self, env: &Env, paint_required: bool) -> Result<bool> {
        *self.validity.borrow_mut() = Validity::Touched;
        let value = self.value(env)?;
        let validity = self.validator.evaluate(&value);
        debug!(input = %self.input_id, ?validity, "Field validated");

        let message = validity
            .violation()
            .filter(|v| paint_required || !v.is_required)
            .map(|v| v.message.clone());
        let helper = env.render(
            "t-c-field-helper",
            &values([
                ("message", message.into()),
                ("helpText", self.help_text.clone().into()),
            ]),
        )?;
        env.dom().set_inner_html(&self.helper_id, &helper)?;

        let is_valid = validity == Validity::Valid;
        *self.validity.borrow_mut() = validity;
        if let Some(callback) = &self.on_valid_change {
            callback(is_valid);
        }
        Ok(is_valid)
    }
}

/// A single-line text input with validation.
pub struct StringField {
    slot: Slot,
    state: Rc<FieldState>,
}

impl fmt::Debug for StringField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringField")
            .field("slot", &self.slot)
            .field("input_id", &self.state.input_id)
            .field("validity", &self.state.validity.borrow())
            .finish_non_exhaustive()
    }
}

impl StringField {
    /// Starts building a field with the given label.
    pub fn builder(label: impl Into<String>) -> StringFieldBuilder {
        StringFieldBuilder {
            label: label.into(),
            required: false,
            paint_required_on_create: false,
            paint_required_on_input: true,
            field_name_for_message: None,
            initial_value: String::new(),
            help_text: String::new(),
            constraints: Vec::new(),
            on_valid_change: None,
            on_value_change: None,
            trim_value: true,
        }
    }

    /// Id of the input element.
    pub fn input_id(&self) -> &str {
        &self.state.input_id
    }

    /// Current validity.
    pub fn validity(&self) -> Validity {
        self.state.validity.borrow().clone()
    }

    /// `Some(valid)` once evaluated, `None` while pristine.
    pub fn is_valid(&self) -> Option<bool> {
        self.state.validity.borrow().is_valid()
    }

    /// Current value, trimmed if configured.
    pub fn value(&self, env: &Env) -> Result<String> {
        self.state.value(env)
    }

    /// Validates the field and paints any violation.
    pub fn validate(&self, env: &Env) -> Result<bool> {
        self.state.validate_and_paint(env, true)
    }

    /// A handle usable from event handlers after the field is built.
    pub fn handle(&self) -> FieldHandle {
        FieldHandle(Rc::clone(&self.state))
    }
}

/// Cloneable access to a built [`StringField`].
#[derive(Clone)]
pub struct FieldHandle(Rc<FieldState>);

impl fmt::Debug for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldHandle").field(&self.0.input_id).finish()
    }
}

impl FieldHandle {
    /// Current value, trimmed if configured.
    pub fn value(&self, env: &Env) -> Result<String> {
        self.0.value(env)
    }

    /// Validates the field and paints any violation.
    pub fn validate(&self, env: &Env) -> Result<bool> {
        self.0.validate_and_paint(env, true)
    }

    /// `Some(valid)` once evaluated, `None` while pristine.
    pub fn is_valid(&self) -> Option<bool> {
        self.0.validity.borrow().is_valid()
    }
}

#[async_trait(?Send)]
impl Component for StringField {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    fn render(&self, env: &Env) -> Result<String> {
        let state = &self.state;
        env.render(
            "t-c-string-field",
            &values([
                ("id", state.input_id.clone().into()),
                ("helperId", state.helper_id.clone().into()),
                ("value", state.initial_value.clone().into()),
                ("label", state.label.clone().into()),
                ("helpText", state.help_text.clone().into()),
                ("required", state.required.into()),
            ]),
        )
    }

    fn post_render(&mut self, env: &Env) -> Result<()> {
        *self.state.validity.borrow_mut() = Validity::Pristine;
        if self.state.paint_required_on_create {
            self.state.validate_and_paint(env, true)?;
        }

        let state = Rc::clone(&self.state);
        let handler_env = env.clone();
        env.dom().on_input(
            &self.state.input_id,
            Rc::new(move |_value: String| {
                if let Err(e) = state.validate_and_paint(&handler_env, state.paint_required_on_input)
                {
                    tracing::warn!(error = %e, "Failed to validate field");
                }
                if let Some(callback) = &state.on_value_change {
                    match state.value(&handler_env) {
                        Ok(value) => callback(&value),
                        Err(e) => tracing::warn!(error = %e, "Failed to read field value"),
                    }
                }
            }),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::cell::Cell;

    use lahendus_spa::{create_and_build, MemoryDom, ROOT_ID};

    use super::*;
    use crate::templates::Templates;

    fn env() -> (Rc<MemoryDom>, Env, Slot) {
        let dom = Rc::new(MemoryDom::new());
        let env = Env::new(dom.clone(), Rc::new(Templates::new()));
        (dom, env, Slot::root(ROOT_ID))
    }

    /// Builds a field straight into the document root.
    async fn build_field(env: &Env, builder: StringFieldBuilder, root: &Slot) -> StringField {
        let mut field = builder.build(root, env);
        env.dom()
            .set_inner_html(ROOT_ID, &format!(r#"<div id="{}"></div>"#, field.slot().id()))
            .unwrap();
        create_and_build(&mut field, env).await.unwrap();
        field
    }

    #[tokio::test]
    async fn test_required_field_painted_on_create_is_invalid_immediately() {
        let (dom, env, root) = env();
        let field = build_field(
            &env,
            StringField::builder("Email")
                .required(true)
                .paint_required_on_create(true),
            &root,
        )
        .await;

        assert_eq!(field.is_valid(), Some(false));
        assert!(dom.document_html().contains("Email is required"));
    }

    #[tokio::test]
    async fn test_required_field_without_initial_paint_stays_pristine() {
        let (dom, env, root) = env();
        let field = build_field(&env, StringField::builder("Email").required(true), &root).await;

        assert_eq!(field.validity(), Validity::Pristine);
        assert_eq!(field.is_valid(), None);
        assert!(!dom.document_html().contains("is required"));
    }

    #[tokio::test]
    async fn test_input_validates_and_notifies() {
        let (dom, env, root) = env();
        let last_valid = Rc::new(Cell::new(None));
        let sink = Rc::clone(&last_valid);
        let field = build_field(
            &env,
            StringField::builder("Email")
                .required(true)
                .constraint(StringConstraints::Email)
                .on_valid_change(move |valid| sink.set(Some(valid))),
            &root,
        )
        .await;

        dom.input(field.input_id(), "not-an-email").unwrap();
        assert_eq!(field.is_valid(), Some(false));
        assert_eq!(last_valid.get(), Some(false));
        assert!(dom.document_html().contains("must be a valid email address"));

        dom.input(field.input_id(), "  mari@example.com ").unwrap();
        assert_eq!(field.is_valid(), Some(true));
        assert_eq!(last_valid.get(), Some(true));
        assert_eq!(field.value(&env).unwrap(), "mari@example.com");
        assert!(!dom.document_html().contains("valid email address"));
    }

    #[tokio::test]
    async fn test_required_violation_hidden_on_input_when_disabled() {
        let (dom, env, root) = env();
        let field = build_field(
            &env,
            StringField::builder("Name")
                .required(true)
                .paint_required_on_input(false),
            &root,
        )
        .await;

        dom.input(field.input_id(), "   ").unwrap();
        assert_eq!(field.is_valid(), Some(false));
        assert!(!dom.document_html().contains("Name is required"));

        // An explicit validate call always paints
        assert!(!field.validate(&env).unwrap());
        assert!(dom.document_html().contains("Name is required"));
    }

    #[tokio::test]
    async fn test_field_name_for_message_and_initial_value() {
        let (dom, env, root) = env();
        let field = build_field(
            &env,
            StringField::builder("Title")
                .field_name_for_message("Exercise title")
                .initial_value("abcdef")
                .constraint(StringConstraints::max_length(3)),
            &root,
        )
        .await;

        assert_eq!(field.value(&env).unwrap(), "abcdef");
        assert!(!field.handle().validate(&env).unwrap());
        assert!(dom
            .document_html()
            .contains("Exercise title must be at most 3 characters long"));
    }
}
