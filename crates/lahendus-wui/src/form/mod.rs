//! Validated form fields.
//!
//! A field starts out [`Validity::Pristine`]. User input or an explicit
//! validate call touches it, after which its constraints decide between
//! [`Validity::Valid`] and [`Validity::Invalid`]. The built-in required
//! check runs first, then caller-supplied constraints in order; the first
//! failure wins.

mod constraints;
mod string_field;

use std::rc::Rc;

pub use constraints::{FieldConstraint, StringConstraints};
pub use string_field::{FieldHandle, StringField, StringFieldBuilder};

/// Validity of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    /// Not yet interacted with or validated.
    Pristine,
    /// Interacted with, constraints not yet evaluated.
    Touched,
    /// All constraints hold.
    Valid,
    /// A constraint failed.
    Invalid(Violation),
}

impl Validity {
    /// `Some(valid)` once evaluated, `None` while pristine or touched.
    pub const fn is_valid(&self) -> Option<bool> {
        match self {
            Self::Valid => Some(true),
            Self::Invalid(_) => Some(false),
            Self::Pristine | Self::Touched => None,
        }
    }

    /// The violation, if invalid.
    pub const fn violation(&self) -> Option<&Violation> {
        match self {
            Self::Invalid(v) => Some(v),
            _ => None,
        }
    }
}

/// A failed constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Message shown next to the field.
    pub message: String,
    /// `true` if the built-in required check failed.
    pub is_required: bool,
}

/// Callback receiving the field's validity after every evaluation.
pub type ValidChangeCallback = Rc<dyn Fn(bool)>;

/// Evaluates the required check and the constraints of a field.
pub struct Validator<T: ?Sized> {
    field_name: String,
    required: Option<Box<dyn FieldConstraint<T>>>,
    constraints: Vec<Box<dyn FieldConstraint<T>>>,
}

impl<T: ?Sized> std::fmt::Debug for Validator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("field_name", &self.field_name)
            .field("required", &self.required.is_some())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

impl<T: ?Sized> Validator<T> {
    /// Creates a validator.
    pub fn new(
        field_name: impl Into<String>,
        required: Option<Box<dyn FieldConstraint<T>>>,
        constraints: Vec<Box<dyn FieldConstraint<T>>>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            required,
            constraints,
        }
    }

    /// Evaluates a value: required check first, then constraints in order.
    pub fn evaluate(&self, value: &T) -> Validity {
        if let Some(message) = self
            .required
            .as_ref()
            .and_then(|c| c.check(value, &self.field_name))
        {
            return Validity::Invalid(Violation {
                message,
                is_required: true,
            });
        }
        self.constraints
            .iter()
            .find_map(|c| c.check(value, &self.field_name))
            .map_or(Validity::Valid, |message| {
                Validity::Invalid(Violation {
                    message,
                    is_required: false,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_check_runs_first() {
        let v: Validator<str> = Validator::new(
            "Email",
            Some(Box::new(StringConstraints::NotBlank)),
            vec![Box::new(StringConstraints::Email)],
        );
        let Validity::Invalid(violation) = v.evaluate("") else {
            unreachable!("blank value must be invalid")
        };
        assert!(violation.is_required);

        let Validity::Invalid(violation) = v.evaluate("nope") else {
            unreachable!("bad email must be invalid")
        };
        assert!(!violation.is_required);
        assert_eq!(v.evaluate("a@b.ee"), Validity::Valid);
    }

    #[test]
    fn test_first_failing_constraint_wins() {
        let v: Validator<str> = Validator::new(
            "Title",
            None,
            vec![
                Box::new(StringConstraints::max_length(2)),
                Box::new(StringConstraints::Email),
            ],
        );
        let violation = v.evaluate("abc").violation().cloned();
        assert!(violation.is_some_and(|v| v.message.contains("at most 2")));
        assert_eq!(Validity::Pristine.is_valid(), None);
    }
}
