//! Field constraints.

use once_cell::sync::Lazy;
use regex::Regex;

/// A predicate over a field value that explains why a value is rejected.
pub trait FieldConstraint<T: ?Sized> {
    /// Returns a violation message, or `None` if the value is acceptable.
    ///
    /// `field_name` is the name used in messages.
    fn check(&self, value: &T, field_name: &str) -> Option<String>;
}

#[allow(clippy::expect_used)]
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    // Pattern is a literal
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern")
});

/// Constraints on string values.
#[derive(Debug, Clone)]
pub enum StringConstraints {
    /// Value must contain a non-whitespace character.
    NotBlank,
    /// Value length in characters must be within bounds.
    Length {
        /// Minimum length, inclusive.
        min: Option<usize>,
        /// Maximum length, inclusive.
        max: Option<usize>,
    },
    /// Value must look like an email address.
    Email,
    /// Every whitespace-separated token must look like an email address.
    EmailList,
    /// Value must match a pattern.
    Matches {
        /// The pattern.
        pattern: Regex,
        /// Message shown when the value does not match.
        message: String,
    },
}

impl StringConstraints {
    /// Constrains the length to at most `max` characters.
    pub const fn max_length(max: usize) -> Self {
        Self::Length {
            min: None,
            max: Some(max),
        }
    }
}

impl FieldConstraint<str> for StringConstraints {
    fn check(&self, value: &str, field_name: &str) -> Option<String> {
        match self {
            Self::NotBlank => value
                .trim()
                .is_empty()
                .then(|| format!("{field_name} is required")),
            Self::Length { min, max } => {
                let len = value.chars().count();
                if let Some(min) = min.filter(|min| len < *min) {
                    return Some(format!(
                        "{field_name} must be at least {min} characters long"
                    ));
                }
                max.filter(|max| len > *max).map(|max| {
                    format!("{field_name} must be at most {max} characters long (currently {len})")
                })
            }
            Self::Email => (!EMAIL_RE.is_match(value.trim()))
                .then(|| format!("{field_name} must be a valid email address")),
            Self::EmailList => value
                .split_whitespace()
                .find(|token| !EMAIL_RE.is_match(token))
                .map(|token| format!("'{token}' is not a valid email address")),
            Self::Matches { pattern, message } => {
                (!pattern.is_match(value)).then(|| message.clone())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_not_blank() {
        assert!(StringConstraints::NotBlank.check("  ", "Email").is_some());
        assert!(StringConstraints::NotBlank.check(" a ", "Email").is_none());
        assert_eq!(
            StringConstraints::NotBlank.check("", "Email").unwrap(),
            "Email is required"
        );
    }

    #[test]
    fn test_length_counts_characters() {
        let c = StringConstraints::max_length(3);
        assert!(c.check("õäö", "Title").is_none());
        assert!(c.check("õäöü", "Title").unwrap().contains("at most 3"));

        let min = StringConstraints::Length {
            min: Some(2),
            max: None,
        };
        assert!(min.check("a", "Title").unwrap().contains("at least 2"));
    }

    #[test]
    fn test_email_list_reports_first_bad_token() {
        let c = StringConstraints::EmailList;
        assert!(c.check("a@b.ee\nc@d.com", "Emails").is_none());
        assert_eq!(
            c.check("a@b.ee nope x@", "Emails").unwrap(),
            "'nope' is not a valid email address"
        );
    }

    #[test]
    fn test_matches() {
        let c = StringConstraints::Matches {
            pattern: Regex::new(r"^\d+$").unwrap(),
            message: "Digits only".to_string(),
        };
        assert!(c.check("123", "Code").is_none());
        assert_eq!(c.check("12a", "Code").unwrap(), "Digits only");
    }
}
