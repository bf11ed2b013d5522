//! Input validation helpers.
//!
//! Request DTOs derive [`validator::Validate`]; [`validate_input`] runs the
//! derived rules and folds every field message into a single string so the
//! client receives one readable error.

use std::sync::LazyLock;

use regex::Regex;
use validator::{Validate, ValidationErrors};

use crate::error::CoreError;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{3,32}$").expect("valid username regex"));

/// Join all field errors into one `"; "`-separated message.
///
/// Fields are sorted by name so the output is stable. Errors without a
/// custom message fall back to `"<field> is invalid"`.
pub fn joined_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| (field.to_string(), errs))
        .collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Run the derived validation rules, mapping failures to
/// [`CoreError::Validation`] with a joined message.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), CoreError> {
    input
        .validate()
        .map_err(|e| CoreError::Validation(joined_errors(&e)))
}

/// Usernames are 3-32 characters of ASCII letters, digits, or underscore.
pub fn validate_username(username: &str) -> Result<(), CoreError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(CoreError::Validation(
            "Username must be 3-32 characters of letters, digits, or underscore".into(),
        ))
    }
}

/// Minimum password length for new passwords.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Derive a URL slug: lowercase ASCII alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Signup {
        #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
        password: String,
        #[validate(email(message = "Email address is invalid"))]
        email: String,
        #[validate(length(max = 5))]
        nickname: String,
    }

    #[test]
    fn joined_errors_sorted_by_field() {
        let input = Signup {
            password: "short".into(),
            email: "not-an-email".into(),
            nickname: "ok".into(),
        };
        let err = validate_input(&input).unwrap_err();
        match err {
            CoreError::Validation(msg) => assert_eq!(
                msg,
                "Email address is invalid; Password must be at least 8 characters"
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_message_falls_back_to_field_name() {
        let input = Signup {
            password: "long-enough".into(),
            email: "a@b.co".into(),
            nickname: "much too long".into(),
        };
        let err = validate_input(&input).unwrap_err();
        assert_eq!(err.to_string(), "nickname is invalid");
    }

    #[test]
    fn valid_input_passes() {
        let input = Signup {
            password: "long-enough".into(),
            email: "a@b.co".into(),
            nickname: "ok".into(),
        };
        assert!(validate_input(&input).is_ok());
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("luna_22").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Fantasy & Sci-Fi"), "fantasy-sci-fi");
        assert_eq!(slugify("  Anime  "), "anime");
        assert_eq!(slugify("***"), "");
    }
}
