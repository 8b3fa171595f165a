use std::backtrace::Backtrace;
use rand::Rng;
use rocket::form;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::response::{Flash, Redirect};
use rocket_dyn_templates::Template;
use serde::Serialize;
use crate::booking::BookingError;

pub(crate) fn sqlx_to_custom_error(err: sqlx::Error) -> Custom<String> {
    error!("SQL Error: {err}\nbacktrace: {}", Backtrace::capture());
    Custom(Status::InternalServerError, format!("SQLx error: {}", err))
}
/// A refused booking becomes a message for the user, a storage failure stays an error.
pub(crate) fn booking_refusal(err: BookingError) -> Result<String, Custom<String>> {
    match err {
        BookingError::Storage(err) => Err(sqlx_to_custom_error(err)),
        refused => Ok(refused.to_string()),
    }
}
pub(crate) fn not_found(what: &str) -> Custom<String> {
    Custom(Status::NotFound, format!("{what} not found"))
}

pub fn generate_random_string(len: usize) -> String {
    const WOWELS: &str = "aeiouy";
    const CONSONANTS: &str = "bcdfghjklmnopqrstvwxz";
    let mut rng = rand::rng();
    (0..len)
        .map(|n| {
            let charset = if n % 2 == 0 { CONSONANTS.as_bytes() } else { WOWELS.as_bytes() };
            charset[rng.random_range(0..charset.len())] as char
        })
        .collect()
}

/// One-shot notice shown after a redirect.
#[derive(Serialize, Debug)]
pub(crate) struct Notice {
    kind: String,
    message: String,
}
impl From<rocket::request::FlashMessage<'_>> for Notice {
    fn from(flash: rocket::request::FlashMessage<'_>) -> Self {
        Self {
            kind: flash.kind().to_string(),
            message: flash.message().to_string(),
        }
    }
}

/// Entry of a `<select>` element.
#[derive(Serialize, Debug)]
pub(crate) struct SelectOption {
    pub id: i64,
    pub label: String,
    pub selected: bool,
}

/// Submitted form: redirect on success, re-rendered form with errors otherwise.
pub(crate) type FormOutcome = Result<Flash<Redirect>, (Status, Template)>;

/// Validation failures of a contextual form, as displayable lines.
pub(crate) fn form_errors(ctx: &form::Context<'_>) -> Vec<String> {
    ctx.errors()
        .map(|e| match &e.name {
            Some(name) => format!("{name}: {}", e.kind),
            None => e.kind.to_string(),
        })
        .collect()
}
/// Submitted raw value of a form field, used to re-render a rejected form.
pub(crate) fn form_value(ctx: &form::Context<'_>, name: &str) -> String {
    ctx.field_value(name).unwrap_or_default().to_string()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() > 1
        && domain.split('.').all(|part| !part.is_empty())
        && !email.chars().any(char::is_whitespace)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(e) if e.is_unique_violation())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_random_string() {
        let s = generate_random_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_email() {
        for (email, valid) in [
            ("anna@gym.local", true),
            ("a.b@c.d.e", true),
            ("anna", false),
            ("@gym.local", false),
            ("anna@gym", false),
            ("anna@gym.", false),
            ("an na@gym.local", false),
            ("a@b@gym.local", false),
        ] {
            assert_eq!(is_valid_email(email), valid, "{email}");
        }
    }
}
