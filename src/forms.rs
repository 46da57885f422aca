//! Submitted form payloads and their validation rules.

use std::borrow::Cow;
use std::collections::HashMap;

use spin_sdk::http::Request;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::core::query_params::parse_pairs;
use crate::session::RequestContext;

pub const REQUIRED: &str = "This field is required.";
pub const CSRF_INVALID: &str = "The CSRF token is missing or invalid.";
pub const USERNAME_TAKEN: &str = "Please use a different username.";
pub const EMAIL_TAKEN: &str = "Please use a different email address.";

/// Fields of an `application/x-www-form-urlencoded` body.
#[derive(Debug, Default)]
pub struct Fields(HashMap<String, String>);

impl Fields {
    pub fn parse(body: &[u8]) -> Self {
        Fields(parse_pairs(&String::from_utf8_lossy(body)))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn text(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }

    pub fn trimmed(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().trim().to_string()
    }

    /// Checkbox semantics: present and not an explicit false value.
    pub fn checked(&self, name: &str) -> bool {
        match self.get(name) {
            Some(value) => !matches!(value.to_ascii_lowercase().as_str(), "" | "false" | "off" | "0"),
            None => false,
        }
    }
}

pub trait FormData: Validate + Sized {
    fn from_fields(fields: &Fields) -> Self;
}

/// One message per failing field.
#[derive(Debug, Default, Clone)]
pub struct FormErrors(HashMap<String, String>);

impl FormErrors {
    pub fn from_validation(result: Result<(), ValidationErrors>) -> Self {
        let mut errors = FormErrors::default();
        if let Err(validation) = result {
            for (field, field_errors) in validation.field_errors() {
                let chosen = field_errors
                    .iter()
                    .find(|e| e.code == "required")
                    .or_else(|| field_errors.first());
                if let Some(error) = chosen {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Invalid value.".to_string());
                    errors.add(&field.to_string(), message);
                }
            }
        }
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Parse, validate and CSRF-check the request body as `F`.
pub fn bind<F: FormData>(ctx: &RequestContext, req: &Request) -> (F, FormErrors) {
    let fields = Fields::parse(req.body());
    let form = F::from_fields(&fields);
    let mut errors = FormErrors::from_validation(form.validate());
    if !ctx.verify_csrf(fields.get("csrf_token")) {
        errors.add("csrf_token", CSRF_INVALID);
    }
    (form, errors)
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("required");
        error.message = Some(Cow::Borrowed(REQUIRED));
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Default, Validate)]
pub struct LoginForm {
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 64, message = "Field must be between 1 and 64 characters long.")
    )]
    pub username: String,
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 128, message = "Field must be between 1 and 128 characters long.")
    )]
    pub password: String,
    pub remember_me: bool,
}

impl FormData for LoginForm {
    fn from_fields(fields: &Fields) -> Self {
        Self {
            username: fields.trimmed("username"),
            password: fields.text("password"),
            remember_me: fields.checked("remember_me"),
        }
    }
}

#[derive(Debug, Default, Validate)]
pub struct RegistrationForm {
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 64, message = "Field must be between 1 and 64 characters long.")
    )]
    pub username: String,
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 120, message = "Field must be between 1 and 120 characters long."),
        email(message = "Invalid email address.")
    )]
    pub email: String,
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 128, message = "Field must be between 1 and 128 characters long.")
    )]
    pub password: String,
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 128, message = "Field must be between 1 and 128 characters long."),
        must_match(other = "password", message = "Field must be equal to password.")
    )]
    pub password2: String,
}

impl FormData for RegistrationForm {
    fn from_fields(fields: &Fields) -> Self {
        Self {
            username: fields.trimmed("username"),
            email: fields.trimmed("email"),
            password: fields.text("password"),
            password2: fields.text("password2"),
        }
    }
}

#[derive(Debug, Default, Validate)]
pub struct EditProfileForm {
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 64, message = "Field must be between 1 and 64 characters long.")
    )]
    pub username: String,
    #[validate(length(max = 140, message = "Field must be between 0 and 140 characters long."))]
    pub about_me: String,
}

impl FormData for EditProfileForm {
    fn from_fields(fields: &Fields) -> Self {
        Self {
            username: fields.trimmed("username"),
            about_me: fields.text("about_me"),
        }
    }
}

#[derive(Debug, Default, Validate)]
pub struct PostForm {
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 140, message = "Field must be between 1 and 140 characters long.")
    )]
    pub post: String,
}

impl FormData for PostForm {
    fn from_fields(fields: &Fields) -> Self {
        Self {
            post: fields.text("post"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for<F: FormData>(body: &str) -> FormErrors {
        let form = F::from_fields(&Fields::parse(body.as_bytes()));
        FormErrors::from_validation(form.validate())
    }

    #[test]
    fn valid_registration_passes() {
        let errors = errors_for::<RegistrationForm>(
            "username=susan&email=susan%40example.com&password=cat&password2=cat",
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn registration_reports_each_bad_field() {
        let errors = errors_for::<RegistrationForm>(
            "username=+++&email=not-an-email&password=cat&password2=dog",
        );
        assert_eq!(errors.get("username"), Some(REQUIRED));
        assert_eq!(errors.get("email"), Some("Invalid email address."));
        assert_eq!(errors.get("password2"), Some("Field must be equal to password."));
        assert!(!errors.has("password"));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn missing_fields_are_required_not_too_short() {
        let errors = errors_for::<LoginForm>("");
        assert_eq!(errors.get("username"), Some(REQUIRED));
        assert_eq!(errors.get("password"), Some(REQUIRED));
    }

    #[test]
    fn lengths_count_characters() {
        let username = "é".repeat(64);
        let errors = errors_for::<LoginForm>(&format!(
            "username={}&password=x",
            urlencoding::encode(&username)
        ));
        assert!(errors.is_empty());

        let errors = errors_for::<PostForm>(&format!("post={}", "a".repeat(141)));
        assert_eq!(
            errors.get("post"),
            Some("Field must be between 1 and 140 characters long.")
        );
    }

    #[test]
    fn about_me_may_be_empty_but_not_long() {
        assert!(errors_for::<EditProfileForm>("username=susan&about_me=").is_empty());
        let errors =
            errors_for::<EditProfileForm>(&format!("username=susan&about_me={}", "b".repeat(141)));
        assert!(errors.has("about_me"));
    }

    #[test]
    fn checkbox_values() {
        let fields = Fields::parse(b"remember_me=y&off=false");
        assert!(fields.checked("remember_me"));
        assert!(!fields.checked("off"));
        assert!(!fields.checked("absent"));
    }

    #[test]
    fn usernames_are_trimmed() {
        let form = LoginForm::from_fields(&Fields::parse(b"username=++susan++&password=+pw+"));
        assert_eq!(form.username, "susan");
        assert_eq!(form.password, " pw ");
    }
}
