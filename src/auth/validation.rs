use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AppError;
use crate::users::repo_types::Role;

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_NAME_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 32;

/// Why a single field was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub type Checked = Result<(), FieldError>;

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trims an optional field; blank counts as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn check_email(email: &str) -> Checked {
    if email.is_empty() {
        return Err(FieldError::new("email", "Please provide your email"));
    }
    if !is_valid_email(email) {
        return Err(FieldError::new("email", "Please provide a valid email"));
    }
    Ok(())
}

pub fn check_name(name: &str) -> Checked {
    let name = name.trim();
    if name.is_empty() {
        return Err(FieldError::new("name", "Please tell us your name"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(FieldError::new(
            "name",
            format!("Name must have at most {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(())
}

pub fn check_phone(phone: Option<&str>) -> Checked {
    match phone {
        Some(p) if p.trim().chars().count() > MAX_PHONE_LEN => Err(FieldError::new(
            "phone",
            format!("Phone number must have at most {MAX_PHONE_LEN} characters"),
        )),
        _ => Ok(()),
    }
}

pub fn check_password(password: &str) -> Checked {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(FieldError::new(
            "password",
            format!("Password must have at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(FieldError::new(
            "password",
            format!("Password must have at most {MAX_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

pub fn check_password_confirm(password: &str, confirm: &str) -> Checked {
    if password != confirm {
        return Err(FieldError::new("passwordConfirm", "Passwords are not the same"));
    }
    Ok(())
}

/// Self-registration may pick `customer` or `engineer`; admins are made by
/// operators, never by signup.
pub fn check_signup_role(role: Option<&str>) -> Result<Role, FieldError> {
    match role.map(|r| r.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("customer") => Ok(Role::Customer),
        Some("engineer") => Ok(Role::Engineer),
        Some(_) => Err(FieldError::new("role", "Role must be customer or engineer")),
    }
}

/// Runs every check and folds failures into one `Validation` error.
pub fn collect(checks: impl IntoIterator<Item = Checked>) -> Result<(), AppError> {
    let reasons: Vec<String> = checks
        .into_iter()
        .filter_map(Result::err)
        .map(|e| e.reason)
        .collect();
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(reasons.join(". ")))
    }
}
