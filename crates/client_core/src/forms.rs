//! Data-driven form fields and the validation rules for the account forms.

use std::collections::BTreeMap;

use shared::protocol::ProfileUpdate;
use thiserror::Error;

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_SPECIALS: &[char] = &['@', '$', '!', '%', '*', '?', '&'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid form: {}", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.errors.iter().find(|error| error.field == field)
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| format!("{}: {}", error.field, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn finish(errors: Vec<FieldError>) -> Result<(), ValidationError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { errors })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Email,
    Tel,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    Text {
        name: &'static str,
        label: &'static str,
        kind: InputKind,
        required: bool,
        editable: bool,
        placeholder: Option<&'static str>,
    },
    Select {
        name: &'static str,
        label: &'static str,
        options: Vec<&'static str>,
        required: bool,
    },
}

impl FieldSpec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text { name, .. } | Self::Select { name, .. } => name,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Text { label, .. } | Self::Select { label, .. } => label,
        }
    }

    pub fn is_editable(&self) -> bool {
        match self {
            Self::Text { editable, .. } => *editable,
            Self::Select { .. } => true,
        }
    }

    pub fn validate(&self, value: Option<&str>) -> Result<(), FieldError> {
        let value = value.map(str::trim).filter(|value| !value.is_empty());
        match (self, value) {
            (Self::Text { required: true, name, label, .. }, None)
            | (Self::Select { required: true, name, label, .. }, None) => {
                Err(FieldError::new(name, format!("{label} is required")))
            }
            (_, None) => Ok(()),
            (Self::Text { kind: InputKind::Email, name, .. }, Some(value)) => {
                if looks_like_email(value) {
                    Ok(())
                } else {
                    Err(FieldError::new(name, "Enter a valid email address"))
                }
            }
            (Self::Text { kind: InputKind::Tel, name, .. }, Some(value)) => {
                let digits = value.chars().filter(char::is_ascii_digit).count();
                let allowed = value
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' '));
                if allowed && digits >= 6 {
                    Ok(())
                } else {
                    Err(FieldError::new(name, "Enter a valid phone number"))
                }
            }
            (Self::Text { .. }, Some(_)) => Ok(()),
            (Self::Select { name, label, options, .. }, Some(value)) => {
                if options.iter().any(|option| *option == value) {
                    Ok(())
                } else {
                    Err(FieldError::new(name, format!("Choose a listed {label}")))
                }
            }
        }
    }
}

/// Personal-data fields of the edit-profile form.
pub fn profile_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::Text {
            name: "fName",
            label: "First Name",
            kind: InputKind::Text,
            required: true,
            editable: true,
            placeholder: Some("First name"),
        },
        FieldSpec::Text {
            name: "lName",
            label: "Last Name",
            kind: InputKind::Text,
            required: true,
            editable: true,
            placeholder: Some("Last name"),
        },
        FieldSpec::Text {
            name: "email",
            label: "Email",
            kind: InputKind::Email,
            required: true,
            editable: false,
            placeholder: None,
        },
        FieldSpec::Text {
            name: "phoneNumber",
            label: "Phone Number",
            kind: InputKind::Tel,
            required: true,
            editable: true,
            placeholder: Some("+880 1XXX-XXXXXX"),
        },
        FieldSpec::Text {
            name: "dateOfBirth",
            label: "Date of Birth",
            kind: InputKind::Date,
            required: false,
            editable: true,
            placeholder: None,
        },
        FieldSpec::Select {
            name: "gender",
            label: "Gender",
            options: vec!["male", "female", "other"],
            required: true,
        },
    ]
}

/// Checks the editable fields and builds the update payload. Locked fields
/// (the email) are never sent.
pub fn validate_profile(
    fields: &[FieldSpec],
    values: &BTreeMap<String, String>,
    photo: Option<&str>,
) -> Result<ProfileUpdate, ValidationError> {
    let mut errors = Vec::new();
    let mut accepted = BTreeMap::new();

    for field in fields.iter().filter(|field| field.is_editable()) {
        let value = values.get(field.name()).map(String::as_str);
        match field.validate(value) {
            Ok(()) => {
                if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
                    accepted.insert(field.name().to_string(), value.to_string());
                }
            }
            Err(error) => errors.push(error),
        }
    }

    let photo = photo.map(str::trim).filter(|photo| !photo.is_empty());
    if photo.is_none() {
        errors.push(FieldError::new("photo", "Photo is required"));
    }

    finish(errors)?;
    Ok(ProfileUpdate {
        photo: photo.unwrap_or_default().to_string(),
        fields: accepted,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasswordChecks {
    pub min_length: bool,
    pub has_letter: bool,
    pub has_number: bool,
    pub has_special: bool,
}

impl PasswordChecks {
    pub fn evaluate(password: &str) -> Self {
        Self {
            min_length: password.chars().count() >= PASSWORD_MIN_LEN,
            has_letter: password.chars().any(|c| c.is_ascii_alphabetic()),
            has_number: password.chars().any(|c| c.is_ascii_digit()),
            has_special: password.chars().any(|c| PASSWORD_SPECIALS.contains(&c)),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.min_length && self.has_letter && self.has_number && self.has_special
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub agree_to_terms: bool,
}

pub fn validate_registration(form: &RegistrationForm) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    if form.first_name.trim().is_empty() {
        errors.push(FieldError::new("fName", "First name is required"));
    }
    if form.last_name.trim().is_empty() {
        errors.push(FieldError::new("lName", "Last name is required"));
    }
    if form.email.trim().is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if !looks_like_email(form.email.trim()) {
        errors.push(FieldError::new("email", "Enter a valid email address"));
    }
    if !PasswordChecks::evaluate(&form.password).all_passed() {
        errors.push(FieldError::new(
            "password",
            "Password must meet all specified requirements.",
        ));
    }
    if !form.agree_to_terms {
        errors.push(FieldError::new(
            "agreeToTerms",
            "You must agree to the terms and conditions to proceed.",
        ));
    }

    finish(errors)
}

pub fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[cfg(test)]
#[path = "tests/forms_tests.rs"]
mod tests;
