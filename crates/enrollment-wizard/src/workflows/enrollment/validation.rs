use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::domain::{Draft, DraftField, Step};

/// Number of digits a phone number must carry.
pub const PHONE_DIGITS: usize = 10;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("email regex is valid")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^[0-9]{{{PHONE_DIGITS}}}$")).expect("phone regex is valid")
});

pub fn validate_text(value: &str) -> bool {
    !value.trim().is_empty()
}

/// `local@domain` with at least one dot inside the domain. Surrounding
/// whitespace is not accepted; it would reach the uniqueness check verbatim.
pub fn validate_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

pub fn validate_phone(value: &str) -> bool {
    PHONE.is_match(value)
}

/// Character class a password may be required to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterClass {
    Upper,
    Lower,
    Digit,
    Symbol,
}

impl CharacterClass {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "upper" | "uppercase" => Some(Self::Upper),
            "lower" | "lowercase" => Some(Self::Lower),
            "digit" | "number" => Some(Self::Digit),
            "symbol" | "special" => Some(Self::Symbol),
            _ => None,
        }
    }

    fn matches(self, ch: char) -> bool {
        match self {
            CharacterClass::Upper => ch.is_uppercase(),
            CharacterClass::Lower => ch.is_lowercase(),
            CharacterClass::Digit => ch.is_ascii_digit(),
            CharacterClass::Symbol => !ch.is_alphanumeric() && !ch.is_whitespace(),
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            CharacterClass::Upper => "an uppercase letter",
            CharacterClass::Lower => "a lowercase letter",
            CharacterClass::Digit => "a digit",
            CharacterClass::Symbol => "a symbol",
        }
    }
}

/// Password rules supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub required_classes: Vec<CharacterClass>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            required_classes: vec![
                CharacterClass::Upper,
                CharacterClass::Lower,
                CharacterClass::Digit,
                CharacterClass::Symbol,
            ],
        }
    }
}

impl PasswordPolicy {
    pub fn accepts(&self, password: &str) -> bool {
        password.chars().count() >= self.min_length
            && self
                .required_classes
                .iter()
                .all(|class| password.chars().any(|ch| class.matches(ch)))
    }

    pub fn describe(&self) -> String {
        let classes: Vec<&str> = self
            .required_classes
            .iter()
            .map(|class| class.describe())
            .collect();
        if classes.is_empty() {
            format!("Password must be at least {} characters", self.min_length)
        } else {
            format!(
                "Password must be at least {} characters and include {}",
                self.min_length,
                classes.join(", ")
            )
        }
    }
}

/// Gating predicate for `step`: every required field on it is well formed.
pub fn step_is_complete(step: Step, draft: &Draft, policy: &PasswordPolicy) -> bool {
    match step {
        Step::PersonalInfo => {
            validate_text(&draft.student_name)
                && validate_email(&draft.email)
                && validate_phone(&draft.mobile_number)
        }
        Step::GuardianInfo => {
            validate_text(&draft.guardian_name)
                && validate_phone(&draft.guardian_phone_number)
                && !draft.address.is_empty()
        }
        Step::Credentials => {
            policy.accepts(&draft.password)
                && policy.accepts(&draft.confirm_password)
                && draft.password == draft.confirm_password
        }
        Step::Identification => !draft.gov_id.is_empty() && !draft.gov_id_image.is_empty(),
    }
}

/// Helper text for a field that holds input but fails its check. Empty fields
/// stay quiet so a fresh form is not covered in errors.
pub fn field_issue(field: DraftField, draft: &Draft, policy: &PasswordPolicy) -> Option<String> {
    let value = draft.text(field)?;
    if value.is_empty() {
        return None;
    }

    match field {
        DraftField::StudentName | DraftField::GuardianName if !validate_text(value) => {
            Some("Name cannot be blank".to_string())
        }
        DraftField::Email if !validate_email(value) => {
            Some("Enter a valid email address".to_string())
        }
        DraftField::MobileNumber | DraftField::GuardianPhoneNumber if !validate_phone(value) => {
            Some(format!("Phone number must be {PHONE_DIGITS} digits"))
        }
        DraftField::Password if !policy.accepts(value) => Some(policy.describe()),
        DraftField::ConfirmPassword if value != draft.password => {
            Some("Passwords do not match".to_string())
        }
        _ => None,
    }
}
