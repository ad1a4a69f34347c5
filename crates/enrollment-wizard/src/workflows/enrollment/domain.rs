use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize};

/// Slot under which an in-progress draft is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftKey(pub String);

impl DraftKey {
    pub const DEFAULT: &'static str = "studentInfo";
}

impl Default for DraftKey {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The full enrollee record being filled in across the wizard.
///
/// Every field is always present; a fresh draft holds empty strings and no
/// room number. The serialized form uses camelCase keys. A stored
/// `roomNumber` may be a number or the raw digits typed into the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Draft {
    pub student_name: String,
    #[serde(deserialize_with = "room_number_from_stored")]
    pub room_number: Option<u32>,
    pub mobile_number: String,
    pub guardian_name: String,
    pub guardian_phone_number: String,
    pub address: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub gov_id: String,
    pub gov_id_image: String,
}

fn room_number_from_stored<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Number(u32),
        Text(String),
    }

    match Option::<Stored>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Stored::Number(room)) => Ok(Some(room)),
        Some(Stored::Text(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("room number '{raw}' is not numeric")))
        }
    }
}

impl Draft {
    /// Applies a single text edit. `roomNumber` accepts blank input as "unset".
    pub fn apply(&mut self, field: DraftField, value: &str) -> Result<(), DraftFieldError> {
        let slot = match field {
            DraftField::RoomNumber => {
                let trimmed = value.trim();
                self.room_number = if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.parse::<u32>().map_err(|_| {
                        DraftFieldError::InvalidRoomNumber {
                            value: value.to_string(),
                        }
                    })?)
                };
                return Ok(());
            }
            DraftField::StudentName => &mut self.student_name,
            DraftField::MobileNumber => &mut self.mobile_number,
            DraftField::GuardianName => &mut self.guardian_name,
            DraftField::GuardianPhoneNumber => &mut self.guardian_phone_number,
            DraftField::Address => &mut self.address,
            DraftField::Email => {
                self.email = value.trim().to_string();
                return Ok(());
            }
            DraftField::Password => &mut self.password,
            DraftField::ConfirmPassword => &mut self.confirm_password,
            DraftField::GovId => &mut self.gov_id,
        };
        *slot = value.to_string();
        Ok(())
    }

    pub fn text(&self, field: DraftField) -> Option<&str> {
        let value = match field {
            DraftField::RoomNumber => return None,
            DraftField::StudentName => &self.student_name,
            DraftField::MobileNumber => &self.mobile_number,
            DraftField::GuardianName => &self.guardian_name,
            DraftField::GuardianPhoneNumber => &self.guardian_phone_number,
            DraftField::Address => &self.address,
            DraftField::Email => &self.email,
            DraftField::Password => &self.password,
            DraftField::ConfirmPassword => &self.confirm_password,
            DraftField::GovId => &self.gov_id,
        };
        Some(value.as_str())
    }
}

/// Draft fields editable through plain text input. The identification image
/// is only ever set through the file encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DraftField {
    StudentName,
    RoomNumber,
    MobileNumber,
    GuardianName,
    GuardianPhoneNumber,
    Address,
    Email,
    Password,
    ConfirmPassword,
    GovId,
}

impl DraftField {
    pub const fn name(self) -> &'static str {
        match self {
            DraftField::StudentName => "studentName",
            DraftField::RoomNumber => "roomNumber",
            DraftField::MobileNumber => "mobileNumber",
            DraftField::GuardianName => "guardianName",
            DraftField::GuardianPhoneNumber => "guardianPhoneNumber",
            DraftField::Address => "address",
            DraftField::Email => "email",
            DraftField::Password => "password",
            DraftField::ConfirmPassword => "confirmPassword",
            DraftField::GovId => "govId",
        }
    }
}

impl FromStr for DraftField {
    type Err = DraftFieldError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let field = match raw {
            "studentName" => DraftField::StudentName,
            "roomNumber" => DraftField::RoomNumber,
            "mobileNumber" => DraftField::MobileNumber,
            "guardianName" => DraftField::GuardianName,
            "guardianPhoneNumber" => DraftField::GuardianPhoneNumber,
            "address" => DraftField::Address,
            "email" => DraftField::Email,
            "password" => DraftField::Password,
            "confirmPassword" => DraftField::ConfirmPassword,
            "govId" => DraftField::GovId,
            other => {
                return Err(DraftFieldError::UnknownField {
                    name: other.to_string(),
                })
            }
        };
        Ok(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftFieldError {
    #[error("unknown draft field '{name}'")]
    UnknownField { name: String },
    #[error("room number '{value}' is not a whole number")]
    InvalidRoomNumber { value: String },
}

/// The four stages of the wizard, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    PersonalInfo,
    GuardianInfo,
    Credentials,
    Identification,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Step::PersonalInfo,
        Step::GuardianInfo,
        Step::Credentials,
        Step::Identification,
    ];

    pub const FIRST: Step = Step::PersonalInfo;
    pub const LAST: Step = Step::Identification;

    pub const fn index(self) -> usize {
        match self {
            Step::PersonalInfo => 0,
            Step::GuardianInfo => 1,
            Step::Credentials => 2,
            Step::Identification => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Step::PersonalInfo => "Personal Information",
            Step::GuardianInfo => "Guardian Information",
            Step::Credentials => "Set Password",
            Step::Identification => "Government ID",
        }
    }

    /// Fields rendered on this step's form.
    pub const fn fields(self) -> &'static [DraftField] {
        match self {
            Step::PersonalInfo => &[
                DraftField::StudentName,
                DraftField::Email,
                DraftField::MobileNumber,
                DraftField::RoomNumber,
            ],
            Step::GuardianInfo => &[
                DraftField::GuardianName,
                DraftField::GuardianPhoneNumber,
                DraftField::Address,
            ],
            Step::Credentials => &[DraftField::Password, DraftField::ConfirmPassword],
            Step::Identification => &[DraftField::GovId],
        }
    }

    /// Saturates at the last step.
    pub const fn next(self) -> Step {
        match self {
            Step::PersonalInfo => Step::GuardianInfo,
            Step::GuardianInfo => Step::Credentials,
            Step::Credentials | Step::Identification => Step::Identification,
        }
    }

    /// Saturates at the first step.
    pub const fn previous(self) -> Step {
        match self {
            Step::PersonalInfo | Step::GuardianInfo => Step::PersonalInfo,
            Step::Credentials => Step::GuardianInfo,
            Step::Identification => Step::Credentials,
        }
    }

    pub const fn is_last(self) -> bool {
        matches!(self, Step::Identification)
    }

    /// Whether leaving this step requires the remote email check.
    pub const fn requires_uniqueness_check(self) -> bool {
        matches!(self, Step::PersonalInfo)
    }
}
