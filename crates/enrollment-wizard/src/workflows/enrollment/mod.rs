//! Student enrollment wizard: a four-step form with per-step gating, draft
//! save/resume, and a remote email uniqueness check before leaving the first
//! step.

pub mod controller;
pub mod domain;
pub mod drafts;
pub mod encoder;
pub mod gate;
pub mod notification;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use controller::{
    AdvanceOutcome, EnrollmentHost, GateTicket, ImageOutcome, ImageTicket, PendingAdvance,
    SaveOutcome, SessionStatus, WizardController, WizardError, WizardSettings, WizardSnapshot,
};
pub use domain::{Draft, DraftField, DraftFieldError, DraftKey, Step};
pub use drafts::{decode_draft, encode_draft, DraftStore, DraftStoreError, FileDraftStore};
pub use encoder::{EncodeError, FileEncoder, FileSelection, FileSource};
pub use gate::{ExistsResponse, GateError, HttpUniquenessGate, UniquenessGate, EXISTS_PATH};
pub use notification::{
    Notification, NotificationView, Notifier, Severity, EMAIL_TAKEN_MESSAGE,
    GENERIC_FAILURE_MESSAGE,
};
pub use router::{enrollment_router, FILE_NAME_HEADER};
pub use service::{EnrollmentService, EnrollmentServiceError, SessionId};
pub use validation::{
    field_issue, step_is_complete, validate_email, validate_phone, validate_text,
    CharacterClass, PasswordPolicy, PHONE_DIGITS,
};
