use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{Draft, DraftField, DraftFieldError, DraftKey, Step};
use super::drafts::DraftStore;
use super::encoder::{EncodeError, FileEncoder, FileSelection, FileSource};
use super::gate::{GateError, UniquenessGate};
use super::notification::{
    Notification, NotificationView, Notifier, Severity, EMAIL_TAKEN_MESSAGE,
    GENERIC_FAILURE_MESSAGE,
};
use super::validation::{field_issue, step_is_complete, PasswordPolicy};
use crate::config::WizardConfig;

/// Callbacks into whatever owns the wizard.
pub trait EnrollmentHost: Send + Sync {
    /// Called once with the finished draft.
    fn on_submit(&self, draft: &Draft);
    /// Called after the draft was saved and the session closed.
    fn on_close(&self);
}

/// Per-session knobs derived from [`WizardConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardSettings {
    pub draft_key: DraftKey,
    pub password_policy: PasswordPolicy,
    pub notification_delay: Duration,
    pub max_image_bytes: usize,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self::from(&WizardConfig::default())
    }
}

impl From<&WizardConfig> for WizardSettings {
    fn from(config: &WizardConfig) -> Self {
        Self {
            draft_key: config.draft_key.clone(),
            password_policy: config.password_policy.clone(),
            notification_delay: config.notification_delay,
            max_image_bytes: config.max_image_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Closed,
    Submitted,
}

/// Commands the wizard refuses outright. None of these change state.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("step '{}' is incomplete", .step.label())]
    StepIncomplete { step: Step },
    #[error("an email uniqueness check is already in flight")]
    GateCheckPending,
    #[error("submit is only available on the last step (currently on '{}')", .step.label())]
    NotAtFinalStep { step: Step },
    #[error("session is no longer open ({status:?})")]
    SessionFinished { status: SessionStatus },
    #[error(transparent)]
    Field(#[from] DraftFieldError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AdvanceOutcome {
    Advanced { to: Step },
    EmailTaken,
    GateFailed,
    /// The answer arrived after the session, step, or draft moved on.
    Stale,
    /// Advancing past the last step does nothing; submit instead.
    AtLastStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ImageOutcome {
    Applied,
    Failed,
    Stale,
    NoFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SaveOutcome {
    Closed,
    Failed,
}

/// Token for an outstanding uniqueness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateTicket {
    id: u64,
    email: String,
    epoch: u64,
    navigation: u64,
}

impl GateTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Result of [`WizardController::begin_advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAdvance {
    Settled(AdvanceOutcome),
    GateCheck(GateTicket),
}

/// Token for an outstanding image encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTicket {
    request: u64,
    epoch: u64,
    file: FileSource,
}

impl ImageTicket {
    pub fn file(&self) -> &FileSource {
        &self.file
    }
}

/// Everything a form needs to render the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardSnapshot {
    pub draft: Draft,
    pub active_step: Step,
    pub step_index: usize,
    pub step_label: &'static str,
    pub is_next_enabled: bool,
    pub gate_check_in_flight: bool,
    pub shows_submit: bool,
    pub status: SessionStatus,
    pub field_issues: BTreeMap<&'static str, String>,
    pub notification: NotificationView,
}

impl WizardSnapshot {
    /// Masks the credential fields for responses that leave the process.
    pub fn redacted(mut self) -> Self {
        for secret in [&mut self.draft.password, &mut self.draft.confirm_password] {
            if !secret.is_empty() {
                *secret = "*".repeat(secret.chars().count());
            }
        }
        self
    }
}

/// Clears the in-flight flag if an `advance` future is dropped before the
/// gate answers.
struct InFlightCheck<'a, S, G, H> {
    controller: &'a mut WizardController<S, G, H>,
    ticket: Option<u64>,
}

impl<S, G, H> Drop for InFlightCheck<'_, S, G, H> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.controller.abandon_advance(ticket);
        }
    }
}

/// State machine driving one enrollment session.
pub struct WizardController<S, G, H> {
    store: Arc<S>,
    gate: Arc<G>,
    host: Arc<H>,
    encoder: FileEncoder,
    notifier: Notifier,
    policy: PasswordPolicy,
    key: DraftKey,
    draft: Draft,
    active_step: Step,
    is_next_enabled: bool,
    status: SessionStatus,
    gate_check: Option<u64>,
    next_ticket: u64,
    epoch: u64,
    navigation: u64,
    image_request: u64,
}

impl<S, G, H> WizardController<S, G, H> {
    /// Forgets an outstanding gate check whose answer will never arrive.
    /// Only the check identified by `ticket` is cleared.
    pub fn abandon_advance(&mut self, ticket: u64) -> bool {
        if self.gate_check != Some(ticket) {
            return false;
        }
        self.gate_check = None;
        warn!(ticket, "email uniqueness check abandoned");
        true
    }
}

impl<S, G, H> WizardController<S, G, H>
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    pub fn new(store: Arc<S>, gate: Arc<G>, host: Arc<H>, settings: WizardSettings) -> Self {
        let mut controller = Self {
            store,
            gate,
            host,
            encoder: FileEncoder::new(settings.max_image_bytes),
            notifier: Notifier::new(settings.notification_delay),
            policy: settings.password_policy,
            key: settings.draft_key,
            draft: Draft::default(),
            active_step: Step::FIRST,
            is_next_enabled: false,
            status: SessionStatus::Open,
            gate_check: None,
            next_ticket: 0,
            epoch: 0,
            navigation: 0,
            image_request: 0,
        };
        controller.refresh_gating();
        controller
    }

    /// Opens a session and immediately restores any saved draft.
    pub fn start(store: Arc<S>, gate: Arc<G>, host: Arc<H>, settings: WizardSettings) -> Self {
        let mut controller = Self::new(store, gate, host, settings);
        controller.resume_from_store();
        controller
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn active_step(&self) -> Step {
        self.active_step
    }

    pub fn is_next_enabled(&self) -> bool {
        self.is_next_enabled
    }

    pub fn gate_check_in_flight(&self) -> bool {
        self.gate_check.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn draft_key(&self) -> &DraftKey {
        &self.key
    }

    pub fn notification(&self) -> Option<Notification> {
        self.notifier.current()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn gate(&self) -> Arc<G> {
        Arc::clone(&self.gate)
    }

    pub fn encoder(&self) -> FileEncoder {
        self.encoder
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        let field_issues = self
            .active_step
            .fields()
            .iter()
            .filter_map(|field| {
                field_issue(*field, &self.draft, &self.policy).map(|issue| (field.name(), issue))
            })
            .collect();

        WizardSnapshot {
            draft: self.draft.clone(),
            active_step: self.active_step,
            step_index: self.active_step.index(),
            step_label: self.active_step.label(),
            is_next_enabled: self.is_next_enabled,
            gate_check_in_flight: self.gate_check_in_flight(),
            shows_submit: self.active_step.is_last(),
            status: self.status,
            field_issues,
            notification: self.notifier.view(),
        }
    }

    /// Replaces the draft with the stored one if a readable save exists.
    pub fn resume(&mut self) -> Result<bool, WizardError> {
        self.ensure_open()?;
        Ok(self.resume_from_store())
    }

    fn resume_from_store(&mut self) -> bool {
        let Some(stored) = self.store.load(&self.key) else {
            debug!(key = %self.key, "no stored draft to resume");
            return false;
        };

        self.draft = stored;
        self.active_step = Step::FIRST;
        self.gate_check = None;
        self.epoch += 1;
        self.refresh_gating();
        info!(key = %self.key, "resumed stored draft");
        true
    }

    pub fn edit_field(&mut self, field: DraftField, value: &str) -> Result<(), WizardError> {
        self.ensure_open()?;
        self.draft.apply(field, value)?;
        self.refresh_gating();
        Ok(())
    }

    pub fn select_category(&mut self, label: &str) -> Result<(), WizardError> {
        self.ensure_open()?;
        self.draft.gov_id = label.to_string();
        self.refresh_gating();
        Ok(())
    }

    /// Starts handling a file selection. Returns `None` when the event
    /// carried no file; additional files are ignored.
    pub fn begin_image_edit(
        &mut self,
        selection: &FileSelection,
    ) -> Result<Option<ImageTicket>, WizardError> {
        self.ensure_open()?;
        let Some(file) = selection.first() else {
            return Ok(None);
        };
        if selection.files.len() > 1 {
            debug!(
                ignored = selection.files.len() - 1,
                "only the first selected file is used"
            );
        }

        self.image_request += 1;
        Ok(Some(ImageTicket {
            request: self.image_request,
            epoch: self.epoch,
            file: file.clone(),
        }))
    }

    /// Applies an encode result if the ticket is still the newest request of
    /// this session. A failed read leaves the field as it was.
    pub fn complete_image_edit(
        &mut self,
        ticket: ImageTicket,
        result: Result<String, EncodeError>,
    ) -> ImageOutcome {
        if self.status != SessionStatus::Open
            || ticket.epoch != self.epoch
            || ticket.request != self.image_request
        {
            debug!(request = ticket.request, "discarding stale image encode");
            return ImageOutcome::Stale;
        }

        match result {
            Ok(encoded) => {
                self.draft.gov_id_image = encoded;
                self.refresh_gating();
                ImageOutcome::Applied
            }
            Err(err) => {
                warn!(error = %err, "identification image not attached");
                ImageOutcome::Failed
            }
        }
    }

    pub async fn edit_image_field(
        &mut self,
        selection: &FileSelection,
    ) -> Result<ImageOutcome, WizardError> {
        let Some(ticket) = self.begin_image_edit(selection)? else {
            return Ok(ImageOutcome::NoFile);
        };
        let result = self.encoder.encode(ticket.file()).await;
        Ok(self.complete_image_edit(ticket, result))
    }

    /// First half of `advance`. Steps without a remote check settle
    /// immediately; leaving the first step hands back a ticket for the gate.
    pub fn begin_advance(&mut self) -> Result<PendingAdvance, WizardError> {
        self.ensure_open()?;
        if self.gate_check.is_some() {
            return Err(WizardError::GateCheckPending);
        }
        if !self.is_next_enabled {
            return Err(WizardError::StepIncomplete {
                step: self.active_step,
            });
        }
        if self.active_step.is_last() {
            return Ok(PendingAdvance::Settled(AdvanceOutcome::AtLastStep));
        }

        if self.active_step.requires_uniqueness_check() {
            self.next_ticket += 1;
            let ticket = GateTicket {
                id: self.next_ticket,
                email: self.draft.email.clone(),
                epoch: self.epoch,
                navigation: self.navigation,
            };
            self.gate_check = Some(ticket.id);
            debug!(ticket = ticket.id, "email uniqueness check started");
            return Ok(PendingAdvance::GateCheck(ticket));
        }

        Ok(PendingAdvance::Settled(self.step_forward()))
    }

    /// Second half of `advance`: folds the gate's answer into the session.
    pub fn complete_advance(
        &mut self,
        ticket: GateTicket,
        answer: Result<bool, GateError>,
    ) -> AdvanceOutcome {
        if self.gate_check != Some(ticket.id) {
            debug!(ticket = ticket.id, "gate answer for a superseded check");
            return AdvanceOutcome::Stale;
        }
        self.gate_check = None;

        if self.status != SessionStatus::Open
            || ticket.epoch != self.epoch
            || ticket.navigation != self.navigation
            || ticket.email != self.draft.email
            || !self.is_next_enabled
        {
            debug!(ticket = ticket.id, "discarding gate answer, session moved on");
            return AdvanceOutcome::Stale;
        }

        match answer {
            Ok(false) => self.step_forward(),
            Ok(true) => {
                info!("enrollment blocked, email already registered");
                self.notifier.show(Severity::Error, EMAIL_TAKEN_MESSAGE);
                AdvanceOutcome::EmailTaken
            }
            Err(err) => {
                warn!(error = %err, "email uniqueness check failed");
                self.notifier.show(Severity::Error, GENERIC_FAILURE_MESSAGE);
                AdvanceOutcome::GateFailed
            }
        }
    }

    pub async fn advance(&mut self) -> Result<AdvanceOutcome, WizardError> {
        match self.begin_advance()? {
            PendingAdvance::Settled(outcome) => Ok(outcome),
            PendingAdvance::GateCheck(ticket) => {
                let gate = Arc::clone(&self.gate);
                let mut pending = InFlightCheck {
                    controller: self,
                    ticket: Some(ticket.id),
                };
                let answer = gate.exists(ticket.email()).await;
                pending.ticket = None;
                Ok(pending.controller.complete_advance(ticket, answer))
            }
        }
    }

    /// Always allowed; stays on the first step when already there.
    pub fn retreat(&mut self) -> Result<Step, WizardError> {
        self.ensure_open()?;
        self.navigation += 1;
        self.active_step = self.active_step.previous();
        self.refresh_gating();
        debug!(step = self.active_step.index(), "moved back");
        Ok(self.active_step)
    }

    /// Persists the whole draft without validating it, then closes the
    /// session. A store failure keeps the session open and notifies.
    pub fn save_and_close(&mut self) -> Result<SaveOutcome, WizardError> {
        self.ensure_open()?;
        match self.store.save(&self.key, &self.draft) {
            Ok(()) => {
                self.finish(SessionStatus::Closed);
                info!(key = %self.key, "draft saved, session closed");
                self.host.on_close();
                Ok(SaveOutcome::Closed)
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "draft save failed");
                self.notifier.show(Severity::Error, GENERIC_FAILURE_MESSAGE);
                Ok(SaveOutcome::Failed)
            }
        }
    }

    /// Hands the draft to the host. The stored draft slot is left untouched.
    pub fn submit(&mut self) -> Result<(), WizardError> {
        self.ensure_open()?;
        if !self.active_step.is_last() {
            return Err(WizardError::NotAtFinalStep {
                step: self.active_step,
            });
        }
        if !self.is_next_enabled {
            return Err(WizardError::StepIncomplete {
                step: self.active_step,
            });
        }

        self.finish(SessionStatus::Submitted);
        info!("enrollment submitted");
        self.host.on_submit(&self.draft);
        Ok(())
    }

    pub fn dismiss_notification(&mut self) -> Option<Notification> {
        self.notifier.dismiss()
    }

    fn step_forward(&mut self) -> AdvanceOutcome {
        self.navigation += 1;
        self.active_step = self.active_step.next();
        self.refresh_gating();
        info!(step = self.active_step.index(), "advanced");
        AdvanceOutcome::Advanced {
            to: self.active_step,
        }
    }

    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.gate_check = None;
        self.epoch += 1;
    }

    fn refresh_gating(&mut self) {
        self.is_next_enabled = step_is_complete(self.active_step, &self.draft, &self.policy);
    }

    fn ensure_open(&self) -> Result<(), WizardError> {
        match self.status {
            SessionStatus::Open => Ok(()),
            status => Err(WizardError::SessionFinished { status }),
        }
    }
}
