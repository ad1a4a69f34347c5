use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::controller::{
    AdvanceOutcome, EnrollmentHost, ImageOutcome, PendingAdvance, SaveOutcome, WizardController,
    WizardError, WizardSettings, WizardSnapshot,
};
use super::domain::{DraftField, DraftFieldError};
use super::drafts::DraftStore;
use super::encoder::FileSelection;
use super::gate::UniquenessGate;

/// Identifier handed out for each open wizard session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("wiz-{id:06}"))
}

type SharedController<S, G, H> = Arc<Mutex<WizardController<S, G, H>>>;

/// Registry of live wizard sessions sharing one store, gate, and host.
///
/// Each session sits behind its own lock. The lock is never held across the
/// gate call or the file read; the controller's tickets decide whether a late
/// answer still applies.
pub struct EnrollmentService<S, G, H> {
    store: Arc<S>,
    gate: Arc<G>,
    host: Arc<H>,
    settings: WizardSettings,
    gov_id_options: Vec<String>,
    sessions: Mutex<HashMap<SessionId, SharedController<S, G, H>>>,
}

impl<S, G, H> EnrollmentService<S, G, H>
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    pub fn new(
        store: Arc<S>,
        gate: Arc<G>,
        host: Arc<H>,
        settings: WizardSettings,
        gov_id_options: Vec<String>,
    ) -> Self {
        Self {
            store,
            gate,
            host,
            settings,
            gov_id_options,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn gov_id_options(&self) -> &[String] {
        &self.gov_id_options
    }

    /// Opens a session, resuming the stored draft when there is one.
    pub fn start(&self) -> (SessionId, WizardSnapshot) {
        let controller = WizardController::start(
            Arc::clone(&self.store),
            Arc::clone(&self.gate),
            Arc::clone(&self.host),
            self.settings.clone(),
        );
        let snapshot = controller.snapshot();
        let id = next_session_id();
        self.sessions_guard()
            .insert(id.clone(), Arc::new(Mutex::new(controller)));
        info!(session = %id, "enrollment session opened");
        (id, snapshot)
    }

    pub fn snapshot(&self, id: &SessionId) -> Result<WizardSnapshot, EnrollmentServiceError> {
        let session = self.session(id)?;
        let controller = lock(&session);
        Ok(controller.snapshot())
    }

    pub fn edit_field(
        &self,
        id: &SessionId,
        field: &str,
        value: &str,
    ) -> Result<WizardSnapshot, EnrollmentServiceError> {
        let field: DraftField = field.parse()?;
        let session = self.session(id)?;
        let mut controller = lock(&session);
        controller.edit_field(field, value)?;
        Ok(controller.snapshot())
    }

    pub fn select_category(
        &self,
        id: &SessionId,
        label: &str,
    ) -> Result<WizardSnapshot, EnrollmentServiceError> {
        if !self.gov_id_options.iter().any(|option| option == label) {
            return Err(EnrollmentServiceError::UnknownCategory {
                label: label.to_string(),
            });
        }
        let session = self.session(id)?;
        let mut controller = lock(&session);
        controller.select_category(label)?;
        Ok(controller.snapshot())
    }

    pub async fn attach_image(
        &self,
        id: &SessionId,
        selection: FileSelection,
    ) -> Result<(ImageOutcome, WizardSnapshot), EnrollmentServiceError> {
        let session = self.session(id)?;
        let (ticket, encoder) = {
            let mut controller = lock(&session);
            match controller.begin_image_edit(&selection)? {
                Some(ticket) => (ticket, controller.encoder()),
                None => return Ok((ImageOutcome::NoFile, controller.snapshot())),
            }
        };

        let result = encoder.encode(ticket.file()).await;

        let mut controller = lock(&session);
        let outcome = controller.complete_image_edit(ticket, result);
        Ok((outcome, controller.snapshot()))
    }

    pub async fn advance(
        &self,
        id: &SessionId,
    ) -> Result<(AdvanceOutcome, WizardSnapshot), EnrollmentServiceError> {
        let session = self.session(id)?;
        let (ticket, gate) = {
            let mut controller = lock(&session);
            match controller.begin_advance()? {
                PendingAdvance::Settled(outcome) => return Ok((outcome, controller.snapshot())),
                PendingAdvance::GateCheck(ticket) => (ticket, controller.gate()),
            }
        };

        let mut pending = AbandonOnDrop {
            session: &session,
            ticket: Some(ticket.id()),
        };
        let answer = gate.exists(ticket.email()).await;
        pending.ticket = None;

        let mut controller = lock(&session);
        let outcome = controller.complete_advance(ticket, answer);
        Ok((outcome, controller.snapshot()))
    }

    pub fn retreat(&self, id: &SessionId) -> Result<WizardSnapshot, EnrollmentServiceError> {
        let session = self.session(id)?;
        let mut controller = lock(&session);
        controller.retreat()?;
        Ok(controller.snapshot())
    }

    /// Saves and closes; a closed session is dropped from the registry.
    pub fn save_and_close(
        &self,
        id: &SessionId,
    ) -> Result<(SaveOutcome, WizardSnapshot), EnrollmentServiceError> {
        let session = self.session(id)?;
        let (outcome, snapshot) = {
            let mut controller = lock(&session);
            let outcome = controller.save_and_close()?;
            (outcome, controller.snapshot())
        };
        if outcome == SaveOutcome::Closed {
            self.sessions_guard().remove(id);
        }
        Ok((outcome, snapshot))
    }

    pub fn submit(&self, id: &SessionId) -> Result<WizardSnapshot, EnrollmentServiceError> {
        let session = self.session(id)?;
        let snapshot = {
            let mut controller = lock(&session);
            controller.submit()?;
            controller.snapshot()
        };
        self.sessions_guard().remove(id);
        Ok(snapshot)
    }

    pub fn dismiss_notification(
        &self,
        id: &SessionId,
    ) -> Result<WizardSnapshot, EnrollmentServiceError> {
        let session = self.session(id)?;
        let mut controller = lock(&session);
        controller.dismiss_notification();
        Ok(controller.snapshot())
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions_guard().len()
    }

    fn session(&self, id: &SessionId) -> Result<SharedController<S, G, H>, EnrollmentServiceError> {
        self.sessions_guard()
            .get(id)
            .cloned()
            .ok_or_else(|| EnrollmentServiceError::UnknownSession { id: id.clone() })
    }

    fn sessions_guard(&self) -> MutexGuard<'_, HashMap<SessionId, SharedController<S, G, H>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the session's gate check when the request awaiting it is
/// cancelled, e.g. by a client disconnect.
struct AbandonOnDrop<'a, S, G, H> {
    session: &'a Mutex<WizardController<S, G, H>>,
    ticket: Option<u64>,
}

impl<S, G, H> Drop for AbandonOnDrop<'_, S, G, H> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            lock(self.session).abandon_advance(ticket);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentServiceError {
    #[error("no open enrollment session '{id}'")]
    UnknownSession { id: SessionId },
    #[error("'{label}' is not an accepted identification type")]
    UnknownCategory { label: String },
    #[error(transparent)]
    Field(#[from] DraftFieldError),
    #[error(transparent)]
    Wizard(#[from] WizardError),
}
