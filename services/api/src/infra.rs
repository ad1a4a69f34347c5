use async_trait::async_trait;
use enrollment_wizard::workflows::enrollment::{
    decode_draft, encode_draft, Draft, DraftKey, DraftStore, DraftStoreError, EnrollmentHost,
    GateError, HttpUniquenessGate, UniquenessGate,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Students enrolled through this process. Backs the uniqueness endpoint
/// when no external registry is configured.
#[derive(Default)]
pub(crate) struct StudentRegistry {
    students: Mutex<Vec<Draft>>,
    closed_sessions: Mutex<usize>,
}

impl StudentRegistry {
    pub(crate) fn contains_email(&self, email: &str) -> bool {
        let needle = email.trim();
        recover(&self.students)
            .iter()
            .any(|student| student.email.trim().eq_ignore_ascii_case(needle))
    }

    pub(crate) fn students(&self) -> Vec<Draft> {
        recover(&self.students).clone()
    }

    pub(crate) fn closed_sessions(&self) -> usize {
        *recover(&self.closed_sessions)
    }
}

impl EnrollmentHost for StudentRegistry {
    fn on_submit(&self, draft: &Draft) {
        info!(email = %draft.email, "student enrolled");
        recover(&self.students).push(draft.clone());
    }

    fn on_close(&self) {
        *recover(&self.closed_sessions) += 1;
    }
}

#[async_trait]
impl UniquenessGate for StudentRegistry {
    async fn exists(&self, email: &str) -> Result<bool, GateError> {
        Ok(self.contains_email(email))
    }
}

/// Either a remote registry over HTTP or the in-process one.
pub(crate) enum GateBackend {
    Http(HttpUniquenessGate),
    Registry(Arc<StudentRegistry>),
}

#[async_trait]
impl UniquenessGate for GateBackend {
    async fn exists(&self, email: &str) -> Result<bool, GateError> {
        match self {
            Self::Http(gate) => gate.exists(email).await,
            Self::Registry(registry) => registry.exists(email).await,
        }
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryDraftStore {
    slots: Arc<Mutex<HashMap<DraftKey, String>>>,
}

impl DraftStore for InMemoryDraftStore {
    fn save(&self, key: &DraftKey, draft: &Draft) -> Result<(), DraftStoreError> {
        let raw = encode_draft(draft)?;
        recover(&self.slots).insert(key.clone(), raw);
        Ok(())
    }

    fn load(&self, key: &DraftKey) -> Option<Draft> {
        let raw = recover(&self.slots).get(key).cloned()?;
        decode_draft(&raw)
    }
}
