use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::workflows::enrollment::controller::{
    EnrollmentHost, WizardController, WizardSettings,
};
use crate::workflows::enrollment::domain::{Draft, DraftField, DraftKey};
use crate::workflows::enrollment::drafts::{
    decode_draft, encode_draft, DraftStore, DraftStoreError,
};
use crate::workflows::enrollment::gate::{GateError, UniquenessGate};
use crate::workflows::enrollment::service::EnrollmentService;

pub(super) const TAKEN_EMAIL: &str = "taken@x.com";
pub(super) const FREE_EMAIL: &str = "free@x.com";
pub(super) const PASSWORD: &str = "Hostel#2024";

/// Keeps serialized JSON so loads exercise the same decode path as disk.
#[derive(Default)]
pub(super) struct MemoryDraftStore {
    slots: Mutex<HashMap<DraftKey, String>>,
}

impl MemoryDraftStore {
    pub(super) fn put_raw(&self, key: &DraftKey, raw: &str) {
        self.slots
            .lock()
            .expect("store mutex poisoned")
            .insert(key.clone(), raw.to_string());
    }

    pub(super) fn raw(&self, key: &DraftKey) -> Option<String> {
        self.slots
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned()
    }
}

impl DraftStore for MemoryDraftStore {
    fn save(&self, key: &DraftKey, draft: &Draft) -> Result<(), DraftStoreError> {
        let raw = encode_draft(draft)?;
        self.put_raw(key, &raw);
        Ok(())
    }

    fn load(&self, key: &DraftKey) -> Option<Draft> {
        self.raw(key).and_then(|raw| decode_draft(&raw))
    }
}

pub(super) struct UnavailableDraftStore;

impl DraftStore for UnavailableDraftStore {
    fn save(&self, _key: &DraftKey, _draft: &Draft) -> Result<(), DraftStoreError> {
        Err(DraftStoreError::Unavailable("disk full".to_string()))
    }

    fn load(&self, _key: &DraftKey) -> Option<Draft> {
        None
    }
}

#[derive(Default)]
pub(super) struct ScriptedGate {
    taken: Mutex<HashSet<String>>,
    offline: AtomicBool,
    stalled: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedGate {
    pub(super) fn with_taken(emails: &[&str]) -> Self {
        let gate = Self::default();
        gate.taken
            .lock()
            .expect("gate mutex poisoned")
            .extend(emails.iter().map(|email| email.to_string()));
        gate
    }

    pub(super) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While stalled, checks never answer.
    pub(super) fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UniquenessGate for ScriptedGate {
    async fn exists(&self, email: &str) -> Result<bool, GateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(GateError::Transport("connection refused".to_string()));
        }
        Ok(self
            .taken
            .lock()
            .expect("gate mutex poisoned")
            .contains(email))
    }
}

#[derive(Default)]
pub(super) struct RecordingHost {
    submitted: Mutex<Vec<Draft>>,
    closes: AtomicUsize,
}

impl RecordingHost {
    pub(super) fn submitted(&self) -> Vec<Draft> {
        self.submitted.lock().expect("host mutex poisoned").clone()
    }

    pub(super) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl EnrollmentHost for RecordingHost {
    fn on_submit(&self, draft: &Draft) {
        self.submitted
            .lock()
            .expect("host mutex poisoned")
            .push(draft.clone());
    }

    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(super) type TestController = WizardController<MemoryDraftStore, ScriptedGate, RecordingHost>;

pub(super) struct Harness {
    pub(super) store: Arc<MemoryDraftStore>,
    pub(super) gate: Arc<ScriptedGate>,
    pub(super) host: Arc<RecordingHost>,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self {
            store: Arc::new(MemoryDraftStore::default()),
            gate: Arc::new(ScriptedGate::with_taken(&[TAKEN_EMAIL])),
            host: Arc::new(RecordingHost::default()),
        }
    }

    pub(super) fn controller(&self) -> TestController {
        WizardController::new(
            Arc::clone(&self.store),
            Arc::clone(&self.gate),
            Arc::clone(&self.host),
            WizardSettings::default(),
        )
    }

    pub(super) fn started(&self) -> TestController {
        WizardController::start(
            Arc::clone(&self.store),
            Arc::clone(&self.gate),
            Arc::clone(&self.host),
            WizardSettings::default(),
        )
    }

    pub(super) fn service(
        &self,
    ) -> EnrollmentService<MemoryDraftStore, ScriptedGate, RecordingHost> {
        EnrollmentService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.gate),
            Arc::clone(&self.host),
            WizardSettings::default(),
            crate::config::default_gov_id_options(),
        )
    }
}

pub(super) fn personal_edits(email: &str) -> Vec<(DraftField, String)> {
    vec![
        (DraftField::StudentName, "Asha Verma".to_string()),
        (DraftField::Email, email.to_string()),
        (DraftField::MobileNumber, "9876543210".to_string()),
        (DraftField::RoomNumber, "204".to_string()),
    ]
}

pub(super) fn guardian_edits() -> Vec<(DraftField, String)> {
    vec![
        (DraftField::GuardianName, "Rakesh Verma".to_string()),
        (DraftField::GuardianPhoneNumber, "9123456780".to_string()),
        (DraftField::Address, "12 MG Road, Pune".to_string()),
    ]
}

pub(super) fn credential_edits() -> Vec<(DraftField, String)> {
    vec![
        (DraftField::Password, PASSWORD.to_string()),
        (DraftField::ConfirmPassword, PASSWORD.to_string()),
    ]
}

pub(super) fn fill(controller: &mut TestController, edits: Vec<(DraftField, String)>) {
    for (field, value) in edits {
        controller
            .edit_field(field, &value)
            .expect("edit accepted");
    }
}

pub(super) fn complete_draft() -> Draft {
    Draft {
        student_name: "Asha Verma".to_string(),
        room_number: Some(204),
        mobile_number: "9876543210".to_string(),
        guardian_name: "Rakesh Verma".to_string(),
        guardian_phone_number: "9123456780".to_string(),
        address: "12 MG Road, Pune".to_string(),
        email: FREE_EMAIL.to_string(),
        password: PASSWORD.to_string(),
        confirm_password: PASSWORD.to_string(),
        gov_id: "PAN Card".to_string(),
        gov_id_image: "data:image/png;base64,aGVsbG8=".to_string(),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
