use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

pub const EMAIL_TAKEN_MESSAGE: &str = "Email already exists";
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub severity: Severity,
    pub message: String,
    pub opened_at: DateTime<Utc>,
}

/// Render-ready view; a closed notifier reports `is_open: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationView {
    pub is_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub message: String,
}

#[derive(Debug, Default)]
struct NotifierState {
    current: Option<Notification>,
    next_id: u64,
    auto_dismiss: Option<AbortHandle>,
}

impl NotifierState {
    fn close(&mut self) -> Option<Notification> {
        if let Some(timer) = self.auto_dismiss.take() {
            timer.abort();
        }
        self.current.take()
    }
}

/// Single-slot transient message surface with auto-dismissal.
#[derive(Debug, Clone)]
pub struct Notifier {
    state: Arc<Mutex<NotifierState>>,
    delay: Duration,
}

impl Notifier {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState::default())),
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Opens a notification, replacing whatever is visible, and arms the
    /// auto-dismiss timer when a tokio runtime is available.
    pub fn show(&self, severity: Severity, message: impl Into<String>) -> u64 {
        let mut state = self.lock();
        state.close();
        state.next_id += 1;
        let id = state.next_id;
        let notification = Notification {
            id,
            severity,
            message: message.into(),
            opened_at: Utc::now(),
        };
        debug!(id, ?severity, message = %notification.message, "notification opened");
        state.current = Some(notification);

        match Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::clone(&self.state);
                let delay = self.delay;
                let task = runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    if state.current.as_ref().map(|current| current.id) == Some(id) {
                        state.close();
                        debug!(id, "notification auto-dismissed");
                    }
                });
                state.auto_dismiss = Some(task.abort_handle());
            }
            Err(_) => warn!(id, "no async runtime, notification will stay until dismissed"),
        }

        id
    }

    /// Manual close; cancels the pending auto-dismiss.
    pub fn dismiss(&self) -> Option<Notification> {
        let closed = self.lock().close();
        if let Some(notification) = &closed {
            debug!(id = notification.id, "notification dismissed");
        }
        closed
    }

    pub fn current(&self) -> Option<Notification> {
        self.lock().current.clone()
    }

    pub fn has_pending_dismissal(&self) -> bool {
        self.lock().auto_dismiss.is_some()
    }

    pub fn view(&self) -> NotificationView {
        match self.current() {
            Some(notification) => NotificationView {
                is_open: true,
                severity: Some(notification.severity),
                message: notification.message,
            },
            None => NotificationView {
                is_open: false,
                severity: None,
                message: String::new(),
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
