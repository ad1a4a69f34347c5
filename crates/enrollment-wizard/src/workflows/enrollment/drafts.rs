use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::domain::{Draft, DraftKey};

/// Durable slot storage for in-progress drafts.
///
/// `load` never fails: anything that cannot be read back as a complete draft
/// is reported as absent so the wizard always opens.
pub trait DraftStore: Send + Sync {
    fn save(&self, key: &DraftKey, draft: &Draft) -> Result<(), DraftStoreError>;
    fn load(&self, key: &DraftKey) -> Option<Draft>;
}

#[derive(Debug, thiserror::Error)]
pub enum DraftStoreError {
    #[error("draft could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("draft storage unavailable: {0}")]
    Unavailable(String),
}

pub fn encode_draft(draft: &Draft) -> Result<String, DraftStoreError> {
    Ok(serde_json::to_string(draft)?)
}

/// Corrupt or schema-mismatched input yields `None`.
pub fn decode_draft(raw: &str) -> Option<Draft> {
    match serde_json::from_str(raw) {
        Ok(draft) => Some(draft),
        Err(err) => {
            warn!(error = %err, "discarding unreadable stored draft");
            None
        }
    }
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    root: PathBuf,
}

impl FileDraftStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &DraftKey) -> PathBuf {
        let file_name: String = key
            .0
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file_name}.json"))
    }
}

impl DraftStore for FileDraftStore {
    fn save(&self, key: &DraftKey, draft: &Draft) -> Result<(), DraftStoreError> {
        let payload = encode_draft(draft)?;
        let path = self.path_for(key);
        fs::create_dir_all(&self.root).map_err(|err| unavailable(&self.root, err))?;

        // Write-then-rename keeps a half-written file from replacing a good save.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, payload).map_err(|err| unavailable(&staging, err))?;
        fs::rename(&staging, &path).map_err(|err| unavailable(&path, err))?;

        debug!(key = %key, path = %path.display(), "draft saved");
        Ok(())
    }

    fn load(&self, key: &DraftKey) -> Option<Draft> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => decode_draft(&raw),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(key = %key, error = %err, "stored draft unreadable");
                None
            }
        }
    }
}

fn unavailable(path: &Path, err: io::Error) -> DraftStoreError {
    DraftStoreError::Unavailable(format!("{}: {err}", path.display()))
}
