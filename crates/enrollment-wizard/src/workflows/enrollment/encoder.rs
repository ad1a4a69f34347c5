use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

/// A file picked by the user, either already in memory or on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Bytes { name: String, content: Vec<u8> },
    Path(PathBuf),
}

impl FileSource {
    pub fn name(&self) -> String {
        match self {
            FileSource::Bytes { name, .. } => name.clone(),
            FileSource::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// One file-input change event. Only the first file is ever used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSelection {
    pub files: Vec<FileSource>,
}

impl FileSelection {
    pub fn single(file: FileSource) -> Self {
        Self { files: vec![file] }
    }

    pub fn first(&self) -> Option<&FileSource> {
        self.files.first()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("file '{name}' could not be read: {reason}")]
    Unreadable { name: String, reason: String },
    #[error("file '{name}' is empty")]
    Empty { name: String },
    #[error("file '{name}' is {size} bytes, limit is {limit}")]
    TooLarge {
        name: String,
        size: usize,
        limit: usize,
    },
}

/// Turns an identification image into a `data:` URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEncoder {
    max_bytes: usize,
}

impl FileEncoder {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub async fn encode(&self, file: &FileSource) -> Result<String, EncodeError> {
        let name = file.name();
        let content = match file {
            FileSource::Bytes { content, .. } => content.clone(),
            FileSource::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|err| EncodeError::Unreadable {
                        name: name.clone(),
                        reason: err.to_string(),
                    })?
            }
        };

        if content.is_empty() {
            return Err(EncodeError::Empty { name });
        }
        if content.len() > self.max_bytes {
            return Err(EncodeError::TooLarge {
                name,
                size: content.len(),
                limit: self.max_bytes,
            });
        }

        let media_type = media_type(Path::new(&name));
        debug!(file = %name, bytes = content.len(), %media_type, "encoding identification image");
        Ok(format!("data:{media_type};base64,{}", STANDARD.encode(&content)))
    }
}

fn media_type(path: &Path) -> mime::Mime {
    mime_guess::from_path(path)
        .first()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}
