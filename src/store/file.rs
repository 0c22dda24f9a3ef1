use super::{validate_user, FeatureMapStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk record wrapping the opaque document
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    user: String,
    updated_at: DateTime<Utc>,
    feature_map: String,
}

/// One JSON file per user under a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, user: &str) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(user)))
    }
}

/// Maps a user id onto a file stem, one-to-one.
///
/// Lowercase ASCII letters, digits and `-` are kept; every other byte becomes
/// `_XX` (uppercase hex). `_` itself is escaped, so no two ids share a stem,
/// and no stem depends on the file system being case-sensitive.
fn file_stem(user: &str) -> String {
    let mut stem = String::with_capacity(user.len());
    for byte in user.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => stem.push(byte as char),
            _ => stem.push_str(&format!("_{:02X}", byte)),
        }
    }
    stem
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl FeatureMapStore for FileStore {
    async fn load(&self, user: &str) -> Result<Option<String>, StoreError> {
        let user = validate_user(user)?;
        let path = self.path_for(user);

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };

        let record: StoredRecord =
            serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if record.user != user {
            return Err(StoreError::Corrupt {
                path,
                message: format!("record belongs to '{}', not '{}'", record.user, user),
            });
        }
        debug!(user, path = %path.display(), updated_at = %record.updated_at, "Loaded feature map");
        Ok(Some(record.feature_map))
    }

    async fn save(&self, user: &str, document: &str) -> Result<(), StoreError> {
        let user = validate_user(user)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_error(&self.root))?;

        let path = self.path_for(user);
        let record = StoredRecord {
            user: user.to_string(),
            updated_at: Utc::now(),
            feature_map: document.to_string(),
        };
        let contents = serde_json::to_string_pretty(&record).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(io_error(&path))?;

        debug!(user, path = %path.display(), bytes = document.len(), "Saved feature map");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
