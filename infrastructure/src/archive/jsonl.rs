//! JSONL file writer for concluded sessions.
//!
//! Each archived session is serialized as a single JSON line with a `type`
//! field and `timestamp`, appended to the file via a buffered writer.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use storm_application::ports::archive::{ArchiveError, SessionArchive};
use storm_domain::SessionSnapshot;
use tracing::info;

/// JSONL session archive that writes one JSON object per line.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Flushes on every append;
/// JSONL is append-only and a concluded session must not be lost to a
/// buffered crash.
pub struct JsonlSessionArchive {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlSessionArchive {
    /// Open (or create) the archive file at the given path, appending to
    /// existing content. Parent directories are created as needed.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionArchive for JsonlSessionArchive {
    async fn archive(&self, snapshot: &SessionSnapshot) -> Result<(), ArchiveError> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let record = serde_json::json!({
            "type": "session_archived",
            "timestamp": timestamp,
            "session": snapshot,
        });
        let line = serde_json::to_string(&record)
            .map_err(|err| ArchiveError::Serialization(err.to_string()))?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ArchiveError::Io("archive writer poisoned".to_string()))?;
        writeln!(writer, "{line}").map_err(|err| ArchiveError::Io(err.to_string()))?;
        writer
            .flush()
            .map_err(|err| ArchiveError::Io(err.to_string()))?;

        info!(session = %snapshot.id, path = %self.path.display(), "session appended to archive");
        Ok(())
    }
}

impl Drop for JsonlSessionArchive {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}
