use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::SessionStoreError;
use crate::session::{SessionFacts, SessionStore};

/// Session facts persisted as JSON on disk.
pub struct FileSessionStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SessionStoreError {
        SessionStoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn read(&self) -> Result<SessionFacts, SessionStoreError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionFacts::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if data.trim().is_empty() {
            return Ok(SessionFacts::default());
        }

        serde_json::from_str(&data).map_err(|e| SessionStoreError::Corrupt(e.to_string()))
    }

    async fn write(&self, facts: &SessionFacts) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(facts)
            .map_err(|e| SessionStoreError::Corrupt(e.to_string()))?;

        // Intents carry consent flags and the selection; the file is created
        // private and swapped in whole.
        let tmp = self.path.with_extension("json.tmp");
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp).await.map_err(|e| self.io_error(e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<SessionFacts, SessionStoreError> {
        self.read().await
    }

    async fn modify(
        &self,
        apply: &mut (dyn for<'a> FnMut(&'a mut SessionFacts) + Send),
    ) -> Result<SessionFacts, SessionStoreError> {
        let _guard = self.write_lock.lock().await;

        let mut facts = match self.read().await {
            Ok(facts) => facts,
            Err(SessionStoreError::Corrupt(reason)) => {
                tracing::warn!(
                    "Discarding unreadable session file {}: {}",
                    self.path.display(),
                    reason
                );
                SessionFacts::default()
            }
            Err(e) => return Err(e),
        };

        apply(&mut facts);
        self.write(&facts).await?;
        Ok(facts)
    }
}

/// Process-local store, used in tests and embedded hosts.
#[derive(Default)]
pub struct MemorySessionStore {
    facts: std::sync::Mutex<SessionFacts>,
}

impl MemorySessionStore {
    pub fn with_facts(facts: SessionFacts) -> Self {
        Self {
            facts: std::sync::Mutex::new(facts),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionFacts> {
        self.facts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<SessionFacts, SessionStoreError> {
        Ok(self.lock().clone())
    }

    async fn modify(
        &self,
        apply: &mut (dyn for<'a> FnMut(&'a mut SessionFacts) + Send),
    ) -> Result<SessionFacts, SessionStoreError> {
        let mut guard = self.lock();
        apply(&mut guard);
        Ok(guard.clone())
    }
}
