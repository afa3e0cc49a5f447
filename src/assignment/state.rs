use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::Result;

/// Round-robin cursor per program: the roster index of the next member due.
///
/// Serializes as a flat `{ "<program>": <cursor> }` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentState {
    cursors: BTreeMap<String, usize>,
}

impl AssignmentState {
    /// Every program at cursor zero.
    pub fn zeroed<I, S>(programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cursors: programs.into_iter().map(|p| (p.into(), 0)).collect(),
        }
    }

    pub fn cursor(&self, program: &str) -> Option<usize> {
        self.cursors.get(program).copied()
    }

    pub fn set_cursor(&mut self, program: impl Into<String>, cursor: usize) {
        self.cursors.insert(program.into(), cursor);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.cursors.iter().map(|(p, c)| (p.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Fit a restored state to the current configuration.
    ///
    /// Unknown programs are dropped, missing ones start at zero, and every
    /// cursor is reduced modulo the roster size.
    pub fn normalized(&self, programs: &[String], roster_size: usize) -> Self {
        let cursors = programs
            .iter()
            .map(|program| {
                let cursor = self.cursor(program).unwrap_or(0);
                let cursor = if roster_size == 0 { 0 } else { cursor % roster_size };
                (program.clone(), cursor)
            })
            .collect();
        Self { cursors }
    }
}

/// Durable home of the cursor map.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Previously saved state, or `None` if nothing usable was saved.
    async fn load_state(&self) -> Result<Option<AssignmentState>>;

    async fn save_state(&self, state: &AssignmentState) -> Result<()>;
}

/// Keeps the cursor map in process memory only.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<AssignmentState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: AssignmentState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
        }
    }

    /// Last saved state.
    pub async fn saved(&self) -> Option<AssignmentState> {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_state(&self) -> Result<Option<AssignmentState>> {
        Ok(self.state.read().await.clone())
    }

    async fn save_state(&self, state: &AssignmentState) -> Result<()> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }
}

/// Stores the cursor map as a JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load_state(&self) -> Result<Option<AssignmentState>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&data) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Assignment state file is corrupt, starting from zero"
                );
                Ok(None)
            }
        }
    }

    async fn save_state(&self, state: &AssignmentState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let serialized = serde_json::to_vec_pretty(state)?;
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&serialized).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
