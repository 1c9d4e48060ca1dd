use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::{
    fs::OpenOptions,
    io::AsyncWriteExt,
    sync::{Mutex, RwLock},
};
use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    utils::config::{AppConfig, CorpusBackend},
};

/// Append-only store holding every piece of extracted text as one document.
///
/// Each `append` adds the text plus a trailing newline and is atomic with respect
/// to other appends. Reads return whatever has been fully appended at the time of
/// the call; an append still in flight may be missed.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    async fn append(&self, text: &str) -> Result<(), AppError>;

    async fn read_all(&self) -> Result<String, AppError>;
}

pub type DynCorpusStore = Arc<dyn CorpusStore>;

/// Corpus kept in a single text file. Appends are flushed to disk before returning.
pub struct FileCorpusStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl FileCorpusStore {
    /// Opens the corpus file, creating it (and its parent directory) when missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let existing_bytes = trim_torn_tail(&path).await?;
        info!(path = %path.display(), existing_bytes, "Opened corpus file");

        Ok(Self {
            path,
            writer: Mutex::new(()),
        })
    }
}

/// Cuts a trailing partial segment left by an interrupted append, so the file ends
/// on the last newline. Returns the resulting length.
async fn trim_torn_tail(path: &Path) -> Result<u64, AppError> {
    let bytes = tokio::fs::read(path).await?;
    if matches!(bytes.last(), None | Some(&b'\n')) {
        return Ok(bytes.len() as u64);
    }

    let keep = bytes
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map_or(0, |idx| idx + 1) as u64;
    warn!(
        path = %path.display(),
        dropped_bytes = bytes.len() as u64 - keep,
        "Corpus ends in a partial segment; trimming it"
    );

    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(keep).await?;
    file.sync_data().await?;
    Ok(keep)
}

#[async_trait]
impl CorpusStore for FileCorpusStore {
    async fn append(&self, text: &str) -> Result<(), AppError> {
        let mut segment = String::with_capacity(text.len().saturating_add(1));
        segment.push_str(text);
        segment.push('\n');

        let _guard = self.writer.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let start = file.metadata().await?.len();

        let written = async {
            file.write_all(segment.as_bytes()).await?;
            file.sync_data().await
        }
        .await;

        if let Err(err) = written {
            // Readers must never see half a segment.
            if let Err(rollback_err) = file.set_len(start).await {
                warn!(error = %rollback_err, start, "Could not roll back failed corpus append");
            }
            return Err(err.into());
        }

        debug!(bytes = segment.len(), "Appended segment to corpus");
        Ok(())
    }

    async fn read_all(&self) -> Result<String, AppError> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}

/// Corpus held in memory for tests and throwaway deployments.
#[derive(Default)]
pub struct MemoryCorpusStore {
    content: RwLock<String>,
}

impl MemoryCorpusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: RwLock::new(content.into()),
        }
    }
}

#[async_trait]
impl CorpusStore for MemoryCorpusStore {
    async fn append(&self, text: &str) -> Result<(), AppError> {
        let mut content = self.content.write().await;
        content.push_str(text);
        content.push('\n');
        Ok(())
    }

    async fn read_all(&self) -> Result<String, AppError> {
        Ok(self.content.read().await.clone())
    }
}

/// Builds the corpus store selected in config.
pub async fn open_corpus_store(config: &AppConfig) -> Result<DynCorpusStore, AppError> {
    match config.corpus_backend {
        CorpusBackend::File => Ok(Arc::new(
            FileCorpusStore::open(config.corpus_path()).await?,
        )),
        CorpusBackend::Memory => Ok(Arc::new(MemoryCorpusStore::new())),
    }
}
