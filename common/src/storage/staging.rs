use std::path::PathBuf;

use tempfile::{Builder, NamedTempFile};

use crate::{error::AppError, storage::types::upload::Upload};

/// Scratch directory for single-image ingestion.
///
/// Every upload gets its own file, removed when the returned handle is dropped.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Writes the upload to a fresh file whose extension matches the declared name.
    pub async fn stage(&self, upload: &Upload) -> Result<NamedTempFile, AppError> {
        let suffix = upload
            .extension()
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let staged = Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&self.root)?;
        tokio::fs::write(staged.path(), &upload.data).await?;

        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn staged_files_are_unique_and_cleaned_up() {
        let dir = tempdir().expect("tempdir");
        let staging = StagingArea::new(dir.path().join("staging"))
            .await
            .expect("staging");

        let first = staging
            .stage(&Upload::new("scan.png", b"first".to_vec()))
            .await
            .expect("stage");
        let second = staging
            .stage(&Upload::new("scan.png", b"second".to_vec()))
            .await
            .expect("stage");

        assert_ne!(first.path(), second.path());
        assert_eq!(first.path().extension().and_then(|e| e.to_str()), Some("png"));
        assert_eq!(tokio::fs::read(first.path()).await.expect("read"), b"first");
        assert_eq!(tokio::fs::read(second.path()).await.expect("read"), b"second");

        let first_path = first.path().to_path_buf();
        drop(first);
        assert!(!first_path.exists());
    }
}
