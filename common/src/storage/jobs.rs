use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    error::AppError,
    storage::types::{job::JobId, upload::Upload},
};

/// Extension of the per-file text outputs written next to each job's uploads.
pub const OUTPUT_EXTENSION: &str = "txt";

const PARTIAL_SUFFIX: &str = "partial";

/// Name of the text output belonging to `source_file_name`, e.g. `scan.png.txt`.
pub fn output_file_name(source_file_name: &str) -> String {
    format!("{source_file_name}.{OUTPUT_EXTENSION}")
}

pub fn is_output_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(OUTPUT_EXTENSION))
}

/// Directory holding one sub-directory per bulk job.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Creates the directory for a new job. An existing directory is a collision.
    pub async fn create_job_dir(&self, job_id: &JobId) -> Result<PathBuf, AppError> {
        let dir = self.job_dir(job_id);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => Ok(dir),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(AppError::JobCreation(
                format!("job directory {} already exists", dir.display()),
            )),
            Err(err) => Err(AppError::JobCreation(format!(
                "could not create job directory {}: {err}",
                dir.display()
            ))),
        }
    }

    pub async fn job_exists(&self, job_id: &JobId) -> bool {
        tokio::fs::metadata(self.job_dir(job_id))
            .await
            .is_ok_and(|meta| meta.is_dir())
    }

    /// Writes an upload into the job directory under its sanitized original name.
    pub async fn persist_upload(&self, job_dir: &Path, upload: &Upload) -> Result<PathBuf, AppError> {
        let file_name = upload.stored_file_name()?;
        let target = job_dir.join(&file_name);
        tokio::fs::write(&target, &upload.data).await?;
        debug!(path = %target.display(), bytes = upload.len(), "Persisted upload");
        Ok(target)
    }

    /// Reads every text output currently present in the job directory.
    ///
    /// Outputs still being written are invisible, so a caller polling a running job
    /// sees a subset rather than a torn file.
    pub async fn read_outputs(&self, job_id: &JobId) -> Result<BTreeMap<String, String>, AppError> {
        let dir = self.job_dir(job_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AppError::JobNotFound(job_id.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let mut outputs = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || !is_output_file(&path) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %path.display(), "Skipping output with non UTF-8 name");
                continue;
            };
            let text = tokio::fs::read_to_string(&path).await?;
            outputs.insert(name.to_string(), text);
        }

        Ok(outputs)
    }
}

/// Writes a text output beside its source file, publishing it with a rename.
pub async fn write_output(source_path: &Path, text: &str) -> Result<PathBuf, AppError> {
    let source_name = source_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Source path has no usable file name: {}",
                source_path.display()
            ))
        })?;
    let target = source_path.with_file_name(output_file_name(source_name));
    let partial = source_path.with_file_name(format!(
        "{}.{PARTIAL_SUFFIX}",
        output_file_name(source_name)
    ));

    tokio::fs::write(&partial, text).await?;
    tokio::fs::rename(&partial, &target).await?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn output_names_derive_from_source_names() {
        assert_eq!(output_file_name("a.png"), "a.png.txt");
        assert!(is_output_file(Path::new("a.png.txt")));
        assert!(is_output_file(Path::new("NOTES.TXT")));
        assert!(!is_output_file(Path::new("a.png.txt.partial")));
        assert!(!is_output_file(Path::new("a.png")));
    }

    #[tokio::test]
    async fn create_job_dir_rejects_collisions() {
        let dir = tempdir().expect("tempdir");
        let workspace = JobWorkspace::new(dir.path()).await.expect("workspace");
        let job_id = JobId::new();

        workspace.create_job_dir(&job_id).await.expect("first create");
        assert!(workspace.job_exists(&job_id).await);

        let err = workspace
            .create_job_dir(&job_id)
            .await
            .expect_err("collision");
        assert!(matches!(err, AppError::JobCreation(_)));
    }

    #[tokio::test]
    async fn read_outputs_of_unknown_job_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let workspace = JobWorkspace::new(dir.path()).await.expect("workspace");

        let err = workspace
            .read_outputs(&JobId::new())
            .await
            .expect_err("unknown job");
        assert!(matches!(err, AppError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn read_outputs_returns_only_text_outputs() {
        let dir = tempdir().expect("tempdir");
        let workspace = JobWorkspace::new(dir.path()).await.expect("workspace");
        let job_id = JobId::new();
        let job_dir = workspace.create_job_dir(&job_id).await.expect("create");

        let source = workspace
            .persist_upload(&job_dir, &Upload::new("a.png", b"img".to_vec()))
            .await
            .expect("persist");
        write_output(&source, "alpha").await.expect("output");
        tokio::fs::write(job_dir.join("b.png.txt.partial"), "half")
            .await
            .expect("partial");

        let outputs = workspace.read_outputs(&job_id).await.expect("outputs");
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get("a.png.txt").map(String::as_str), Some("alpha"));
    }

    #[tokio::test]
    async fn read_outputs_of_fresh_job_is_empty() {
        let dir = tempdir().expect("tempdir");
        let workspace = JobWorkspace::new(dir.path()).await.expect("workspace");
        let job_id = JobId::new();
        workspace.create_job_dir(&job_id).await.expect("create");

        let outputs = workspace.read_outputs(&job_id).await.expect("outputs");
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn persist_upload_strips_directory_components() {
        let dir = tempdir().expect("tempdir");
        let workspace = JobWorkspace::new(dir.path()).await.expect("workspace");
        let job_id = JobId::new();
        let job_dir = workspace.create_job_dir(&job_id).await.expect("create");

        let stored = workspace
            .persist_upload(&job_dir, &Upload::new("../../escape.png", b"x".to_vec()))
            .await
            .expect("persist");

        assert_eq!(stored, job_dir.join("escape.png"));
    }
}
