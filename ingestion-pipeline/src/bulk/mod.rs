mod registry;

pub use registry::JobRegistry;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{
        corpus::DynCorpusStore,
        jobs::JobWorkspace,
        types::{
            job::{JobId, JobRecord, JobState},
            upload::Upload,
        },
    },
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::ocr::{DirectoryExtraction, OcrAdapter};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkJobReceipt {
    pub task_id: JobId,
    pub num_files: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JobOutputs {
    pub task_id: JobId,
    pub output: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JobStatus {
    pub task_id: JobId,
    pub state: String,
    pub num_files: Option<usize>,
    pub failed_files: BTreeMap<String, String>,
    pub error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Runs bulk jobs: a synchronous pass feeding the corpus, then a detached pass
/// writing per-file outputs into the job directory.
pub struct BulkJobOrchestrator {
    corpus: DynCorpusStore,
    ocr: Arc<OcrAdapter>,
    workspace: JobWorkspace,
    registry: JobRegistry,
}

impl BulkJobOrchestrator {
    /// Finished jobs are dropped from the registry once `job_retention` has passed.
    pub fn new(
        corpus: DynCorpusStore,
        ocr: Arc<OcrAdapter>,
        workspace: JobWorkspace,
        job_retention: Duration,
    ) -> Self {
        Self {
            corpus,
            ocr,
            workspace,
            registry: JobRegistry::with_retention(job_retention),
        }
    }

    /// Persists and ingests `uploads` in order, then schedules the output pass.
    ///
    /// Unusable file names are rejected before a job is created. A file whose OCR
    /// fails is recorded against the job and left out of the corpus while the rest
    /// carry on. Storage failures abort the request and mark the job failed; texts
    /// appended before them stay in the corpus.
    #[instrument(skip_all, fields(num_files = uploads.len(), job_id = tracing::field::Empty))]
    pub async fn start_bulk(&self, uploads: Vec<Upload>) -> Result<BulkJobReceipt, AppError> {
        for upload in &uploads {
            upload.stored_file_name()?;
        }

        let job_id = JobId::new();
        tracing::Span::current().record("job_id", tracing::field::display(&job_id));

        let job_dir = self.workspace.create_job_dir(&job_id).await?;
        self.registry.insert(JobRecord::new(job_id)).await;

        if let Err(err) = self.ingest_in_order(&job_id, &job_dir, &uploads).await {
            warn!(error = %err, "Synchronous bulk pass failed");
            let reason = err.to_string();
            if let Err(update_err) = self.registry.update(&job_id, |job| job.fail(reason)).await {
                warn!(error = %update_err, "Could not mark bulk job failed");
            }
            return Err(err);
        }

        self.spawn_output_pass(job_id, job_dir);

        info!(num_files = uploads.len(), "Bulk job accepted");
        Ok(BulkJobReceipt {
            task_id: job_id,
            num_files: uploads.len(),
        })
    }

    async fn ingest_in_order(
        &self,
        job_id: &JobId,
        job_dir: &Path,
        uploads: &[Upload],
    ) -> Result<(), AppError> {
        for upload in uploads {
            let stored = self.workspace.persist_upload(job_dir, upload).await?;
            let stored_name = stored
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.registry
                .update(job_id, |job| {
                    job.add_file(stored_name.clone());
                    Ok(())
                })
                .await?;

            let text = match self.ocr.extract_one(&stored).await {
                Ok(text) => text,
                Err(AppError::Extraction(reason)) => {
                    warn!(file_name = %stored_name, error = %reason, "OCR failed; skipping corpus append");
                    self.registry
                        .update(job_id, |job| {
                            job.record_failure(stored_name, reason);
                            Ok(())
                        })
                        .await?;
                    continue;
                }
                Err(err) => return Err(err),
            };
            self.corpus.append(&text).await?;
        }
        Ok(())
    }

    fn spawn_output_pass(&self, job_id: JobId, job_dir: PathBuf) {
        let ocr = Arc::clone(&self.ocr);
        let registry = self.registry.clone();
        let span = tracing::info_span!("bulk_output_pass", job_id = %job_id);

        tokio::spawn(
            async move {
                if let Err(err) = registry.update(&job_id, JobRecord::start).await {
                    error!(error = %err, "Could not start bulk output pass");
                    return;
                }

                let Some(job) = registry.get(&job_id).await else {
                    error!("Bulk job vanished before its output pass");
                    return;
                };

                let outcome = match rescan_job_dir(&ocr, &job_dir, &job.file_names).await {
                    Ok(extraction) => {
                        info!(
                            extracted = extraction.outputs.len(),
                            failed = extraction.failures.len(),
                            "Bulk output pass finished"
                        );
                        registry
                            .update(&job_id, |job| job.complete(extraction.failures))
                            .await
                    }
                    Err(err) => {
                        error!(error = %err, "Bulk output pass failed");
                        let reason = err.to_string();
                        registry.update(&job_id, |job| job.fail(reason)).await
                    }
                };

                if let Err(err) = outcome {
                    error!(error = %err, "Could not record bulk job outcome");
                }
            }
            .instrument(span),
        );
    }

    /// Text outputs written so far for a job. Unknown or malformed ids are `JobNotFound`.
    pub async fn get_outputs(&self, task_id: &str) -> Result<JobOutputs, AppError> {
        let job_id = JobId::parse(task_id)?;
        let output = self.workspace.read_outputs(&job_id).await?;
        Ok(JobOutputs {
            task_id: job_id,
            output,
        })
    }

    /// Lifecycle state of a job. Jobs left on disk by an earlier process report
    /// `unknown`.
    pub async fn job_status(&self, task_id: &str) -> Result<JobStatus, AppError> {
        let job_id = JobId::parse(task_id)?;

        if let Some(job) = self.registry.get(&job_id).await {
            return Ok(JobStatus {
                task_id: job_id,
                state: job.state.as_str().to_string(),
                num_files: Some(job.num_files),
                failed_files: job.failed_files,
                error: job.error,
                created_at: Some(job.created_at),
                updated_at: Some(job.updated_at),
            });
        }

        if self.workspace.job_exists(&job_id).await {
            return Ok(JobStatus {
                task_id: job_id,
                state: "unknown".to_string(),
                num_files: None,
                failed_files: BTreeMap::new(),
                error: None,
                created_at: None,
                updated_at: None,
            });
        }

        Err(AppError::JobNotFound(task_id.to_string()))
    }

    pub async fn wait_for_job(&self, job_id: &JobId) -> Result<JobState, AppError> {
        self.registry.wait_for_terminal(job_id).await
    }
}

/// Re-scans the job directory, then runs OCR on any recorded file the scan passed
/// over, so every input ends up with an output or a recorded failure.
async fn rescan_job_dir(
    ocr: &OcrAdapter,
    job_dir: &Path,
    file_names: &[String],
) -> Result<DirectoryExtraction, AppError> {
    let mut extraction = ocr.extract_directory(job_dir, true).await?;

    let missed: Vec<String> = file_names
        .iter()
        .filter(|name| {
            !extraction.outputs.contains_key(*name) && !extraction.failures.contains_key(*name)
        })
        .cloned()
        .collect();
    if !missed.is_empty() {
        debug!(missed = missed.len(), "Extracting files the directory scan skipped");
        let rest = ocr.extract_files(job_dir, &missed, true).await;
        extraction.outputs.extend(rest.outputs);
        extraction.failures.extend(rest.failures);
    }

    Ok(extraction)
}
