use std::sync::Arc;

use common::{
    error::AppError,
    storage::{corpus::DynCorpusStore, staging::StagingArea, types::upload::Upload},
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::ocr::OcrAdapter;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExtractedText {
    pub filename: String,
    pub text: String,
}

/// Single image ingestion: stage, recognize, append to the corpus.
pub struct IngestionGateway {
    corpus: DynCorpusStore,
    ocr: Arc<OcrAdapter>,
    staging: StagingArea,
}

impl IngestionGateway {
    pub fn new(corpus: DynCorpusStore, ocr: Arc<OcrAdapter>, staging: StagingArea) -> Self {
        Self {
            corpus,
            ocr,
            staging,
        }
    }

    #[instrument(skip_all, fields(file_name = %upload.file_name, bytes = upload.len()))]
    pub async fn ingest_single(&self, upload: Upload) -> Result<ExtractedText, AppError> {
        let staged = self.staging.stage(&upload).await?;
        let text = self.ocr.extract_one(staged.path()).await?;
        drop(staged);

        self.corpus.append(&text).await?;
        info!(chars = text.len(), "Ingested single image");

        Ok(ExtractedText {
            filename: upload.file_name,
            text,
        })
    }
}
