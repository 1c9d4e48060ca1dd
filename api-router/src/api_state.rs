use std::{sync::Arc, time::Duration};

use async_openai::{config::OpenAIConfig, Client};
use common::{
    error::AppError,
    storage::{
        corpus::{open_corpus_store, DynCorpusStore},
        jobs::JobWorkspace,
        staging::StagingArea,
    },
    utils::config::{AppConfig, OcrBackendKind, QaBackendKind},
};
use ingestion_pipeline::{BulkJobOrchestrator, IngestionGateway, OcrAdapter};
use retrieval_pipeline::{ContextWindowing, QaAdapter, QuestionAnsweringEngine};

#[derive(Clone)]
pub struct ApiState {
    pub config: AppConfig,
    pub corpus: DynCorpusStore,
    pub gateway: Arc<IngestionGateway>,
    pub bulk: Arc<BulkJobOrchestrator>,
    pub qa: Arc<QuestionAnsweringEngine>,
}

impl ApiState {
    pub async fn new(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let corpus = open_corpus_store(config).await?;
        let openai_client = openai_client(config);

        let ocr = OcrAdapter::from_config(config, openai_client.clone())?;
        let qa = QaAdapter::from_config(config, openai_client)?;

        Ok(Self::with_components(config, corpus, ocr, qa).await?)
    }

    /// Wires the pipelines around already built adapters.
    pub async fn with_components(
        config: &AppConfig,
        corpus: DynCorpusStore,
        ocr: OcrAdapter,
        qa: QaAdapter,
    ) -> Result<Self, AppError> {
        let ocr = Arc::new(ocr);
        let staging = StagingArea::new(config.staging_path()).await?;
        let workspace = JobWorkspace::new(config.jobs_path()).await?;

        Ok(Self {
            config: config.clone(),
            corpus: Arc::clone(&corpus),
            gateway: Arc::new(IngestionGateway::new(
                Arc::clone(&corpus),
                Arc::clone(&ocr),
                staging,
            )),
            bulk: Arc::new(BulkJobOrchestrator::new(
                Arc::clone(&corpus),
                ocr,
                workspace,
                Duration::from_secs(config.job_retention_secs),
            )),
            qa: Arc::new(QuestionAnsweringEngine::new(
                corpus,
                Arc::new(qa),
                ContextWindowing::from_config(config),
            )),
        })
    }
}

fn openai_client(config: &AppConfig) -> Option<Arc<Client<OpenAIConfig>>> {
    let needs_client = config.ocr_backend == OcrBackendKind::OpenAI
        || config.qa_backend == QaBackendKind::OpenAI;

    needs_client.then(|| {
        Arc::new(Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ))
    })
}
