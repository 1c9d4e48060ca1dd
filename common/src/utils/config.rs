use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CorpusBackend {
    #[default]
    File,
    Memory,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendKind {
    #[default]
    Tesseract,
    OpenAI,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QaBackendKind {
    #[default]
    OpenAI,
    Lexical,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_corpus_file")]
    pub corpus_file: String,
    #[serde(default)]
    pub corpus_backend: CorpusBackend,

    #[serde(default)]
    pub ocr_backend: OcrBackendKind,
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,
    #[serde(default = "default_ocr_timeout_secs")]
    pub ocr_timeout_secs: u64,
    #[serde(default = "default_model")]
    pub ocr_model: String,

    #[serde(default)]
    pub qa_backend: QaBackendKind,
    #[serde(default = "default_qa_timeout_secs")]
    pub qa_timeout_secs: u64,
    #[serde(default = "default_model")]
    pub qa_model: String,
    #[serde(default = "default_qa_max_context_chars")]
    pub qa_max_context_chars: usize,
    #[serde(default = "default_qa_context_overlap_chars")]
    pub qa_context_overlap_chars: usize,

    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,

    /// Shared key guarding the API. Unset means the API is open.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_ingest_max_files")]
    pub ingest_max_files: usize,
    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,

    /// How long finished bulk jobs stay in the status registry.
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,
}

impl AppConfig {
    pub fn data_path(&self) -> PathBuf {
        resolve_base_dir(self)
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.data_path().join(&self.corpus_file)
    }

    pub fn jobs_path(&self) -> PathBuf {
        self.data_path().join("jobs")
    }

    pub fn staging_path(&self) -> PathBuf {
        self.data_path().join("staging")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            corpus_file: default_corpus_file(),
            corpus_backend: CorpusBackend::default(),
            ocr_backend: OcrBackendKind::default(),
            ocr_language: default_ocr_language(),
            ocr_timeout_secs: default_ocr_timeout_secs(),
            ocr_model: default_model(),
            qa_backend: QaBackendKind::default(),
            qa_timeout_secs: default_qa_timeout_secs(),
            qa_model: default_model(),
            qa_max_context_chars: default_qa_max_context_chars(),
            qa_context_overlap_chars: default_qa_context_overlap_chars(),
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            api_key: None,
            ingest_max_files: default_ingest_max_files(),
            ingest_max_body_bytes: default_ingest_max_body_bytes(),
            job_retention_secs: default_job_retention_secs(),
        }
    }
}

fn default_http_port() -> u16 {
    3000
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_corpus_file() -> String {
    "corpus.txt".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_ocr_timeout_secs() -> u64 {
    120
}

fn default_qa_timeout_secs() -> u64 {
    60
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_qa_max_context_chars() -> usize {
    12_000
}

fn default_qa_context_overlap_chars() -> usize {
    500
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ingest_max_files() -> usize {
    50
}

fn default_ingest_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_job_retention_secs() -> u64 {
    3600
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

/// Resolve the absolute data directory from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}
