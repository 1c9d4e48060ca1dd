mod tesseract;
mod vision;

pub use tesseract::TesseractBackend;
pub use vision::VisionModelBackend;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use common::{
    error::AppError,
    storage::jobs::{is_output_file, write_output},
    utils::config::{AppConfig, OcrBackendKind},
};
use tracing::{debug, info, instrument, warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];

/// A text recognition engine. Implementations only need to handle one image.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_ocr(&self, image_path: &Path) -> Result<String, AppError>;
}

/// Outcome of running OCR over a directory.
#[derive(Debug, Default, Clone)]
pub struct DirectoryExtraction {
    /// Extracted text keyed by source file name.
    pub outputs: BTreeMap<String, String>,
    /// Failure reason keyed by source file name.
    pub failures: BTreeMap<String, String>,
}

/// Boundary around the OCR engine: bounds every call with a timeout and maps all
/// engine errors to `AppError::Extraction`.
pub struct OcrAdapter {
    backend: Arc<dyn OcrBackend>,
    timeout: Duration,
}

impl OcrAdapter {
    pub fn new(backend: Arc<dyn OcrBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn from_config(
        config: &AppConfig,
        openai_client: Option<Arc<Client<OpenAIConfig>>>,
    ) -> Result<Self, AppError> {
        let backend: Arc<dyn OcrBackend> = match config.ocr_backend {
            OcrBackendKind::Tesseract => Arc::new(TesseractBackend::new(&config.ocr_language)),
            OcrBackendKind::OpenAI => {
                let client = openai_client.ok_or_else(|| {
                    AppError::InternalError(
                        "OpenAI OCR backend selected but no client was configured".into(),
                    )
                })?;
                Arc::new(VisionModelBackend::new(client, config.ocr_model.clone()))
            }
        };
        info!(backend = backend.name(), "OCR backend initialized");

        Ok(Self::new(
            backend,
            Duration::from_secs(config.ocr_timeout_secs),
        ))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Runs OCR on a single file. An image with no recognizable text yields `""`.
    #[instrument(skip_all, fields(path = %path.display(), backend = self.backend.name()))]
    pub async fn extract_one(&self, path: &Path) -> Result<String, AppError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.backend.run_ocr(path)).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(Ok(text)) => {
                debug!(elapsed_ms, chars = text.len(), "OCR finished");
                Ok(text)
            }
            Ok(Err(AppError::Extraction(reason))) => Err(AppError::Extraction(reason)),
            Ok(Err(err)) => Err(AppError::Extraction(format!(
                "{}: {err}",
                path.display()
            ))),
            Err(_) => Err(AppError::Extraction(format!(
                "{}: OCR timed out after {}s",
                path.display(),
                self.timeout.as_secs()
            ))),
        }
    }

    /// Runs OCR on every eligible image in `dir`, in file name order.
    ///
    /// A file that fails is recorded in `failures` and the remaining files are still
    /// processed. With `persist`, each result is also written to `<file>.txt` beside
    /// its source. Only an unreadable directory fails the whole call.
    #[instrument(skip_all, fields(dir = %dir.display(), persist))]
    pub async fn extract_directory(
        &self,
        dir: &Path,
        persist: bool,
    ) -> Result<DirectoryExtraction, AppError> {
        let mut images = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_eligible_image(&path) {
                images.push(path);
            }
        }
        images.sort();

        Ok(self.extract_paths(images, persist).await)
    }

    /// Runs OCR on the named files inside `dir`, whatever their extension.
    ///
    /// Used where the set of inputs is known up front, so a file the directory scan
    /// would skip still ends up with an output or a recorded failure.
    #[instrument(skip_all, fields(dir = %dir.display(), files = file_names.len(), persist))]
    pub async fn extract_files(
        &self,
        dir: &Path,
        file_names: &[String],
        persist: bool,
    ) -> DirectoryExtraction {
        let mut names: Vec<&String> = file_names.iter().collect();
        names.sort();
        names.dedup();

        let paths = names.into_iter().map(|name| dir.join(name)).collect();
        self.extract_paths(paths, persist).await
    }

    async fn extract_paths(&self, paths: Vec<PathBuf>, persist: bool) -> DirectoryExtraction {
        let mut extraction = DirectoryExtraction::default();
        for path in paths {
            let file_name = display_name(&path);
            match self.extract_file(&path, persist).await {
                Ok(text) => {
                    extraction.outputs.insert(file_name, text);
                }
                Err(err) => {
                    warn!(file_name = %file_name, error = %err, "OCR failed for file; continuing");
                    extraction.failures.insert(file_name, err.to_string());
                }
            }
        }

        info!(
            extracted = extraction.outputs.len(),
            failed = extraction.failures.len(),
            "Extraction pass finished"
        );
        extraction
    }

    async fn extract_file(&self, path: &Path, persist: bool) -> Result<String, AppError> {
        let text = self.extract_one(path).await?;
        if persist {
            write_output(path, &text).await?;
        }
        Ok(text)
    }
}

/// Whether a directory entry should be handed to OCR. Text outputs never are.
pub fn is_eligible_image(path: &Path) -> bool {
    if is_output_file(path) {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// OCR double that "recognizes" the file contents as UTF-8 text, or fails for
    /// configured file names.
    #[derive(Default)]
    pub struct EchoOcr {
        failing: Vec<String>,
        delay: Option<Duration>,
        pub calls: Mutex<Vec<String>>,
    }

    impl EchoOcr {
        pub fn failing_on(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|n| (*n).to_string()).collect(),
                ..Default::default()
            }
        }

        pub fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl OcrBackend for EchoOcr {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn run_ocr(&self, image_path: &Path) -> Result<String, AppError> {
            let name = display_name(image_path);
            self.calls.lock().await.push(name.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.iter().any(|f| name == *f) {
                return Err(AppError::InternalError(format!("cannot decode {name}")));
            }
            let bytes = tokio::fs::read(image_path).await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::EchoOcr;
    use super::*;
    use tempfile::tempdir;

    fn adapter(backend: EchoOcr) -> OcrAdapter {
        OcrAdapter::new(Arc::new(backend), Duration::from_secs(5))
    }

    #[test]
    fn eligibility_is_by_image_extension() {
        assert!(is_eligible_image(Path::new("scan.PNG")));
        assert!(is_eligible_image(Path::new("photo.jpeg")));
        assert!(!is_eligible_image(Path::new("scan.png.txt")));
        assert!(!is_eligible_image(Path::new("notes.md")));
        assert!(!is_eligible_image(Path::new("README")));
    }

    #[tokio::test]
    async fn extract_one_returns_backend_text() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("hello.png");
        tokio::fs::write(&path, "HELLO WORLD").await.expect("write");

        let text = adapter(EchoOcr::default())
            .extract_one(&path)
            .await
            .expect("extract");
        assert_eq!(text, "HELLO WORLD");
    }

    #[tokio::test]
    async fn extract_one_maps_backend_errors_to_extraction_failure() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken.png");
        tokio::fs::write(&path, "x").await.expect("write");

        let err = adapter(EchoOcr::failing_on(&["broken.png"]))
            .extract_one(&path)
            .await
            .expect_err("should fail");
        assert!(matches!(err, AppError::Extraction(msg) if msg.contains("cannot decode")));
    }

    #[tokio::test]
    async fn extract_one_times_out_as_extraction_failure() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("slow.png");
        tokio::fs::write(&path, "x").await.expect("write");

        let adapter = OcrAdapter::new(
            Arc::new(EchoOcr::slow(Duration::from_millis(200))),
            Duration::from_millis(20),
        );
        let err = adapter.extract_one(&path).await.expect_err("timeout");
        assert!(matches!(err, AppError::Extraction(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn extract_directory_isolates_per_file_failures() {
        let dir = tempdir().expect("tempdir");
        for (name, body) in [("a.png", "a"), ("b.png", "b"), ("c.png", "c")] {
            tokio::fs::write(dir.path().join(name), body)
                .await
                .expect("write");
        }
        tokio::fs::write(dir.path().join("readme.md"), "skip me")
            .await
            .expect("write");

        let extraction = adapter(EchoOcr::failing_on(&["b.png"]))
            .extract_directory(dir.path(), true)
            .await
            .expect("extract directory");

        assert_eq!(extraction.outputs.len(), 2);
        assert_eq!(extraction.outputs.get("a.png").map(String::as_str), Some("a"));
        assert_eq!(extraction.outputs.get("c.png").map(String::as_str), Some("c"));
        assert!(extraction.failures.contains_key("b.png"));

        let a_out = tokio::fs::read_to_string(dir.path().join("a.png.txt"))
            .await
            .expect("a output");
        assert_eq!(a_out, "a");
        assert!(dir.path().join("c.png.txt").exists());
        assert!(!dir.path().join("b.png.txt").exists());
    }

    #[tokio::test]
    async fn extract_directory_without_persist_writes_nothing() {
        let dir = tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("a.png"), "a")
            .await
            .expect("write");

        let extraction = adapter(EchoOcr::default())
            .extract_directory(dir.path(), false)
            .await
            .expect("extract directory");

        assert_eq!(extraction.outputs.len(), 1);
        assert!(!dir.path().join("a.png.txt").exists());
    }

    #[tokio::test]
    async fn extract_directory_skips_previous_outputs_on_rescan() {
        let dir = tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("a.png"), "a")
            .await
            .expect("write");
        let backend = Arc::new(EchoOcr::default());
        let adapter = OcrAdapter::new(backend.clone(), Duration::from_secs(5));

        adapter
            .extract_directory(dir.path(), true)
            .await
            .expect("first pass");
        adapter
            .extract_directory(dir.path(), true)
            .await
            .expect("second pass");

        let calls = backend.calls.lock().await;
        assert_eq!(calls.as_slice(), ["a.png", "a.png"]);
    }

    #[tokio::test]
    async fn extract_files_covers_names_the_directory_scan_skips() {
        let dir = tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("scan"), "no extension")
            .await
            .expect("write");
        tokio::fs::write(dir.path().join("page.heic"), "heic")
            .await
            .expect("write");

        let adapter = adapter(EchoOcr::default());
        let scanned = adapter
            .extract_directory(dir.path(), false)
            .await
            .expect("scan");
        assert!(scanned.outputs.is_empty());

        let names = vec!["scan".to_string(), "page.heic".to_string(), "scan".to_string()];
        let extraction = adapter.extract_files(dir.path(), &names, true).await;

        assert_eq!(extraction.outputs.len(), 2);
        assert!(extraction.failures.is_empty());
        let out = tokio::fs::read_to_string(dir.path().join("scan.txt"))
            .await
            .expect("output");
        assert_eq!(out, "no extension");
        assert!(dir.path().join("page.heic.txt").exists());
    }

    #[tokio::test]
    async fn extract_files_records_missing_files_as_failures() {
        let dir = tempdir().expect("tempdir");
        let extraction = adapter(EchoOcr::default())
            .extract_files(dir.path(), &["gone.png".to_string()], true)
            .await;

        assert!(extraction.outputs.is_empty());
        assert!(extraction.failures.contains_key("gone.png"));
    }

    #[tokio::test]
    async fn extract_directory_on_missing_dir_is_io_failure() {
        let dir = tempdir().expect("tempdir");
        let err = adapter(EchoOcr::default())
            .extract_directory(&dir.path().join("missing"), true)
            .await
            .expect_err("missing dir");
        assert!(matches!(err, AppError::Io(_)));
    }

    #[test]
    fn from_config_requires_client_for_vision_backend() {
        let config = AppConfig {
            ocr_backend: OcrBackendKind::OpenAI,
            ..Default::default()
        };
        assert!(OcrAdapter::from_config(&config, None).is_err());

        let tesseract = OcrAdapter::from_config(&AppConfig::default(), None).expect("tesseract");
        assert_eq!(tesseract.backend_name(), "tesseract");
    }
}
