use std::{io::ErrorKind, path::Path};

use async_trait::async_trait;
use common::error::AppError;
use tokio::process::Command;

use super::OcrBackend;

/// Runs the `tesseract` command line tool and reads the recognized text from stdout.
pub struct TesseractBackend {
    language: String,
}

impl TesseractBackend {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn run_ocr(&self, image_path: &Path) -> Result<String, AppError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(AppError::Extraction(format!(
                    "{}: tesseract failed: {}",
                    image_path.display(),
                    stderr.trim()
                )))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(AppError::Extraction(
                "tesseract not found (install tesseract-ocr)".to_string(),
            )),
            Err(err) => Err(AppError::Io(err)),
        }
    }
}
