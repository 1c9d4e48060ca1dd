use super::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestValidationError {
    PayloadTooLarge(String),
    BadRequest(String),
}

pub fn validate_bulk_input(
    config: &AppConfig,
    file_count: usize,
) -> Result<(), IngestValidationError> {
    if file_count == 0 {
        return Err(IngestValidationError::BadRequest(
            "No files were uploaded".to_string(),
        ));
    }

    if file_count > config.ingest_max_files {
        return Err(IngestValidationError::BadRequest(format!(
            "Too many files. Maximum allowed is {}",
            config.ingest_max_files
        )));
    }

    Ok(())
}

pub fn validate_upload_size(
    config: &AppConfig,
    file_name: &str,
    size: usize,
) -> Result<(), IngestValidationError> {
    if size > config.ingest_max_body_bytes {
        return Err(IngestValidationError::PayloadTooLarge(format!(
            "File {file_name} is too large. Maximum allowed is {} bytes",
            config.ingest_max_body_bytes
        )));
    }

    Ok(())
}
