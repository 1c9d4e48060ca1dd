use std::path::Path;

use bytes::Bytes;
use mime_guess::from_path;

use crate::error::AppError;

/// A file received on a request, held in memory until it is staged on disk.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Extension of the declared file name, lowercased, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// File name safe to use inside a job directory.
    pub fn stored_file_name(&self) -> Result<String, AppError> {
        sanitize_file_name(&self.file_name).ok_or_else(|| {
            AppError::Validation(format!("Unusable upload file name: {:?}", self.file_name))
        })
    }
}

/// Guesses the MIME type based on the file extension.
pub fn guess_mime_type(path: &Path) -> String {
    from_path(path)
        .first_or(mime::APPLICATION_OCTET_STREAM)
        .to_string()
}

/// Reduces a client supplied file name to a single safe path component.
///
/// Directory parts are dropped and any character outside `[A-Za-z0-9_-]` in the
/// stem (or outside `[A-Za-z0-9]` in the extension) becomes `_`. Returns `None`
/// when nothing usable is left.
pub fn sanitize_file_name(file_name: &str) -> Option<String> {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.chars().all(|c| c == '.') {
        return None;
    }

    let clean = |part: &str, allow: fn(char) -> bool| -> String {
        part.chars().map(|c| if allow(c) { c } else { '_' }).collect()
    };
    let stem_char = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    let ext_char = |c: char| c.is_ascii_alphanumeric();

    match base.rfind('.') {
        Some(idx) if idx > 0 => {
            let (name, ext) = base.split_at(idx);
            let ext = ext.trim_start_matches('.');
            Some(format!("{}.{}", clean(name, stem_char), clean(ext, ext_char)))
        }
        _ => Some(clean(base, stem_char)),
    }
}
