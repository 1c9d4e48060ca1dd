#![allow(clippy::missing_docs_in_private_items)]

pub mod bulk;
pub mod gateway;
pub mod ocr;

pub use bulk::{BulkJobOrchestrator, BulkJobReceipt, JobOutputs, JobStatus};
pub use gateway::{ExtractedText, IngestionGateway};
pub use ocr::{OcrAdapter, OcrBackend};
