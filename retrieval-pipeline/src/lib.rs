#![allow(clippy::missing_docs_in_private_items)]

pub mod engine;
pub mod qa;

pub use engine::{Answer, ContextWindowing, QuestionAnsweringEngine};
pub use qa::{QaAdapter, QaAnswer, QaBackend};
