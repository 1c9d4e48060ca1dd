use std::sync::Arc;

use common::{error::AppError, storage::corpus::DynCorpusStore, utils::config::AppConfig};
use serde::Serialize;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{info, instrument, warn};

use crate::qa::{QaAdapter, QaAnswer};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    #[serde(skip_serializing)]
    pub confidence: f32,
}

/// How a corpus larger than one QA call is split up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindowing {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ContextWindowing {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_chars: config.qa_max_context_chars,
            overlap_chars: config.qa_context_overlap_chars,
        }
    }

    /// Splits `corpus` into overlapping windows. A corpus that fits is one window.
    pub fn windows<'a>(&self, corpus: &'a str) -> Result<Vec<&'a str>, AppError> {
        if self.max_chars == 0 || corpus.chars().count() <= self.max_chars {
            return Ok(vec![corpus]);
        }

        let chunk_config = ChunkConfig::new(self.max_chars)
            .with_overlap(self.overlap_chars)
            .map_err(|e| AppError::Validation(format!("invalid QA context overlap: {e}")))?;
        let splitter = TextSplitter::new(chunk_config);

        Ok(splitter.chunks(corpus).collect())
    }
}

/// Answers questions against a fresh read of the whole corpus.
pub struct QuestionAnsweringEngine {
    corpus: DynCorpusStore,
    qa: Arc<QaAdapter>,
    windowing: ContextWindowing,
}

impl QuestionAnsweringEngine {
    pub fn new(corpus: DynCorpusStore, qa: Arc<QaAdapter>, windowing: ContextWindowing) -> Self {
        Self {
            corpus,
            qa,
            windowing,
        }
    }

    #[instrument(skip_all, fields(question_chars = question.len()))]
    pub async fn ask(&self, question: &str) -> Result<Answer, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("Question must not be empty".into()));
        }

        let corpus = self.corpus.read_all().await?;
        if corpus.trim().is_empty() {
            return Err(AppError::EmptyCorpus);
        }

        let windows = self.windowing.windows(&corpus)?;
        let best = self.best_answer(question, &windows).await?;
        info!(
            windows = windows.len(),
            confidence = best.confidence,
            "Answered question"
        );

        Ok(Answer {
            question: question.to_string(),
            answer: best.answer,
            confidence: best.confidence,
        })
    }

    /// Highest confidence answer across windows; ties keep the earliest window.
    /// Failing windows are skipped unless every window fails.
    async fn best_answer(&self, question: &str, windows: &[&str]) -> Result<QaAnswer, AppError> {
        let mut best: Option<QaAnswer> = None;
        let mut last_error = None;

        for (index, window) in windows.iter().enumerate() {
            match self.qa.answer(question, window).await {
                Ok(candidate) => match &best {
                    Some(current) if candidate.confidence <= current.confidence => {}
                    _ => best = Some(candidate),
                },
                Err(err) => {
                    warn!(window = index, error = %err, "QA failed for context window");
                    last_error = Some(err);
                }
            }
        }

        match (best, last_error) {
            (Some(answer), _) => Ok(answer),
            (None, Some(err)) => Err(err),
            (None, None) => Err(AppError::EmptyCorpus),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::{LexicalQaBackend, QaBackend};
    use async_trait::async_trait;
    use common::storage::corpus::{CorpusStore, MemoryCorpusStore};
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn engine_with(
        corpus: Arc<MemoryCorpusStore>,
        backend: Arc<dyn QaBackend>,
        windowing: ContextWindowing,
    ) -> QuestionAnsweringEngine {
        let qa = Arc::new(QaAdapter::new(backend, Duration::from_secs(5)));
        QuestionAnsweringEngine::new(corpus, qa, windowing)
    }

    fn single_window() -> ContextWindowing {
        ContextWindowing {
            max_chars: 12_000,
            overlap_chars: 500,
        }
    }

    /// Answers with the window itself and a scripted confidence per call.
    struct Scripted {
        confidences: Mutex<Vec<Result<f32, String>>>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(confidences: Vec<Result<f32, String>>) -> Self {
            Self {
                confidences: Mutex::new(confidences),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QaBackend for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn answer(&self, _question: &str, context: &str) -> Result<QaAnswer, AppError> {
            self.seen.lock().await.push(context.to_string());
            let mut script = self.confidences.lock().await;
            if script.is_empty() {
                return Ok(QaAnswer::new(context, 0.0));
            }
            match script.remove(0) {
                Ok(confidence) => Ok(QaAnswer::new(context, confidence)),
                Err(reason) => Err(AppError::InternalError(reason)),
            }
        }
    }

    #[tokio::test]
    async fn empty_corpus_is_rejected() {
        let engine = engine_with(
            Arc::new(MemoryCorpusStore::new()),
            Arc::new(LexicalQaBackend::new()),
            single_window(),
        );
        assert!(matches!(
            engine.ask("anything?").await,
            Err(AppError::EmptyCorpus)
        ));
    }

    #[tokio::test]
    async fn blank_question_is_a_validation_error() {
        let engine = engine_with(
            Arc::new(MemoryCorpusStore::with_content("text\n")),
            Arc::new(LexicalQaBackend::new()),
            single_window(),
        );
        assert!(matches!(engine.ask("  ").await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn every_question_reads_the_latest_corpus() {
        let corpus = Arc::new(MemoryCorpusStore::new());
        let engine = engine_with(
            corpus.clone(),
            Arc::new(LexicalQaBackend::new()),
            single_window(),
        );

        assert!(matches!(
            engine.ask("What does it say?").await,
            Err(AppError::EmptyCorpus)
        ));

        corpus.append("HELLO WORLD").await.expect("append");
        let answer = engine.ask("What does it say?").await.expect("answer");
        assert_eq!(answer.question, "What does it say?");
        assert_eq!(answer.answer, "HELLO WORLD");
    }

    #[tokio::test]
    async fn long_corpus_is_windowed_and_best_window_wins() {
        let corpus = Arc::new(MemoryCorpusStore::with_content(format!(
            "{}\n{}\n{}\n",
            "a".repeat(40),
            "b".repeat(40),
            "c".repeat(40)
        )));
        let backend = Arc::new(Scripted::new(vec![Ok(0.2), Ok(0.9), Ok(0.9)]));
        let engine = engine_with(
            corpus,
            backend.clone(),
            ContextWindowing {
                max_chars: 45,
                overlap_chars: 0,
            },
        );

        let answer = engine.ask("which?").await.expect("answer");

        let seen = backend.seen.lock().await;
        assert_eq!(seen.len(), 3);
        assert_eq!(answer.answer, "b".repeat(40));
        assert!((answer.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn failed_windows_are_skipped() {
        let corpus = Arc::new(MemoryCorpusStore::with_content(format!(
            "{}\n{}\n",
            "a".repeat(40),
            "b".repeat(40)
        )));
        let backend = Arc::new(Scripted::new(vec![Err("overloaded".into()), Ok(0.1)]));
        let engine = engine_with(
            corpus,
            backend,
            ContextWindowing {
                max_chars: 45,
                overlap_chars: 0,
            },
        );

        let answer = engine.ask("which?").await.expect("answer");
        assert_eq!(answer.answer, "b".repeat(40));
    }

    #[tokio::test]
    async fn all_windows_failing_reports_qa_failure() {
        let corpus = Arc::new(MemoryCorpusStore::with_content("short\n"));
        let backend = Arc::new(Scripted::new(vec![Err("down".into())]));
        let engine = engine_with(corpus, backend, single_window());

        let err = engine.ask("which?").await.expect_err("qa down");
        assert!(matches!(err, AppError::QaFailure(msg) if msg.contains("down")));
    }

    #[test]
    fn windows_overlap_when_configured() {
        let windowing = ContextWindowing {
            max_chars: 20,
            overlap_chars: 5,
        };
        let text = "one two three four five six seven eight nine ten";
        let windows = windowing.windows(text).expect("windows");

        assert!(windows.len() > 1);
        assert!(windows.iter().all(|w| w.chars().count() <= 20));
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let windowing = ContextWindowing {
            max_chars: 10,
            overlap_chars: 10,
        };
        assert!(matches!(
            windowing.windows(&"x".repeat(30)),
            Err(AppError::Validation(_))
        ));
    }
}
