use std::collections::HashSet;

use async_trait::async_trait;
use common::error::AppError;

use super::{QaAnswer, QaBackend};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "how",
    "in", "is", "it", "of", "on", "or", "say", "says", "the", "this", "to", "was", "were", "what",
    "when", "where", "which", "who", "why", "with",
];

/// Local extractive QA: returns the context line sharing the most terms with the
/// question.
///
/// Confidence is the fraction of question terms found on that line. When no line
/// shares a term, the most recently appended line is returned with confidence 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalQaBackend;

impl LexicalQaBackend {
    pub fn new() -> Self {
        Self
    }
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl QaBackend for LexicalQaBackend {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn answer(&self, question: &str, context: &str) -> Result<QaAnswer, AppError> {
        let wanted: HashSet<String> = terms(question)
            .filter(|term| !STOPWORDS.contains(&term.as_str()))
            .collect();

        let mut best: Option<(&str, usize)> = None;
        let mut last_line = None;
        for line in context.lines().map(str::trim).filter(|line| !line.is_empty()) {
            last_line = Some(line);
            let present: HashSet<String> = terms(line).collect();
            let hits = wanted.intersection(&present).count();
            if hits > 0 && !matches!(best, Some((_, best_hits)) if best_hits >= hits) {
                best = Some((line, hits));
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let answer = match best {
            Some((line, hits)) => QaAnswer::new(line, hits as f32 / wanted.len() as f32),
            None => last_line.map_or_else(QaAnswer::none, |line| QaAnswer::new(line, 0.0)),
        };
        Ok(answer)
    }
}
