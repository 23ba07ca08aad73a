//! Prompt templates and the strategy that picks one per query.
//!
//! Template selection is a pure function `classify(query) -> TemplateKind`
//! plus a [`PromptLibrary`] lookup, so new query types need a new template
//! entry, not a new pipeline type.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

const GENERAL_TEMPLATE: &str = "
You are a helpful AI assistant. Use the following context to answer the question.
If the answer is not found in the context, say \"I don't know.\"

Context:
{context}

Question:
{question}

Answer:
";

const FACTUAL_TEMPLATE: &str = "
Based on the facts below, provide a direct and concise answer.

Facts:
{context}

Question:
{question}

Answer:
";

const REASONING_TEMPLATE: &str = "
Read the context and think step-by-step to answer the question in detail.

Context:
{context}

Question:
{question}

Detailed Answer:
";

/// Identifies a prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// General-purpose answering with an explicit "I don't know" fallback.
    #[default]
    General,
    /// Short, direct answers to fact lookups.
    Factual,
    /// Step-by-step answers to multi-step questions.
    Reasoning,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TemplateKind::General => "general",
            TemplateKind::Factual => "factual",
            TemplateKind::Reasoning => "reasoning",
        })
    }
}

/// A prompt with `{context}` and `{question}` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Create a template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if either slot is missing.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            if !text.contains(slot) {
                return Err(RagError::ConfigError(format!("prompt template is missing {slot}")));
            }
        }
        Ok(Self { text })
    }

    /// The raw template text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fill both slots in a single pass, so slot-like text inside `context`
    /// or `question` is left alone.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + context.len() + question.len());
        let mut rest = self.text.as_str();
        loop {
            let next = [(CONTEXT_SLOT, context), (QUESTION_SLOT, question)]
                .into_iter()
                .filter_map(|(slot, value)| rest.find(slot).map(|pos| (pos, slot, value)))
                .min_by_key(|(pos, _, _)| *pos);
            match next {
                Some((pos, slot, value)) => {
                    out.push_str(&rest[..pos]);
                    out.push_str(value);
                    rest = &rest[pos + slot.len()..];
                }
                None => {
                    out.push_str(rest);
                    return out;
                }
            }
        }
    }
}

/// Templates keyed by [`TemplateKind`].
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    general: PromptTemplate,
    specialised: HashMap<TemplateKind, PromptTemplate>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        let builtin = |text: &str| PromptTemplate { text: text.to_string() };
        Self {
            general: builtin(GENERAL_TEMPLATE),
            specialised: HashMap::from([
                (TemplateKind::Factual, builtin(FACTUAL_TEMPLATE)),
                (TemplateKind::Reasoning, builtin(REASONING_TEMPLATE)),
            ]),
        }
    }
}

impl PromptLibrary {
    /// Replace the template used for `kind`.
    pub fn with_template(mut self, kind: TemplateKind, template: PromptTemplate) -> Self {
        match kind {
            TemplateKind::General => self.general = template,
            other => {
                self.specialised.insert(other, template);
            }
        }
        self
    }

    /// The template for `kind`, falling back to [`TemplateKind::General`].
    pub fn get(&self, kind: TemplateKind) -> &PromptTemplate {
        self.specialised.get(&kind).unwrap_or(&self.general)
    }
}

/// Chooses a template for a query.
pub trait QueryClassifier: Send + Sync {
    /// Classify `query`.
    fn classify(&self, query: &str) -> TemplateKind;
}

/// Always answers with the same template. The pipeline default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantClassifier(pub TemplateKind);

impl QueryClassifier for ConstantClassifier {
    fn classify(&self, _query: &str) -> TemplateKind {
        self.0
    }
}

/// Cue-word heuristic: reasoning cues select [`TemplateKind::Reasoning`],
/// short wh-questions select [`TemplateKind::Factual`].
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    factual_max_words: usize,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self { factual_max_words: 8 }
    }
}

const REASONING_CUES: &[&str] =
    &["why", "how", "explain", "compare", "contrast", "difference", "step", "analyze", "analyse"];
const FACTUAL_OPENERS: &[&str] = &["who", "what", "when", "where", "which"];

impl KeywordClassifier {
    /// Treat wh-questions of at most `words` words as factual.
    pub fn with_factual_max_words(mut self, words: usize) -> Self {
        self.factual_max_words = words;
        self
    }
}

impl QueryClassifier for KeywordClassifier {
    fn classify(&self, query: &str) -> TemplateKind {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        if words.iter().any(|w| REASONING_CUES.contains(&w.as_str())) {
            return TemplateKind::Reasoning;
        }
        match words.first() {
            Some(first)
                if FACTUAL_OPENERS.contains(&first.as_str())
                    && words.len() <= self.factual_max_words =>
            {
                TemplateKind::Factual
            }
            _ => TemplateKind::General,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_slots() {
        let template = PromptTemplate::new("C={context} Q={question}").unwrap();
        assert_eq!(template.render("ctx", "why?"), "C=ctx Q=why?");
    }

    #[test]
    fn slot_text_inside_context_is_not_expanded() {
        let template = PromptTemplate::new("{context}|{question}").unwrap();
        assert_eq!(template.render("see {question}", "q"), "see {question}|q");
    }

    #[test]
    fn template_without_slots_is_rejected() {
        assert!(PromptTemplate::new("no slots").is_err());
        assert!(PromptTemplate::new("{context} only").is_err());
    }

    #[test]
    fn builtin_templates_have_slots() {
        let library = PromptLibrary::default();
        for kind in [TemplateKind::General, TemplateKind::Factual, TemplateKind::Reasoning] {
            assert!(PromptTemplate::new(library.get(kind).text()).is_ok());
        }
        assert!(library.get(TemplateKind::General).text().contains("I don't know."));
        assert!(library.get(TemplateKind::Reasoning).text().contains("Detailed Answer:"));
    }

    #[test]
    fn constant_classifier_defaults_to_general() {
        assert_eq!(ConstantClassifier::default().classify("why is the sky blue"), TemplateKind::General);
    }

    #[test]
    fn keyword_classifier_routes_queries() {
        let classifier = KeywordClassifier::default();
        assert_eq!(classifier.classify("What is the objective of Lab 6?"), TemplateKind::Factual);
        assert_eq!(
            classifier.classify("Explain how the retriever ranks chunks"),
            TemplateKind::Reasoning
        );
        assert_eq!(classifier.classify("Summarise the onboarding guide"), TemplateKind::General);
        assert_eq!(
            classifier.classify("What are all of the many configuration values that the system reads at start"),
            TemplateKind::General
        );
    }
}
