//! Retrieval and answer quality metrics, and a runner that scores a pipeline
//! against a set of labelled queries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RagError, Result};
use crate::pipeline::RagPipeline;

/// Precision, recall and F1 of one retrieved set against the relevant set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl RetrievalMetrics {
    /// Macro-average over `metrics`. All zeros when `metrics` is empty.
    pub fn mean(metrics: &[RetrievalMetrics]) -> RetrievalMetrics {
        if metrics.is_empty() {
            return RetrievalMetrics::default();
        }
        let n = metrics.len() as f64;
        let sum = metrics.iter().fold(RetrievalMetrics::default(), |acc, m| RetrievalMetrics {
            precision: acc.precision + m.precision,
            recall: acc.recall + m.recall,
            f1: acc.f1 + m.f1,
        });
        RetrievalMetrics { precision: sum.precision / n, recall: sum.recall / n, f1: sum.f1 / n }
    }
}

/// Exact-match accuracy over a batch of answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetrics {
    pub exact_match_accuracy: f64,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 { 0.0 } else { numerator / denominator }
}

/// Score `retrieved` against `relevant`.
///
/// Each metric is 0 when its denominator is 0, so empty sets never yield NaN.
pub fn retrieval_metrics(relevant: &BTreeSet<String>, retrieved: &BTreeSet<String>) -> RetrievalMetrics {
    let hits = relevant.intersection(retrieved).count() as f64;
    let precision = ratio(hits, retrieved.len() as f64);
    let recall = ratio(hits, relevant.len() as f64);
    let f1 = ratio(2.0 * precision * recall, precision + recall);
    RetrievalMetrics { precision, recall, f1 }
}

/// Fraction of pairs that match after trimming and lower-casing.
///
/// # Errors
///
/// Returns [`RagError::LengthMismatch`] if the sequences differ in length.
/// Two empty sequences score 0.
pub fn answer_metrics(predictions: &[String], expected: &[String]) -> Result<AnswerMetrics> {
    if predictions.len() != expected.len() {
        return Err(RagError::LengthMismatch { predictions: predictions.len(), expected: expected.len() });
    }
    let correct = predictions
        .iter()
        .zip(expected)
        .filter(|(p, e)| p.trim().to_lowercase() == e.trim().to_lowercase())
        .count();
    Ok(AnswerMetrics { exact_match_accuracy: ratio(correct as f64, expected.len() as f64) })
}

/// A labelled evaluation query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    /// `source` values of the documents that should be retrieved.
    pub expected_doc_ids: BTreeSet<String>,
    pub expected_answer: String,
}

/// Read a JSON array of [`EvalCase`]s.
pub fn load_cases(path: impl AsRef<Path>) -> Result<Vec<EvalCase>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| RagError::DocumentLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Everything observed for one evaluation query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub query: String,
    pub retrieved_ids: BTreeSet<String>,
    pub relevant_ids: BTreeSet<String>,
    pub predicted_answer: String,
    pub expected_answer: String,
    pub retrieval: RetrievalMetrics,
}

/// Per-query records plus aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub records: Vec<EvaluationRecord>,
    pub retrieval: RetrievalMetrics,
    pub answers: AnswerMetrics,
}

impl EvaluationReport {
    /// Collapse the report into one comparison row.
    pub fn summary(&self) -> ConfigMetrics {
        ConfigMetrics { retrieval: self.retrieval, exact_match_accuracy: self.answers.exact_match_accuracy }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Retrieval Metrics ===")?;
        for (i, record) in self.records.iter().enumerate() {
            let m = record.retrieval;
            writeln!(
                f,
                "Query {}: Precision={:.2}, Recall={:.2}, F1={:.2}",
                i + 1,
                m.precision,
                m.recall,
                m.f1
            )?;
        }
        writeln!(f)?;
        writeln!(f, "=== Answer Accuracy ===")?;
        write!(f, "Exact Match Accuracy: {:.2}", self.answers.exact_match_accuracy)
    }
}

/// Runs labelled queries through a [`RagPipeline`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Answer every case and score the results.
    ///
    /// A case whose embedding or generation call fails is logged and scored
    /// as an empty answer with nothing retrieved.
    ///
    /// # Errors
    ///
    /// [`RagError::NotReady`] and any non-recoverable error abort the run.
    pub async fn run(&self, pipeline: &RagPipeline, cases: &[EvalCase]) -> Result<EvaluationReport> {
        let mut records = Vec::with_capacity(cases.len());
        for case in cases {
            let (retrieved_ids, predicted_answer) = match pipeline.answer(&case.query).await {
                Ok(answer) => {
                    let ids: BTreeSet<String> = answer.sources.iter().map(|c| c.source().to_string()).collect();
                    (ids, answer.answer)
                }
                Err(RagError::NotReady) => return Err(RagError::NotReady),
                Err(e) if e.is_recoverable() => {
                    warn!(query = %case.query, error = %e, "evaluation query failed, scoring as empty");
                    (BTreeSet::new(), String::new())
                }
                Err(e) => return Err(e),
            };
            let retrieval = retrieval_metrics(&case.expected_doc_ids, &retrieved_ids);
            records.push(EvaluationRecord {
                query: case.query.clone(),
                retrieved_ids,
                relevant_ids: case.expected_doc_ids.clone(),
                predicted_answer,
                expected_answer: case.expected_answer.clone(),
                retrieval,
            });
        }

        let per_query: Vec<RetrievalMetrics> = records.iter().map(|r| r.retrieval).collect();
        let predictions: Vec<String> = records.iter().map(|r| r.predicted_answer.clone()).collect();
        let expected: Vec<String> = records.iter().map(|r| r.expected_answer.clone()).collect();
        let report = EvaluationReport {
            retrieval: RetrievalMetrics::mean(&per_query),
            answers: answer_metrics(&predictions, &expected)?,
            records,
        };
        info!(
            queries = report.records.len(),
            f1 = report.retrieval.f1,
            exact_match = report.answers.exact_match_accuracy,
            "evaluation finished"
        );
        Ok(report)
    }
}

/// Aggregate scores for one named configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetrics {
    pub retrieval: RetrievalMetrics,
    pub exact_match_accuracy: f64,
}

/// Side-by-side scores of several configurations, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonTable {
    pub rows: Vec<(String, ConfigMetrics)>,
}

/// Tabulate `results` for comparison.
pub fn compare(results: &BTreeMap<String, ConfigMetrics>) -> ComparisonTable {
    ComparisonTable { rows: results.iter().map(|(name, m)| (name.clone(), *m)).collect() }
}

impl fmt::Display for ComparisonTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration Comparison:")?;
        writeln!(
            f,
            "{:<15} {:<10} {:<10} {:<10} {:<10}",
            "Configuration", "Precision", "Recall", "F1 Score", "Exact Match"
        )?;
        write!(f, "{}", "-".repeat(61))?;
        for (name, m) in &self.rows {
            write!(
                f,
                "\n{:<15} {:<10.2} {:<10.2} {:<10.2} {:<10.2}",
                name, m.retrieval.precision, m.retrieval.recall, m.retrieval.f1, m.exact_match_accuracy
            )?;
        }
        Ok(())
    }
}
