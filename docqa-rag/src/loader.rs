//! Directory ingestion: turn files on disk into [`Document`]s.
//!
//! Format-specific text extraction sits behind [`DocumentParser`]. Only plain
//! text ships with the crate; PDF or DOCX extraction is registered by the
//! caller. One unreadable file never aborts the batch: it is logged, recorded
//! in [`LoadReport::failures`] and skipped.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// Extracts plain text from one file format.
pub trait DocumentParser: Send + Sync {
    /// Value stored under the `file_type` metadata key (e.g. `"pdf"`).
    fn file_type(&self) -> &str;

    /// Lower-case file extensions this parser accepts, without the dot.
    fn extensions(&self) -> &[&str];

    /// Extract the text of the file at `path`.
    fn parse(&self, path: &Path) -> Result<String>;
}

/// Reads UTF-8 text and Markdown files verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn file_type(&self) -> &str {
        "txt"
    }

    fn extensions(&self) -> &[&str] {
        &["txt", "md"]
    }

    fn parse(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| RagError::DocumentLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Documents loaded from a directory together with the files that failed.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully loaded documents, in sorted path order.
    pub documents: Vec<Document>,
    /// Files that could not be loaded, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

/// Walks a directory tree and parses every file with a registered parser.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::DocumentLoader;
///
/// let report = DocumentLoader::new().load_dir("documents")?;
/// println!("loaded {} documents", report.documents.len());
/// ```
#[derive(Clone)]
pub struct DocumentLoader {
    parsers: HashMap<String, Arc<dyn DocumentParser>>,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader {
    /// A loader that understands plain text and Markdown.
    pub fn new() -> Self {
        Self { parsers: HashMap::new() }.with_parser(Arc::new(PlainTextParser))
    }

    /// Register `parser` for each of its extensions, replacing earlier registrations.
    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        for ext in parser.extensions() {
            self.parsers.insert(ext.to_ascii_lowercase(), Arc::clone(&parser));
        }
        self
    }

    /// Load every parseable file under `dir`, recursively.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentLoad`] only if `dir` itself is missing or
    /// not a directory. Per-file failures are collected in the report.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<LoadReport> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(RagError::DocumentLoad {
                path: dir.to_path_buf(),
                message: "not a directory".to_string(),
            });
        }

        let mut report = LoadReport::default();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    report.failures.push((path, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(parser) = self.parser_for(entry.path()) else {
                debug!(path = %entry.path().display(), "no parser registered, skipping");
                continue;
            };

            match self.load_file(entry.path(), parser.as_ref()) {
                Ok(document) => report.documents.push(document),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "failed to load document");
                    report.failures.push((entry.path().to_path_buf(), e.to_string()));
                }
            }
        }

        info!(
            documents = report.documents.len(),
            failures = report.failures.len(),
            dir = %dir.display(),
            "loaded documents"
        );
        Ok(report)
    }

    fn parser_for(&self, path: &Path) -> Option<&Arc<dyn DocumentParser>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.parsers.get(&ext)
    }

    fn load_file(&self, path: &Path, parser: &dyn DocumentParser) -> Result<Document> {
        let text = parser.parse(path)?;
        let source = path.to_string_lossy().into_owned();
        Ok(Document::new(source.clone(), text, source, parser.file_type()))
    }
}
