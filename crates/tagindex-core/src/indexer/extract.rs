//! Pluggable snippet extraction.
//!
//! The reconciliation engine only sees [`SnippetExtractor`]; which
//! implementation handles a file is decided by [`ExtractorRegistry`] from
//! the file's language.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{ExtractionError, ExtractionResult};
use crate::indexer::filesystem::detect_language;
use crate::indexer::treesitter::TreeSitterExtractor;
use crate::models::Snippet;

/// Turns file contents into snippet descriptors.
///
/// Must be deterministic for identical contents; may return an empty list.
pub trait SnippetExtractor: Send + Sync {
    fn extract(&self, path: &str, contents: &str) -> ExtractionResult<Vec<Snippet>>;
}

impl<F> SnippetExtractor for F
where
    F: Fn(&str, &str) -> ExtractionResult<Vec<Snippet>> + Send + Sync,
{
    fn extract(&self, path: &str, contents: &str) -> ExtractionResult<Vec<Snippet>> {
        self(path, contents)
    }
}

/// Reject descriptors whose line range is inverted or negative.
pub fn validate_snippets(path: &str, snippets: &[Snippet]) -> ExtractionResult<()> {
    for snippet in snippets {
        if snippet.start_line < 0 || snippet.end_line < snippet.start_line {
            return Err(ExtractionError::Malformed(format!(
                "{path}: snippet {:?} spans {}..{}",
                snippet.title, snippet.start_line, snippet.end_line
            )));
        }
    }
    Ok(())
}

/// Language -> extractor table, with an optional catch-all.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    by_language: HashMap<String, Arc<dyn SnippetExtractor>>,
    fallback: Option<Arc<dyn SnippetExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tree-sitter extraction for every language it has a grammar for.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let tree_sitter: Arc<dyn SnippetExtractor> = Arc::new(TreeSitterExtractor::new());
        for language in TreeSitterExtractor::SUPPORTED_LANGUAGES {
            registry.register(language, Arc::clone(&tree_sitter));
        }
        registry
    }

    /// Use `extractor` for every file, whatever its language.
    pub fn single(extractor: Arc<dyn SnippetExtractor>) -> Self {
        Self {
            by_language: HashMap::new(),
            fallback: Some(extractor),
        }
    }

    pub fn register(&mut self, language: &str, extractor: Arc<dyn SnippetExtractor>) {
        self.by_language.insert(language.to_string(), extractor);
    }

    pub fn set_fallback(&mut self, extractor: Arc<dyn SnippetExtractor>) {
        self.fallback = Some(extractor);
    }

    pub fn resolve(&self, path: &str) -> Option<&Arc<dyn SnippetExtractor>> {
        detect_language(path)
            .and_then(|language| self.by_language.get(&language))
            .or(self.fallback.as_ref())
    }

    /// Extract and validate. Files nobody handles yield no snippets.
    pub fn extract(&self, path: &str, contents: &str) -> ExtractionResult<Vec<Snippet>> {
        let Some(extractor) = self.resolve(path) else {
            return Ok(Vec::new());
        };
        let snippets = extractor.extract(path, contents)?;
        validate_snippets(path, &snippets)?;
        Ok(snippets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_snippet(_path: &str, _contents: &str) -> ExtractionResult<Vec<Snippet>> {
        Ok(vec![Snippet {
            title: "t".into(),
            body: "b".into(),
            signature: "s".into(),
            start_line: 0,
            end_line: 1,
        }])
    }

    #[test]
    fn unknown_language_yields_nothing() {
        let registry = ExtractorRegistry::with_defaults();
        assert!(registry.extract("notes.txt", "hello").unwrap().is_empty());
    }

    #[test]
    fn registered_language_wins_over_fallback() {
        let mut registry = ExtractorRegistry::single(Arc::new(
            |_: &str, _: &str| -> ExtractionResult<Vec<Snippet>> { Ok(Vec::new()) },
        ));
        registry.register("go", Arc::new(one_snippet));
        assert_eq!(registry.extract("main.go", "").unwrap().len(), 1);
        assert!(registry.extract("README.md", "").unwrap().is_empty());
    }

    #[test]
    fn malformed_descriptor_rejected() {
        let registry = ExtractorRegistry::single(Arc::new(
            |_: &str, _: &str| -> ExtractionResult<Vec<Snippet>> {
                Ok(vec![Snippet {
                    title: "bad".into(),
                    body: String::new(),
                    signature: String::new(),
                    start_line: 10,
                    end_line: 2,
                }])
            },
        ));
        let err = registry.extract("a.go", "").unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }

    #[test]
    fn fallback_covers_languages_without_a_grammar() {
        let mut registry = ExtractorRegistry::with_defaults();
        assert!(registry.resolve("notes.txt").is_none());
        registry.set_fallback(Arc::new(one_snippet));
        assert_eq!(registry.extract("notes.txt", "hello").unwrap()[0].title, "t");
        let go = registry.extract("main.go", "package main\n\nfunc run() {}\n").unwrap();
        assert_eq!(go[0].title, "run");
    }
}
