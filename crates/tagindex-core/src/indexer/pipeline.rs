//! Parallel snippet extraction with Rayon.
//!
//! Runs before any store transaction is opened, so no lock is held while
//! files are read and parsed.

use rayon::prelude::*;
use tracing::debug;

use crate::errors::ExtractionResult;
use crate::indexer::extract::ExtractorRegistry;
use crate::indexer::source::ContentSource;
use crate::models::{PathAndFingerprint, Scope, Snippet};

pub struct ExtractionOutcome {
    pub entry: PathAndFingerprint,
    /// False when the read failed or no extractor handles the path.
    pub extractor_invoked: bool,
    pub result: ExtractionResult<Vec<Snippet>>,
}

fn extract_file_worker(
    scope: &Scope,
    entry: &PathAndFingerprint,
    source: &dyn ContentSource,
    registry: &ExtractorRegistry,
) -> ExtractionOutcome {
    let mut extractor_invoked = false;
    let result = source.read(scope, &entry.path).and_then(|contents| {
        extractor_invoked = registry.resolve(&entry.path).is_some();
        registry.extract(&entry.path, &contents)
    });
    ExtractionOutcome {
        entry: entry.clone(),
        extractor_invoked,
        result,
    }
}

/// Extract every entry, preserving input order in the output.
///
/// `workers == 0` uses the global Rayon pool.
pub fn parallel_extract(
    scope: &Scope,
    entries: &[PathAndFingerprint],
    source: &dyn ContentSource,
    registry: &ExtractorRegistry,
    workers: usize,
) -> Vec<ExtractionOutcome> {
    if entries.is_empty() {
        return vec![];
    }
    debug!(count = entries.len(), workers, "extracting snippets");

    let run = || -> Vec<ExtractionOutcome> {
        entries
            .par_iter()
            .map(|entry| extract_file_worker(scope, entry, source, registry))
            .collect()
    };

    if workers == 0 {
        return run();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(run),
        Err(_) => {
            // Fallback to sequential
            entries
                .iter()
                .map(|entry| extract_file_worker(scope, entry, source, registry))
                .collect()
        }
    }
}
