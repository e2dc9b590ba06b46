//! Reconciliation engine: applies one scope's diff to the content store.
//!
//! Batches run in the fixed order Compute, RemoveTag, AddTag, Delete. Each
//! batch is one store transaction, and the completion sink hears about a
//! batch only after that transaction has committed. Extraction for a
//! Compute batch finishes before its transaction opens.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{IndexConfig, DEFAULT_BATCH_SIZE};
use crate::errors::IndexResult;
use crate::indexer::extract::ExtractorRegistry;
use crate::indexer::pipeline::parallel_extract;
use crate::indexer::source::{ContentSource, FsContentSource};
use crate::models::{CompletionEvent, PathAndFingerprint, RefreshDiff, ResultKind, Scope, Snippet};
use crate::store::database::{DeleteOutcome, SnippetStore};

// ---------------------------------------------------------------------------
// Completion sink
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Fraction of diff entries handled so far, 0.0..=1.0.
    pub progress: f64,
    pub completed: usize,
    pub total: usize,
    pub desc: String,
}

/// Checkpoint callback, called once per committed batch.
pub trait CompletionSink {
    fn mark_complete(
        &mut self,
        entries: &[PathAndFingerprint],
        kind: ResultKind,
    ) -> IndexResult<()>;

    fn progress(&mut self, _update: &ProgressUpdate) {}
}

impl<F> CompletionSink for F
where
    F: FnMut(&[PathAndFingerprint], ResultKind),
{
    fn mark_complete(
        &mut self,
        entries: &[PathAndFingerprint],
        kind: ResultKind,
    ) -> IndexResult<()> {
        self(entries, kind);
        Ok(())
    }
}

/// Sink that just remembers every acknowledged batch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompletionLog {
    pub events: Vec<CompletionEvent>,
}

impl CompletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self, kind: ResultKind) -> Vec<&PathAndFingerprint> {
        self.events
            .iter()
            .filter(|event| event.kind == kind)
            .flat_map(|event| event.entries.iter())
            .collect()
    }
}

impl CompletionSink for CompletionLog {
    fn mark_complete(
        &mut self,
        entries: &[PathAndFingerprint],
        kind: ResultKind,
    ) -> IndexResult<()> {
        self.events.push(CompletionEvent {
            kind,
            entries: entries.to_vec(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation, checked before every batch.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub entry: PathAndFingerprint,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Acknowledged batches, in commit order.
    pub events: Vec<CompletionEvent>,
    /// Compute entries skipped because extraction failed; unacknowledged.
    pub extraction_failures: Vec<ExtractionFailure>,
    /// Compute entries whose artifact was deleted by another scope between
    /// the reuse lookup and the write; unacknowledged.
    pub deferred: Vec<PathAndFingerprint>,
    /// Files handed to an extractor.
    pub extracted: usize,
    /// Compute entries satisfied by an artifact already in the store.
    pub reused: usize,
    /// Delete entries whose artifact another scope still links.
    pub retained: usize,
    pub cancelled: bool,
}

impl ReconcileReport {
    pub fn acknowledged(&self) -> usize {
        self.events.iter().map(|event| event.entries.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    store: Arc<SnippetStore>,
    source: Arc<dyn ContentSource>,
    extractors: ExtractorRegistry,
    batch_size: usize,
    workers: usize,
}

impl Reconciler {
    pub fn new(
        store: Arc<SnippetStore>,
        source: Arc<dyn ContentSource>,
        extractors: ExtractorRegistry,
    ) -> Self {
        Self {
            store,
            source,
            extractors,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 0,
        }
    }

    /// Disk-backed contents and the default tree-sitter extractors.
    pub fn from_config(store: Arc<SnippetStore>, config: &IndexConfig) -> Self {
        Self::new(
            store,
            Arc::new(FsContentSource::new(config.max_file_bytes)),
            ExtractorRegistry::with_defaults(),
        )
        .with_batch_size(config.batch_size)
        .with_workers(config.extract_workers)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn store(&self) -> &SnippetStore {
        &self.store
    }

    pub fn reconcile(
        &self,
        scope: &Scope,
        diff: &RefreshDiff,
        sink: &mut dyn CompletionSink,
    ) -> IndexResult<ReconcileReport> {
        self.reconcile_with_cancel(scope, diff, sink, &CancelFlag::new())
    }

    /// Apply `diff` to the store for `scope`.
    ///
    /// Integrity and persistence errors end the run; batches acknowledged
    /// before the error stay committed. The failed batch is rolled back
    /// and never acknowledged.
    pub fn reconcile_with_cancel(
        &self,
        scope: &Scope,
        diff: &RefreshDiff,
        sink: &mut dyn CompletionSink,
        cancel: &CancelFlag,
    ) -> IndexResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let total = diff.len();
        let mut handled = 0usize;
        info!(
            scope = %scope,
            compute = diff.compute.len(),
            remove_tag = diff.remove_tag.len(),
            add_tag = diff.add_tag.len(),
            delete = diff.delete.len(),
            "reconciling"
        );

        for kind in ResultKind::PROCESSING_ORDER {
            let entries: Vec<PathAndFingerprint> = diff
                .entries(kind)
                .iter()
                .cloned()
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect();

            for batch in entries.chunks(self.batch_size) {
                if cancel.is_cancelled() {
                    info!(
                        scope = %scope,
                        acknowledged = report.acknowledged(),
                        "reconciliation cancelled"
                    );
                    report.cancelled = true;
                    return Ok(report);
                }

                let committed = match kind {
                    ResultKind::Compute => self.compute_batch(scope, batch, &mut report)?,
                    ResultKind::RemoveTag => self.remove_tag_batch(scope, batch)?,
                    ResultKind::AddTag => self.add_tag_batch(scope, batch)?,
                    ResultKind::Delete => self.delete_batch(scope, batch, &mut report)?,
                };
                handled += batch.len();
                debug!(scope = %scope, %kind, committed = committed.len(), "batch committed");

                if !committed.is_empty() {
                    sink.mark_complete(&committed, kind)?;
                    report.events.push(CompletionEvent {
                        kind,
                        entries: committed,
                    });
                }
                sink.progress(&ProgressUpdate {
                    progress: handled as f64 / total.max(1) as f64,
                    completed: handled,
                    total,
                    desc: format!("{kind}: {handled}/{total}"),
                });
            }
        }

        info!(
            scope = %scope,
            acknowledged = report.acknowledged(),
            extracted = report.extracted,
            reused = report.reused,
            failures = report.extraction_failures.len(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Reuse artifacts the store already has for a key; extract the rest
    /// outside the transaction, then write headers, snippets and links.
    fn compute_batch(
        &self,
        scope: &Scope,
        batch: &[PathAndFingerprint],
        report: &mut ReconcileReport,
    ) -> IndexResult<Vec<PathAndFingerprint>> {
        let existing = self.store.existing_artifacts(batch)?;
        let pending: Vec<PathAndFingerprint> = batch
            .iter()
            .filter(|entry| !existing.contains(*entry))
            .cloned()
            .collect();

        let outcomes =
            parallel_extract(scope, &pending, &*self.source, &self.extractors, self.workers);
        let mut extracted: HashMap<PathAndFingerprint, Vec<Snippet>> = HashMap::new();
        for outcome in outcomes {
            if outcome.extractor_invoked {
                report.extracted += 1;
            }
            match outcome.result {
                Ok(snippets) => {
                    extracted.insert(outcome.entry, snippets);
                }
                Err(e) => {
                    warn!(
                        entry = %outcome.entry,
                        error = %e,
                        "snippet extraction failed, skipping"
                    );
                    report.extraction_failures.push(ExtractionFailure {
                        entry: outcome.entry,
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut vanished = Vec::new();
        let committed = self.store.transaction(|tx| {
            let mut committed = Vec::with_capacity(batch.len());
            for entry in batch {
                match extracted.get(entry) {
                    Some(snippets) => {
                        tx.put_artifact(entry, snippets)?;
                    }
                    None if existing.contains(entry) => {
                        if !tx.has_artifact(entry)? {
                            vanished.push(entry.clone());
                            continue;
                        }
                    }
                    None => continue,
                }
                tx.add_association(entry, scope)?;
                committed.push(entry.clone());
            }
            Ok(committed)
        })?;

        for entry in &vanished {
            warn!(entry = %entry, "reused artifact deleted before commit, leaving entry pending");
        }
        report.deferred.extend(vanished);
        report.reused += committed.iter().filter(|e| existing.contains(*e)).count();
        Ok(committed)
    }

    fn remove_tag_batch(
        &self,
        scope: &Scope,
        batch: &[PathAndFingerprint],
    ) -> IndexResult<Vec<PathAndFingerprint>> {
        self.store.transaction(|tx| {
            for entry in batch {
                tx.remove_association(entry, scope)?;
            }
            Ok(batch.to_vec())
        })
    }

    fn add_tag_batch(
        &self,
        scope: &Scope,
        batch: &[PathAndFingerprint],
    ) -> IndexResult<Vec<PathAndFingerprint>> {
        self.store.transaction(|tx| {
            for entry in batch {
                tx.add_association(entry, scope)?;
            }
            Ok(batch.to_vec())
        })
    }

    fn delete_batch(
        &self,
        scope: &Scope,
        batch: &[PathAndFingerprint],
        report: &mut ReconcileReport,
    ) -> IndexResult<Vec<PathAndFingerprint>> {
        let mut retained: HashSet<PathAndFingerprint> = HashSet::new();
        self.store.transaction(|tx| {
            for entry in batch {
                tx.remove_association(entry, scope)?;
                if let DeleteOutcome::Retained { live_links } = tx.delete_artifact(entry)? {
                    warn!(
                        entry = %entry,
                        live_links,
                        "delete issued for an artifact other scopes still link; kept"
                    );
                    retained.insert(entry.clone());
                }
            }
            Ok(())
        })?;
        report.retained += retained.len();
        Ok(batch.to_vec())
    }
}
