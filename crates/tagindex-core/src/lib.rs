//! Tagindex core library: an incremental, tag-scoped snippet index.
//!
//! Files are keyed by `(path, fingerprint)`. Extracted snippets are stored
//! once per key and shared by every scope (directory, branch, artifact)
//! that links them. A diff planner hands the [`Reconciler`] a
//! [`RefreshDiff`] per scope; the reconciler applies it in batches and
//! acknowledges each batch through a [`CompletionSink`] after it commits.

pub mod config;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod store;

pub use config::IndexConfig;
pub use errors::{ExtractionError, IndexError, IndexResult};
pub use indexer::extract::{ExtractorRegistry, SnippetExtractor};
pub use indexer::reconcile::{
    CancelFlag, CompletionLog, CompletionSink, ProgressUpdate, ReconcileReport, Reconciler,
};
pub use indexer::source::{ContentSource, FsContentSource, MemoryContentSource};
pub use indexer::treesitter::TreeSitterExtractor;
pub use models::{
    CompletionEvent, PathAndFingerprint, RefreshDiff, ResultKind, Scope, Snippet, SnippetRecord,
    StoreStats,
};
pub use store::database::{DeleteOutcome, SnippetStore};
