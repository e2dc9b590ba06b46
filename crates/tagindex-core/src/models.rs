//! Shared typed models used across extraction, storage, and reconciliation.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Artifact identifier of the code snippet index.
pub const CODE_SNIPPETS_ARTIFACT_ID: &str = "codeSnippets";

// ---------------------------------------------------------------------------
// 1. Scope
// ---------------------------------------------------------------------------

/// One logical index instance: a directory root on a branch, for one
/// artifact kind. Two scopes over the same files are still distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub directory: String,
    pub branch: String,
    pub artifact_id: String,
}

impl Scope {
    pub fn new(
        directory: impl Into<String>,
        branch: impl Into<String>,
        artifact_id: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            branch: branch.into(),
            artifact_id: artifact_id.into(),
        }
    }

    /// Scope for the code snippet index.
    pub fn code_snippets(directory: impl Into<String>, branch: impl Into<String>) -> Self {
        Self::new(directory, branch, CODE_SNIPPETS_ARTIFACT_ID)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.directory, self.branch, self.artifact_id)
    }
}

// ---------------------------------------------------------------------------
// 2. PathAndFingerprint
// ---------------------------------------------------------------------------

/// A file path and the content hash it had when the diff was planned.
///
/// The fingerprint is the dedup key: equal fingerprints mean equal
/// extracted content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathAndFingerprint {
    pub path: String,
    pub fingerprint: String,
}

impl PathAndFingerprint {
    pub fn new(path: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

impl fmt::Display for PathAndFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.fingerprint)
    }
}

// ---------------------------------------------------------------------------
// 3. Snippets
// ---------------------------------------------------------------------------

/// A snippet descriptor as returned by an extractor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: String,
    pub body: String,
    pub signature: String,
    pub start_line: i64,
    pub end_line: i64,
}

/// A persisted snippet row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetRecord {
    pub id: i64,
    pub path: String,
    pub fingerprint: String,
    pub title: String,
    pub body: String,
    pub signature: String,
    pub start_line: i64,
    pub end_line: i64,
}

impl SnippetRecord {
    pub fn key(&self) -> PathAndFingerprint {
        PathAndFingerprint::new(&self.path, &self.fingerprint)
    }

    /// Short `title: signature` label used by the path/signature listing.
    pub fn label(&self) -> String {
        if self.title.is_empty() {
            self.signature.clone()
        } else if self.signature.is_empty() {
            self.title.clone()
        } else {
            format!("{}: {}", self.title, self.signature)
        }
    }
}

// ---------------------------------------------------------------------------
// 4. Diff and completion
// ---------------------------------------------------------------------------

/// The four mutually exclusive update actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    #[serde(rename = "compute")]
    Compute,
    #[serde(rename = "addTag")]
    AddTag,
    #[serde(rename = "removeTag")]
    RemoveTag,
    #[serde(rename = "del")]
    Delete,
}

impl ResultKind {
    /// Order in which one reconciliation run applies the batches.
    pub const PROCESSING_ORDER: [ResultKind; 4] = [
        ResultKind::Compute,
        ResultKind::RemoveTag,
        ResultKind::AddTag,
        ResultKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Compute => "compute",
            ResultKind::AddTag => "addTag",
            ResultKind::RemoveTag => "removeTag",
            ResultKind::Delete => "del",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-computed diff for one scope, grouped by action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshDiff {
    #[serde(default)]
    pub compute: Vec<PathAndFingerprint>,
    #[serde(default)]
    pub add_tag: Vec<PathAndFingerprint>,
    #[serde(default)]
    pub remove_tag: Vec<PathAndFingerprint>,
    #[serde(default, rename = "del")]
    pub delete: Vec<PathAndFingerprint>,
}

impl RefreshDiff {
    pub fn entries(&self, kind: ResultKind) -> &[PathAndFingerprint] {
        match kind {
            ResultKind::Compute => &self.compute,
            ResultKind::AddTag => &self.add_tag,
            ResultKind::RemoveTag => &self.remove_tag,
            ResultKind::Delete => &self.delete,
        }
    }

    pub fn len(&self) -> usize {
        self.compute.len() + self.add_tag.len() + self.remove_tag.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One acknowledged batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub kind: ResultKind,
    pub entries: Vec<PathAndFingerprint>,
}

/// Row counts across the whole store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub artifacts: i64,
    pub snippets: i64,
    pub links: i64,
}
