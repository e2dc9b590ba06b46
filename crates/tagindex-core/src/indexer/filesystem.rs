//! Filesystem helpers: language detection, content fingerprints and the
//! workspace file listing fed to diff planners.

use std::path::Path;

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::{IndexError, IndexResult};
use crate::models::PathAndFingerprint;

const LANGUAGE_BY_EXTENSION: &[(&str, &str)] = &[
    (".py", "python"),
    (".java", "java"),
    (".ts", "typescript"),
    (".mts", "typescript"),
    (".tsx", "tsx"),
    (".js", "javascript"),
    (".jsx", "javascript"),
    (".mjs", "javascript"),
    (".go", "go"),
];

const DEFAULT_SENSITIVE_EXCLUDE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*.p12",
    "*secret*",
    "*secrets*",
    "*credential*",
    "id_rsa",
    "id_dsa",
];

/// Per-workspace ignore file, same syntax as `.gitignore`.
pub const IGNORE_FILE_NAME: &str = ".tagindexignore";

pub fn detect_language(path: &str) -> Option<String> {
    let path = Path::new(path);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))?;
    LANGUAGE_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext.as_str())
        .map(|(_, lang)| lang.to_string())
}

/// SHA-256 hex digest of file contents, used as the fingerprint.
pub fn compute_content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn hash_file(path: &Path) -> IndexResult<String> {
    let data = std::fs::read(path)?;
    Ok(compute_content_hash(&data))
}

fn exclude_sensitive() -> bool {
    match std::env::var("TAGINDEX_EXCLUDE_SENSITIVE") {
        Ok(val) => {
            let v = val.trim().to_lowercase();
            !matches!(v.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}

/// List every indexable file under `root` with its current fingerprint.
///
/// Honours `.gitignore` and [`IGNORE_FILE_NAME`], skips hidden files,
/// files over `max_file_bytes` and (unless `TAGINDEX_EXCLUDE_SENSITIVE` is
/// off) likely secrets. Paths are `/`-separated and relative to `root`,
/// sorted for stable output.
pub fn scan_workspace(root: &Path, max_file_bytes: u64) -> IndexResult<Vec<PathAndFingerprint>> {
    let mut overrides = OverrideBuilder::new(root);
    if exclude_sensitive() {
        for pattern in DEFAULT_SENSITIVE_EXCLUDE_PATTERNS {
            overrides
                .add(&format!("!{pattern}"))
                .map_err(|e| IndexError::Config(format!("bad exclude pattern {pattern}: {e}")))?;
        }
    }
    let overrides = overrides
        .build()
        .map_err(|e| IndexError::Config(e.to_string()))?;

    let walker = WalkBuilder::new(root)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILE_NAME)
        .overrides(overrides)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable workspace entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > max_file_bytes {
            debug!(path = %path.display(), size, "skipping oversized file");
            continue;
        }
        if let Some(file) = fingerprint_entry(root, path) {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

/// Relative path plus content hash, or `None` (logged) when the file can
/// no longer be read, e.g. it was removed after the walk listed it.
fn fingerprint_entry(root: &Path, path: &Path) -> Option<PathAndFingerprint> {
    let fingerprint = match hash_file(path) {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable workspace file");
            return None;
        }
    };
    let rel_path = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    Some(PathAndFingerprint::new(rel_path, fingerprint))
}
