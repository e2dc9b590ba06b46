//! End-to-end flow over a real workspace on disk and a file-backed store.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tagindex_core::indexer::filesystem::scan_workspace;
use tagindex_core::{
    CompletionLog, IndexConfig, PathAndFingerprint, Reconciler, RefreshDiff, ResultKind, Scope,
    SnippetStore,
};

/// Minimal planner: diff what the scope last acknowledged against a scan.
fn plan(
    acknowledged: &BTreeSet<PathAndFingerprint>,
    current: &[PathAndFingerprint],
) -> RefreshDiff {
    let current: BTreeSet<PathAndFingerprint> = current.iter().cloned().collect();
    let stale: Vec<PathAndFingerprint> = acknowledged.difference(&current).cloned().collect();
    RefreshDiff {
        compute: current.difference(acknowledged).cloned().collect(),
        remove_tag: stale.clone(),
        delete: stale,
        ..Default::default()
    }
}

fn apply(acknowledged: &mut BTreeSet<PathAndFingerprint>, log: &CompletionLog) {
    for event in &log.events {
        for entry in &event.entries {
            match event.kind {
                ResultKind::Compute | ResultKind::AddTag => {
                    acknowledged.insert(entry.clone());
                }
                ResultKind::RemoveTag | ResultKind::Delete => {
                    acknowledged.remove(entry);
                }
            }
        }
    }
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn index_edit_and_reopen_workspace() {
    let workspace = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let root = workspace.path();
    write(root, "cmd/main.go", "package main\n\nfunc main() {\n}\n");
    write(
        root,
        "lib/util.py",
        "def slugify(text):\n    return text.lower()\n",
    );
    write(root, "README.md", "# demo\n");

    let config = IndexConfig {
        db_path: data.path().join("index.sqlite"),
        batch_size: 1,
        ..IndexConfig::default()
    };
    let scope = Scope::code_snippets(root.to_string_lossy(), "main");
    let mut acknowledged = BTreeSet::new();

    {
        let store = Arc::new(SnippetStore::open(&config).unwrap());
        let reconciler = Reconciler::from_config(store.clone(), &config);

        let scan = scan_workspace(root, config.max_file_bytes).unwrap();
        assert_eq!(scan.len(), 3);
        let mut log = CompletionLog::new();
        let report = reconciler
            .reconcile(&scope, &plan(&acknowledged, &scan), &mut log)
            .unwrap();
        apply(&mut acknowledged, &log);

        // One batch per entry; README has no extractor and stores zero snippets.
        assert_eq!(log.events.len(), 3);
        assert_eq!(report.extracted, 2);
        assert!(report.extraction_failures.is_empty());
        assert_eq!(acknowledged.len(), 3);

        let signatures = store.paths_and_signatures(&[scope.clone()]).unwrap();
        assert_eq!(signatures["cmd/main.go"], vec!["main: func main()".to_string()]);
        assert_eq!(signatures["lib/util.py"], vec!["slugify: def slugify(text)".to_string()]);
        assert!(!signatures.contains_key("README.md"));

        // Edit one file: its old key is untagged and deleted, the new one computed.
        write(
            root,
            "cmd/main.go",
            "package main\n\nfunc main() {\n}\n\nfunc helper() int {\n\treturn 1\n}\n",
        );
        let scan = scan_workspace(root, config.max_file_bytes).unwrap();
        let diff = plan(&acknowledged, &scan);
        assert_eq!(diff.compute.len(), 1);
        assert_eq!(diff.delete.len(), 1);

        let mut log = CompletionLog::new();
        let report = reconciler.reconcile(&scope, &diff, &mut log).unwrap();
        apply(&mut acknowledged, &log);
        assert_eq!(report.extracted, 1);
        let kinds: Vec<ResultKind> = log.events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ResultKind::Compute, ResultKind::RemoveTag, ResultKind::Delete]
        );

        let stats = store.stats().unwrap();
        assert_eq!(stats.artifacts, 3);
        assert_eq!(stats.links, 3);
        assert_eq!(stats.snippets, 3);
    }

    // Reopening the same file sees the committed state, and a rescan with
    // nothing changed plans an empty diff.
    let store = Arc::new(SnippetStore::open(&config).unwrap());
    let titles: Vec<String> = store
        .list_artifacts(&scope)
        .unwrap()
        .into_iter()
        .map(|record| record.title)
        .collect();
    assert!(titles.contains(&"helper".to_string()));
    assert!(titles.contains(&"slugify".to_string()));

    let scan = scan_workspace(root, config.max_file_bytes).unwrap();
    let diff = plan(&acknowledged, &scan);
    assert!(diff.is_empty());
    let mut log = CompletionLog::new();
    Reconciler::from_config(store, &config)
        .reconcile(&scope, &diff, &mut log)
        .unwrap();
    assert!(log.events.is_empty());
}

#[test]
fn branches_share_artifacts_for_identical_contents() {
    let workspace = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let root = workspace.path();
    write(root, "src/App.java", "public class App {\n    void run() {}\n}\n");

    let config = IndexConfig {
        db_path: data.path().join("index.sqlite"),
        ..IndexConfig::default()
    };
    let store = Arc::new(SnippetStore::open(&config).unwrap());
    let reconciler = Reconciler::from_config(store.clone(), &config);
    let scan = scan_workspace(root, config.max_file_bytes).unwrap();
    let diff = plan(&BTreeSet::new(), &scan);

    let main = Scope::code_snippets(root.to_string_lossy(), "main");
    let feature = Scope::code_snippets(root.to_string_lossy(), "feature");
    reconciler.reconcile(&main, &diff, &mut CompletionLog::new()).unwrap();
    let report = reconciler
        .reconcile(&feature, &diff, &mut CompletionLog::new())
        .unwrap();

    assert_eq!(report.extracted, 0);
    assert_eq!(report.reused, 1);
    let stats = store.stats().unwrap();
    assert_eq!(stats.artifacts, 1);
    assert_eq!(stats.snippets, 2);
    assert_eq!(stats.links, 2);

    let page = store
        .list_snippets_page(&[main.clone(), feature.clone()], 0, 10)
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(
        store.list_artifacts(&main).unwrap(),
        store.list_artifacts(&feature).unwrap()
    );
}
