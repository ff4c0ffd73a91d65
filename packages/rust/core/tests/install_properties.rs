//! End-to-end install behavior against real directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kbinstall_core::{
    CatalogStore, InstallReporter, MergeEngine, ReportStatus, SilentProgress, StagingArea,
    files, verify_kb,
};
use kbinstall_shared::{
    Catalog, DocumentEntry, InstallMode, InstallOutcome, InstallRequest, InstallResult,
};

struct Doc<'a> {
    path: &'a str,
    title: Option<&'a str>,
    body: &'a str,
}

fn doc<'a>(path: &'a str, title: &'a str, body: &'a str) -> Doc<'a> {
    Doc {
        path,
        title: Some(title),
        body,
    }
}

fn write_kb(kb: &Path, docs: &[Doc<'_>]) {
    let mut catalog = Catalog::new();
    for d in docs {
        let mut entry = DocumentEntry::new(d.path).with_uri(format!("https://example.com/{}", d.path));
        if let Some(title) = d.title {
            entry = entry.with_title(title);
        }
        catalog.documents.push(entry);

        let file = files::document_path(kb, d.path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, d.body).unwrap();
    }
    CatalogStore::default().save(kb, &catalog).unwrap();
}

fn install(sources: &[PathBuf], dest: &Path, mode: InstallMode, force: bool) -> Vec<InstallResult> {
    let request = InstallRequest {
        sources: sources.to_vec(),
        dest_root: dest.to_path_buf(),
        mode,
        force,
    };
    MergeEngine::default()
        .install(&request, &SilentProgress)
        .unwrap()
}

fn catalog(kb: &Path) -> Catalog {
    CatalogStore::default().load(kb).unwrap().unwrap()
}

/// Every file under `kb` (catalog included) with its contents.
fn snapshot(kb: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    let mut stack = vec![kb.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(kb).unwrap().to_string_lossy().into_owned();
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    out
}

fn assert_integrity(kb: &Path) {
    let report = verify_kb(&CatalogStore::default(), kb).unwrap();
    assert!(report.is_clean(), "inconsistent KB: {report:?}");

    let cat = catalog(kb);
    let mut paths: Vec<_> = cat.paths().collect();
    let before = paths.len();
    paths.sort_unstable();
    paths.dedup();
    assert_eq!(paths.len(), before, "duplicate paths in catalog");
}

#[test]
fn scenario_a_single_into_empty_destination() {
    let stage = StagingArea::new().unwrap();
    let src = stage.kb_dir("docs-kb").unwrap();
    write_kb(&src, &[doc("a.md", "A", "# A"), doc("b.md", "B", "# B")]);
    let out = stage.kb_dir("out").unwrap();

    let results = install(&[src], &out, InstallMode::Single, false);

    let out = std::fs::canonicalize(&out).unwrap();
    assert_eq!(results[0].target, out.join("docs-kb"));
    assert_eq!(results[0].outcome, InstallOutcome::Created);
    assert_eq!(
        catalog(&results[0].target).paths().collect::<Vec<_>>(),
        vec!["a.md", "b.md"]
    );
    assert_integrity(&results[0].target);
}

#[test]
fn scenario_b_merge_updates_and_adds() {
    let stage = StagingArea::new().unwrap();
    let target = stage.kb_dir("target").unwrap();
    write_kb(&target, &[doc("a.md", "Old", "old"), doc("keep.md", "Keep", "keep")]);
    let src = stage.kb_dir("src").unwrap();
    write_kb(&src, &[doc("a.md", "New", "new"), doc("c.md", "C", "c")]);

    let results = install(&[src], &target, InstallMode::Merge, false);

    assert_eq!(results[0].outcome, InstallOutcome::Merged);
    assert!(results[0].error.is_none());
    let cat = catalog(&target);
    assert_eq!(cat.get("a.md").unwrap().title.as_deref(), Some("New"));
    assert!(cat.contains("c.md"));
    assert!(cat.contains("keep.md"), "pre-existing entry lost");
    assert_eq!(cat.len(), 3);
    assert_integrity(&target);
}

#[test]
fn scenario_c_existing_target_left_untouched() {
    let stage = StagingArea::new().unwrap();
    let src = stage.kb_dir("docs-kb").unwrap();
    write_kb(&src, &[doc("a.md", "A", "a")]);
    let out = stage.kb_dir("out").unwrap();
    let existing = out.join("docs-kb");
    write_kb(&existing, &[doc("z.md", "Z", "z")]);
    let before = snapshot(&existing);

    let results = install(&[src], &out, InstallMode::Single, false);

    assert_eq!(results[0].outcome, InstallOutcome::SkippedExists);
    assert_eq!(snapshot(&existing), before);
}

#[test]
fn scenario_d_last_source_wins() {
    let stage = StagingArea::new().unwrap();
    let a = stage.kb_dir("kbA").unwrap();
    write_kb(&a, &[doc("shared.md", "From A", "A body"), doc("only-a.md", "A", "a")]);
    let b = stage.kb_dir("kbB").unwrap();
    write_kb(&b, &[doc("shared.md", "From B", "B body")]);
    let target = stage.path().join("merged");

    let results = install(&[a, b], &target, InstallMode::Merge, false);

    assert!(results.iter().all(|r| r.outcome.is_success()));
    let cat = catalog(&target);
    assert_eq!(cat.get("shared.md").unwrap().title.as_deref(), Some("From B"));
    assert_eq!(
        std::fs::read_to_string(files::document_path(&target, "shared.md")).unwrap(),
        "B body"
    );
    assert!(cat.contains("only-a.md"));
    assert_integrity(&target);
}

#[test]
fn merge_is_idempotent() {
    let stage = StagingArea::new().unwrap();
    let src = stage.kb_dir("src").unwrap();
    write_kb(&src, &[doc("a.md", "A", "a"), doc("guide/b.md", "B", "b")]);
    let target = stage.path().join("kb");

    install(&[src.clone()], &target, InstallMode::Merge, false);
    let first = snapshot(&target);

    let results = install(&[src], &target, InstallMode::Merge, false);
    assert_eq!(snapshot(&target), first);
    assert_eq!(results[0].documents_added, 0);
    assert_eq!(results[0].documents_replaced, 0);
    assert_eq!(results[0].documents_unchanged, 2);
}

#[test]
fn collision_replaces_entry_without_keeping_stale_fields() {
    let stage = StagingArea::new().unwrap();
    let target = stage.kb_dir("target").unwrap();
    write_kb(&target, &[doc("a.md", "Curated", "old a")]);
    let src = stage.kb_dir("src").unwrap();
    write_kb(
        &src,
        &[Doc {
            path: "a.md",
            title: None,
            body: "new a",
        }],
    );

    let results = install(&[src], &target, InstallMode::Merge, false);
    assert_eq!(results[0].documents_replaced, 1);

    let entry = catalog(&target).get("a.md").unwrap().clone();
    assert!(entry.title.is_none(), "title of the replaced file survived");
    assert_eq!(
        std::fs::read_to_string(files::document_path(&target, "a.md")).unwrap(),
        "new a"
    );
}

#[test]
fn last_source_wins_even_when_it_has_fewer_fields() {
    let stage = StagingArea::new().unwrap();
    let a = stage.kb_dir("kbA").unwrap();
    std::fs::create_dir_all(a.join("cache")).unwrap();
    std::fs::write(a.join("cache/shared.md"), "A body").unwrap();
    CatalogStore::default()
        .save(
            &a,
            &Catalog {
                documents: vec![
                    DocumentEntry::new("shared.md")
                        .with_uri("https://a/shared")
                        .with_title("A title")
                        .with_summary("about A"),
                ],
            },
        )
        .unwrap();
    let b = stage.kb_dir("kbB").unwrap();
    std::fs::create_dir_all(b.join("cache")).unwrap();
    std::fs::write(b.join("cache/shared.md"), "B body").unwrap();
    CatalogStore::default()
        .save(
            &b,
            &Catalog {
                documents: vec![DocumentEntry::new("shared.md").with_uri("https://b/shared")],
            },
        )
        .unwrap();
    let target = stage.path().join("merged");

    install(&[a, b], &target, InstallMode::Merge, false);

    let cat = catalog(&target);
    let entry = cat.get("shared.md").unwrap();
    assert_eq!(entry, &DocumentEntry::new("shared.md").with_uri("https://b/shared"));
    assert_eq!(
        std::fs::read_to_string(files::document_path(&target, "shared.md")).unwrap(),
        "B body"
    );
    assert_integrity(&target);
}

#[test]
fn isolated_sources_fail_independently() {
    let stage = StagingArea::new().unwrap();
    let good = stage.kb_dir("good").unwrap();
    write_kb(&good, &[doc("a.md", "A", "a")]);
    let empty = stage.kb_dir("empty").unwrap();
    let out = stage.kb_dir("out").unwrap();
    let taken = out.join("taken");
    std::fs::create_dir_all(&taken).unwrap();
    std::fs::write(taken.join("README"), "hands off").unwrap();
    let taken_src = stage.kb_dir("src-parent").unwrap().join("taken");
    write_kb(&taken_src, &[doc("t.md", "T", "t")]);

    let request = InstallRequest {
        sources: vec![empty, taken_src, good],
        dest_root: out.clone(),
        mode: InstallMode::IsolatedSubdirectories,
        force: false,
    };
    let results = MergeEngine::default()
        .install(&request, &SilentProgress)
        .unwrap();
    let report = InstallReporter::report(&request, &results);

    assert_eq!(results[0].outcome, InstallOutcome::Failed);
    assert_eq!(results[1].outcome, InstallOutcome::SkippedExists);
    assert_eq!(results[2].outcome, InstallOutcome::Created);
    assert_eq!(report.status, ReportStatus::Partial);
    assert_eq!(report.open_path.as_deref(), Some(results[2].target.as_path()));
    assert!(!taken.join("catalog.json").exists());
}

#[test]
fn failed_merge_leaves_no_destination_behind() {
    let stage = StagingArea::new().unwrap();
    let empty = stage.kb_dir("empty").unwrap();
    let dest = stage.path().join("shelf/merged");

    let request = InstallRequest {
        sources: vec![empty],
        dest_root: dest.clone(),
        mode: InstallMode::Merge,
        force: false,
    };
    let results = MergeEngine::default()
        .install(&request, &SilentProgress)
        .unwrap();
    let report = InstallReporter::report(&request, &results);

    assert_eq!(results[0].outcome, InstallOutcome::Failed);
    assert_eq!(report.status, ReportStatus::Error);
    assert!(!stage.path().join("shelf").exists());
}

#[test]
fn force_keeps_previous_entries() {
    let stage = StagingArea::new().unwrap();
    let out = stage.kb_dir("out").unwrap();
    write_kb(&out.join("kb"), &[doc("old.md", "Old", "old")]);
    let src = stage.kb_dir("kb").unwrap();
    write_kb(&src, &[doc("new.md", "New", "new")]);

    let results = install(&[src], &out, InstallMode::Single, true);

    assert_eq!(results[0].outcome, InstallOutcome::Overwritten);
    let cat = catalog(&results[0].target);
    assert!(cat.contains("old.md"));
    assert!(cat.contains("new.md"));
    assert_integrity(&results[0].target);
}

#[test]
fn legacy_discovery_source_installs_as_clean_catalog() {
    let stage = StagingArea::new().unwrap();
    let src = stage.kb_dir("legacy-kb").unwrap();
    std::fs::create_dir_all(src.join("cache")).unwrap();
    std::fs::write(src.join("cache/intro.md"), "# Intro").unwrap();
    std::fs::write(
        src.join("discovery.json"),
        r#"{
  "metadata": {"generator": "crawler", "pages": 1},
  "documents": [{"path": "cache/intro.md", "url": "https://example.com/intro", "title": "Intro"}]
}"#,
    )
    .unwrap();
    let out = stage.kb_dir("out").unwrap();

    let results = install(&[src], &out, InstallMode::Single, false);
    assert_eq!(results[0].outcome, InstallOutcome::Created);

    let raw: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(results[0].target.join("catalog.json")).unwrap(),
    )
    .unwrap();
    let keys: Vec<_> = raw.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["documents".to_string()]);
    assert_eq!(raw["documents"][0]["path"], "intro.md");
    assert_eq!(raw["documents"][0]["uri"], "https://example.com/intro");
    assert_integrity(&results[0].target);
}

#[test]
fn nested_cache_folder_in_canonical_catalog_is_installed_as_is() {
    let stage = StagingArea::new().unwrap();
    let src = stage.kb_dir("nested-kb").unwrap();
    std::fs::create_dir_all(src.join("cache/cache")).unwrap();
    std::fs::write(src.join("cache/cache/notes.md"), "nested").unwrap();
    std::fs::write(src.join("cache/notes.md"), "decoy").unwrap();
    std::fs::write(
        src.join("catalog.json"),
        r#"{"documents": [{"path": "cache/notes.md"}, {"path": "notes.md"}]}"#,
    )
    .unwrap();
    let out = stage.kb_dir("out").unwrap();

    let results = install(&[src], &out, InstallMode::Single, false);
    assert_eq!(results[0].outcome, InstallOutcome::Created);

    let target = &results[0].target;
    assert_eq!(
        std::fs::read_to_string(files::document_path(target, "cache/notes.md")).unwrap(),
        "nested"
    );
    assert_eq!(
        std::fs::read_to_string(files::document_path(target, "notes.md")).unwrap(),
        "decoy"
    );
    assert_integrity(target);
}
