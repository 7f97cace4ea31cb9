//! End-to-end consolidation runs over directories and in-memory sources.

use std::path::{Path, PathBuf};

use url::Url;

use docs2md_core::{ConsolidationEngine, FileSink, MemorySink, SilentProgress};
use docs2md_discovery::{DirectorySource, MemorySource, RepositorySource};
use docs2md_shared::{
    ConsolidateConfig, FailureKind, RunManifest, RunState, SourceStatus, UnresolvedReason,
    WalkConfig,
};

fn config(output: PathBuf) -> ConsolidateConfig {
    ConsolidateConfig {
        output,
        assets_dir: "assets".into(),
        concurrency: 4,
        base_heading_level: 1,
        toc_title: Some("Table of Contents".into()),
        toc_include_sections: false,
        toc_max_level: 3,
        source_attribution: false,
        write_manifest: true,
        validate_references: false,
    }
}

fn write(root: &Path, rel: &str, content: impl AsRef<[u8]>) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

async fn consolidate(docs: &Path, output: &Path) -> (RunManifest, String) {
    let engine = ConsolidationEngine::new(config(output.to_path_buf())).unwrap();
    let source = DirectorySource::new(docs, WalkConfig::default());
    let mut sink = FileSink::new(output);
    let manifest = engine.run(source, &mut sink, &SilentProgress).await.unwrap();
    let text = std::fs::read_to_string(output).unwrap_or_default();
    (manifest, text)
}

#[tokio::test]
async fn nested_folders_set_title_levels() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(&docs, "index.md", "# Home\n\nWelcome.\n");
    write(&docs, "guide/a.md", "# A\n\n## Details\n\nText a.\n");
    write(&docs, "guide/b.md", "# B\n\nText b.\n");

    let output = tmp.path().join("out/docs.md");
    let (manifest, text) = consolidate(&docs, &output).await;

    assert_eq!(manifest.state, RunState::Done);
    assert_eq!(manifest.succeeded, 3);
    assert!(text.starts_with(
        "# Table of Contents\n\n- [Home](#home)\n  - [A](#a)\n  - [B](#b)\n\n# Home\n\nWelcome.\n\n## A\n\n### Details\n"
    ));
    assert!(text.ends_with("## B\n\nText b.\n"));
    assert_eq!(manifest.output.as_deref(), Some(output.as_path()));
}

#[tokio::test]
async fn duplicate_titles_get_distinct_anchors() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(&docs, "a.md", "# Overview\n\nFirst.\n");
    write(&docs, "b.md", "# Overview\n\nSecond.\n");

    let (_, text) = consolidate(&docs, &tmp.path().join("docs.md")).await;
    assert!(text.contains("- [Overview](#overview)\n- [Overview](#overview-1)\n"));
}

#[tokio::test]
async fn unreadable_document_is_isolated() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(&docs, "good.md", "# Good\n\nKept.\n");
    write(&docs, "bad.md", [b'#', b' ', 0xFF, 0xFE, b'\n']);
    write(&docs, "other.md", "# Other\n\nAlso kept.\n");

    let (manifest, text) = consolidate(&docs, &tmp.path().join("docs.md")).await;

    assert_eq!(manifest.state, RunState::PartiallyFailed);
    assert_eq!(manifest.discovered, 3);
    assert_eq!(manifest.succeeded, 2);
    assert_eq!(manifest.failed, 1);
    assert_eq!(manifest.failures[0].source, "bad.md");
    assert_eq!(manifest.failures[0].kind, FailureKind::Normalization);
    assert!(text.contains("Kept."));
    assert!(text.contains("Also kept."));
}

#[tokio::test]
async fn all_documents_failing_writes_nothing() {
    let source = MemorySource::directory("/docs")
        .with_file("a.md", vec![0xC3, 0x28])
        .with_file("b.md", vec![0xFF]);
    let engine = ConsolidationEngine::new(ConsolidateConfig {
        write_manifest: false,
        ..config(PathBuf::from("docs.md"))
    })
    .unwrap();
    let mut sink = MemorySink::new();

    let manifest = engine.run(source, &mut sink, &SilentProgress).await.unwrap();

    assert_eq!(manifest.state, RunState::Failed);
    assert_eq!(manifest.failed, 2);
    assert!(manifest.sources.iter().all(|s| s.status == SourceStatus::Failed));
    assert!(!sink.is_finished());
}

#[tokio::test]
async fn images_are_copied_to_stable_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(&docs, "guide/setup.md", "# Setup\n\n![diagram](./img/a.png)\n");
    write(&docs, "guide/img/a.png", [0x89, b'P', b'N', b'G']);

    let output = tmp.path().join("out/docs.md");
    let (manifest, text) = consolidate(&docs, &output).await;

    assert_eq!(manifest.assets.len(), 1);
    let asset = &manifest.assets[0];
    assert!(asset.copied);
    assert_eq!(std::fs::read(&asset.destination).unwrap(), vec![0x89, b'P', b'N', b'G']);

    let name = asset.destination.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("guide-img-"), "{name}");
    assert!(name.ends_with("-a.png"), "{name}");
    assert_eq!(asset.destination, tmp.path().join("out/assets").join(&name));
    assert!(text.contains(&format!("![diagram](assets/{name})")));

    // Same input, same name.
    let (again, _) = consolidate(&docs, &tmp.path().join("out/again.md")).await;
    assert_eq!(again.assets[0].destination, asset.destination);
}

#[tokio::test]
async fn reruns_are_byte_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(&docs, "README.md", "---\ntitle: Project\n---\n\nIntro with [setup](guide/setup.md#install).\n");
    write(&docs, "guide/setup.md", "# Setup\n\n## Install\n\n```sh\ncargo install docs2md\n```\n");
    write(&docs, "guide/usage.mdx", "import X from './x';\n\n# Usage\n\n<Tip>Run it.</Tip>\n");

    let (first, a) = consolidate(&docs, &tmp.path().join("a.md")).await;
    let (_, b) = consolidate(&docs, &tmp.path().join("b.md")).await;

    assert_eq!(first.state, RunState::Done);
    assert_eq!(a, b);
    assert!(a.contains("Intro with [setup](#install)."));
}

#[tokio::test]
async fn fragment_links_prefer_owning_document() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(&docs, "a.md", "# A\n\n## Usage\n\nFirst usage.\n");
    write(&docs, "b.md", "# B\n\nJump to [usage](#usage).\n\n## Usage\n\nSecond usage.\n");

    let (manifest, text) = consolidate(&docs, &tmp.path().join("docs.md")).await;
    assert!(text.contains("Jump to [usage](#usage-1)."));
    assert!(manifest.unresolved.is_empty());
}

#[tokio::test]
async fn manifest_is_written_next_to_output() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(&docs, "a.md", "# A\n\n[gone](./missing.md)\n");

    let output = tmp.path().join("docs.md");
    let (manifest, _) = consolidate(&docs, &output).await;

    let path = tmp.path().join("docs.md.manifest.json");
    let stored: RunManifest = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(stored.run_id, manifest.run_id);
    assert_eq!(stored.unresolved.len(), 1);
    assert_eq!(stored.sources[0].status, SourceStatus::SucceededWithWarnings);
}

#[tokio::test]
async fn crawled_pages_link_to_each_other() {
    let start = Url::parse("https://docs.example.com/").unwrap();
    let home = r#"<html><head><title>Docs</title></head><body><main>
        <h1>Home</h1>
        <p>Read the <a href="/guide">guide</a> or the <a href="/missing">archive</a>.</p>
        </main></body></html>"#;
    let guide = r#"<html><head><title>Guide | Docs</title></head><body><main>
        <h1>Guide</h1><p>Back <a href="/">home</a>.</p>
        </main></body></html>"#;
    let source = MemorySource::site(start.clone())
        .with_page(start.clone(), 0, home)
        .with_page(start.join("guide").unwrap(), 1, guide);

    let engine = ConsolidationEngine::new(ConsolidateConfig {
        source_attribution: true,
        write_manifest: false,
        ..config(PathBuf::from("docs.md"))
    })
    .unwrap();
    let mut sink = MemorySink::new();
    let manifest = engine.run(source, &mut sink, &SilentProgress).await.unwrap();

    assert_eq!(manifest.state, RunState::Done);
    let text = sink.contents();
    assert!(text.contains("# Home\n\nSource: <https://docs.example.com/>\n"));
    assert!(text.contains("## Guide\n\nSource: <https://docs.example.com/guide>\n"));
    assert!(text.contains("[guide](#guide)"));
    assert!(text.contains("[archive](https://docs.example.com/missing)"));
    assert!(text.contains("[home](#home)"));
}

#[tokio::test]
async fn repository_subdir_reaches_assets_above_it() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    write(&repo, "img/logo.png", [1, 2, 3]);
    write(&repo, "docs/intro.md", "# Intro\n\n![a](/img/logo.png)\n\n![b](../img/logo.png)\n");

    let output = tmp.path().join("out/docs.md");
    let engine = ConsolidationEngine::new(config(output.clone())).unwrap();
    let source = RepositorySource::local(&repo, Some("docs"), WalkConfig::default()).unwrap();
    let mut sink = FileSink::new(&output);
    let manifest = engine.run(source, &mut sink, &SilentProgress).await.unwrap();

    assert_eq!(manifest.state, RunState::Done);
    assert!(manifest.unresolved.is_empty());
    assert_eq!(manifest.assets.len(), 1);
    assert!(manifest.assets[0].copied);
    assert_eq!(manifest.assets[0].source, repo.join("img/logo.png"));
    assert_eq!(std::fs::read(&manifest.assets[0].destination).unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn html_block_references_are_resolved() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(
        &docs,
        "guide/setup.md",
        "# Setup\n\n<p align=\"center\">\n<a href=\"./other.md\"><img src=\"./img/a.png\" width=\"80\"></a>\n</p>\n\n<img src=\"./img/gone.png\">\n",
    );
    write(&docs, "guide/other.md", "# Other\n\nText.\n");
    write(&docs, "guide/img/a.png", [7]);

    let engine = ConsolidationEngine::new(ConsolidateConfig {
        validate_references: true,
        ..config(tmp.path().join("out/docs.md"))
    })
    .unwrap();
    let source = DirectorySource::new(&docs, WalkConfig::default());
    let mut sink = FileSink::new(tmp.path().join("out/docs.md"));
    let manifest = engine.run(source, &mut sink, &SilentProgress).await.unwrap();
    let text = std::fs::read_to_string(tmp.path().join("out/docs.md")).unwrap();

    assert_eq!(manifest.assets.len(), 1);
    assert!(manifest.assets[0].copied);
    let name = manifest.assets[0].destination.file_name().unwrap().to_string_lossy().to_string();
    assert!(text.contains(&format!("<a href=\"#other\"><img src=\"assets/{name}\" width=\"80\"></a>")));

    assert_eq!(manifest.unresolved.len(), 1);
    assert_eq!(manifest.unresolved[0].target, "./img/gone.png");
    assert!(text.contains("<img src=\"./img/gone.png\">"));
    assert_eq!(manifest.state, RunState::PartiallyFailed);
}

#[tokio::test]
async fn linked_image_resolves_both_targets() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(&docs, "guide/a.md", "# A\n\nSee [![pic](./img/a.png)](./other.md) here.\n");
    write(&docs, "guide/other.md", "# Other\n\nText.\n");
    write(&docs, "guide/img/a.png", [1]);

    let (manifest, text) = consolidate(&docs, &tmp.path().join("out/docs.md")).await;

    assert_eq!(manifest.state, RunState::Done);
    assert!(manifest.unresolved.is_empty());
    let name = manifest.assets[0].destination.file_name().unwrap().to_string_lossy().to_string();
    assert!(text.contains(&format!("See [![pic](assets/{name})](#other) here.")));
}

#[tokio::test]
async fn unknown_fragment_is_kept_and_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = tmp.path().join("docs");
    write(&docs, "a.md", "# A\n\nSee [there](#nowhere) and [here](#a).\n");

    let (manifest, text) = consolidate(&docs, &tmp.path().join("docs.md")).await;

    assert!(text.contains("See [there](#nowhere) and [here](#a)."));
    assert_eq!(manifest.state, RunState::Done);
    assert_eq!(manifest.unresolved.len(), 1);
    assert_eq!(manifest.unresolved[0].target, "#nowhere");
    assert_eq!(manifest.unresolved[0].reason, UnresolvedReason::UnknownAnchor);
    assert_eq!(manifest.sources[0].status, SourceStatus::SucceededWithWarnings);
}
