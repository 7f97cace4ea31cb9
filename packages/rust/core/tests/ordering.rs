//! Ordering and completeness properties over generated source trees.

use std::collections::BTreeSet;
use std::path::PathBuf;

use proptest::prelude::*;
use url::Url;

use docs2md_core::{ConsolidationEngine, MemorySink, SilentProgress};
use docs2md_discovery::{DiscoverySource, MemorySource};
use docs2md_markdown::is_index_name;
use docs2md_shared::{ConsolidateConfig, RunManifest, RunState};

fn config() -> ConsolidateConfig {
    ConsolidateConfig {
        output: PathBuf::from("docs.md"),
        assets_dir: "assets".into(),
        concurrency: 3,
        base_heading_level: 1,
        toc_title: Some("Contents".into()),
        toc_include_sections: false,
        toc_max_level: 3,
        source_attribution: false,
        write_manifest: false,
        validate_references: false,
    }
}

fn consolidate<S: DiscoverySource>(source: S) -> (RunManifest, String) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let engine = ConsolidationEngine::new(config()).unwrap();
        let mut sink = MemorySink::new();
        let manifest = engine.run(source, &mut sink, &SilentProgress).await.unwrap();
        (manifest, sink.contents().to_string())
    })
}

/// Distinct relative paths up to two folders deep.
fn file_paths() -> impl Strategy<Value = Vec<String>> {
    let dir = prop::sample::select(vec!["a", "b", "c"]);
    let name = prop::sample::select(vec!["index", "README", "alpha", "Beta", "gamma", "a", "b"]);
    let path = (prop::collection::vec(dir, 0..3), name)
        .prop_map(|(dirs, name)| {
            let mut parts: Vec<String> = dirs.into_iter().map(String::from).collect();
            parts.push(format!("{name}.md"));
            parts.join("/")
        });
    prop::collection::btree_set(path, 1..12)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

fn file_body(i: usize) -> String {
    format!("# T{i}\n\nmarker-{i}.\n\n## Part {i}.\n\nbody-{i}.\n")
}

/// Output position of each document's marker, indexed like `paths`.
fn positions(text: &str, count: usize) -> Vec<usize> {
    (0..count)
        .map(|i| text.find(&format!("marker-{i}.")).expect("marker present"))
        .collect()
}

fn folders(path: &str) -> Vec<String> {
    let parts: Vec<&str> = path.split('/').collect();
    (1..parts.len()).map(|n| parts[..n].join("/")).collect()
}

fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_block_of_every_file_is_emitted_once(paths in file_paths()) {
        let source = paths
            .iter()
            .enumerate()
            .fold(MemorySource::directory("/docs"), |s, (i, p)| s.with_file(p, file_body(i)));
        let (manifest, text) = consolidate(source);

        prop_assert_eq!(manifest.state, RunState::Done);
        prop_assert_eq!(manifest.succeeded, paths.len());
        for i in 0..paths.len() {
            prop_assert_eq!(text.matches(&format!("marker-{i}.")).count(), 1);
            prop_assert_eq!(text.matches(&format!("body-{i}.")).count(), 1);
            prop_assert_eq!(text.matches(&format!("Part {i}.")).count(), 1);
        }
    }

    #[test]
    fn folders_are_contiguous_and_led_by_their_index(paths in file_paths()) {
        let source = paths
            .iter()
            .enumerate()
            .fold(MemorySource::directory("/docs"), |s, (i, p)| s.with_file(p, file_body(i)));
        let (_, text) = consolidate(source);
        let pos = positions(&text, paths.len());

        let mut order: Vec<usize> = (0..paths.len()).collect();
        order.sort_by_key(|&i| pos[i]);
        let rank: Vec<usize> = {
            let mut rank = vec![0; paths.len()];
            for (r, &i) in order.iter().enumerate() {
                rank[i] = r;
            }
            rank
        };

        let all_folders: BTreeSet<String> = paths.iter().flat_map(|p| folders(p)).collect();
        for folder in &all_folders {
            let prefix = format!("{folder}/");
            let inside: Vec<usize> = (0..paths.len())
                .filter(|&i| paths[i].starts_with(&prefix))
                .map(|i| rank[i])
                .collect();
            let (lo, hi) = (*inside.iter().min().unwrap(), *inside.iter().max().unwrap());
            prop_assert_eq!(hi - lo + 1, inside.len(), "{} is split", folder);
        }

        for (a, path_a) in paths.iter().enumerate() {
            if !is_index_name(file_name(path_a)) {
                continue;
            }
            let dir = parent(path_a);
            for (b, path_b) in paths.iter().enumerate() {
                let below = if dir.is_empty() { true } else { path_b.starts_with(&format!("{dir}/")) };
                if a != b && below && !is_index_name(file_name(path_b)) {
                    prop_assert!(rank[a] < rank[b], "{} after {}", path_a, path_b);
                }
            }
        }
    }

    #[test]
    fn discovery_order_does_not_change_output(paths in file_paths(), seed in any::<u64>()) {
        let bodies: Vec<(String, String)> = paths
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), file_body(i)))
            .collect();
        let mut rotated = bodies.clone();
        rotated.rotate_left(seed as usize % bodies.len());

        let build = |docs: &[(String, String)]| {
            docs.iter()
                .fold(MemorySource::directory("/docs"), |s, (p, body)| s.with_file(p, body.clone()))
        };
        let (_, first) = consolidate(build(&bodies));
        let (_, second) = consolidate(build(&rotated));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn pages_follow_depth_then_discovery(depths in prop::collection::vec(0u32..4, 1..12)) {
        let start = Url::parse("https://docs.example.com/").unwrap();
        let source = depths.iter().enumerate().fold(MemorySource::site(start.clone()), |s, (i, depth)| {
            let url = start.join(&format!("p{i}")).unwrap();
            let html = format!("<html><body><main><h1>P{i}</h1><p>marker-{i}.</p></main></body></html>");
            s.with_page(url, *depth, html)
        });
        let (manifest, text) = consolidate(source);
        prop_assert_eq!(manifest.succeeded, depths.len());

        let pos = positions(&text, depths.len());
        for a in 0..depths.len() {
            for b in a + 1..depths.len() {
                if depths[a] <= depths[b] {
                    prop_assert!(pos[a] < pos[b], "p{} should precede p{}", a, b);
                } else {
                    prop_assert!(pos[b] < pos[a], "p{} should precede p{}", b, a);
                }
            }
        }
    }
}
