use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::json;
use slidemark_core::{
    Deck, DeckError, DeckOptions, Engine, Feature, FileSource, ImportError, LineSpan,
    MemorySource, QueueStatus, ReparseOutcome, ReparseQueue, SlideError,
};

/// Counts reads per path so tests can see which files were re-read.
#[derive(Debug, Default)]
struct CountingSource {
    inner: Arc<MemorySource>,
    reads: Mutex<HashMap<PathBuf, usize>>,
}

impl CountingSource {
    fn new(inner: Arc<MemorySource>) -> Self {
        Self {
            inner,
            reads: Mutex::default(),
        }
    }

    fn reads(&self, path: &str) -> usize {
        self.reads
            .lock()
            .unwrap()
            .get(Path::new(path))
            .copied()
            .unwrap_or(0)
    }
}

impl FileSource for CountingSource {
    fn read(&self, path: &Path) -> io::Result<String> {
        *self.reads.lock().unwrap().entry(path.to_path_buf()).or_default() += 1;
        self.inner.read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }
}

fn parse(files: &[(&str, &str)]) -> Arc<Deck> {
    let source = files
        .iter()
        .fold(MemorySource::new(), |source, (path, text)| {
            source.with_file(path, *text)
        });
    Engine::new(source).parse("slides.md").unwrap()
}

fn contents(deck: &Deck) -> Vec<&str> {
    deck.slides.iter().map(|slide| slide.content.as_str()).collect()
}

fn outline(deck: &Deck) -> String {
    deck.slides
        .iter()
        .map(|slide| {
            format!(
                "{} {} {:?} {}:{}-{}{}",
                slide.index,
                slide.config.layout().unwrap_or("-"),
                slide.title.as_deref().unwrap_or(""),
                slide.source.file.display(),
                slide.source.span.start,
                slide.source.span.end,
                if slide.importers.is_empty() {
                    String::new()
                } else {
                    format!(" via {}", slide.importers.len())
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn headmatter_layout_stays_on_the_first_slide() {
    let deck = parse(&[("slides.md", "---\nlayout: cover\n---\n# A\n---\n# B")]);

    assert_eq!(contents(&deck), ["# A", "# B"]);
    assert_eq!(deck.slides[0].config.layout(), Some("cover"));
    assert_eq!(deck.slides[1].config.layout(), None);
    assert_eq!(deck.head.layout(), Some("cover"));
}

#[test]
fn slide_layout_overrides_headmatter() {
    let deck = parse(&[(
        "slides.md",
        "---\ntheme: seriph\nlayout: default\n---\n# A\n---\nlayout: cover\n---\n# B\n---\n# C",
    )]);

    assert_eq!(deck.slides[0].config.layout(), Some("default"));
    assert_eq!(deck.slides[1].config.layout(), Some("cover"));
    assert_eq!(deck.slides[2].config.layout(), None);
    for slide in &deck.slides {
        assert_eq!(slide.config.get("theme"), Some(&json!("seriph")));
    }
}

#[test]
fn headmatter_defaults_apply_to_every_slide() {
    let deck = parse(&[(
        "slides.md",
        "---\ndefaults:\n  transition: fade\n---\n# A\n---\ntransition: none\n---\n# B",
    )]);

    assert_eq!(deck.slides[0].config.get("transition"), Some(&json!("fade")));
    assert_eq!(deck.slides[1].config.get("transition"), Some(&json!("none")));
}

#[test]
fn single_position_import_keeps_source_provenance() {
    let deck = parse(&[
        ("slides.md", "# Cover\n---\nsrc: b.md:2\n---\n"),
        ("b.md", "# B1\n---\n# B2\n---\n# B3"),
    ]);

    assert_eq!(contents(&deck), ["# Cover", "# B2"]);
    let imported = &deck.slides[1];
    assert_eq!(imported.index, 1);
    assert_eq!(imported.source.file, Path::new("b.md"));
    assert_eq!(imported.source.span, LineSpan::new(2, 3));
    assert_eq!(imported.title.as_deref(), Some("B2"));
    assert_eq!(imported.importers.len(), 1);
    assert_eq!(imported.importers[0].file, Path::new("slides.md"));
    assert_eq!(imported.importers[0].span, LineSpan::new(1, 5));
}

#[test]
fn selections_follow_expression_order() {
    let deck = parse(&[
        (
            "slides.md",
            "# Intro\n---\nsrc: five.md:1-2,4\n---\n\n---\nsrc: five.md:3-\n---\n",
        ),
        ("five.md", "# S1\n---\n# S2\n---\n# S3\n---\n# S4\n---\n# S5"),
    ]);

    assert_eq!(
        contents(&deck),
        ["# Intro", "# S1", "# S2", "# S4", "# S3", "# S4", "# S5"]
    );
    let indices: Vec<_> = deck.slides.iter().map(|slide| slide.index).collect();
    assert_eq!(indices, [0, 1, 2, 3, 4, 5, 6]);
}

#[test]
fn importer_keys_override_imported_frontmatter() {
    let deck = parse(&[
        ("slides.md", "# Intro\n---\nsrc: b.md\nclass: dark\n---\n"),
        ("b.md", "---\nlayout: two-cols\n---\n# B1\n---\n# B2"),
    ]);

    assert_eq!(deck.slides[1].config.layout(), Some("two-cols"));
    assert_eq!(deck.slides[1].config.class(), Some("dark"));
    assert_eq!(deck.slides[2].config.layout(), None);
    assert_eq!(deck.slides[2].config.class(), Some("dark"));
    assert!(deck.slides[1].config.src().is_none());
}

#[test]
fn nested_imports_record_every_importer() {
    let deck = parse(&[
        ("slides.md", "# Root\n---\nsrc: ./parts/a.md\n---\n"),
        ("parts/a.md", "# A\n---\nsrc: ../shared/b.md\n---\n"),
        ("shared/b.md", "# B"),
    ]);

    assert_eq!(contents(&deck), ["# Root", "# A", "# B"]);
    let nested = &deck.slides[2];
    let chain: Vec<_> = nested.importers.iter().map(|p| p.file.as_path()).collect();
    assert_eq!(chain, [Path::new("slides.md"), Path::new("parts/a.md")]);
    assert!(deck.depends_on(Path::new("shared/b.md")));
}

#[test]
fn direct_self_import_is_a_cycle() {
    let source = MemorySource::new().with_file("slides.md", "# A\n---\nsrc: slides.md\n---\n");
    let cycle = match Engine::new(source).parse("slides.md") {
        Err(DeckError::Cycle(cycle)) => cycle,
        other => panic!("expected a cycle, got {other:?}"),
    };
    assert_eq!(
        cycle.chain,
        [PathBuf::from("slides.md"), PathBuf::from("slides.md")]
    );
}

#[test]
fn indirect_self_import_names_the_cycle() {
    let source = MemorySource::new()
        .with_file("slides.md", "# A\n---\nsrc: b.md\n---\n")
        .with_file("b.md", "# B\n---\nsrc: slides.md\n---\n");
    let err = Engine::new(source).parse("slides.md").unwrap_err();
    assert_eq!(
        err.to_string(),
        "import cycle detected: slides.md -> b.md -> slides.md"
    );
}

#[test]
fn repeated_import_without_cycle_is_allowed() {
    let deck = parse(&[
        ("slides.md", "---\nsrc: b.md\n---\n\n---\nsrc: b.md\n---\n"),
        ("b.md", "# B"),
    ]);
    assert_eq!(contents(&deck), ["# B", "# B"]);
}

#[test]
fn missing_import_becomes_a_placeholder() {
    let deck = parse(&[("slides.md", "# A\n---\nsrc: gone.md\n---\n\n---\n# C")]);

    assert_eq!(deck.len(), 3);
    let placeholder = &deck.slides[1];
    assert!(placeholder.is_placeholder());
    assert!(placeholder.content.is_empty());
    assert_eq!(placeholder.source.file, Path::new("slides.md"));
    assert!(matches!(
        placeholder.broken_import,
        Some(ImportError::NotFound { ref resolved, .. }) if resolved == Path::new("gone.md")
    ));

    assert_eq!(deck.diagnostics.errors.len(), 1);
    let diagnostic = &deck.diagnostics.errors[0];
    assert!(matches!(diagnostic.error, SlideError::Import(_)));
    assert_eq!(diagnostic.location.line, 3);
    assert!(deck.files.contains(Path::new("gone.md")));
}

#[test]
fn out_of_range_selection_becomes_a_placeholder() {
    let deck = parse(&[
        ("slides.md", "# A\n---\nsrc: b.md:4\n---\n"),
        ("b.md", "# B1\n---\n# B2"),
    ]);

    assert_eq!(deck.len(), 2);
    assert!(matches!(
        deck.slides[1].broken_import,
        Some(ImportError::Range { ref selection, .. }) if selection == "4"
    ));
}

#[test]
fn bad_frontmatter_is_reported_and_parsing_continues() {
    let deck = parse(&[("slides.md", "# A\n---\nlayout: [cover\n---\n# B")]);

    assert_eq!(contents(&deck), ["# A", "# B"]);
    assert!(deck.slides[1].config.is_empty());
    assert_eq!(deck.diagnostics.errors.len(), 1);
    let diagnostic = &deck.diagnostics.errors[0];
    assert!(matches!(diagnostic.error, SlideError::Config(_)));
    assert_eq!(diagnostic.location.file.as_deref(), Some(Path::new("slides.md")));
    assert!(diagnostic.location.line >= 3);
}

#[test]
fn unclosed_fence_is_a_warning() {
    let deck = parse(&[("slides.md", "# A\n\n```js\nconst a = 1;\n---\n# still code")]);

    assert_eq!(deck.len(), 1);
    assert_eq!(deck.diagnostics.warnings.len(), 1);
    assert_eq!(deck.diagnostics.warnings[0].location().line, 3);
}

#[test]
fn hidden_slides_stay_and_disabled_slides_go() {
    let deck = parse(&[(
        "slides.md",
        "# A\n---\nhide: true\n---\n# B\n---\ndisabled: true\n---\n# C\n---\n# D",
    )]);

    assert_eq!(contents(&deck), ["# A", "# B", "# D"]);
    assert!(deck.slides[1].is_hidden());
    assert_eq!(deck.slides[2].index, 2);
}

#[test]
fn deck_features_are_the_union_of_slides() {
    let deck = parse(&[(
        "slides.md",
        "# Math\n\n$$\nE = mc^2\n$$\n---\n```mermaid\ngraph TD\n  A --> B\n```\n---\n<Tweet id=\"20\" />\n",
    )]);

    assert!(deck.slides[0].features.contains(&Feature::Math));
    assert!(deck.slides[1].features.contains(&Feature::Mermaid));
    assert!(deck.slides[2].features.contains(&Feature::Tweet));
    assert_eq!(deck.features.len(), 3);
}

#[test]
fn custom_markers_come_from_options() {
    let mut options = DeckOptions::new();
    let rule = serde_json::from_value(json!({ "feature": "youtube", "pattern": "<Youtube\\b" }));
    options.markers.push(rule.unwrap());
    let source = MemorySource::new().with_file("slides.md", "<Youtube id=\"x\" />");
    let deck = Engine::with_options(source, options)
        .unwrap()
        .parse("slides.md")
        .unwrap();

    assert!(deck.features.contains(&Feature::Custom("youtube".into())));
}

#[test]
fn notes_title_and_level() {
    let deck = parse(&[(
        "slides.md",
        "# Welcome\n\nHello\n\n<!-- greet everyone -->\n---\ntitle: Agenda\nlevel: 3\n---\n## Plan",
    )]);

    let first = &deck.slides[0];
    assert_eq!(first.note.as_deref(), Some("greet everyone"));
    assert_eq!(first.content, "# Welcome\n\nHello");
    assert_eq!(first.title.as_deref(), Some("Welcome"));
    assert_eq!(first.level, Some(1));

    let second = &deck.slides[1];
    assert_eq!(second.title.as_deref(), Some("Agenda"));
    assert_eq!(second.level, Some(3));
}

#[test]
fn slide_at_maps_lines_back_to_slides() {
    let deck = parse(&[("slides.md", "# A\n---\n# B\n\ntext\n---\n# C")]);

    assert_eq!(deck.slide_at(Path::new("slides.md"), 3).map(|s| s.index), Some(1));
    assert_eq!(deck.slide_at(Path::new("slides.md"), 6).map(|s| s.index), Some(2));
    assert!(deck.slide_at(Path::new("other.md"), 0).is_none());
}

#[test]
fn deck_serializes_in_camel_case() {
    let deck = parse(&[("slides.md", "# A")]);
    let value = serde_json::to_value(&*deck).unwrap();

    assert_eq!(value["slides"][0]["source"]["contentStart"], json!(0));
    assert!(value["slides"][0]["brokenImport"].is_null());
    assert_eq!(value["root"], json!("slides.md"));
}

#[test]
fn deck_outline() {
    let deck = parse(&[
        (
            "slides.md",
            "---\nlayout: cover\n---\n# Welcome\n---\nsrc: parts/intro.md\n---\n\n---\nlayout: end\n---\n# Thanks",
        ),
        ("parts/intro.md", "# Why\n---\nlayout: two-cols\n---\n# How"),
    ]);

    insta::assert_snapshot!(outline(&deck), @r#"
    0 cover "Welcome" slides.md:0-4
    1 - "Why" parts/intro.md:0-1 via 1
    2 two-cols "How" parts/intro.md:1-5 via 1
    3 end "Thanks" slides.md:8-12
    "#);
}

#[test]
fn disjoint_reparse_is_no_change() {
    let source = Arc::new(MemorySource::new().with_file("slides.md", "# A"));
    let mut engine = Engine::new(Arc::clone(&source));
    let first = engine.parse("slides.md").unwrap();

    source.insert("notes.md", "unrelated");
    let outcome = engine.reparse(["notes.md"]).unwrap();
    assert!(matches!(outcome, ReparseOutcome::NoChange));
    assert!(Arc::ptr_eq(engine.deck().unwrap(), &first));
}

#[test]
fn identical_bytes_are_no_change() {
    let source = Arc::new(MemorySource::new().with_file("slides.md", "# A\n---\n# B"));
    let mut engine = Engine::new(Arc::clone(&source));
    let first = engine.parse("slides.md").unwrap();

    source.insert("slides.md", "# A\n---\n# B");
    let outcome = engine.reparse(["slides.md"]).unwrap();
    assert!(matches!(outcome, ReparseOutcome::NoChange));
    assert!(Arc::ptr_eq(engine.deck().unwrap(), &first));
}

#[test]
fn reparse_only_rereads_invalidated_files() {
    let files = Arc::new(
        MemorySource::new()
            .with_file("slides.md", "# Root\n---\nsrc: a.md\n---\n\n---\nsrc: b.md\n---\n")
            .with_file("a.md", "# A")
            .with_file("b.md", "# B"),
    );
    let source = Arc::new(CountingSource::new(Arc::clone(&files)));
    let mut engine = Engine::new(Arc::clone(&source));
    engine.parse("slides.md").unwrap();
    assert_eq!(
        (source.reads("slides.md"), source.reads("a.md"), source.reads("b.md")),
        (1, 1, 1)
    );

    files.insert("b.md", "# B2");
    let outcome = engine.reparse(["b.md"]).unwrap();
    let deck = outcome.deck().unwrap();
    assert_eq!(contents(deck), ["# Root", "# A", "# B2"]);
    // b.md once for its fingerprint, the root because it imports b.md.
    assert_eq!(
        (source.reads("slides.md"), source.reads("a.md"), source.reads("b.md")),
        (2, 1, 2)
    );
}

#[test]
fn reparse_matches_a_fresh_parse() {
    let files = Arc::new(
        MemorySource::new()
            .with_file("slides.md", "---\ntheme: x\n---\n# Root\n---\nsrc: a.md:2\n---\n")
            .with_file("a.md", "# A1\n---\n# A2"),
    );
    let mut engine = Engine::new(Arc::clone(&files));
    engine.parse("slides.md").unwrap();

    files.insert("a.md", "# A1\n---\nlayout: center\n---\n# A2 changed");
    let updated = engine.reparse(["a.md"]).unwrap();
    let fresh = Engine::new(Arc::clone(&files)).parse("slides.md").unwrap();
    assert_eq!(**updated.deck().unwrap(), *fresh);
}

#[test]
fn deleted_import_is_evicted_and_restored() {
    let files = Arc::new(
        MemorySource::new()
            .with_file("slides.md", "# Root\n---\nsrc: b.md\n---\n")
            .with_file("b.md", "# B"),
    );
    let mut engine = Engine::new(Arc::clone(&files));
    engine.parse("slides.md").unwrap();
    assert!(engine.cache().contains(Path::new("b.md")));

    files.remove("b.md");
    let outcome = engine.reparse(["b.md"]).unwrap();
    let deck = outcome.deck().unwrap();
    assert!(deck.slides[1].is_placeholder());
    assert!(!engine.cache().contains(Path::new("b.md")));

    files.insert("b.md", "# B again");
    let outcome = engine.reparse(["b.md"]).unwrap();
    let deck = outcome.deck().unwrap();
    assert_eq!(contents(deck), ["# Root", "# B again"]);
    assert!(deck.diagnostics.errors.is_empty());
}

#[test]
fn dropped_import_leaves_the_cache() {
    let files = Arc::new(
        MemorySource::new()
            .with_file("slides.md", "# Root\n---\nsrc: b.md\n---\n")
            .with_file("b.md", "# B"),
    );
    let mut engine = Engine::new(Arc::clone(&files));
    engine.parse("slides.md").unwrap();

    files.insert("slides.md", "# Root only");
    let outcome = engine.reparse(["slides.md"]).unwrap();
    assert_eq!(outcome.deck().unwrap().len(), 1);
    assert!(!engine.cache().contains(Path::new("b.md")));
    assert!(engine.cache().dependents(Path::new("b.md")).is_empty());
}

#[test]
fn failed_reparse_keeps_the_previous_deck() {
    let files = Arc::new(
        MemorySource::new()
            .with_file("slides.md", "# Root\n---\nsrc: b.md\n---\n")
            .with_file("b.md", "# B"),
    );
    let mut engine = Engine::new(Arc::clone(&files));
    let first = engine.parse("slides.md").unwrap();

    files.insert("b.md", "# B\n---\nsrc: slides.md\n---\n");
    let err = engine.reparse(["b.md"]).unwrap_err();
    assert!(matches!(err, DeckError::Cycle(_)));
    assert!(Arc::ptr_eq(engine.deck().unwrap(), &first));

    // Still pending: fixing the file alone is enough to recover.
    files.insert("b.md", "# B fixed");
    let outcome = engine.reparse(Vec::<PathBuf>::new()).unwrap();
    assert_eq!(contents(outcome.deck().unwrap()), ["# Root", "# B fixed"]);
}

#[test]
fn sequential_options_build_the_same_deck() {
    let files = Arc::new(
        MemorySource::new()
            .with_file("slides.md", "---\nsrc: a.md\n---\n\n---\nsrc: b.md\n---\n\n---\nsrc: c.md\n---\n")
            .with_file("a.md", "# A\n---\n# A2")
            .with_file("b.md", "# B")
            .with_file("c.md", "# C\n---\nsrc: b.md\n---\n"),
    );
    let parallel = Engine::new(Arc::clone(&files)).parse("slides.md").unwrap();
    let sequential = Engine::with_options(Arc::clone(&files), DeckOptions::sequential())
        .unwrap()
        .parse("slides.md")
        .unwrap();

    assert_eq!(*parallel, *sequential);
    assert_eq!(contents(&parallel), ["# A", "# A2", "# B", "# C", "# B"]);
}

#[test]
fn queue_coalesces_concurrent_changes() {
    let files = Arc::new(
        MemorySource::new()
            .with_file("slides.md", "# Root\n---\nsrc: a.md\n---\n\n---\nsrc: b.md\n---\n")
            .with_file("a.md", "# A")
            .with_file("b.md", "# B"),
    );
    let mut engine = Engine::new(Arc::clone(&files));
    engine.parse("slides.md").unwrap();
    let queue = Arc::new(ReparseQueue::new(engine));

    let handles: Vec<_> = [("a.md", "# A2"), ("b.md", "# B2")]
        .into_iter()
        .map(|(path, text)| {
            let files = Arc::clone(&files);
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                files.insert(path, text);
                queue.submit([path]).unwrap()
            })
        })
        .collect();
    let statuses: Vec<QueueStatus> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert!(
        statuses
            .iter()
            .any(|status| matches!(status, QueueStatus::Processed(_)))
    );
    assert!(queue.pending().is_empty());
    assert_eq!(contents(&queue.deck().unwrap()), ["# Root", "# A2", "# B2"]);
}

#[test]
fn headmatter_with_leading_comment_or_blank_line() {
    for text in [
        "---\n# deck settings\ntheme: seriph\n---\n# Hello",
        "---\n\ntheme: seriph\n---\n# Hello",
    ] {
        let deck = parse(&[("slides.md", text)]);
        assert_eq!(contents(&deck), ["# Hello"], "{text:?}");
        assert_eq!(deck.head.get("theme"), Some(&json!("seriph")));
        assert_eq!(deck.slides[0].config.get("theme"), Some(&json!("seriph")));
    }
}

#[test]
fn non_string_src_becomes_a_placeholder() {
    let deck = parse(&[("slides.md", "# A\n---\nsrc: [a.md, b.md]\n---\n")]);

    assert_eq!(deck.len(), 2);
    assert!(matches!(
        deck.slides[1].broken_import,
        Some(ImportError::NotFound { ref reason, .. }) if reason.contains("string")
    ));
    assert_eq!(deck.diagnostics.errors.len(), 1);
}

#[test]
fn malformed_selection_names_the_imported_file() {
    let deck = parse(&[
        ("slides.md", "# A\n---\nsrc: b.md:2-1\n---\n"),
        ("b.md", "# B1\n---\n# B2"),
    ]);

    assert_eq!(deck.len(), 2);
    assert!(matches!(
        deck.slides[1].broken_import,
        Some(ImportError::Range { ref selection, ref target, .. })
            if selection == "2-1" && target == Path::new("b.md")
    ));
    assert!(matches!(deck.diagnostics.errors[0].error, SlideError::Import(_)));
}

#[test]
fn new_sibling_takes_over_a_package_import() {
    let files = Arc::new(
        MemorySource::new()
            .with_file("deck/slides.md", "# Root\n---\nsrc: intro.md\n---\n")
            .with_file("node_modules/intro.md", "# Package intro"),
    );
    let mut engine = Engine::new(Arc::clone(&files));
    let first = engine.parse("deck/slides.md").unwrap();
    assert_eq!(first.slides[1].content, "# Package intro");
    assert!(first.depends_on(Path::new("deck/intro.md")));

    files.insert("deck/intro.md", "# Local intro");
    let outcome = engine.reparse(["deck/intro.md"]).unwrap();
    let incremental = outcome.deck().unwrap();
    let fresh = Engine::new(Arc::clone(&files)).parse("deck/slides.md").unwrap();

    assert_eq!(incremental.slides[1].content, "# Local intro");
    assert_eq!(**incremental, *fresh);
}
