//! End to end runs over scratch directory trees

use chrono::{NaiveDate, NaiveDateTime};
use phockup::summary::{EXIT_FILE_ERRORS, EXIT_OK};
use phockup::ErrorKind;
use phockup::{
    Config, ExtractedTime, FileOperation, Outcome, Processor, TimeExtractor, TimeResolver,
    TimeSource,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Reports the same capture time for every file
struct Fixed(NaiveDateTime);

impl TimeExtractor for Fixed {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn extract(&self, _path: &Path) -> Option<ExtractedTime> {
        Some(ExtractedTime::new(self.0, TimeSource::Exif))
    }
}

fn april_7() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 4, 7)
        .unwrap()
        .and_hms_opt(10, 15, 0)
        .unwrap()
}

fn fixed() -> TimeResolver {
    TimeResolver::new(vec![Box::new(Fixed(april_7()))])
}

fn no_time() -> TimeResolver {
    TimeResolver::new(vec![])
}

struct Scratch {
    _dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Scratch {
    fn new(files: &[(&str, &[u8])]) -> Self {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        for (name, content) in files {
            let path = input.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        fs::create_dir_all(&input).unwrap();
        Self {
            _dir: dir,
            input,
            output,
        }
    }

    fn config(&self) -> Config {
        Config {
            input_paths: vec![self.input.clone()],
            output_dir: self.output.clone(),
            threads: 4,
            ..Config::default()
        }
    }
}

/// Relative path -> content of every file below `root`
fn tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    if !root.exists() {
        return BTreeMap::new();
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_path_buf();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

#[test]
fn test_capture_time_names_destination() {
    let scratch = Scratch::new(&[("IMG_0001.JPG", b"photo")]);
    let summary = Processor::with_resolver(scratch.config(), fixed())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.counts.copied, 1);
    assert_eq!(summary.exit_code(), EXIT_OK);
    assert_eq!(
        fs::read(scratch.output.join("2023/04/07/20230407-101500.jpg")).unwrap(),
        b"photo"
    );
    assert!(scratch.input.join("IMG_0001.JPG").exists());
    assert_eq!(summary.results[0].time_source, Some(TimeSource::Exif));
}

#[test]
fn test_unknown_time_keeps_original_name() {
    let scratch = Scratch::new(&[("IMG_1234.jpg", b"no metadata")]);
    let summary = Processor::with_resolver(scratch.config(), no_time())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.counts.copied, 1);
    assert!(scratch.output.join("unknown/IMG_1234.jpg").is_file());
    assert_eq!(summary.results[0].time_source, None);
}

#[test]
fn test_second_distinct_file_gets_counter() {
    let scratch = Scratch::new(&[("a.jpg", b"first"), ("b.jpg", b"second")]);
    Processor::with_resolver(scratch.config(), fixed())
        .unwrap()
        .run()
        .unwrap();

    let day = scratch.output.join("2023/04/07");
    assert_eq!(fs::read(day.join("20230407-101500.jpg")).unwrap(), b"first");
    assert_eq!(fs::read(day.join("20230407-101500-1.jpg")).unwrap(), b"second");
}

#[test]
fn test_identical_content_is_stored_once() {
    let scratch = Scratch::new(&[("a.jpg", b"same"), ("copy/a.jpg", b"same")]);
    let summary = Processor::with_resolver(scratch.config(), fixed())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.counts.copied, 1);
    assert_eq!(summary.counts.skipped_duplicate, 1);
    assert_eq!(tree(&scratch.output).len(), 1);
}

#[test]
fn test_rerun_is_idempotent() {
    let scratch = Scratch::new(&[
        ("a.jpg", b"one"),
        ("b.jpg", b"two"),
        ("c.mov", b"three"),
        ("nested/d.jpg", b"four"),
    ]);

    let first = Processor::with_resolver(scratch.config(), fixed())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(first.counts.copied, 4);
    let before = tree(&scratch.output);

    let second = Processor::with_resolver(scratch.config(), fixed())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(second.counts.skipped_duplicate, 4);
    assert_eq!(second.counts.placed(), 0);
    assert_eq!(tree(&scratch.output), before);
}

#[test]
fn test_move_loses_no_data() {
    let files: &[(&str, &[u8])] = &[
        ("a.jpg", b"alpha"),
        ("b.jpg", b"beta"),
        ("c.jpg", b"alpha"),
        ("sub/d.png", b"delta"),
    ];
    let scratch = Scratch::new(files);
    let mut config = scratch.config();
    config.operation = FileOperation::Move;

    let summary = Processor::with_resolver(config, fixed()).unwrap().run().unwrap();
    assert_eq!(summary.exit_code(), EXIT_OK);
    assert_eq!(summary.counts.moved, 3);
    assert_eq!(summary.counts.skipped_duplicate, 1);

    // Every original content exists in the destination, and a source is only
    // gone if its bytes were placed
    let placed: Vec<Vec<u8>> = tree(&scratch.output).into_values().collect();
    for (name, content) in files {
        assert!(placed.iter().any(|p| p == content), "{name} lost");
    }
    for result in &summary.results {
        match result.outcome {
            Outcome::Moved => assert!(!result.source.exists()),
            Outcome::SkippedDuplicate => assert!(result.source.exists()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

#[test]
fn test_dry_run_touches_nothing() {
    let scratch = Scratch::new(&[("a.jpg", b"one"), ("b.jpg", b"two")]);
    let mut config = scratch.config();
    config.dry_run = true;
    config.operation = FileOperation::Move;
    let input_before = tree(&scratch.input);

    let summary = Processor::with_resolver(config, fixed()).unwrap().run().unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.counts.moved, 2);
    assert!(!scratch.output.exists());
    assert_eq!(tree(&scratch.input), input_before);
    let destinations: Vec<_> = summary
        .results
        .iter()
        .map(|r| r.destination.clone().unwrap())
        .collect();
    assert_eq!(
        destinations,
        vec![
            scratch.output.join("2023/04/07/20230407-101500.jpg"),
            scratch.output.join("2023/04/07/20230407-101500-1.jpg"),
        ]
    );
}

#[test]
fn test_result_independent_of_thread_count() {
    let files: &[(&str, &[u8])] = &[
        ("z.jpg", b"1"),
        ("y.jpg", b"22"),
        ("x/w.jpg", b"333"),
        ("v.jpg", b"4444"),
        ("u.jpg", b"55555"),
    ];

    let run = |threads: usize| {
        let scratch = Scratch::new(files);
        let mut config = scratch.config();
        config.threads = threads;
        Processor::with_resolver(config, fixed()).unwrap().run().unwrap();
        tree(&scratch.output)
    };

    let single = run(1);
    assert_eq!(single.len(), files.len());
    for _ in 0..3 {
        assert_eq!(run(8), single);
    }
}

#[test]
fn test_existing_different_file_is_never_overwritten() {
    let scratch = Scratch::new(&[("a.jpg", b"new photo")]);
    let day = scratch.output.join("2023/04/07");
    fs::create_dir_all(&day).unwrap();
    fs::write(day.join("20230407-101500.jpg"), b"old photo").unwrap();

    Processor::with_resolver(scratch.config(), fixed())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(fs::read(day.join("20230407-101500.jpg")).unwrap(), b"old photo");
    assert_eq!(fs::read(day.join("20230407-101500-1.jpg")).unwrap(), b"new photo");
}

#[test]
fn test_exhausted_names_fail_only_that_file() {
    let scratch = Scratch::new(&[("a.jpg", b"a"), ("b.jpg", b"b"), ("c.jpg", b"c")]);
    let mut config = scratch.config();
    config.max_disambiguation_attempts = 1;

    let summary = Processor::with_resolver(config, fixed()).unwrap().run().unwrap();

    assert_eq!(summary.counts.copied, 2);
    assert_eq!(summary.counts.skipped_error, 1);
    assert_eq!(summary.exit_code(), EXIT_FILE_ERRORS);
    assert_eq!(summary.errors[0].source, scratch.input.join("c.jpg"));
}

#[test]
fn test_exclusions_and_sidecars() {
    let scratch = Scratch::new(&[
        ("IMG_1.jpg", b"photo"),
        ("IMG_1.xmp", b"<xmp/>"),
        ("skip.png", b"excluded"),
        (".DS_Store", b"junk"),
    ]);
    let mut config = scratch.config();
    config.exclude = vec!["*.png".into()];

    let summary = Processor::with_resolver(config, fixed()).unwrap().run().unwrap();

    assert_eq!(summary.counts.total(), 1);
    let output = tree(&scratch.output);
    assert_eq!(
        output.keys().cloned().collect::<Vec<_>>(),
        vec![
            PathBuf::from("2023/04/07/20230407-101500.jpg"),
            PathBuf::from("2023/04/07/20230407-101500.xmp"),
        ]
    );
}

#[test]
fn test_original_names_and_custom_layout() {
    let scratch = Scratch::new(&[("Holiday.JPG", b"beach")]);
    let mut config = scratch.config();
    config.original_names = true;
    config.dir_format = "%Y/%m-%b".into();

    Processor::with_resolver(config, fixed()).unwrap().run().unwrap();
    assert!(scratch.output.join("2023/04-Apr/Holiday.JPG").is_file());
}

#[test]
fn test_link_mode() {
    let scratch = Scratch::new(&[("a.jpg", b"linked")]);
    let mut config = scratch.config();
    config.operation = FileOperation::Link;

    let summary = Processor::with_resolver(config, fixed()).unwrap().run().unwrap();
    assert_eq!(summary.counts.linked, 1);
    assert!(scratch.input.join("a.jpg").exists());
    assert_eq!(
        fs::read(scratch.output.join("2023/04/07/20230407-101500.jpg")).unwrap(),
        b"linked"
    );
}

#[test]
fn test_duplicate_of_failed_file_is_an_error() {
    let scratch = Scratch::new(&[("a.jpg", b"same"), ("b.jpg", b"same")]);
    // A regular file where the day directory should go makes every write fail
    fs::create_dir_all(scratch.output.join("2023/04")).unwrap();
    fs::write(scratch.output.join("2023/04/07"), b"in the way").unwrap();

    let summary = Processor::with_resolver(scratch.config(), fixed())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.counts.skipped_duplicate, 0);
    assert_eq!(summary.counts.skipped_error, 2);
    assert_eq!(summary.exit_code(), EXIT_FILE_ERRORS);
    let b = &summary.errors[1];
    assert_eq!(b.source, scratch.input.join("b.jpg"));
    assert_eq!(b.kind, ErrorKind::DestinationWriteFailed);
    assert!(b.message.contains("a.jpg"), "{}", b.message);
}

#[test]
fn test_sidecars_of_same_named_files_both_arrive() {
    let scratch = Scratch::new(&[
        ("x.jpg", b"jpeg"),
        ("x.png", b"png"),
        ("x.jpg.xmp", b"<for jpg/>"),
        ("x.png.xmp", b"<for png/>"),
        ("x.xmp", b"<shared/>"),
    ]);

    let summary = Processor::with_resolver(scratch.config(), fixed())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(summary.counts.copied, 2);

    let day = scratch.output.join("2023/04/07");
    assert_eq!(fs::read(day.join("20230407-101500.jpg.xmp")).unwrap(), b"<for jpg/>");
    assert_eq!(fs::read(day.join("20230407-101500.xmp")).unwrap(), b"<shared/>");
    assert_eq!(fs::read(day.join("20230407-101500.png.xmp")).unwrap(), b"<for png/>");
    // The shared stem sidecar travels with the first file only
    assert!(summary.warnings.is_empty());

    // Nothing was overwritten, so every sidecar is still a distinct file
    assert_eq!(tree(&scratch.output).len(), 5);
}

#[test]
fn test_sidecar_never_overwrites_existing_file() {
    let scratch = Scratch::new(&[("IMG_1.jpg", b"photo"), ("IMG_1.jpg.xmp", b"<new/>")]);
    let day = scratch.output.join("2023/04/07");
    fs::create_dir_all(&day).unwrap();
    fs::write(day.join("20230407-101500.jpg.xmp"), b"<older/>").unwrap();

    let summary = Processor::with_resolver(scratch.config(), fixed())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.counts.copied, 1);
    assert_eq!(summary.exit_code(), EXIT_OK);
    assert_eq!(summary.warnings.len(), 1);
    assert_eq!(fs::read(day.join("20230407-101500.jpg.xmp")).unwrap(), b"<older/>");
    assert!(scratch.input.join("IMG_1.jpg.xmp").exists());
}
