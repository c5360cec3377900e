use std::{
    fs,
    path::{Path, PathBuf},
};

use budget_jpeg::{
    batch::{self, BatchRunner},
    commit,
    search::SIZE_TOLERANCE,
    OptimizationPlan, OptimizeError, PreparedImage, RunConfig, SearchPhase, SearchPolicy,
};
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb};

fn textured(w: u32, h: u32, seed: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(w, h, |x, y| {
        let n = (x.wrapping_mul(73856093) ^ y.wrapping_mul(19349663) ^ seed.wrapping_mul(83492791))
            .wrapping_mul(2654435761);
        let stripe = if (x / 4 + y / 9) % 2 == 0 { 30 } else { 220 };
        Rgb([
            ((n >> 24) as u8 / 4).wrapping_add(stripe),
            ((n >> 16) as u8 / 4).wrapping_add(stripe),
            ((n >> 8) as u8 / 4).wrapping_add(stripe),
        ])
    }))
}

fn write_images(dir: &Path, specs: &[(&str, u32, u32)]) -> Vec<PathBuf> {
    specs
        .iter()
        .enumerate()
        .map(|(i, (name, w, h))| {
            let path = dir.join(name);
            textured(*w, *h, i as u32).save(&path).unwrap();
            path
        })
        .collect()
}

fn no_temp_files_left(dir: &Path) -> bool {
    fs::read_dir(dir)
        .unwrap()
        .all(|e| !e.unwrap().file_name().to_string_lossy().ends_with(".tmp"))
}

#[test]
fn failing_image_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut images = write_images(
        dir.path(),
        &[("1.jpg", 64, 64), ("2.jpg", 64, 64), ("4.jpg", 64, 64), ("5.jpg", 64, 64)],
    );
    let broken = dir.path().join("3.jpg");
    fs::write(&broken, b"this is not a jpeg at all").unwrap();
    images.insert(2, broken.clone());

    let plan = OptimizationPlan::new(5 * 4 * 1024, images.len(), Some(2000), 80).unwrap();
    let mut lines = Vec::new();
    let report = BatchRunner::new(plan, dir.path())
        .run(&images, |i, r| lines.push((i, r.success)))
        .unwrap();

    assert_eq!(report.summary.success_count, 4);
    assert_eq!(report.summary.failure_count, 1);
    assert_eq!(lines, vec![(1, true), (2, true), (3, false), (4, true), (5, true)]);
    assert!(report.results[2].error.is_some());
    assert_eq!(fs::read(&broken).unwrap(), b"this is not a jpeg at all");
    assert!(no_temp_files_left(dir.path()));
}

#[test]
fn two_image_budget_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_images(dir.path(), &[("a.jpg", 640, 480), ("b.jpg", 480, 360)]);
    let max_width = 400;
    let aggregate = 40 * 1024;

    let plan = OptimizationPlan::new(aggregate, 2, Some(max_width), 80).unwrap();
    let per_image = plan.per_image_target_bytes();
    assert_eq!(per_image, 20 * 1024);
    let originals: Vec<Vec<u8>> = images.iter().map(|p| fs::read(p).unwrap()).collect();

    let report = BatchRunner::new(plan, dir.path()).run(&images, |_, _| {}).unwrap();
    let summary = &report.summary;

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 0);
    for (path, result) in images.iter().zip(&report.results) {
        let decoded = image::open(path).unwrap();
        assert!(decoded.width() <= max_width);
        assert_eq!(result.width, Some(decoded.width()));
        assert_eq!(result.optimized_bytes, fs::metadata(path).unwrap().len());
    }

    // Each image lands in the tolerance band or on the closest size its search measured.
    for (original, result) in originals.iter().zip(&report.results) {
        let target = per_image.min(original.len() as u64);
        let prepared = PreparedImage::from_bytes(original, Some(max_width)).unwrap();
        let mut measured = Vec::new();
        budget_jpeg::search(&SearchPolicy::default(), target, 80, |q| {
            let encoded = prepared.encode_at(q)?;
            measured.push(encoded.bytes.len() as u64);
            Ok::<_, OptimizeError>(encoded)
        })
        .unwrap();
        let closest = measured.iter().map(|s| s.abs_diff(target)).min().unwrap();

        let distance = result.optimized_bytes.abs_diff(target);
        let within_band = result.optimized_bytes as f64 <= target as f64 * SIZE_TOLERANCE;
        assert_ne!(result.search_phase, Some(SearchPhase::Searching));
        assert!(
            within_band || result.search_phase == Some(SearchPhase::Exhausted) || distance == closest,
            "{} bytes for a {} byte target after {:?}",
            result.optimized_bytes,
            target,
            result.search_phase
        );
        assert_eq!(distance, closest, "{measured:?}");
    }
    let on_disk: u64 = images.iter().map(|p| fs::metadata(p).unwrap().len()).sum();
    assert_eq!(summary.total_optimized_bytes, on_disk);
    assert_eq!(
        summary.target_met,
        summary.total_optimized_bytes as f64 <= aggregate as f64 * 1.10
    );
}

#[test]
fn generous_target_never_inflates_files() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_images(dir.path(), &[("a.jpg", 160, 120), ("b.jpg", 200, 100)]);
    let before: Vec<u64> = images.iter().map(|p| fs::metadata(p).unwrap().len()).collect();

    let plan = OptimizationPlan::new(1024 * 1024 * 1024, 2, Some(2000), 80).unwrap();
    let report = BatchRunner::new(plan, dir.path()).run(&images, |_, _| {}).unwrap();

    assert_eq!(report.summary.success_count, 2);
    for (result, original) in report.results.iter().zip(before) {
        assert_eq!(result.original_bytes, original);
        assert!(result.optimized_bytes <= original);
        assert_eq!(result.width, Some(image::open(&result.path).unwrap().width()));
    }
    assert!(report.summary.target_met);
}

#[test]
fn separate_output_folder_keeps_originals() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir(&input).unwrap();
    let images = write_images(&input, &[("a.jpg", 300, 200)]);
    let original = fs::read(&images[0]).unwrap();

    let mut config = RunConfig::new(&input);
    config.output_dir = Some(output.clone());
    config.target_megabytes = 0.01;
    config.max_width = 150;

    let prepared = batch::prepare(&config).unwrap();
    let report = BatchRunner::new(prepared.plan, config.destination_dir())
        .run(&prepared.images, |_, _| {})
        .unwrap();

    assert_eq!(report.summary.success_count, 1);
    assert_eq!(fs::read(&images[0]).unwrap(), original);
    let written = image::open(output.join("a.jpg")).unwrap();
    assert_eq!(written.dimensions(), (150, 100));
}

#[test]
fn backup_then_in_place_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("pages");
    fs::create_dir(&input).unwrap();
    let images = write_images(&input, &[("p1.jpg", 500, 300), ("p2.jpg", 500, 300)]);
    let originals: Vec<Vec<u8>> = images.iter().map(|p| fs::read(p).unwrap()).collect();

    let mut config = RunConfig::new(&input);
    config.backup = true;
    config.max_width = 250;
    config.target_megabytes = 0.02;
    let backup_dir = config.backup_dir().unwrap();

    let prepared = batch::prepare(&config).unwrap();
    commit::backup_originals(&prepared.images, &backup_dir).unwrap();
    let report = BatchRunner::new(prepared.plan, config.destination_dir())
        .run(&prepared.images, |_, _| {})
        .unwrap();

    assert_eq!(report.summary.success_count, 2);
    for (path, original) in images.iter().zip(&originals) {
        let backup = fs::read(backup_dir.join(path.file_name().unwrap())).unwrap();
        assert_eq!(&backup, original);
        assert_eq!(image::open(path).unwrap().width(), 250);
    }
    assert!(no_temp_files_left(&input));
    // The backup folder sits beside the input and is not picked up by discovery.
    assert_eq!(batch::discover_images(&input).unwrap().len(), 2);
}

#[test]
fn worker_pool_matches_sequential_run() {
    let seq_dir = tempfile::tempdir().unwrap();
    let par_dir = tempfile::tempdir().unwrap();
    let specs = [("1.jpg", 220, 160), ("2.jpg", 180, 180), ("3.jpg", 260, 120), ("4.jpg", 90, 200)];
    let seq_images = write_images(seq_dir.path(), &specs);
    let par_images = write_images(par_dir.path(), &specs);

    let plan = OptimizationPlan::new(24 * 1024, specs.len(), Some(200), 80).unwrap();
    let sequential = BatchRunner::new(plan.clone(), seq_dir.path())
        .run(&seq_images, |_, _| {})
        .unwrap();

    let mut order = Vec::new();
    let parallel = BatchRunner::new(plan, par_dir.path())
        .with_jobs(3)
        .run(&par_images, |i, _| order.push(i))
        .unwrap();

    assert_eq!(order, vec![1, 2, 3, 4]);
    assert_eq!(sequential.summary, parallel.summary);
    let seq_q: Vec<_> = sequential.results.iter().map(|r| r.quality).collect();
    let par_q: Vec<_> = parallel.results.iter().map(|r| r.quality).collect();
    assert_eq!(seq_q, par_q);
}

#[test]
fn preflight_errors_touch_nothing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(batch::prepare(&RunConfig::new(dir.path().join("missing"))).is_err());

    let empty = RunConfig::new(dir.path());
    assert!(batch::prepare(&empty).is_err());

    write_images(dir.path(), &[("a.jpg", 32, 32)]);
    let before = fs::read(dir.path().join("a.jpg")).unwrap();
    let mut bad_target = RunConfig::new(dir.path());
    bad_target.target_megabytes = -1.0;
    assert!(batch::prepare(&bad_target).is_err());
    assert_eq!(fs::read(dir.path().join("a.jpg")).unwrap(), before);
}
