use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::RunConfig;
use crate::error::{OptimizeError, Result};
use crate::optimizer::{OptimizationResult, Optimizer};
use crate::plan::OptimizationPlan;
use crate::report::{Report, ReportAggregator};
use crate::search::SearchPolicy;

pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jpe", "jfif"];

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// JPEG files directly inside `dir`, sorted by path. Subdirectories are not visited.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(OptimizeError::InvalidBatch(format!(
            "input folder '{}' does not exist",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), JPEG_EXTENSIONS))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    Ok(files)
}

pub fn total_size(files: &[PathBuf]) -> u64 {
    files
        .iter()
        .filter_map(|f| std::fs::metadata(f).ok())
        .map(|m| m.len())
        .sum()
}

/// Pre-flight result: the images to process and the plan they share.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub images: Vec<PathBuf>,
    pub plan: OptimizationPlan,
}

/// Validates `config`, discovers images and computes the plan. Touches no files.
pub fn prepare(config: &RunConfig) -> Result<PreparedBatch> {
    config.validate()?;
    let images = discover_images(&config.input_dir)?;
    if images.is_empty() {
        return Err(OptimizeError::InvalidBatch(format!(
            "no JPEG images found in '{}'",
            config.input_dir.display()
        )));
    }
    let plan = OptimizationPlan::from_megabytes(
        config.target_megabytes,
        images.len(),
        Some(config.max_width),
        config.initial_quality,
    )?;
    Ok(PreparedBatch { images, plan })
}

pub struct BatchRunner {
    plan: OptimizationPlan,
    destination_dir: PathBuf,
    policy: SearchPolicy,
    jobs: usize,
    cancel: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(plan: OptimizationPlan, destination_dir: impl Into<PathBuf>) -> Self {
        BatchRunner {
            plan,
            destination_dir: destination_dir.into(),
            policy: SearchPolicy::default(),
            jobs: 1,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Flag checked before each image starts. Setting it stops the batch between images.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn plan(&self) -> &OptimizationPlan {
        &self.plan
    }

    fn destination_for(&self, source: &Path) -> PathBuf {
        match source.file_name() {
            Some(name) => self.destination_dir.join(name),
            None => source.to_path_buf(),
        }
    }

    fn process_one(&self, optimizer: &Optimizer<'_>, source: &Path) -> Option<OptimizationResult> {
        if self.cancel.load(Ordering::SeqCst) {
            return None;
        }
        let destination = self.destination_for(source);
        Some(optimizer.process(source, &destination))
    }

    /// Processes `images` and reports each result to `observer` with its 1-based
    /// position. With more than one job, results are reported once all workers are
    /// done, still in input order.
    pub fn run<F>(&self, images: &[PathBuf], mut observer: F) -> Result<Report>
    where
        F: FnMut(usize, &OptimizationResult),
    {
        let optimizer = Optimizer::new(&self.plan).with_policy(self.policy);
        let mut aggregator = ReportAggregator::new(self.plan.aggregate_target_bytes());
        info!(
            images = images.len(),
            per_image_target = self.plan.per_image_target_bytes(),
            jobs = self.jobs,
            "starting batch"
        );

        let outcomes: Vec<Option<OptimizationResult>> = if self.jobs <= 1 {
            let mut outcomes = Vec::with_capacity(images.len());
            for (i, source) in images.iter().enumerate() {
                let outcome = self.process_one(&optimizer, source);
                if let Some(result) = &outcome {
                    observer(i + 1, result);
                }
                outcomes.push(outcome);
            }
            outcomes
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs)
                .build()
                .map_err(|e| OptimizeError::WorkerPool(e.to_string()))?;
            let outcomes: Vec<Option<OptimizationResult>> = pool.install(|| {
                images
                    .par_iter()
                    .map(|source| self.process_one(&optimizer, source))
                    .collect()
            });
            for (i, outcome) in outcomes.iter().enumerate() {
                if let Some(result) = outcome {
                    observer(i + 1, result);
                }
            }
            outcomes
        };

        let mut cancelled = 0;
        for outcome in outcomes {
            match outcome {
                Some(result) => aggregator.record(result),
                None => cancelled += 1,
            }
        }
        if cancelled > 0 {
            warn!(cancelled, "batch cancelled before all images were processed");
        }
        aggregator.record_cancelled(cancelled);

        Ok(aggregator.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discovery_is_flat_sorted_and_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.jpeg", "c.png", "notes.txt", "d.jfif"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("e.jpg"), b"x").unwrap();

        let names: Vec<String> = discover_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpeg", "b.JPG", "d.jfif"]);
    }

    #[test]
    fn test_missing_directory_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_images(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidBatch(_)));
    }

    #[test]
    fn test_prepare_rejects_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.txt"), b"x").unwrap();
        let err = prepare(&RunConfig::new(dir.path())).unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidBatch(_)));
    }

    #[test]
    fn test_prepare_builds_plan_from_count() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1.jpg", "2.jpg", "3.jpg", "4.jpg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let mut config = RunConfig::new(dir.path());
        config.target_megabytes = 4.0;
        let batch = prepare(&config).unwrap();
        assert_eq!(batch.images.len(), 4);
        assert_eq!(batch.plan.per_image_target_bytes(), 1024 * 1024);
        assert_eq!(batch.plan.max_width(), Some(2000));
    }

    #[test]
    fn test_cancelled_batch_processes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let images: Vec<PathBuf> = (0..3).map(|i| dir.path().join(format!("{i}.jpg"))).collect();
        for p in &images {
            fs::write(p, b"garbage").unwrap();
        }
        let plan = OptimizationPlan::new(1000, 3, None, 80).unwrap();
        let runner = BatchRunner::new(plan, dir.path())
            .with_cancel_flag(Arc::new(AtomicBool::new(true)));

        let mut seen = 0;
        let report = runner.run(&images, |_, _| seen += 1).unwrap();
        assert_eq!(seen, 0);
        assert_eq!(report.summary.cancelled_count, 3);
        assert_eq!(report.summary.processed(), 0);
        assert!(images.iter().all(|p| fs::read(p).unwrap() == b"garbage"));
    }
}
