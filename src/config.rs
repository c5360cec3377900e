use std::path::{Path, PathBuf};

use crate::commit::{backup_dir_for, is_same_file};
use crate::error::{OptimizeError, Result};

pub const DEFAULT_INPUT_DIR: &str = "assets/quran_safa";
pub const DEFAULT_TARGET_MEGABYTES: f64 = 40.0;
pub const DEFAULT_MAX_WIDTH: u32 = 2000;
pub const DEFAULT_INITIAL_QUALITY: u8 = 80;

/// Everything one run needs, resolved from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    /// `None` rewrites the input directory in place.
    pub output_dir: Option<PathBuf>,
    pub target_megabytes: f64,
    pub max_width: u32,
    pub initial_quality: u8,
    pub backup: bool,
    pub jobs: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: None,
            target_megabytes: DEFAULT_TARGET_MEGABYTES,
            max_width: DEFAULT_MAX_WIDTH,
            initial_quality: DEFAULT_INITIAL_QUALITY,
            backup: false,
            jobs: 1,
        }
    }
}

impl RunConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            ..Self::default()
        }
    }

    pub fn destination_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.input_dir)
    }

    /// An output folder that resolves to the input folder, however it is spelled,
    /// is an in-place run.
    pub fn in_place(&self) -> bool {
        match &self.output_dir {
            None => true,
            Some(out) => out == &self.input_dir || is_same_file(out, &self.input_dir),
        }
    }

    /// Backups only make sense when originals are about to be overwritten.
    pub fn backup_dir(&self) -> Option<PathBuf> {
        (self.backup && self.in_place()).then(|| backup_dir_for(&self.input_dir))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.input_dir.is_dir() {
            return Err(OptimizeError::InvalidBatch(format!(
                "input folder '{}' does not exist",
                self.input_dir.display()
            )));
        }
        if !self.target_megabytes.is_finite() || self.target_megabytes <= 0.0 {
            return Err(OptimizeError::InvalidBatch(format!(
                "target size must be positive, got {} MB",
                self.target_megabytes
            )));
        }
        if self.max_width == 0 {
            return Err(OptimizeError::InvalidBatch(
                "max width must be a positive number of pixels".to_string(),
            ));
        }
        if !(1..=100).contains(&self.initial_quality) {
            return Err(OptimizeError::InvalidBatch(format!(
                "quality must be within 1..=100, got {}",
                self.initial_quality
            )));
        }
        if self.jobs == 0 {
            return Err(OptimizeError::InvalidBatch(
                "at least one worker is required".to_string(),
            ));
        }
        Ok(())
    }
}
