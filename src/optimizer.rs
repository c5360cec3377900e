use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::PreparedImage;
use crate::commit::{is_same_file, safe_replace};
use crate::error::{OptimizeError, Result};
use crate::plan::OptimizationPlan;
use crate::search::{search, Measured, SearchPhase, SearchPolicy};

/// Outcome for one image. Failed images carry `error` and are left untouched on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub path: PathBuf,
    pub original_bytes: u64,
    pub optimized_bytes: u64,
    pub success: bool,
    pub error: Option<String>,
    pub quality: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub search_phase: Option<SearchPhase>,
    /// The re-encode came out larger than the source, so the source bytes were kept.
    pub kept_original: bool,
    /// Resized to honor the max width but still bigger than the source file.
    pub larger_than_original: bool,
}

impl OptimizationResult {
    pub fn failed(path: impl Into<PathBuf>, original_bytes: u64, error: &OptimizeError) -> Self {
        OptimizationResult {
            path: path.into(),
            original_bytes,
            optimized_bytes: 0,
            success: false,
            error: Some(error.to_string()),
            quality: None,
            width: None,
            height: None,
            search_phase: None,
            kept_original: false,
            larger_than_original: false,
        }
    }

    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        (self.original_bytes as f64 - self.optimized_bytes as f64) / self.original_bytes as f64 * 100.0
    }
}

/// Runs decode, quality search and commit for single images against a shared plan.
pub struct Optimizer<'a> {
    plan: &'a OptimizationPlan,
    policy: SearchPolicy,
}

impl<'a> Optimizer<'a> {
    pub fn new(plan: &'a OptimizationPlan) -> Optimizer<'a> {
        Optimizer {
            plan,
            policy: SearchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &SearchPolicy {
        &self.policy
    }

    /// Never returns an error: anything that goes wrong is folded into a failed result.
    pub fn process(&self, source: &Path, destination: &Path) -> OptimizationResult {
        let original_bytes = fs::metadata(source).map(|m| m.len()).unwrap_or(0);
        match self.try_process(source, destination) {
            Ok(result) => result,
            Err(e) => {
                warn!(path = %source.display(), error = %e, "image failed");
                OptimizationResult::failed(source, original_bytes, &e)
            }
        }
    }

    fn try_process(&self, source: &Path, destination: &Path) -> Result<OptimizationResult> {
        let data = fs::read(source)?;
        let original_bytes = data.len() as u64;
        let in_place = source == destination || is_same_file(source, destination);

        let prepared = PreparedImage::from_bytes(&data, self.plan.max_width())?;
        let (width, height) = prepared.dimensions();
        // Never aim above what the source already weighs.
        let target = self.plan.per_image_target_bytes().min(original_bytes);

        let outcome = search(&self.policy, target, self.plan.initial_quality(), |q| {
            prepared.encode_at(q)
        })?;
        debug!(
            path = %source.display(),
            quality = outcome.quality,
            size = outcome.size,
            target_bytes = target,
            iterations = outcome.iterations,
            phase = ?outcome.phase,
            "search finished"
        );

        let (mut quality, mut encoded) = (outcome.quality, outcome.payload);
        if encoded.measured_len() > original_bytes
            && prepared.was_resized()
            && quality > self.policy.min_quality
        {
            let floor = prepared.encode_at(self.policy.min_quality)?;
            if floor.measured_len() < encoded.measured_len() {
                quality = self.policy.min_quality;
                encoded = floor;
            }
        }

        let grew = encoded.measured_len() > original_bytes;
        let keep_original = grew && !prepared.was_resized();
        let larger_than_original = grew && prepared.was_resized();
        if keep_original {
            info!(
                path = %source.display(),
                encoded = encoded.measured_len(),
                original = original_bytes,
                "re-encode is larger than the source, keeping original bytes"
            );
            if !in_place {
                safe_replace(destination, &data)?;
            }
        } else {
            if larger_than_original {
                warn!(
                    path = %source.display(),
                    encoded = encoded.measured_len(),
                    original = original_bytes,
                    quality,
                    "resized image is still larger than the source at the lowest quality"
                );
            }
            safe_replace(destination, &encoded.bytes)?;
        }

        let optimized_bytes = fs::metadata(destination)
            .map_err(|e| OptimizeError::commit(destination, e))?
            .len();

        Ok(OptimizationResult {
            path: source.to_path_buf(),
            original_bytes,
            optimized_bytes,
            success: true,
            error: None,
            quality: (!keep_original).then_some(quality),
            width: Some(if keep_original { prepared.source().width } else { width }),
            height: Some(if keep_original { prepared.source().height } else { height }),
            search_phase: Some(outcome.phase),
            kept_original: keep_original,
            larger_than_original,
        })
    }
}
