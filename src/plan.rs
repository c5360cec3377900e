use serde::Serialize;

use crate::error::{OptimizeError, Result};

pub const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Budget shared read-only by every image of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizationPlan {
    aggregate_target_bytes: u64,
    per_image_target_bytes: u64,
    image_count: usize,
    max_width: Option<u32>,
    initial_quality: u8,
}

impl OptimizationPlan {
    /// Splits `aggregate_target_bytes` evenly across `image_count` images.
    /// The original size of each image plays no part in its share.
    pub fn new(
        aggregate_target_bytes: u64,
        image_count: usize,
        max_width: Option<u32>,
        initial_quality: u8,
    ) -> Result<Self> {
        if image_count == 0 {
            return Err(OptimizeError::InvalidBatch("no images to optimize".to_string()));
        }
        if aggregate_target_bytes == 0 {
            return Err(OptimizeError::InvalidBatch(
                "target size must be greater than zero".to_string(),
            ));
        }
        if max_width == Some(0) {
            return Err(OptimizeError::InvalidBatch(
                "max width must be a positive number of pixels".to_string(),
            ));
        }

        let per_image_target_bytes = aggregate_target_bytes / image_count as u64;
        if per_image_target_bytes == 0 {
            return Err(OptimizeError::InvalidBatch(format!(
                "target of {aggregate_target_bytes} bytes is smaller than one byte per image across {image_count} images"
            )));
        }

        Ok(OptimizationPlan {
            aggregate_target_bytes,
            per_image_target_bytes,
            image_count,
            max_width,
            initial_quality,
        })
    }

    /// Same as [`OptimizationPlan::new`] with the target given in megabytes (MiB).
    pub fn from_megabytes(
        target_megabytes: f64,
        image_count: usize,
        max_width: Option<u32>,
        initial_quality: u8,
    ) -> Result<Self> {
        Self::new(
            megabytes_to_bytes(target_megabytes)?,
            image_count,
            max_width,
            initial_quality,
        )
    }

    pub fn aggregate_target_bytes(&self) -> u64 {
        self.aggregate_target_bytes
    }

    pub fn per_image_target_bytes(&self) -> u64 {
        self.per_image_target_bytes
    }

    pub fn image_count(&self) -> usize {
        self.image_count
    }

    pub fn max_width(&self) -> Option<u32> {
        self.max_width
    }

    pub fn initial_quality(&self) -> u8 {
        self.initial_quality
    }
}

pub fn megabytes_to_bytes(megabytes: f64) -> Result<u64> {
    if !megabytes.is_finite() || megabytes <= 0.0 {
        return Err(OptimizeError::InvalidBatch(format!(
            "target size must be a positive number of megabytes, got {megabytes}"
        )));
    }
    Ok((megabytes * BYTES_PER_MEGABYTE).round() as u64)
}
