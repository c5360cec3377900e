use serde::Serialize;

use crate::optimizer::OptimizationResult;

/// The batch counts as on target up to this factor over the aggregate budget.
pub const AGGREGATE_TOLERANCE: f64 = 1.10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub aggregate_target_bytes: u64,
    /// Successful images only.
    pub total_original_bytes: u64,
    /// Successful images only.
    pub total_optimized_bytes: u64,
    pub success_count: usize,
    pub failure_count: usize,
    pub cancelled_count: usize,
    pub target_met: bool,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.success_count + self.failure_count
    }

    pub fn total_reduction_percent(&self) -> f64 {
        if self.total_original_bytes == 0 {
            return 0.0;
        }
        (self.total_original_bytes as f64 - self.total_optimized_bytes as f64)
            / self.total_original_bytes as f64
            * 100.0
    }

    pub fn bytes_saved(&self) -> i64 {
        self.total_original_bytes as i64 - self.total_optimized_bytes as i64
    }
}

/// Folds results into a [`RunSummary`]. Meant to be fed from a single thread.
#[derive(Debug, Clone)]
pub struct ReportAggregator {
    aggregate_target_bytes: u64,
    total_original_bytes: u64,
    total_optimized_bytes: u64,
    success_count: usize,
    failure_count: usize,
    cancelled_count: usize,
    results: Vec<OptimizationResult>,
}

impl ReportAggregator {
    pub fn new(aggregate_target_bytes: u64) -> Self {
        Self {
            aggregate_target_bytes,
            total_original_bytes: 0,
            total_optimized_bytes: 0,
            success_count: 0,
            failure_count: 0,
            cancelled_count: 0,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: OptimizationResult) {
        if result.success {
            self.total_original_bytes += result.original_bytes;
            self.total_optimized_bytes += result.optimized_bytes;
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.results.push(result);
    }

    pub fn record_cancelled(&mut self, count: usize) {
        self.cancelled_count += count;
    }

    pub fn finish(self) -> Report {
        let target_met =
            self.total_optimized_bytes as f64 <= self.aggregate_target_bytes as f64 * AGGREGATE_TOLERANCE;
        Report {
            summary: RunSummary {
                aggregate_target_bytes: self.aggregate_target_bytes,
                total_original_bytes: self.total_original_bytes,
                total_optimized_bytes: self.total_optimized_bytes,
                success_count: self.success_count,
                failure_count: self.failure_count,
                cancelled_count: self.cancelled_count,
                target_met,
            },
            results: self.results,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: RunSummary,
    pub results: Vec<OptimizationResult>,
}

impl Report {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Closing block printed after the per-image lines.
    pub fn render_summary(&self, max_width: u32, initial_quality: u8) -> String {
        let s = &self.summary;
        let total = s.processed() + s.cancelled_count;
        let rule = "=".repeat(60);

        let mut lines = vec![
            String::new(),
            rule.clone(),
            "OPTIMIZATION COMPLETE".to_string(),
            rule,
            format!("Successfully optimized: {}/{}", s.success_count, total),
        ];
        if s.failure_count > 0 {
            lines.push(format!("Failed: {}", s.failure_count));
        }
        if s.cancelled_count > 0 {
            lines.push(format!("Cancelled before start: {}", s.cancelled_count));
        }
        lines.push(String::new());
        lines.push(format!(
            "Original total size: {} ({:.2} MB)",
            format_size(s.total_original_bytes),
            megabytes(s.total_original_bytes)
        ));
        lines.push(format!(
            "Optimized total size: {} ({:.2} MB)",
            format_size(s.total_optimized_bytes),
            megabytes(s.total_optimized_bytes)
        ));
        if s.total_original_bytes > 0 {
            lines.push(format!("Total reduction: {:.1}%", s.total_reduction_percent()));
            let saved = s.bytes_saved();
            let saved_text = if saved < 0 {
                format!("-{}", format_size(saved.unsigned_abs()))
            } else {
                format_size(saved as u64)
            };
            lines.push(format!("Space saved: {saved_text}"));
        }

        lines.push(String::new());
        if s.target_met {
            lines.push(format!(
                "[SUCCESS] Target size achieved! ({} <= {})",
                format_size(s.total_optimized_bytes),
                format_size(s.aggregate_target_bytes)
            ));
        } else {
            lines.push("[WARNING] Target size not fully met. Consider:".to_string());
            lines.push(format!("  - Reducing max-width (currently {max_width}px)"));
            lines.push(format!("  - Reducing quality (currently {initial_quality})"));
            lines.push("  - Increasing target size".to_string());
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// One table row: `[3/40] page_003.jpg  OK  1.20 MB -> 410.22 KB (66.6% reduction)  q=72  2000x2833`.
pub fn render_line(index: usize, total: usize, result: &OptimizationResult) -> String {
    let name = result
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| result.path.display().to_string());
    let head = format!("[{index}/{total}] {name:<28}");

    if !result.success {
        return format!(
            "{head} FAILED: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    let detail = match (result.quality, result.width, result.height) {
        (Some(q), Some(w), Some(h)) => format!("q={q:<3} {w}x{h}"),
        (None, Some(w), Some(h)) => format!("kept  {w}x{h}"),
        _ => String::new(),
    };
    let grew = if result.larger_than_original { "  larger than source" } else { "" };
    format!(
        "{head} OK  {:>10} -> {:>10} ({:>5.1}% reduction)  {detail}{grew}",
        format_size(result.original_bytes),
        format_size(result.optimized_bytes),
        result.reduction_percent()
    )
}

pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} TB")
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
