pub mod batch;
pub mod codec;
pub mod commit;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod plan;
pub mod report;
pub mod search;
mod utils;

pub use batch::{discover_images, prepare, BatchRunner, PreparedBatch};
pub use codec::{encode_at, EncodedImage, ImageAsset, PreparedImage};
pub use config::RunConfig;
pub use error::{OptimizeError, Result};
pub use optimizer::{OptimizationResult, Optimizer};
pub use plan::OptimizationPlan;
pub use report::{Report, ReportAggregator, RunSummary};
pub use search::{search, SearchOutcome, SearchPhase, SearchPolicy, SearchState};
