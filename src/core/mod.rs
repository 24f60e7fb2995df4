//! 核心类型：停机原因与流水线状态

pub mod error;
pub mod state;

pub use error::{truncate_detail, HaltReason, DETAIL_LIMIT};
pub use state::{PipelineStage, TaskOutcome};
