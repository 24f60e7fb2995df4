//! 阶段间消息：任务记录、任务包、完成包、验证包，以及执行摘要的确定性 digest

pub mod digest;
pub mod types;

pub use digest::{compute_execution_digest, is_digest_shaped, MAX_OUTPUT_SUMMARY_CHARS};
pub use types::{
    ExecutionRecord, StrategyCommand, TaskCompletionPacket, TaskPacket, TaskRecord,
    VerificationPacket, UNKNOWN_TASK_ID,
};
