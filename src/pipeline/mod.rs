//! 任务流水线：协作者契约、依赖集合与状态机

pub mod deps;
pub mod runner;

pub use deps::{DepsOverride, PacketBuilder, PipelineDeps, Reviewer, StrategyExecutor, Verifier};
pub use runner::TaskPipeline;

use serde_json::Value;

use crate::config::AppConfig;
use crate::core::TaskOutcome;

/// 便捷入口：用配置构建默认协作者（可部分替换）并运行一个任务
pub async fn run_task(config: &AppConfig, raw: &Value, overrides: DepsOverride) -> TaskOutcome {
    TaskPipeline::from_config(config, overrides).run(raw).await
}
