//! Arbiter - 带护栏的任务执行流水线
//!
//! 模块划分：
//! - **packet**: 阶段间消息（任务记录、任务包、完成包、验证包）与执行摘要 digest
//! - **guardrail**: 输入扫描（shield）、看门狗（watchdog）、包校验（logician）
//! - **receipt**: 审计 receipt 类型与落点（tracing / 内存 / JSONL）
//! - **core**: 停机原因与流水线阶段、终态
//! - **pipeline**: 协作者契约与任务状态机
//! - **collaborators**: 默认协作者（静态上下文构建、Shell 策略执行、执行记录校验、审核回执）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: tracing 初始化

pub mod collaborators;
pub mod config;
pub mod core;
pub mod guardrail;
pub mod observability;
pub mod packet;
pub mod pipeline;
pub mod receipt;

pub use crate::core::{HaltReason, PipelineStage, TaskOutcome};
pub use pipeline::{run_task, DepsOverride, PipelineDeps, TaskPipeline};
