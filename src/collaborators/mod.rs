//! 默认协作者：未被 DepsOverride 替换时由流水线使用

pub mod builder;
pub mod reviewers;
pub mod strategy;
pub mod verifiers;

pub use builder::StaticContextPacketBuilder;
pub use reviewers::{ReceiptReviewer, ReviewKind};
pub use strategy::ShellStrategyExecutor;
pub use verifiers::{ExecutionQualityVerifier, ExecutionSpecVerifier};
