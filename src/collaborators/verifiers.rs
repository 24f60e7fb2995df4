//! 默认校验器：只依据完成包中的执行记录做判断

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::packet::{TaskCompletionPacket, TaskPacket, VerificationPacket};
use crate::pipeline::Verifier;

/// 摘要中出现即判定质量不合格的标记
const FAILURE_MARKERS: &[&str] = &["error:", "FAILED", "panicked"];

/// spec 校验：每条策略命令都有对应记录且退出码为 0
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionSpecVerifier;

#[async_trait]
impl Verifier for ExecutionSpecVerifier {
    async fn verify(
        &self,
        packet: &TaskPacket,
        completion: &TaskCompletionPacket,
        _cancel: CancellationToken,
    ) -> anyhow::Result<VerificationPacket> {
        let passed = packet.strategy_commands.iter().all(|strategy| {
            completion
                .execution
                .iter()
                .any(|record| record.command == strategy.command && record.exit_code == 0)
        });
        if !passed {
            tracing::info!(task_id = %packet.task_id, "spec verifier: strategy command not satisfied");
        }
        Ok(VerificationPacket::new(packet.task_id.clone(), passed))
    }
}

/// quality 校验：任何输出摘要都不含失败标记
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionQualityVerifier;

#[async_trait]
impl Verifier for ExecutionQualityVerifier {
    async fn verify(
        &self,
        packet: &TaskPacket,
        completion: &TaskCompletionPacket,
        _cancel: CancellationToken,
    ) -> anyhow::Result<VerificationPacket> {
        let flagged = completion.execution.iter().find(|record| {
            FAILURE_MARKERS
                .iter()
                .any(|marker| record.output_summary.contains(marker))
        });
        if let Some(record) = flagged {
            tracing::info!(task_id = %packet.task_id, command = %record.command, "quality verifier: failure marker in output");
        }
        Ok(VerificationPacket::new(packet.task_id.clone(), flagged.is_none()))
    }
}
