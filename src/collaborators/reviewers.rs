//! 默认审核者：直接通过，并把结论作为 receipt 发出

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::packet::TaskPacket;
use crate::pipeline::Reviewer;
use crate::receipt::{Receipt, ReceiptSink, ReviewPacket};

/// 审核类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewKind {
    Integration,
    UxSimulation,
    Oracle,
}

/// 通过 receipt sink 记录审核结论的审核者
pub struct ReceiptReviewer {
    kind: ReviewKind,
    sink: Arc<dyn ReceiptSink>,
}

impl ReceiptReviewer {
    pub fn new(kind: ReviewKind, sink: Arc<dyn ReceiptSink>) -> Self {
        Self { kind, sink }
    }

    fn receipt(&self, packet: &TaskPacket) -> Receipt {
        let task_id = packet.task_id.clone();
        let mut review = ReviewPacket {
            task_id: task_id.clone(),
            passed: true,
            journey_checks: None,
            findings: None,
        };
        match self.kind {
            ReviewKind::Integration => Receipt::IntegrationChecked { task_id, packet: review },
            ReviewKind::UxSimulation => {
                review.journey_checks = Some(vec![format!("journey:{}", packet.query)]);
                Receipt::UxSimulated { task_id, packet: review }
            }
            ReviewKind::Oracle => {
                review.findings = Some(Vec::new());
                Receipt::OracleReviewed { task_id, packet: review }
            }
        }
    }
}

#[async_trait]
impl Reviewer for ReceiptReviewer {
    async fn review(&self, packet: &TaskPacket, _cancel: CancellationToken) -> anyhow::Result<()> {
        let receipt = self.receipt(packet);
        tracing::debug!(task_id = %packet.task_id, kind = receipt.kind(), "review recorded");
        self.sink.emit(&receipt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::MemoryReceiptSink;

    fn packet() -> TaskPacket {
        TaskPacket {
            task_id: "T1".into(),
            query: "checkout flow".into(),
            context_pack: "## Context Pack".into(),
            citations: vec!["doc#1".into()],
            strategy_commands: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_each_kind_emits_its_receipt() {
        let sink = Arc::new(MemoryReceiptSink::new());
        for kind in [ReviewKind::Integration, ReviewKind::UxSimulation, ReviewKind::Oracle] {
            ReceiptReviewer::new(kind, sink.clone())
                .review(&packet(), CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(
            sink.kinds().await,
            vec!["INTEGRATION_CHECKED", "UX_SIMULATED", "ORACLE_REVIEWED"]
        );
        let receipts = sink.receipts().await;
        let Receipt::UxSimulated { packet, .. } = &receipts[1] else {
            panic!("expected UX_SIMULATED");
        };
        assert!(packet.passed);
        assert_eq!(packet.journey_checks.as_deref(), Some(&["journey:checkout flow".to_string()][..]));
    }
}
