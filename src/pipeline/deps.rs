//! 外部协作者契约与依赖集合
//!
//! 每个协作者都是 async trait；每次调用收到一个 CancellationToken，
//! 看门狗超时后会取消它，协作者应尽量在取消点退出。
//! DepsOverride 可替换任意子集，未指定的使用默认实现。

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{
    ExecutionQualityVerifier, ExecutionSpecVerifier, ReceiptReviewer, ReviewKind,
    ShellStrategyExecutor, StaticContextPacketBuilder,
};
use crate::config::AppConfig;
use crate::packet::{TaskCompletionPacket, TaskPacket, TaskRecord, VerificationPacket};
use crate::receipt::{JsonlReceiptSink, ReceiptSink, TracingReceiptSink};

/// 任务包构建器
#[async_trait]
pub trait PacketBuilder: Send + Sync {
    async fn build(&self, task: &TaskRecord, cancel: CancellationToken) -> anyhow::Result<TaskPacket>;
}

/// 策略执行器
#[async_trait]
pub trait StrategyExecutor: Send + Sync {
    async fn execute(
        &self,
        packet: &TaskPacket,
        cancel: CancellationToken,
    ) -> anyhow::Result<TaskCompletionPacket>;
}

/// spec / quality 校验器
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        packet: &TaskPacket,
        completion: &TaskCompletionPacket,
        cancel: CancellationToken,
    ) -> anyhow::Result<VerificationPacket>;
}

/// 集成检查 / UX 模拟 / Oracle 评审：只关心成功或失败，自行发出 receipt
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, packet: &TaskPacket, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// 流水线使用的全部协作者
#[derive(Clone)]
pub struct PipelineDeps {
    pub packet_builder: Arc<dyn PacketBuilder>,
    pub strategy_executor: Arc<dyn StrategyExecutor>,
    pub spec_verifier: Arc<dyn Verifier>,
    pub quality_verifier: Arc<dyn Verifier>,
    pub integration_reviewer: Arc<dyn Reviewer>,
    pub ux_reviewer: Arc<dyn Reviewer>,
    pub oracle_reviewer: Arc<dyn Reviewer>,
    pub receipt_sink: Arc<dyn ReceiptSink>,
}

/// 依赖替换包：None 表示使用默认实现
#[derive(Clone, Default)]
pub struct DepsOverride {
    pub packet_builder: Option<Arc<dyn PacketBuilder>>,
    pub strategy_executor: Option<Arc<dyn StrategyExecutor>>,
    pub spec_verifier: Option<Arc<dyn Verifier>>,
    pub quality_verifier: Option<Arc<dyn Verifier>>,
    pub integration_reviewer: Option<Arc<dyn Reviewer>>,
    pub ux_reviewer: Option<Arc<dyn Reviewer>>,
    pub oracle_reviewer: Option<Arc<dyn Reviewer>>,
    pub receipt_sink: Option<Arc<dyn ReceiptSink>>,
}

impl DepsOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packet_builder(mut self, builder: Arc<dyn PacketBuilder>) -> Self {
        self.packet_builder = Some(builder);
        self
    }

    pub fn strategy_executor(mut self, executor: Arc<dyn StrategyExecutor>) -> Self {
        self.strategy_executor = Some(executor);
        self
    }

    pub fn spec_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.spec_verifier = Some(verifier);
        self
    }

    pub fn quality_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.quality_verifier = Some(verifier);
        self
    }

    pub fn integration_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.integration_reviewer = Some(reviewer);
        self
    }

    pub fn ux_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.ux_reviewer = Some(reviewer);
        self
    }

    pub fn oracle_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.oracle_reviewer = Some(reviewer);
        self
    }

    pub fn receipt_sink(mut self, sink: Arc<dyn ReceiptSink>) -> Self {
        self.receipt_sink = Some(sink);
        self
    }
}

impl PipelineDeps {
    /// 按配置构建默认协作者，再用 overrides 替换
    ///
    /// 默认审核者通过最终选定的 receipt sink 发出回执，因此先确定 sink。
    pub fn resolve(config: &AppConfig, overrides: DepsOverride) -> Self {
        let receipt_sink: Arc<dyn ReceiptSink> = overrides.receipt_sink.unwrap_or_else(|| {
            match &config.receipts.path {
                Some(path) => Arc::new(JsonlReceiptSink::new(path)),
                None => Arc::new(TracingReceiptSink),
            }
        });

        let reviewer = |kind: ReviewKind| -> Arc<dyn Reviewer> {
            Arc::new(ReceiptReviewer::new(kind, receipt_sink.clone()))
        };

        Self {
            packet_builder: overrides.packet_builder.unwrap_or_else(|| {
                Arc::new(StaticContextPacketBuilder::new(config.packet.citations.clone()))
            }),
            strategy_executor: overrides
                .strategy_executor
                .unwrap_or_else(|| Arc::new(ShellStrategyExecutor::from_config(&config.strategy))),
            spec_verifier: overrides
                .spec_verifier
                .unwrap_or_else(|| Arc::new(ExecutionSpecVerifier)),
            quality_verifier: overrides
                .quality_verifier
                .unwrap_or_else(|| Arc::new(ExecutionQualityVerifier)),
            integration_reviewer: overrides
                .integration_reviewer
                .unwrap_or_else(|| reviewer(ReviewKind::Integration)),
            ux_reviewer: overrides
                .ux_reviewer
                .unwrap_or_else(|| reviewer(ReviewKind::UxSimulation)),
            oracle_reviewer: overrides
                .oracle_reviewer
                .unwrap_or_else(|| reviewer(ReviewKind::Oracle)),
            receipt_sink,
        }
    }
}
