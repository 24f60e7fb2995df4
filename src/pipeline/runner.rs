//! 任务流水线主循环
//!
//! 严格串行：扫描输入 → 构建任务包 → 扫描上下文 → 执行策略 → 校验完成包
//! → spec 校验 → quality 校验 → 可选审核者 → 完成。
//! 每个失败转移在返回前恰好发出一个 receipt；成功的校验阶段也会先发出自己的 receipt。
//! 所有路径都收敛为 TaskOutcome，不向调用方抛错。

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{truncate_detail, HaltReason, PipelineStage, TaskOutcome};
use crate::guardrail::{
    assert_safe, validate_completion_packet, validate_verification_packet, PacketRejection,
    RestartContext, RestartHook, Watchdog, WatchdogError, WatchdogOptions,
};
use crate::packet::{TaskCompletionPacket, TaskPacket, TaskRecord, VerificationPacket, UNKNOWN_TASK_ID};
use crate::pipeline::deps::{DepsOverride, PipelineDeps, Reviewer, Verifier};
use crate::receipt::{
    GuardrailEvent, GuardrailModule, GuardrailOutcome, GuardrailStage, Receipt, ReceiptSink,
};

/// 看门狗重启时发出 `watchdog/<stage>/restart` 事件
struct WatchdogReceiptHook<'a> {
    sink: &'a dyn ReceiptSink,
    stage: GuardrailStage,
    task_id: Option<&'a str>,
}

#[async_trait]
impl RestartHook for WatchdogReceiptHook<'_> {
    async fn on_restart(&self, ctx: RestartContext<'_>) -> anyhow::Result<()> {
        let code = ctx.error.code().map(|c| c.as_str()).unwrap_or("UNKNOWN");
        let event = GuardrailEvent::new(
            GuardrailModule::Watchdog,
            self.stage,
            GuardrailOutcome::Restart,
            code,
        )
        .with_detail(ctx.error.to_string())
        .with_task_id(self.task_id.map(str::to_string))
        .with_attempt(ctx.attempt);
        self.sink.emit(&Receipt::GuardrailEvent(event)).await
    }
}

/// spec / quality 校验阶段的差异部分
struct VerificationGate {
    stage: PipelineStage,
    watchdog_stage: GuardrailStage,
    packet_stage: GuardrailStage,
    operation: &'static str,
    failed: HaltReason,
    verifier_error: fn(String) -> HaltReason,
    receipt: fn(String, bool, VerificationPacket) -> Receipt,
}

impl VerificationGate {
    fn spec() -> Self {
        Self {
            stage: PipelineStage::SpecVerification,
            watchdog_stage: GuardrailStage::VerifySpec,
            packet_stage: GuardrailStage::SpecPacket,
            operation: "verify-spec",
            failed: HaltReason::SpecVerificationFailed,
            verifier_error: HaltReason::SpecVerifierError,
            receipt: |task_id, passed, packet| Receipt::VerifierSpec {
                task_id,
                passed,
                packet,
            },
        }
    }

    fn quality() -> Self {
        Self {
            stage: PipelineStage::QualityVerification,
            watchdog_stage: GuardrailStage::VerifyQuality,
            packet_stage: GuardrailStage::QualityPacket,
            operation: "verify-quality",
            failed: HaltReason::QualityVerificationFailed,
            verifier_error: HaltReason::QualityVerifierError,
            receipt: |task_id, passed, packet| Receipt::VerifierQuality {
                task_id,
                passed,
                packet,
            },
        }
    }
}

/// 可选审核阶段的差异部分
struct ReviewGate {
    stage: PipelineStage,
    watchdog_stage: GuardrailStage,
    operation: &'static str,
    failed: fn(String) -> HaltReason,
}

/// 任务流水线：持有协作者与看门狗参数，可在多个任务间共享
pub struct TaskPipeline {
    deps: PipelineDeps,
    watchdog_defaults: WatchdogOptions,
    stage_options: HashMap<GuardrailStage, WatchdogOptions>,
    cancel_token: CancellationToken,
}

impl TaskPipeline {
    pub fn new(deps: PipelineDeps, watchdog_defaults: WatchdogOptions) -> Self {
        Self {
            deps,
            watchdog_defaults,
            stage_options: HashMap::new(),
            cancel_token: CancellationToken::new(),
        }
    }

    /// 默认协作者 + overrides，看门狗默认值取自配置
    pub fn from_config(config: &AppConfig, overrides: DepsOverride) -> Self {
        Self::new(PipelineDeps::resolve(config, overrides), config.watchdog)
    }

    /// 单个阶段的看门狗参数（优先于流水线默认值）
    pub fn with_stage_options(mut self, stage: GuardrailStage, options: WatchdogOptions) -> Self {
        self.stage_options.insert(stage, options);
        self
    }

    /// 外部取消令牌；取消后正在进行的协作者调用会收到信号
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }

    /// 运行一个任务；raw 为调用方给出的任意 JSON 记录
    pub async fn run(&self, raw: &Value) -> TaskOutcome {
        let record = TaskRecord::from_value(raw);
        match self.drive(raw, &record).await {
            Ok(()) => {
                tracing::info!(
                    task_id = record.id.as_deref().unwrap_or(""),
                    stage = %PipelineStage::Done,
                    "task done"
                );
                TaskOutcome::Done
            }
            Err(reason) => {
                tracing::warn!(
                    task_id = record.id.as_deref().unwrap_or(""),
                    reason = %reason,
                    "task halted"
                );
                TaskOutcome::HaltAndAsk(reason)
            }
        }
    }

    async fn drive(&self, raw: &Value, record: &TaskRecord) -> Result<(), HaltReason> {
        let runtime_id = record.id.as_deref();

        self.scan(raw, PipelineStage::InputScan, GuardrailStage::TaskInput, runtime_id)
            .await?;

        if record.noop {
            tracing::info!(task_id = runtime_id.unwrap_or(""), "noop task");
            return Ok(());
        }

        let packet = self.build_packet(record).await?;
        let task_id = packet.task_id.as_str();

        self.scan(
            &packet.scan_view(),
            PipelineStage::ContextScan,
            GuardrailStage::ContextPacket,
            Some(task_id),
        )
        .await?;

        let completion = self.execute_strategy(&packet).await?;
        self.validate_completion(&packet, &completion).await?;

        self.verify(VerificationGate::spec(), &*self.deps.spec_verifier, &packet, &completion)
            .await?;
        self.verify(
            VerificationGate::quality(),
            &*self.deps.quality_verifier,
            &packet,
            &completion,
        )
        .await?;

        if record.requires_integration_check {
            let gate = ReviewGate {
                stage: PipelineStage::IntegrationCheck,
                watchdog_stage: GuardrailStage::IntegrationCheck,
                operation: "run-integration-check",
                failed: HaltReason::IntegrationCheckFailed,
            };
            self.review(gate, &*self.deps.integration_reviewer, &packet).await?;
        }

        if record.ux_sensitive {
            let gate = ReviewGate {
                stage: PipelineStage::UxSimulation,
                watchdog_stage: GuardrailStage::UxSimulation,
                operation: "run-ux-simulation",
                failed: HaltReason::UxSimulationFailed,
            };
            self.review(gate, &*self.deps.ux_reviewer, &packet).await?;
        }

        if record.requires_oracle_review {
            let gate = ReviewGate {
                stage: PipelineStage::OracleReview,
                watchdog_stage: GuardrailStage::OracleReview,
                operation: "run-oracle-review",
                failed: HaltReason::OracleReviewFailed,
            };
            self.review(gate, &*self.deps.oracle_reviewer, &packet).await?;
        }

        Ok(())
    }

    async fn scan(
        &self,
        value: &Value,
        pipeline_stage: PipelineStage,
        stage: GuardrailStage,
        task_id: Option<&str>,
    ) -> Result<(), HaltReason> {
        tracing::debug!(task_id = task_id.unwrap_or(""), stage = %pipeline_stage, "stage start");
        let Err(blocked) = assert_safe(value) else {
            return Ok(());
        };
        let reason = HaltReason::ParanoiaBlocked(blocked.0);
        tracing::warn!(task_id = task_id.unwrap_or(""), stage = %pipeline_stage, reason = %reason, "shield blocked");
        let event = GuardrailEvent::new(
            GuardrailModule::Shield,
            stage,
            GuardrailOutcome::Blocked,
            blocked.0.as_str(),
        )
        .with_detail(reason.reason())
        .with_task_id(task_id.map(str::to_string));
        self.emit_best_effort(Receipt::GuardrailEvent(event)).await;
        Err(reason)
    }

    async fn build_packet(&self, record: &TaskRecord) -> Result<TaskPacket, HaltReason> {
        let builder = &self.deps.packet_builder;
        let packet = self
            .supervised(
                PipelineStage::PacketBuild,
                GuardrailStage::BuildTaskPacket,
                "build-task-packet",
                record.id.as_deref(),
                move |token| builder.build(record, token),
                HaltReason::PacketBuildFailed,
            )
            .await?;

        let missing = if packet.task_id == UNKNOWN_TASK_ID || packet.task_id.trim().is_empty() {
            Some(HaltReason::TaskIdMissing)
        } else if packet.citations.is_empty() {
            Some(HaltReason::ContextPackRequired)
        } else {
            None
        };
        if let Some(reason) = missing {
            self.emit_stage_failed(PipelineStage::PacketBuild, record.id.as_deref(), &reason)
                .await;
            return Err(reason);
        }

        tracing::info!(task_id = %packet.task_id, citations = packet.citations.len(), "task packet built");
        Ok(packet)
    }

    async fn execute_strategy(&self, packet: &TaskPacket) -> Result<TaskCompletionPacket, HaltReason> {
        let executor = &self.deps.strategy_executor;
        let completion = self
            .supervised(
                PipelineStage::StrategyExecution,
                GuardrailStage::StrategyExecution,
                "execute-task-strategy",
                Some(&packet.task_id),
                move |token| executor.execute(packet, token),
                HaltReason::StrategyFailed,
            )
            .await?;
        tracing::info!(
            task_id = %packet.task_id,
            records = completion.execution.len(),
            "strategy executed"
        );
        Ok(completion)
    }

    async fn validate_completion(
        &self,
        packet: &TaskPacket,
        completion: &TaskCompletionPacket,
    ) -> Result<(), HaltReason> {
        tracing::debug!(task_id = %packet.task_id, stage = %PipelineStage::CompletionValidation, "stage start");
        if let Err(rejection) = validate_completion_packet(completion, &packet.task_id) {
            self.emit_rejection(GuardrailStage::ExecutorPacket, &packet.task_id, rejection)
                .await;
            return Err(HaltReason::ExecutorPacketInvalid(rejection));
        }

        self.emit_required(Receipt::ExecutorCompleted {
            task_id: packet.task_id.clone(),
            packet: completion.clone(),
        })
        .await
    }

    async fn verify(
        &self,
        gate: VerificationGate,
        verifier: &dyn Verifier,
        packet: &TaskPacket,
        completion: &TaskCompletionPacket,
    ) -> Result<(), HaltReason> {
        let verification = self
            .supervised(
                gate.stage,
                gate.watchdog_stage,
                gate.operation,
                Some(&packet.task_id),
                move |token| verifier.verify(packet, completion, token),
                gate.verifier_error,
            )
            .await?;

        if let Err(rejection) = validate_verification_packet(&verification, &packet.task_id) {
            self.emit_rejection(gate.packet_stage, &packet.task_id, rejection)
                .await;
            return Err(match rejection {
                PacketRejection::TaskIdMismatch => gate.failed,
                other => HaltReason::VerifierPacketInvalid(other),
            });
        }

        let passed = verification.passed;
        self.emit_required((gate.receipt)(packet.task_id.clone(), passed, verification))
            .await?;

        if !passed {
            return Err(gate.failed);
        }
        tracing::info!(task_id = %packet.task_id, stage = %gate.stage, "verification passed");
        Ok(())
    }

    async fn review(&self, gate: ReviewGate, reviewer: &dyn Reviewer, packet: &TaskPacket) -> Result<(), HaltReason> {
        self.supervised(
            gate.stage,
            gate.watchdog_stage,
            gate.operation,
            Some(&packet.task_id),
            move |token| reviewer.review(packet, token),
            gate.failed,
        )
        .await?;
        tracing::info!(task_id = %packet.task_id, stage = %gate.stage, "review passed");
        Ok(())
    }

    /// 在看门狗下调用协作者，把监管错误与协作者错误分别转为 HaltReason
    async fn supervised<T, F, Fut>(
        &self,
        stage: PipelineStage,
        watchdog_stage: GuardrailStage,
        operation: &str,
        task_id: Option<&str>,
        attempt_fn: F,
        on_error: fn(String) -> HaltReason,
    ) -> Result<T, HaltReason>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        tracing::debug!(task_id = task_id.unwrap_or(""), stage = %stage, "stage start");

        let hook = WatchdogReceiptHook {
            sink: &*self.deps.receipt_sink,
            stage: watchdog_stage,
            task_id,
        };
        let err = match self.watchdog_for(watchdog_stage).run(operation, attempt_fn, Some(&hook)).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let reason = match (&err, err.code()) {
            (WatchdogError::Task(e), _) => on_error(truncate_detail(&e.to_string())),
            (_, Some(code)) => HaltReason::Watchdog {
                code,
                stage: watchdog_stage,
            },
            (_, None) => on_error(truncate_detail(&err.to_string())),
        };

        match err.code() {
            Some(code) => {
                let outcome = match err {
                    WatchdogError::Timeout { .. } => GuardrailOutcome::Timeout,
                    _ => GuardrailOutcome::Failed,
                };
                let event = GuardrailEvent::new(
                    GuardrailModule::Watchdog,
                    watchdog_stage,
                    outcome,
                    code.as_str(),
                )
                .with_detail(reason.reason())
                .with_task_id(task_id.map(str::to_string));
                self.emit_best_effort(Receipt::GuardrailEvent(event)).await;
            }
            None => self.emit_stage_failed(stage, task_id, &reason).await,
        }
        Err(reason)
    }

    fn watchdog_for(&self, stage: GuardrailStage) -> Watchdog {
        let options = self
            .stage_options
            .get(&stage)
            .copied()
            .unwrap_or_default()
            .or(self.watchdog_defaults);
        Watchdog::new(options.resolve()).with_cancel_token(self.cancel_token.child_token())
    }

    async fn emit_rejection(&self, stage: GuardrailStage, task_id: &str, rejection: PacketRejection) {
        let event = GuardrailEvent::new(
            GuardrailModule::Logician,
            stage,
            GuardrailOutcome::Rejected,
            rejection.as_str(),
        )
        .with_task_id(Some(task_id.to_string()));
        self.emit_best_effort(Receipt::GuardrailEvent(event)).await;
    }

    async fn emit_stage_failed(&self, stage: PipelineStage, task_id: Option<&str>, reason: &HaltReason) {
        self.emit_best_effort(Receipt::StageFailed {
            task_id: task_id.map(str::to_string),
            stage,
            reason: reason.reason(),
        })
        .await;
    }

    /// 停机路径：receipt 失败只记录日志，保留原停机原因
    async fn emit_best_effort(&self, receipt: Receipt) {
        if let Err(e) = self.deps.receipt_sink.emit(&receipt).await {
            tracing::warn!(kind = receipt.kind(), error = %e, "receipt sink failed on halt path");
        }
    }

    /// 成功路径：receipt 失败即停机
    async fn emit_required(&self, receipt: Receipt) -> Result<(), HaltReason> {
        self.deps.receipt_sink.emit(&receipt).await.map_err(|e| {
            tracing::warn!(kind = receipt.kind(), error = %e, "receipt sink failed");
            HaltReason::ReceiptSinkFailed(truncate_detail(&e.to_string()))
        })
    }
}
