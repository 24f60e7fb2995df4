//! Receipt 类型：每个阶段边界发出的审计事件
//!
//! 序列化为带 `type` 标签的 JSON，供外部账本落盘。

use std::fmt;

use serde::Serialize;

use crate::core::PipelineStage;
use crate::packet::{TaskCompletionPacket, VerificationPacket};

/// 发出护栏事件的模块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailModule {
    Shield,
    Watchdog,
    Logician,
}

/// 护栏事件所在的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailStage {
    TaskInput,
    ContextPacket,
    BuildTaskPacket,
    StrategyExecution,
    ExecutorPacket,
    VerifySpec,
    SpecPacket,
    VerifyQuality,
    QualityPacket,
    IntegrationCheck,
    UxSimulation,
    OracleReview,
}

impl GuardrailStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailStage::TaskInput => "task_input",
            GuardrailStage::ContextPacket => "context_packet",
            GuardrailStage::BuildTaskPacket => "build_task_packet",
            GuardrailStage::StrategyExecution => "strategy_execution",
            GuardrailStage::ExecutorPacket => "executor_packet",
            GuardrailStage::VerifySpec => "verify_spec",
            GuardrailStage::SpecPacket => "spec_packet",
            GuardrailStage::VerifyQuality => "verify_quality",
            GuardrailStage::QualityPacket => "quality_packet",
            GuardrailStage::IntegrationCheck => "integration_check",
            GuardrailStage::UxSimulation => "ux_simulation",
            GuardrailStage::OracleReview => "oracle_review",
        }
    }

    /// halt reason 中使用的大写阶段名，如 `STRATEGY_EXECUTION`
    pub fn phase(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for GuardrailStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailOutcome {
    Blocked,
    Restart,
    Timeout,
    Failed,
    Rejected,
}

/// 护栏事件：扫描阻断、看门狗重启/超时、包校验拒绝
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailEvent {
    pub module: GuardrailModule,
    pub stage: GuardrailStage,
    pub outcome: GuardrailOutcome,
    pub reason_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

impl GuardrailEvent {
    pub fn new(
        module: GuardrailModule,
        stage: GuardrailStage,
        outcome: GuardrailOutcome,
        reason_code: impl Into<String>,
    ) -> Self {
        Self {
            module,
            stage,
            outcome,
            reason_code: reason_code.into(),
            detail: None,
            task_id: None,
            attempt: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_task_id(mut self, task_id: Option<String>) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }
}

/// 审核者（集成检查 / UX 模拟 / Oracle 评审）回执中的结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPacket {
    pub task_id: String,
    pub passed: bool,
    #[serde(rename = "journey_checks", skip_serializing_if = "Option::is_none")]
    pub journey_checks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<String>>,
}

/// 审计 receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Receipt {
    GuardrailEvent(GuardrailEvent),
    #[serde(rename_all = "camelCase")]
    ExecutorCompleted {
        task_id: String,
        packet: TaskCompletionPacket,
    },
    #[serde(rename_all = "camelCase")]
    VerifierSpec {
        task_id: String,
        passed: bool,
        packet: VerificationPacket,
    },
    #[serde(rename_all = "camelCase")]
    VerifierQuality {
        task_id: String,
        passed: bool,
        packet: VerificationPacket,
    },
    /// 协作者报错等没有护栏事件的停机
    #[serde(rename_all = "camelCase")]
    StageFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        stage: PipelineStage,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    IntegrationChecked { task_id: String, packet: ReviewPacket },
    #[serde(rename_all = "camelCase")]
    UxSimulated { task_id: String, packet: ReviewPacket },
    #[serde(rename_all = "camelCase")]
    OracleReviewed { task_id: String, packet: ReviewPacket },
}

impl Receipt {
    /// `type` 标签值
    pub fn kind(&self) -> &'static str {
        match self {
            Receipt::GuardrailEvent(_) => "GUARDRAIL_EVENT",
            Receipt::ExecutorCompleted { .. } => "EXECUTOR_COMPLETED",
            Receipt::VerifierSpec { .. } => "VERIFIER_SPEC",
            Receipt::VerifierQuality { .. } => "VERIFIER_QUALITY",
            Receipt::StageFailed { .. } => "STAGE_FAILED",
            Receipt::IntegrationChecked { .. } => "INTEGRATION_CHECKED",
            Receipt::UxSimulated { .. } => "UX_SIMULATED",
            Receipt::OracleReviewed { .. } => "ORACLE_REVIEWED",
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            Receipt::GuardrailEvent(event) => event.task_id.as_deref(),
            Receipt::StageFailed { task_id, .. } => task_id.as_deref(),
            Receipt::ExecutorCompleted { task_id, .. }
            | Receipt::VerifierSpec { task_id, .. }
            | Receipt::VerifierQuality { task_id, .. }
            | Receipt::IntegrationChecked { task_id, .. }
            | Receipt::UxSimulated { task_id, .. }
            | Receipt::OracleReviewed { task_id, .. } => Some(task_id),
        }
    }

    pub fn as_guardrail_event(&self) -> Option<&GuardrailEvent> {
        match self {
            Receipt::GuardrailEvent(event) => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guardrail_event_wire_shape() {
        let receipt = Receipt::GuardrailEvent(
            GuardrailEvent::new(
                GuardrailModule::Shield,
                GuardrailStage::TaskInput,
                GuardrailOutcome::Blocked,
                "PROMPT_INJECTION_PATTERN",
            )
            .with_detail("PARANOIA_MODE_BLOCKED:PROMPT_INJECTION_PATTERN")
            .with_task_id(Some("TASK-SHIELD".into())),
        );
        assert_eq!(
            serde_json::to_value(&receipt).unwrap(),
            json!({
                "type": "GUARDRAIL_EVENT",
                "module": "shield",
                "stage": "task_input",
                "outcome": "blocked",
                "reasonCode": "PROMPT_INJECTION_PATTERN",
                "detail": "PARANOIA_MODE_BLOCKED:PROMPT_INJECTION_PATTERN",
                "taskId": "TASK-SHIELD"
            })
        );
    }

    #[test]
    fn test_verifier_receipt_wire_shape() {
        let receipt = Receipt::VerifierSpec {
            task_id: "T1".into(),
            passed: false,
            packet: VerificationPacket::new("T1", false),
        };
        assert_eq!(receipt.kind(), "VERIFIER_SPEC");
        assert_eq!(
            serde_json::to_value(&receipt).unwrap(),
            json!({
                "type": "VERIFIER_SPEC",
                "taskId": "T1",
                "passed": false,
                "packet": {"taskId": "T1", "passed": false}
            })
        );
    }

    #[test]
    fn test_stage_failed_wire_shape() {
        let receipt = Receipt::StageFailed {
            task_id: None,
            stage: PipelineStage::PacketBuild,
            reason: "TASK_ID_MISSING".into(),
        };
        assert_eq!(
            serde_json::to_value(&receipt).unwrap(),
            json!({"type": "STAGE_FAILED", "stage": "PACKET_BUILD", "reason": "TASK_ID_MISSING"})
        );
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(GuardrailStage::StrategyExecution.phase(), "STRATEGY_EXECUTION");
        assert_eq!(GuardrailStage::BuildTaskPacket.phase(), "BUILD_TASK_PACKET");
    }
}
