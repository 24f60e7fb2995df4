//! 流水线阶段与终态
//!
//! INPUT_SCAN → PACKET_BUILD → CONTEXT_SCAN → STRATEGY_EXECUTION → COMPLETION_VALIDATION
//! → SPEC_VERIFICATION → QUALITY_VERIFICATION → [INTEGRATION_CHECK] → [UX_SIMULATION]
//! → [ORACLE_REVIEW] → DONE；任一阶段可提前以 HALT_AND_ASK 结束。

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::core::HaltReason;

/// 流水线阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    InputScan,
    PacketBuild,
    ContextScan,
    StrategyExecution,
    CompletionValidation,
    SpecVerification,
    QualityVerification,
    IntegrationCheck,
    UxSimulation,
    OracleReview,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::InputScan => "INPUT_SCAN",
            PipelineStage::PacketBuild => "PACKET_BUILD",
            PipelineStage::ContextScan => "CONTEXT_SCAN",
            PipelineStage::StrategyExecution => "STRATEGY_EXECUTION",
            PipelineStage::CompletionValidation => "COMPLETION_VALIDATION",
            PipelineStage::SpecVerification => "SPEC_VERIFICATION",
            PipelineStage::QualityVerification => "QUALITY_VERIFICATION",
            PipelineStage::IntegrationCheck => "INTEGRATION_CHECK",
            PipelineStage::UxSimulation => "UX_SIMULATION",
            PipelineStage::OracleReview => "ORACLE_REVIEW",
            PipelineStage::Done => "DONE",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务终态
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// 全部审核通过
    Done,
    /// 需要外部介入
    HaltAndAsk(HaltReason),
}

impl TaskOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskOutcome::Done)
    }

    pub fn halt_reason(&self) -> Option<&HaltReason> {
        match self {
            TaskOutcome::Done => None,
            TaskOutcome::HaltAndAsk(reason) => Some(reason),
        }
    }

    /// 停机原因字符串；Done 时为 None
    pub fn reason(&self) -> Option<String> {
        self.halt_reason().map(HaltReason::reason)
    }
}

/// `{"type":"TASK_DONE"}` 或 `{"type":"HALT_AND_ASK","reason":"..."}`
impl Serialize for TaskOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TaskOutcome::Done => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", "TASK_DONE")?;
                map.end()
            }
            TaskOutcome::HaltAndAsk(reason) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "HALT_AND_ASK")?;
                map.serialize_entry("reason", &reason.reason())?;
                map.end()
            }
        }
    }
}
