//! 停机原因（halt reason）
//!
//! 两类来源：护栏拒绝（扫描阻断、包校验失败、看门狗超时/重启失败）与协作者报错。
//! Display 即对外的 reason 字符串，如 `PARANOIA_MODE_BLOCKED:PROMPT_INJECTION_PATTERN`。

use thiserror::Error;

use crate::guardrail::{PacketRejection, ShieldReason, WatchdogCode};
use crate::receipt::GuardrailStage;

/// 协作者错误信息截断长度（字符）
pub const DETAIL_LIMIT: usize = 60;

/// 任务停机原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    #[error("PARANOIA_MODE_BLOCKED:{0}")]
    ParanoiaBlocked(ShieldReason),

    #[error("{code}:{}", .stage.phase())]
    Watchdog {
        code: WatchdogCode,
        stage: GuardrailStage,
    },

    #[error("TASK_PACKET_BUILD_FAILED: {0}")]
    PacketBuildFailed(String),

    #[error("TASK_ID_MISSING")]
    TaskIdMissing,

    #[error("CONTEXT_PACK_REQUIRED")]
    ContextPackRequired,

    #[error("TASK_STRATEGY_FAILED: {0}")]
    StrategyFailed(String),

    #[error("LOGICIAN_EXECUTOR_PACKET_INVALID:{0}")]
    ExecutorPacketInvalid(PacketRejection),

    #[error("LOGICIAN_VERIFIER_PACKET_INVALID:{0}")]
    VerifierPacketInvalid(PacketRejection),

    /// 校验器给出 passed=false 或任务 ID 不匹配
    #[error("SPEC_VERIFICATION_FAILED")]
    SpecVerificationFailed,

    #[error("SPEC_VERIFICATION_FAILED: {0}")]
    SpecVerifierError(String),

    #[error("QUALITY_VERIFICATION_FAILED")]
    QualityVerificationFailed,

    #[error("QUALITY_VERIFICATION_FAILED: {0}")]
    QualityVerifierError(String),

    #[error("INTEGRATION_CHECK_FAILED: {0}")]
    IntegrationCheckFailed(String),

    #[error("UX_SIMULATION_FAILED: {0}")]
    UxSimulationFailed(String),

    #[error("ORACLE_REVIEW_FAILED: {0}")]
    OracleReviewFailed(String),

    /// 成功路径上 receipt 无法落盘
    #[error("RECEIPT_SINK_FAILED: {0}")]
    ReceiptSinkFailed(String),
}

impl HaltReason {
    /// 对外的 reason 字符串
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// 协作者错误信息：去除首尾空白，超过 DETAIL_LIMIT 个字符时截断并追加 `...`
pub fn truncate_detail(message: &str) -> String {
    let message = message.trim();
    if message.chars().count() > DETAIL_LIMIT {
        let head: String = message.chars().take(DETAIL_LIMIT).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}
