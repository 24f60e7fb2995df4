//! 包校验器（logician）
//!
//! 纯函数：返回 Ok 或一个具体的 PacketRejection，预期内的校验失败从不 panic。
//! 以 JSON 形状为准进行检查（外部协作者可能直接给出原始 JSON）；
//! 类型化的包先序列化为 JSON 再走同一套规则，保证 reason code 的判定顺序一致。

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::packet::{
    compute_execution_digest, is_digest_shaped, TaskCompletionPacket, VerificationPacket,
    MAX_OUTPUT_SUMMARY_CHARS,
};

/// 校验拒绝原因，每个 reason code 一个变体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketRejection {
    PacketNotObject,
    TaskIdMismatch,
    ExecutionMissing,
    ExecutionRecordInvalid,
    ExecutionDigestInvalid,
    TestsInvalid,
    FilesChangedInvalid,
    VerificationPacketInvalid,
}

impl PacketRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketRejection::PacketNotObject => "PACKET_NOT_OBJECT",
            PacketRejection::TaskIdMismatch => "TASK_ID_MISMATCH",
            PacketRejection::ExecutionMissing => "EXECUTION_MISSING",
            PacketRejection::ExecutionRecordInvalid => "EXECUTION_RECORD_INVALID",
            PacketRejection::ExecutionDigestInvalid => "EXECUTION_DIGEST_INVALID",
            PacketRejection::TestsInvalid => "TESTS_INVALID",
            PacketRejection::FilesChangedInvalid => "FILES_CHANGED_INVALID",
            PacketRejection::VerificationPacketInvalid => "VERIFICATION_PACKET_INVALID",
        }
    }
}

impl fmt::Display for PacketRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for PacketRejection {}

fn non_blank(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn task_id_matches(packet: &Map<String, Value>, expected_task_id: &str) -> bool {
    non_blank(packet.get("taskId")) == Some(expected_task_id)
}

fn is_string_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.iter().all(|item| non_blank(Some(item)).is_some()))
}

fn validate_execution_record(value: &Value) -> Result<(), PacketRejection> {
    let record = value.as_object().ok_or(PacketRejection::ExecutionRecordInvalid)?;

    let summary = record.get("outputSummary").and_then(Value::as_str).unwrap_or("");
    let digest = record.get("outputDigest").and_then(Value::as_str).unwrap_or("");
    // as_i64 对浮点返回 None，只接受严格整数 0
    let exit_ok = record.get("exitCode").and_then(Value::as_i64) == Some(0);
    let summary_len = summary.trim().chars().count();

    if non_blank(record.get("command")).is_none()
        || !exit_ok
        || summary_len == 0
        || summary_len > MAX_OUTPUT_SUMMARY_CHARS
    {
        return Err(PacketRejection::ExecutionRecordInvalid);
    }

    if !is_digest_shaped(digest) || compute_execution_digest(summary) != digest {
        return Err(PacketRejection::ExecutionDigestInvalid);
    }

    Ok(())
}

/// 校验原始 JSON 形式的任务完成包
pub fn validate_completion_value(packet: &Value, expected_task_id: &str) -> Result<(), PacketRejection> {
    let packet = packet.as_object().ok_or(PacketRejection::PacketNotObject)?;

    if !task_id_matches(packet, expected_task_id) {
        return Err(PacketRejection::TaskIdMismatch);
    }

    let execution = packet
        .get("execution")
        .and_then(Value::as_array)
        .filter(|records| !records.is_empty())
        .ok_or(PacketRejection::ExecutionMissing)?;

    execution.iter().try_for_each(validate_execution_record)?;

    if packet.get("tests").is_some_and(|tests| !is_string_list(tests)) {
        return Err(PacketRejection::TestsInvalid);
    }

    if packet
        .get("files_changed")
        .is_some_and(|files| !is_string_list(files))
    {
        return Err(PacketRejection::FilesChangedInvalid);
    }

    Ok(())
}

/// 校验类型化的任务完成包
pub fn validate_completion_packet(
    packet: &TaskCompletionPacket,
    expected_task_id: &str,
) -> Result<(), PacketRejection> {
    let value = serde_json::to_value(packet).map_err(|_| PacketRejection::PacketNotObject)?;
    validate_completion_value(&value, expected_task_id)
}

/// 校验原始 JSON 形式的验证包
pub fn validate_verification_value(packet: &Value, expected_task_id: &str) -> Result<(), PacketRejection> {
    let packet = packet
        .as_object()
        .ok_or(PacketRejection::VerificationPacketInvalid)?;

    if !task_id_matches(packet, expected_task_id) {
        return Err(PacketRejection::TaskIdMismatch);
    }

    if !packet.get("passed").is_some_and(Value::is_boolean) {
        return Err(PacketRejection::VerificationPacketInvalid);
    }

    Ok(())
}

/// 校验类型化的验证包
pub fn validate_verification_packet(
    packet: &VerificationPacket,
    expected_task_id: &str,
) -> Result<(), PacketRejection> {
    let value = serde_json::to_value(packet).map_err(|_| PacketRejection::VerificationPacketInvalid)?;
    validate_verification_value(&value, expected_task_id)
}
