//! 阶段间数据类型
//!
//! TaskRecord 由调用方的原始 JSON 归一化而来；TaskPacket 由外部构建器生成；
//! TaskCompletionPacket 由策略执行器返回；VerificationPacket 由校验器返回。
//! 所有包在单次运行内只读，按引用在阶段间传递。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 构建器无法确定任务 ID 时使用的哨兵值
pub const UNKNOWN_TASK_ID: &str = "UNKNOWN_TASK";

/// 策略命令（一条待执行的命令行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCommand {
    pub command: String,
}

impl StrategyCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// 接受字符串或 `{"command": "..."}` 对象；空白命令丢弃，其它形状忽略
    pub fn normalize_list(raw: Option<&Value>) -> Vec<StrategyCommand> {
        let Some(Value::Array(items)) = raw else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(map) => map.get("command").and_then(Value::as_str),
                _ => None,
            })
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(StrategyCommand::new)
            .collect()
    }
}

/// 归一化后的任务记录：只保留已知字段，可选开关默认 false
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: Option<String>,
    pub query: Option<String>,
    pub noop: bool,
    pub requires_integration_check: bool,
    pub ux_sensitive: bool,
    pub requires_oracle_review: bool,
    pub strategy_commands: Vec<StrategyCommand>,
}

impl TaskRecord {
    /// 从任意 JSON 归一化；非对象输入得到全默认记录
    pub fn from_value(raw: &Value) -> Self {
        let string_field = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
        let flag = |key: &str| raw.get(key).and_then(Value::as_bool) == Some(true);
        Self {
            id: string_field("id"),
            query: string_field("query"),
            noop: flag("noop"),
            requires_integration_check: flag("requiresIntegrationCheck"),
            ux_sensitive: flag("uxSensitive"),
            requires_oracle_review: flag("requiresOracleReview"),
            strategy_commands: StrategyCommand::normalize_list(raw.get("strategyCommands")),
        }
    }
}

/// 任务包：查询 + 上下文包 + 引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPacket {
    pub task_id: String,
    pub query: String,
    pub context_pack: String,
    pub citations: Vec<String>,
    #[serde(default)]
    pub strategy_commands: Vec<StrategyCommand>,
}

impl TaskPacket {
    /// 用于二次扫描的视图（任务 ID、查询、上下文、引用、策略命令）
    pub fn scan_view(&self) -> Value {
        serde_json::json!({
            "taskId": self.task_id,
            "query": self.query,
            "contextPack": self.context_pack,
            "citations": self.citations,
            "strategyCommands": self.strategy_commands,
        })
    }
}

/// 单条执行记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub command: String,
    pub exit_code: i64,
    pub output_summary: String,
    pub output_digest: String,
}

impl ExecutionRecord {
    /// 按摘要计算 digest 构造记录
    pub fn new(command: impl Into<String>, exit_code: i64, output_summary: impl Into<String>) -> Self {
        let output_summary = output_summary.into();
        Self {
            command: command.into(),
            exit_code,
            output_digest: super::compute_execution_digest(&output_summary),
            output_summary,
        }
    }
}

/// 任务完成包（策略执行器产出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletionPacket {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub execution: Vec<ExecutionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<Vec<String>>,
}

/// 验证包（spec / quality 校验器产出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPacket {
    pub task_id: String,
    pub passed: bool,
}

impl VerificationPacket {
    pub fn new(task_id: impl Into<String>, passed: bool) -> Self {
        Self {
            task_id: task_id.into(),
            passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_record_defaults_flags() {
        let record = TaskRecord::from_value(&json!({
            "id": "T1",
            "query": "ship task",
            "noop": "yes",
            "uxSensitive": true,
            "extra": 42
        }));
        assert_eq!(record.id.as_deref(), Some("T1"));
        assert_eq!(record.query.as_deref(), Some("ship task"));
        assert!(!record.noop);
        assert!(record.ux_sensitive);
        assert!(!record.requires_integration_check);
        assert!(!record.requires_oracle_review);
    }

    #[test]
    fn test_task_record_from_non_object() {
        assert_eq!(TaskRecord::from_value(&json!("ship")), TaskRecord::default());
    }

    #[test]
    fn test_strategy_commands_normalized() {
        let record = TaskRecord::from_value(&json!({
            "strategyCommands": ["node --version", {"command": " cargo test "}, "  ", 7, {"cmd": "x"}]
        }));
        assert_eq!(
            record.strategy_commands,
            vec![StrategyCommand::new("node --version"), StrategyCommand::new("cargo test")]
        );
    }

    #[test]
    fn test_completion_packet_wire_names() {
        let packet = TaskCompletionPacket {
            task_id: "T1".into(),
            execution: vec![ExecutionRecord::new("node --version", 0, "v20.0.0")],
            tests: None,
            files_changed: Some(vec!["src/lib.rs".into()]),
        };
        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(value["taskId"], "T1");
        assert_eq!(value["execution"][0]["exitCode"], 0);
        assert!(value["execution"][0]["outputDigest"].is_string());
        assert!(value.get("tests").is_none());
        assert_eq!(value["files_changed"][0], "src/lib.rs");
    }
}
