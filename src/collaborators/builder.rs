//! 默认任务包构建器：用配置中的引用拼出上下文包

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::packet::{TaskPacket, TaskRecord, UNKNOWN_TASK_ID};
use crate::pipeline::PacketBuilder;

/// 静态上下文构建器：每条引用生成一行 `- [citation] query`
#[derive(Debug, Clone, Default)]
pub struct StaticContextPacketBuilder {
    citations: Vec<String>,
}

impl StaticContextPacketBuilder {
    pub fn new(citations: Vec<String>) -> Self {
        let citations = citations
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        Self { citations }
    }

    fn context_pack(&self, query: &str) -> String {
        let mut pack = String::from("## Context Pack");
        for citation in &self.citations {
            pack.push_str(&format!("\n- [{}] {}", citation, query));
        }
        pack
    }
}

#[async_trait]
impl PacketBuilder for StaticContextPacketBuilder {
    async fn build(&self, task: &TaskRecord, _cancel: CancellationToken) -> anyhow::Result<TaskPacket> {
        let task_id = task
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_TASK_ID)
            .to_string();
        let query = task.query.as_deref().unwrap_or("").trim().to_string();

        tracing::debug!(task_id = %task_id, citations = self.citations.len(), "building static context packet");

        Ok(TaskPacket {
            context_pack: self.context_pack(&query),
            task_id,
            query,
            citations: self.citations.clone(),
            strategy_commands: task.strategy_commands.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_builds_context_lines() {
        let builder = StaticContextPacketBuilder::new(vec!["docs/a.md#A".into(), "  ".into(), "docs/b.md#B".into()]);
        let record = TaskRecord::from_value(&json!({
            "id": "T1",
            "query": "ship task",
            "strategyCommands": ["echo ok"]
        }));
        let packet = builder.build(&record, CancellationToken::new()).await.unwrap();
        assert_eq!(packet.task_id, "T1");
        assert_eq!(packet.citations.len(), 2);
        assert_eq!(
            packet.context_pack,
            "## Context Pack\n- [docs/a.md#A] ship task\n- [docs/b.md#B] ship task"
        );
        assert_eq!(packet.strategy_commands.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_id_uses_sentinel() {
        let builder = StaticContextPacketBuilder::new(vec![]);
        let packet = builder
            .build(&TaskRecord::from_value(&json!({"query": "q"})), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(packet.task_id, UNKNOWN_TASK_ID);
        assert!(packet.citations.is_empty());
    }
}
