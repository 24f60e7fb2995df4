//! Receipt 落点
//!
//! - TracingReceiptSink：以结构化 JSON 审计日志输出（默认）
//! - MemoryReceiptSink：内存收集，供嵌入方与测试读取
//! - JsonlReceiptSink：追加写入 JSONL 账本，每行 `{ts, runId, receipt}`
//!
//! 多个任务并发运行时可共享同一个 sink；单次运行内的顺序由调用方保证。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::receipt::Receipt;

/// Receipt 落点 trait：不得无限期阻塞
#[async_trait]
pub trait ReceiptSink: Send + Sync {
    async fn emit(&self, receipt: &Receipt) -> anyhow::Result<()>;
}

/// 输出到 tracing 的审计日志
#[derive(Debug, Default)]
pub struct TracingReceiptSink;

#[async_trait]
impl ReceiptSink for TracingReceiptSink {
    async fn emit(&self, receipt: &Receipt) -> anyhow::Result<()> {
        let audit = serde_json::to_string(receipt)?;
        tracing::info!(kind = receipt.kind(), audit = %audit, "receipt");
        Ok(())
    }
}

/// 内存收集
#[derive(Debug, Default)]
pub struct MemoryReceiptSink {
    receipts: Mutex<Vec<Receipt>>,
}

impl MemoryReceiptSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已收集 receipt 的快照
    pub async fn receipts(&self) -> Vec<Receipt> {
        self.receipts.lock().await.clone()
    }

    pub async fn kinds(&self) -> Vec<&'static str> {
        self.receipts.lock().await.iter().map(Receipt::kind).collect()
    }
}

#[async_trait]
impl ReceiptSink for MemoryReceiptSink {
    async fn emit(&self, receipt: &Receipt) -> anyhow::Result<()> {
        self.receipts.lock().await.push(receipt.clone());
        Ok(())
    }
}

/// JSONL 账本：同一进程内串行追加
#[derive(Debug)]
pub struct JsonlReceiptSink {
    path: PathBuf,
    run_id: String,
    write_lock: Mutex<()>,
}

impl JsonlReceiptSink {
    /// run_id 随机生成（uuid v4）
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_run_id(path, uuid::Uuid::new_v4().to_string())
    }

    pub fn with_run_id(path: impl AsRef<Path>, run_id: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            run_id: run_id.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReceiptSink for JsonlReceiptSink {
    async fn emit(&self, receipt: &Receipt) -> anyhow::Result<()> {
        let line = serde_json::json!({
            "ts": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "runId": self.run_id,
            "receipt": receipt,
        });
        let mut payload = serde_json::to_string(&line)?;
        payload.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::VerificationPacket;

    fn spec_receipt(task_id: &str) -> Receipt {
        Receipt::VerifierSpec {
            task_id: task_id.into(),
            passed: true,
            packet: VerificationPacket::new(task_id, true),
        }
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemoryReceiptSink::new();
        sink.emit(&spec_receipt("A")).await.unwrap();
        sink.emit(&spec_receipt("B")).await.unwrap();
        let ids: Vec<_> = sink
            .receipts()
            .await
            .iter()
            .map(|r| r.task_id().unwrap_or_default().to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_envelopes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger").join("receipts.jsonl");
        let sink = JsonlReceiptSink::with_run_id(&path, "run-test");
        sink.emit(&spec_receipt("T1")).await.unwrap();
        sink.emit(&spec_receipt("T2")).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["runId"], "run-test");
        assert_eq!(lines[0]["receipt"]["type"], "VERIFIER_SPEC");
        assert_eq!(lines[1]["receipt"]["taskId"], "T2");
        assert!(lines[0]["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_receipts() {
        assert!(TracingReceiptSink.emit(&spec_receipt("T1")).await.is_ok());
    }
}
