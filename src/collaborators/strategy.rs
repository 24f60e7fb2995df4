//! 默认策略执行器：按顺序执行任务包中的策略命令
//!
//! 仅允许白名单中的命令名（首词）；拒绝危险子串与 shell 控制符（命令串联、管道、重定向、替换），
//! 保证 sh -c 只执行一条白名单命令。单条命令带超时，
//! 取消令牌触发或超时时子进程随 future 一起被丢弃并 kill。

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::StrategySection;
use crate::packet::{ExecutionRecord, TaskCompletionPacket, TaskPacket, MAX_OUTPUT_SUMMARY_CHARS};
use crate::pipeline::StrategyExecutor;

const NO_OUTPUT: &str = "(no output)";

/// 禁止的命令/子串（即使首词在白名单中也不允许）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rm -r",
    "wget ",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
];

/// shell 控制符：串联、管道、后台、重定向、命令替换、换行
const SHELL_CONTROL: &[&str] = &["&&", "||", "|", "&", ";", ">", "<", "`", "$(", "\n", "\r"];

/// Shell 策略执行器
pub struct ShellStrategyExecutor {
    allowed_commands: HashSet<String>,
    timeout: Duration,
    max_summary_chars: usize,
}

impl ShellStrategyExecutor {
    pub fn new(allowed_commands: Vec<String>, timeout_secs: u64, max_summary_chars: usize) -> Self {
        let allowed_commands = allowed_commands
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            allowed_commands,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            max_summary_chars: max_summary_chars.clamp(1, MAX_OUTPUT_SUMMARY_CHARS),
        }
    }

    pub fn from_config(section: &StrategySection) -> Self {
        Self::new(
            section.allowed_commands.clone(),
            section.command_timeout_secs,
            section.max_summary_chars,
        )
    }

    fn check_allowed(&self, raw: &str) -> anyhow::Result<()> {
        let raw_lower = raw.to_lowercase();
        if let Some(forbidden) = FORBIDDEN_SUBSTR.iter().find(|f| raw_lower.contains(*f)) {
            bail!("forbidden pattern: {}", forbidden);
        }
        if let Some(op) = SHELL_CONTROL.iter().find(|op| raw.contains(*op)) {
            bail!("shell control operator {:?} not allowed", op);
        }
        let name = raw.split_whitespace().next().unwrap_or("").to_lowercase();
        if name.is_empty() {
            bail!("empty strategy command");
        }
        if !self.allowed_commands.contains(&name) {
            bail!("command '{}' not in allowlist", name);
        }
        Ok(())
    }

    /// stdout 优先，其次 stderr，均为空时记为 `(no output)`；超长截断
    fn summarize(&self, stdout: &[u8], stderr: &[u8]) -> String {
        let stdout = String::from_utf8_lossy(stdout);
        let stderr = String::from_utf8_lossy(stderr);
        let text = [stdout.trim(), stderr.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(NO_OUTPUT);
        let summary: String = text.chars().take(self.max_summary_chars).collect();
        summary.trim_end().to_string()
    }

    async fn run_one(&self, command: &str, cancel: &CancellationToken) -> anyhow::Result<ExecutionRecord> {
        self.check_allowed(command)?;
        tracing::info!(command = %command, "strategy command execute");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]).kill_on_drop(true);

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(anyhow!("cancelled while running '{}'", command)),
            res = tokio::time::timeout(self.timeout, cmd.output()) => res
                .map_err(|_| anyhow!("command timed out after {}s: {}", self.timeout.as_secs(), command))?
                .map_err(|e| anyhow!("failed to spawn '{}': {}", command, e))?,
        };

        let exit_code = i64::from(output.status.code().unwrap_or(-1));
        let summary = self.summarize(&output.stdout, &output.stderr);
        tracing::debug!(command = %command, exit_code, "strategy command finished");
        Ok(ExecutionRecord::new(command, exit_code, summary))
    }
}

#[async_trait]
impl StrategyExecutor for ShellStrategyExecutor {
    async fn execute(&self, packet: &TaskPacket, cancel: CancellationToken) -> anyhow::Result<TaskCompletionPacket> {
        if packet.strategy_commands.is_empty() {
            bail!("no strategy commands for task {}", packet.task_id);
        }

        let mut execution = Vec::with_capacity(packet.strategy_commands.len());
        let mut tests = Vec::with_capacity(packet.strategy_commands.len());
        for strategy in &packet.strategy_commands {
            let record = self.run_one(&strategy.command, &cancel).await?;
            let first_line = record.output_summary.lines().next().unwrap_or("").trim();
            tests.push(format!("executed:{}: {}", record.command, first_line));
            execution.push(record);
        }

        Ok(TaskCompletionPacket {
            task_id: packet.task_id.clone(),
            execution,
            tests: Some(tests),
            files_changed: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{compute_execution_digest, StrategyCommand};

    fn packet(commands: &[&str]) -> TaskPacket {
        TaskPacket {
            task_id: "T1".into(),
            query: "q".into(),
            context_pack: "## Context Pack".into(),
            citations: vec!["doc#1".into()],
            strategy_commands: commands.iter().map(|c| StrategyCommand::new(*c)).collect(),
        }
    }

    fn executor() -> ShellStrategyExecutor {
        ShellStrategyExecutor::new(vec!["echo".into(), "false".into(), "sleep".into()], 5, 4000)
    }

    #[tokio::test]
    async fn test_executes_allowed_commands() {
        let completion = executor()
            .execute(&packet(&["echo hello", "false"]), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(completion.task_id, "T1");
        assert_eq!(completion.execution.len(), 2);
        let first = &completion.execution[0];
        assert_eq!(first.exit_code, 0);
        assert_eq!(first.output_summary, "hello");
        assert_eq!(first.output_digest, compute_execution_digest("hello"));
        let second = &completion.execution[1];
        assert_eq!(second.exit_code, 1);
        assert_eq!(second.output_summary, NO_OUTPUT);
        assert_eq!(
            completion.tests.unwrap(),
            vec!["executed:echo hello: hello".to_string(), "executed:false: (no output)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejects_unlisted_command() {
        let err = executor()
            .execute(&packet(&["touch /tmp/x"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not in allowlist"));
    }

    #[tokio::test]
    async fn test_rejects_chained_commands() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("chained");
        let chained = [
            format!("echo ok && touch {}", marker.display()),
            format!("echo ok; touch {}", marker.display()),
            format!("echo ok | tee {}", marker.display()),
            format!("echo ok > {}", marker.display()),
            format!("echo ok\ntouch {}", marker.display()),
            "echo $(id)".to_string(),
        ];
        for command in &chained {
            let err = executor()
                .execute(&packet(&[command.as_str()]), CancellationToken::new())
                .await
                .unwrap_err();
            assert!(err.to_string().contains("not allowed"), "command: {command}");
        }
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_rejects_forbidden_substring() {
        let exec = ShellStrategyExecutor::new(vec!["rm".into()], 5, 4000);
        let err = exec
            .execute(&packet(&["rm -rf build"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("forbidden pattern"));
    }

    #[test]
    fn test_summary_limit_clamped_to_validator_limit() {
        let exec = ShellStrategyExecutor::new(vec![], 1, MAX_OUTPUT_SUMMARY_CHARS * 2);
        let long = "y".repeat(MAX_OUTPUT_SUMMARY_CHARS + 10);
        let summary = exec.summarize(long.as_bytes(), b"");
        assert_eq!(summary.chars().count(), MAX_OUTPUT_SUMMARY_CHARS);
    }

    #[tokio::test]
    async fn test_requires_commands() {
        let err = executor().execute(&packet(&[]), CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("no strategy commands"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_command() {
        let token = CancellationToken::new();
        token.cancel();
        let err = executor().execute(&packet(&["sleep 5"]), token).await.unwrap_err();
        assert!(err.to_string().starts_with("cancelled"));
    }

    #[test]
    fn test_summary_truncated() {
        let exec = ShellStrategyExecutor::new(vec![], 1, 5);
        assert_eq!(exec.summarize(b"abcdefgh", b""), "abcde");
        assert_eq!(exec.summarize(b"  ", b"warn\n"), "warn");
    }
}
