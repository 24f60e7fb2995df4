//! 看门狗：超时 + 有限重试的受监管调用
//!
//! 每次尝试得到一个新的子 CancellationToken；超时后取消该 token 并丢弃尝试的 future，
//! 若仍有重试额度，先串行执行可选的 RestartHook，再开始新一轮尝试。
//! 非超时错误立即透传，不参与重试。

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// 进程入口层读取的环境变量
pub const TIMEOUT_ENV: &str = "ARBITER_WATCHDOG_TIMEOUT_MS";
pub const MAX_RETRIES_ENV: &str = "ARBITER_WATCHDOG_MAX_RETRIES";

/// 看门狗错误码（用于 receipt 与 halt reason）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogCode {
    Timeout,
    RestartFailed,
}

impl WatchdogCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchdogCode::Timeout => "WATCHDOG_TIMEOUT",
            WatchdogCode::RestartFailed => "WATCHDOG_RESTART_FAILED",
        }
    }
}

impl fmt::Display for WatchdogCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("Watchdog timeout in {operation} at attempt {attempt}")]
    Timeout { operation: String, attempt: u32 },

    #[error("Watchdog restart failed in {operation} at attempt {attempt}: {message}")]
    RestartFailed {
        operation: String,
        attempt: u32,
        message: String,
    },

    /// 被监管的调用自身返回的错误
    #[error(transparent)]
    Task(anyhow::Error),
}

impl WatchdogError {
    /// 监管类错误返回对应错误码；Task 错误返回 None
    pub fn code(&self) -> Option<WatchdogCode> {
        match self {
            WatchdogError::Timeout { .. } => Some(WatchdogCode::Timeout),
            WatchdogError::RestartFailed { .. } => Some(WatchdogCode::RestartFailed),
            WatchdogError::Task(_) => None,
        }
    }
}

/// 可分层的看门狗参数：单次调用 → 流水线默认 → 环境变量 → 内置默认
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct WatchdogOptions {
    /// 单次尝试超时（毫秒）；0 视为未设置
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

impl WatchdogOptions {
    pub fn new(timeout_ms: u64, max_retries: u32) -> Self {
        Self {
            timeout_ms: Some(timeout_ms),
            max_retries: Some(max_retries),
        }
    }

    /// 本层未设置的字段取 fallback 的值
    pub fn or(self, fallback: WatchdogOptions) -> WatchdogOptions {
        WatchdogOptions {
            timeout_ms: self.timeout_ms.filter(|ms| *ms > 0).or(fallback.timeout_ms),
            max_retries: self.max_retries.or(fallback.max_retries),
        }
    }

    /// 读取 ARBITER_WATCHDOG_* 环境变量（仅进程入口层调用）
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var(TIMEOUT_ENV).ok().as_deref(),
            std::env::var(MAX_RETRIES_ENV).ok().as_deref(),
        )
    }

    /// 解析原始字符串；非法或负数忽略
    pub fn from_vars(timeout_ms: Option<&str>, max_retries: Option<&str>) -> Self {
        Self {
            timeout_ms: timeout_ms
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .filter(|ms| *ms > 0),
            max_retries: max_retries.and_then(|raw| raw.trim().parse::<u32>().ok()),
        }
    }

    /// 补齐内置默认值
    pub fn resolve(self) -> WatchdogSettings {
        WatchdogSettings {
            timeout: Duration::from_millis(
                self.timeout_ms.filter(|ms| *ms > 0).unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        }
    }
}

/// 已解析的看门狗参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        WatchdogOptions::default().resolve()
    }
}

/// 重启回调收到的上下文
#[derive(Debug)]
pub struct RestartContext<'a> {
    pub operation: &'a str,
    /// 刚刚超时的尝试序号（从 1 开始）
    pub attempt: u32,
    pub error: &'a WatchdogError,
}

/// 超时后、下一次尝试前执行的回调；返回 Err 则终止并报告 RestartFailed
#[async_trait]
pub trait RestartHook: Send + Sync {
    async fn on_restart(&self, ctx: RestartContext<'_>) -> anyhow::Result<()>;
}

/// 看门狗：持有解析后的参数与父级取消令牌
#[derive(Debug, Clone)]
pub struct Watchdog {
    settings: WatchdogSettings,
    cancel_token: CancellationToken,
}

impl Watchdog {
    pub fn new(settings: WatchdogSettings) -> Self {
        Self {
            settings,
            cancel_token: CancellationToken::new(),
        }
    }

    /// 使用外部令牌作为父级（外部取消会传递到每次尝试）
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn settings(&self) -> WatchdogSettings {
        self.settings
    }

    /// 在超时与重试预算内执行 `attempt_fn`；每次尝试传入新的子令牌
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        mut attempt_fn: F,
        hook: Option<&dyn RestartHook>,
    ) -> Result<T, WatchdogError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let total_attempts = self.settings.max_retries.saturating_add(1);

        for attempt in 1..=total_attempts {
            let token = self.cancel_token.child_token();
            let outcome = tokio::time::timeout(self.settings.timeout, attempt_fn(token.clone())).await;

            let timeout_err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => return Err(WatchdogError::Task(e)),
                Err(_) => {
                    token.cancel();
                    WatchdogError::Timeout {
                        operation: operation.to_string(),
                        attempt,
                    }
                }
            };

            tracing::warn!(
                operation,
                attempt,
                timeout_ms = self.settings.timeout.as_millis() as u64,
                "watchdog attempt timed out"
            );

            if attempt >= total_attempts {
                return Err(timeout_err);
            }

            if let Some(hook) = hook {
                let ctx = RestartContext {
                    operation,
                    attempt,
                    error: &timeout_err,
                };
                if let Err(e) = hook.on_restart(ctx).await {
                    return Err(WatchdogError::RestartFailed {
                        operation: operation.to_string(),
                        attempt,
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(WatchdogError::Timeout {
            operation: operation.to_string(),
            attempt: total_attempts,
        })
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(WatchdogSettings::default())
    }
}
