//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ARBITER__*` 覆盖（双下划线表示嵌套，如 `ARBITER__WATCHDOG__TIMEOUT_MS=5000`）。
//! 看门狗参数最后再叠加旧式环境变量 `ARBITER_WATCHDOG_TIMEOUT_MS` / `ARBITER_WATCHDOG_MAX_RETRIES`。

use std::path::PathBuf;

use serde::Deserialize;

use crate::guardrail::WatchdogOptions;
use crate::packet::MAX_OUTPUT_SUMMARY_CHARS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 流水线级看门狗默认值，未设置的字段落到内置默认
    #[serde(default)]
    pub watchdog: WatchdogOptions,
    #[serde(default)]
    pub packet: PacketSection,
    #[serde(default)]
    pub strategy: StrategySection,
    #[serde(default)]
    pub receipts: ReceiptsSection,
}

/// [packet] 段：默认构建器附带的引用
#[derive(Debug, Clone, Deserialize)]
pub struct PacketSection {
    #[serde(default = "default_citations")]
    pub citations: Vec<String>,
}

fn default_citations() -> Vec<String> {
    vec!["docs/README.md#Overview".into()]
}

impl Default for PacketSection {
    fn default() -> Self {
        Self {
            citations: default_citations(),
        }
    }
}

/// [strategy] 段：策略命令白名单（仅首词）、单条命令超时、摘要长度上限
#[derive(Debug, Clone, Deserialize)]
pub struct StrategySection {
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,
}

fn default_allowed_commands() -> Vec<String> {
    vec![
        "echo".into(),
        "ls".into(),
        "cat".into(),
        "node".into(),
        "npm".into(),
        "cargo".into(),
        "rustc".into(),
        "git".into(),
    ]
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_max_summary_chars() -> usize {
    MAX_OUTPUT_SUMMARY_CHARS
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            command_timeout_secs: default_command_timeout_secs(),
            max_summary_chars: default_max_summary_chars(),
        }
    }
}

/// [receipts] 段：JSONL 账本路径；未设置时 receipt 只写入 tracing 日志
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReceiptsSection {
    pub path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watchdog: WatchdogOptions::default(),
            packet: PacketSection::default(),
            strategy: StrategySection::default(),
            receipts: ReceiptsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 ARBITER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 ARBITER__*（双下划线表示嵌套键，列表用逗号分隔）
/// 4. 看门狗未配置的字段回落到旧式环境变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, skipped");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ARBITER")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("packet.citations")
            .with_list_parse_key("strategy.allowed_commands"),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.watchdog = cfg.watchdog.or(WatchdogOptions::from_env());
    Ok(cfg)
}
