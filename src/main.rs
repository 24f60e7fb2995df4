//! Arbiter 命令行入口
//!
//! `arbiter [TASK_JSON_PATH] [--config PATH]`：读取任务 JSON（文件或 stdin），
//! 以默认协作者运行流水线，输出终态 JSON。完成退出码 0，停机退出码 2。

use std::path::PathBuf;

use anyhow::{bail, Context};
use arbiter::{config::load_config, observability, run_task, DepsOverride};
use tokio::io::AsyncReadExt;

const EXIT_HALTED: i32 = 2;

struct CliArgs {
    task_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut task_path = None;
    let mut config_path = None;
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args.next().context("--config requires a path")?;
                config_path = Some(PathBuf::from(value));
            }
            "-" => task_path = None,
            flag if flag.starts_with('-') => bail!("unknown flag: {}", flag),
            path => {
                if task_path.is_some() {
                    bail!("only one task path may be given");
                }
                task_path = Some(PathBuf::from(path));
            }
        }
    }
    Ok(CliArgs {
        task_path,
        config_path,
    })
}

async fn read_task(path: Option<&PathBuf>) -> anyhow::Result<serde_json::Value> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read task file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read task from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Task input is not valid JSON")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = load_config(args.config_path).context("Failed to load config")?;
    let task = read_task(args.task_path.as_ref()).await?;

    let outcome = run_task(&config, &task, DepsOverride::new()).await;
    println!("{}", serde_json::to_string(&outcome)?);

    if !outcome.is_done() {
        std::process::exit(EXIT_HALTED);
    }
    Ok(())
}
