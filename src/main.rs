// ==========================================
// 财务导入引擎 - 命令行入口
// ==========================================
// 用法:
//   ledger-import [--db PATH] [--json-log] list
//   ledger-import [--db PATH] validate <processor_id> <file> --period YYYY-MM --ou OU
//   ledger-import [--db PATH] run <processor_id> <file> --period YYYY-MM --ou OU
//                 [--scenario S] [--skip-validation] [--stop-on-error]
// 输出: JSON（结果信封）
// ==========================================

use anyhow::{anyhow, bail, Context};
use ledger_import::db::open_sqlite_connection;
use ledger_import::{
    logging, ConfigManager, ImportOptions, ImportRegistry, ReportingPeriod,
    StagingRepositoryImpl,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const DB_PATH_ENV: &str = "LEDGER_IMPORT_DB_PATH";

/// 默认数据库路径: 环境变量 → 用户数据目录 → 当前目录
fn default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./ledger_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("ledger-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("ledger_import.db");
        }
    }
    path.to_string_lossy().to_string()
}

enum Command {
    List,
    Validate(RunArgs),
    Run(RunArgs),
}

struct RunArgs {
    processor_id: String,
    file: PathBuf,
    options: ImportOptions,
}

struct Cli {
    db_path: String,
    json_log: bool,
    command: Command,
}

fn usage() -> &'static str {
    "用法: ledger-import [--db PATH] [--json-log] <list | validate | run> ...\n\
     \x20 run <processor_id> <file> --period YYYY-MM --ou OU [--scenario S] [--skip-validation] [--stop-on-error]"
}

fn parse_args(args: Vec<String>) -> anyhow::Result<Cli> {
    let mut db_path = None;
    let mut json_log = false;
    let mut positional = Vec::new();
    let mut period = None;
    let mut ou = None;
    let mut scenario = None;
    let mut skip_validation = false;
    let mut stop_on_error = false;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--db" => db_path = Some(iter.next().context("--db 缺少参数")?),
            "--json-log" => json_log = true,
            "--period" => {
                let raw = iter.next().context("--period 缺少参数")?;
                period = Some(
                    ReportingPeriod::parse(&raw).ok_or_else(|| anyhow!("无法识别的报告期: {}", raw))?,
                );
            }
            "--ou" => ou = Some(iter.next().context("--ou 缺少参数")?),
            "--scenario" => scenario = Some(iter.next().context("--scenario 缺少参数")?),
            "--skip-validation" => skip_validation = true,
            "--stop-on-error" => stop_on_error = true,
            "-h" | "--help" => bail!(usage()),
            other if other.starts_with("--") => bail!("未知参数: {}\n{}", other, usage()),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("list") => Command::List,
        Some(name @ ("run" | "validate")) => {
            let processor_id = positional.next().context("缺少 processor_id")?;
            let file = PathBuf::from(positional.next().context("缺少文件路径")?);
            let period = period.context("缺少 --period")?;
            let ou = ou.context("缺少 --ou")?;

            let mut options = ImportOptions::new(period, ou);
            options.scenario = scenario;
            options.skip_validation = skip_validation;
            options.stop_on_error = stop_on_error;

            let run_args = RunArgs {
                processor_id,
                file,
                options,
            };
            if name == "run" {
                Command::Run(run_args)
            } else {
                Command::Validate(run_args)
            }
        }
        Some(other) => bail!("未知命令: {}\n{}", other, usage()),
        None => bail!(usage()),
    };

    Ok(Cli {
        db_path: db_path.unwrap_or_else(default_db_path),
        json_log,
        command,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_args(std::env::args().skip(1).collect())?;

    if cli.json_log {
        logging::init_json();
    } else {
        logging::init();
    }
    tracing::info!(
        version = ledger_import::VERSION,
        db = %cli.db_path,
        "{}",
        ledger_import::APP_NAME
    );

    // 网关与配置共用同一连接
    let conn = Arc::new(Mutex::new(open_sqlite_connection(&cli.db_path)?));
    let gateway = Arc::new(StagingRepositoryImpl::from_connection(conn.clone())?);
    let config = Arc::new(ConfigManager::from_connection(conn)?);
    let registry = ImportRegistry::new(gateway, config);
    registry.initialize()?;

    let output = match cli.command {
        Command::List => serde_json::to_string_pretty(&registry.list_processors())?,
        Command::Validate(args) => {
            let outcome = registry
                .validate(&args.processor_id, &args.file, &args.options)
                .await;
            serde_json::to_string_pretty(&outcome)?
        }
        Command::Run(args) => {
            // Ctrl-C: 在下一个检查点（解析前后、驱逐前、批次之间）停止
            let token = CancellationToken::new();
            let signal_token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("收到中断信号, 正在取消导入");
                    signal_token.cancel();
                }
            });

            let options = args.options.with_cancel(token);
            let outcome = registry
                .execute(&args.processor_id, &args.file, &options)
                .await;
            serde_json::to_string_pretty(&outcome)?
        }
    };

    println!("{}", output);
    Ok(())
}
