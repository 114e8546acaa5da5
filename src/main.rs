use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use geo_core::{init_logging, AppConfig};
use geo_infrastructure::init_metrics;
use geo_scheduler::{instance_id, wait_for_shutdown_signal, Application, ShutdownManager};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("geo-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("GEO内容发布调度系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径（未指定时按默认路径查找）"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别（覆盖配置文件）")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式（覆盖配置文件）")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("no-api")
                .long("no-api")
                .help("不启动运维API")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("默认路径")))?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
    if matches.get_flag("no-api") {
        config.api.enabled = false;
    }

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;
    init_metrics(&config.observability).context("初始化指标导出失败")?;

    info!("启动GEO内容发布调度系统");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let grace = Duration::from_secs(config.scheduler.shutdown_grace_seconds);
    let app = Arc::new(Application::new(config, instance_id()).await?);
    info!("实例标识: {}", app.instance_id());

    let shutdown_manager = ShutdownManager::new();
    let mut app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e:#}");
            }
        })
    };

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
        }
        result = &mut app_handle => {
            if let Err(e) = result {
                error!("应用任务异常结束: {e}");
            }
            return Err(anyhow::anyhow!("应用在收到关闭信号前退出"));
        }
    }
    shutdown_manager.shutdown().await;

    // 调度器自身最多等待 grace，这里再留出关闭API和连接池的时间
    match tokio::time::timeout(grace + Duration::from_secs(5), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("GEO内容发布调度系统已退出");
    Ok(())
}
