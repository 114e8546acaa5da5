//! 调度指标
//!
//! 指标在各组件中直接通过 `metrics` 宏记录，这里负责登记说明并安装导出器。

use std::net::SocketAddr;

use anyhow::{Context, Result};
use geo_core::config::models::ObservabilityConfig;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// 登记所有指标的说明
pub fn describe_metrics() {
    describe_counter!("geo_dispatch_total", "派发次数，按任务和结果区分");
    describe_histogram!(
        "geo_dispatch_duration_seconds",
        Unit::Seconds,
        "单次派发耗时"
    );
    describe_histogram!(
        "geo_slot_wait_seconds",
        Unit::Seconds,
        "等待并发槽位的时间"
    );
    describe_counter!("geo_slot_busy_total", "等待超时未拿到并发槽位的次数");
    describe_counter!("geo_job_runs_total", "定时任务运行次数，按任务和结果区分");
    describe_counter!("geo_job_skipped_total", "因上一次运行未结束而跳过的触发次数");
    describe_counter!("geo_notifications_total", "发出的通知数量，按事件区分");
}

/// 安装 Prometheus 导出器
///
/// 需要在 tokio 运行时内调用，导出器的 HTTP 监听任务会挂在当前运行时上。
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.metrics_enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .metrics_bind_address
        .parse()
        .with_context(|| format!("指标监听地址无效: {}", config.metrics_bind_address))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus导出器失败")?;

    describe_metrics();
    info!("Prometheus 指标导出已启动: {}", addr);
    Ok(())
}
