//! 可观测性
//!
//! - [`metrics_collector`] - 指标描述与 Prometheus 导出
//! - [`notifier`] - 基于 tracing 的通知出口

pub mod metrics_collector;
pub mod notifier;

pub use metrics_collector::{describe_metrics, init_metrics};
pub use notifier::TracingNotifier;
