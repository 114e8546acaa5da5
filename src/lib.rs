//! # GEO 发布调度系统
//!
//! 组装各 crate 的入口：
//!
//! - [`app`] - 根据配置创建存储、派发器和调度器，负责启动与关闭顺序
//! - [`shutdown`] - 关闭信号的广播与系统信号监听

pub mod app;
pub mod shutdown;

pub use app::{instance_id, Application};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};
