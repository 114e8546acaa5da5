//! # 基础设施
//!
//! - [`database`] - SQLite 存储实现与表结构初始化
//! - [`automation`] - 浏览器自动化服务的 HTTP 桥接
//! - [`browser_pool`] - 按平台复用的浏览器上下文
//! - [`observability`] - 指标导出与通知出口

pub mod automation;
pub mod browser_pool;
pub mod database;
pub mod error_handling;
pub mod observability;

pub use automation::{
    index_checker_registry, publisher_registry, AutomationClient, HttpIndexChecker, HttpPublisher,
};
pub use browser_pool::SharedBrowserPool;
pub use database::*;
pub use observability::*;
