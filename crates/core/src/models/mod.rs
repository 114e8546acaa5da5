//! # 数据模型
//!
//! 发布调度核心使用的数据结构：定时任务配置、待发布文章、执行记录、
//! 平台账号以及收录检测目标。
//!
//! ## 状态管理
//!
//! ### 文章发布状态流转
//! ```text
//! Generating → Scheduled → Publishing → Published
//!                  ↑            ↓
//!                  └──────── Failed
//! ```
//!
//! ### 定时任务状态流转
//! ```text
//! Registered → Active ⇄ Paused
//!                ↓
//!           Quarantined
//! ```
//!
//! 所有时间字段统一使用 `DateTime<Utc>`。

pub mod account;
pub mod article;
pub mod execution_log;
pub mod index_check;
pub mod scheduled_task;

pub use account::*;
pub use article::*;
pub use execution_log::*;
pub use index_check::*;
pub use scheduled_task::*;
