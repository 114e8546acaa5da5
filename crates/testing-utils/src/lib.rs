//! # GEO Testing Utils
//!
//! 各 crate 测试共用的内存实现与测试数据构造器。
//!
//! - **Mock Stores**: 所有存储接口的内存实现，行为与 SQLite 实现保持一致
//! - **Scripted Capabilities**: 按脚本返回结果的发布器 / 检测器 / 浏览器池
//! - **Builders**: 带合理默认值的测试数据构造器
//!
//! ```toml
//! [dev-dependencies]
//! geo-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
