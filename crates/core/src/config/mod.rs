//! 配置管理
//!
//! 配置按 默认值 → TOML文件 → 环境变量（`GEO_` 前缀）的顺序叠加，
//! 加载完成后逐段校验。
//!
//! ```rust,no_run
//! use geo_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/geo.toml")).unwrap();
//! println!("并发上限: {}", config.scheduler.max_concurrent_jobs);
//! ```

pub mod models;

pub use models::*;
