//! 共享库
//!
//! 包含掉落引擎与 CLI 共用的配置加载、规则文件热更新和可观测性基础设施代码。

pub mod config;
pub mod config_watcher;
pub mod observability;
