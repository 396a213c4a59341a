//! CLI 模块
//!
//! 提供命令行接口，支持以下功能：
//!
//! - `check` - 编译规则文件并列出警告
//! - `simulate` - 用合成事件批量评估规则
//! - `logs` - 查询玩家最近的获取记录
//! - `sweep` - 执行一次过期记录清理
//! - `watch` - 常驻运行：规则热更新、定时清理、控制台指令
//!
//! # 使用示例
//!
//! ```bash
//! drop-engine check config/rules.yml
//! drop-engine simulate -n 10000 --permission cu.drop.150 --metrics
//! drop-engine logs Steve -d 7
//! drop-engine sweep --today 2024-05-01
//! drop-engine watch
//! ```

pub mod commands;
pub mod console;
pub mod runner;

pub use commands::{Cli, Commands};
pub use console::ConsolePresenter;
pub use runner::{CommandRunner, SimulationOptions, SimulationSummary};
