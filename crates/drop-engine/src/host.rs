//! 宿主协作接口
//!
//! 引擎只通过这些 trait 与游戏服务器交互：权限查询、技能放置追踪、
//! 展示（控制台指令、广播、标题、动作栏、聊天）以及获取记录存储。
//! 宿主适配层负责实现它们并把游戏事件翻译成 [`crate::models`] 中的结构。

use crate::error::Result;
use crate::models::{Actor, BlockInfo};
use serde::{Deserialize, Serialize};

/// 权限来源
#[cfg_attr(test, mockall::automock)]
pub trait PermissionSource: Send + Sync {
    /// 列出玩家当前生效的全部权限
    fn permissions(&self, actor: &Actor) -> Vec<String>;
}

/// 技能插件的放置追踪（如 mcMMO）
#[cfg_attr(test, mockall::automock)]
pub trait SkillPlacementTracker: Send + Sync {
    /// 方块是否由玩家放置并被追踪
    fn is_tracked_placement(&self, block: &BlockInfo) -> bool;
}

/// 定时标题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub fade_in: i32,
    pub stay: i32,
    pub fade_out: i32,
    pub title: String,
    pub subtitle: String,
}

/// 展示与指令分发
#[cfg_attr(test, mockall::automock)]
pub trait Presenter: Send + Sync {
    /// 以控制台身份执行指令
    fn dispatch_command(&self, command: &str) -> Result<()>;

    /// 向全服广播
    fn broadcast(&self, message: &str) -> Result<()>;

    /// 向全部在线玩家展示标题
    fn broadcast_title(&self, title: &Title) -> Result<()>;

    fn send_title(&self, actor: &Actor, title: &Title) -> Result<()>;

    fn send_action_bar(&self, actor: &Actor, message: &str) -> Result<()>;

    fn send_message(&self, actor: &Actor, message: &str) -> Result<()>;
}

/// 一条获取记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// `YYYY-MM-DD HH:MM:SS`
    pub timestamp_label: String,
    /// `物品(来源)`
    pub text: String,
}

/// 获取记录存储
#[cfg_attr(test, mockall::automock)]
pub trait AcquisitionLog: Send + Sync {
    /// 记录一次获取，调用方不等待落盘
    fn record(&self, actor: &Actor, item_label: &str, source_label: &str);

    /// 查询最近 `days` 天（含今天）的记录，最新的一天在前，同一天内按记录顺序
    fn recent(&self, player_name: &str, days: u32) -> Result<Vec<LogEntry>>;
}
