//! 自定义掉落引擎
//!
//! 根据玩家的游戏行为发放概率奖励，支持：
//! - 挖掘、食用、钓鱼、附魔四类触发
//! - YAML 规则编译与原子热替换
//! - 玩家加成权限、全局倍率与防刷冷却
//! - 奖励动作执行与玩家获取记录

pub mod acquisition;
pub mod bonus;
pub mod cli;
pub mod commands;
pub mod compiler;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod executor;
pub mod host;
pub mod matcher;
pub mod models;
pub mod probability;
pub mod snapshot;
pub mod store;
pub mod testing;

pub use acquisition::{FileAcquisitionLog, RetentionSweeper, SweepReport};
pub use commands::{CommandReply, CommandService};
pub use compiler::{ConfigWarning, SnapshotCompiler};
pub use engine::{DropEngine, DropEngineBuilder, EventOutcome, Exclusion, FiredReward};
pub use error::{DropError, Result};
pub use host::{AcquisitionLog, LogEntry, PermissionSource, Presenter, SkillPlacementTracker, Title};
pub use models::{
    Actor, BlockBreakEvent, BlockInfo, CatchState, ConsumeEvent, EnchantEvent, FishEvent, Tool,
    TriggerKind,
};
pub use probability::{Composition, Roller, ThreadRngRoller};
pub use snapshot::{ConfigurationSnapshot, RuleCounts};
pub use store::{ReloadOutcome, SnapshotStore};
