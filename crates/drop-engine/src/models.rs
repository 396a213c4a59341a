//! 事件与原始配置模型
//!
//! 宿主适配层把游戏事件翻译成这里的纯数据结构后交给引擎；
//! 规则文件先解析成 [`RawConfig`]，再由编译器逐条校验生成快照。

use crate::error::{DropError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use uuid::Uuid;

/// 触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    BlockBreak,
    Consume,
    Fishing,
    Enchant,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::BlockBreak,
        TriggerKind::Consume,
        TriggerKind::Fishing,
        TriggerKind::Enchant,
    ];

    /// 写入获取记录的来源标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::BlockBreak => "挖矿",
            Self::Consume => "食用",
            Self::Fishing => "钓鱼",
            Self::Enchant => "附魔",
        }
    }

    /// 指标与日志使用的稳定标识
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockBreak => "block_break",
            Self::Consume => "consume",
            Self::Fishing => "fishing",
            Self::Enchant => "enchant",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 触发事件的玩家
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    /// 玩家当前所在世界
    pub world: String,
}

impl Actor {
    pub fn new(id: Uuid, name: impl Into<String>, world: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            world: world.into(),
        }
    }
}

/// 挖掘所用工具
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    /// 工具类型名，如 `DIAMOND_PICKAXE`
    pub type_name: String,
    pub has_silk_touch: bool,
}

/// 被破坏的方块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub material: String,
    pub world: String,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBreakEvent {
    pub actor: Actor,
    pub tool: Tool,
    pub block: BlockInfo,
    /// 宿主已取消的事件不参与评估
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeEvent {
    pub actor: Actor,
    pub item_type: String,
}

/// 钓鱼状态，只有 `CaughtFish` 会触发奖励
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchState {
    Fishing,
    Bite,
    CaughtFish,
    CaughtEntity,
    InGround,
    FailedAttempt,
    ReelIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FishEvent {
    pub actor: Actor,
    pub state: CatchState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnchantEvent {
    pub actor: Actor,
    /// 被附魔物品类型
    pub item_type: String,
    /// 本次附魔消耗的等级
    pub cost_level: i32,
    /// 本次添加的附魔名称（如 `sharpness`）
    pub enchants: Vec<String>,
}

/// 原始规则配置
///
/// 保留 YAML 的映射结构与声明顺序，不在这里做任何语义校验：
/// 单条规则写错只应影响它自己，所以逐条解释留给编译器。
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    root: Mapping,
}

impl RawConfig {
    /// 解析 YAML 文本
    ///
    /// 只有语法错误或顶层不是映射时才返回错误；空文件视为空配置。
    pub fn from_yaml(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            Value::Null => Ok(Self::default()),
            other => Err(DropError::ConfigParse(format!(
                "顶层必须是映射，实际为 {}",
                value_kind(&other)
            ))),
        }
    }

    pub fn from_mapping(root: Mapping) -> Self {
        Self { root }
    }

    /// 获取顶层配置节
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.root.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

/// YAML 值类型名，用于告警信息
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_labels() {
        assert_eq!(TriggerKind::BlockBreak.label(), "挖矿");
        assert_eq!(TriggerKind::Consume.label(), "食用");
        assert_eq!(TriggerKind::Fishing.label(), "钓鱼");
        assert_eq!(TriggerKind::Enchant.label(), "附魔");
        assert_eq!(TriggerKind::Fishing.to_string(), "fishing");
    }

    #[test]
    fn test_raw_config_sections() {
        let raw = RawConfig::from_yaml(
            r#"
global:
  check-mcmmo: false
dig: {}
"#,
        )
        .unwrap();

        assert!(raw.section("global").is_some());
        assert!(raw.section("dig").is_some());
        assert!(raw.section("fishing").is_none());
    }

    #[test]
    fn test_empty_yaml_is_empty_config() {
        let raw = RawConfig::from_yaml("").unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn test_non_mapping_root_rejected() {
        let err = RawConfig::from_yaml("- a\n- b\n").unwrap_err();
        assert!(matches!(err, DropError::ConfigParse(_)));
    }

    #[test]
    fn test_syntax_error_rejected() {
        assert!(RawConfig::from_yaml("dig: [unclosed").is_err());
    }

    #[test]
    fn test_event_serde_names() {
        let json = serde_json::to_string(&CatchState::CaughtFish).unwrap();
        assert_eq!(json, "\"caught_fish\"");
    }
}
