//! 配置快照
//!
//! 快照发布后不可变。重载与倍率调整都会生成新快照并原子替换，
//! 规则集合放在 `Arc` 里，仅调整倍率时新旧快照共享同一份规则。

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_TITLE_TEMPLATE: &str = "开启全局概率翻倍 x%amount%";
pub const DEFAULT_SUBTITLE_TEMPLATE: &str =
    "您当前概率翻倍倍数：%now% (权限基础倍数: %basic% 全局倍数: %total%)";

/// 规范化后的材质标识
///
/// 材质集合是开放的，只校验形状：去掉 `minecraft:` 前缀、转大写、
/// 空格与连字符转下划线，结果必须匹配 `^[A-Z0-9_]+$`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Material(String);

impl Material {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let without_ns = trimmed
            .strip_prefix("minecraft:")
            .or_else(|| trimmed.strip_prefix("MINECRAFT:"))
            .unwrap_or(trimmed);

        let normalized: String = without_ns
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();

        let valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');

        valid.then_some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 全匹配正则
///
/// 标识符必须整体匹配，部分命中不算。
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", source))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// 单个掉落
#[derive(Debug, Clone, PartialEq)]
pub struct DropRule {
    pub name: String,
    /// 配置百分比 / 100，加载时不截断
    pub base_chance: f64,
    pub actions: Vec<String>,
}

impl DropRule {
    /// 基础概率 <= 0 的掉落视为关闭，任何倍率下都不触发
    pub fn is_enabled(&self) -> bool {
        self.base_chance > 0.0
    }
}

/// 掉落名 -> 掉落，保持声明顺序
pub type DropTable = IndexMap<String, DropRule>;

/// 工具规则
#[derive(Debug, Clone)]
pub struct ToolRule {
    pub key: String,
    pub pattern: Pattern,
    /// 世界名 -> 最大高度，未配置的世界不限高
    pub world_height_limits: HashMap<String, i32>,
    pub block_drops: IndexMap<Material, DropTable>,
}

impl ToolRule {
    pub fn matches_tool(&self, tool_type: &str) -> bool {
        self.pattern.is_match(tool_type)
    }

    /// 高度检查：`y > maxY` 时拒绝
    pub fn allows_height(&self, world: &str, y: i32) -> bool {
        self.world_height_limits
            .get(world)
            .is_none_or(|max_y| y <= *max_y)
    }
}

/// 附魔规则
#[derive(Debug, Clone)]
pub struct EnchantRule {
    pub drop: DropRule,
    pub item_pattern: Option<Pattern>,
    pub enchant_pattern: Option<Pattern>,
    pub min_level: i32,
    pub max_level: i32,
}

impl EnchantRule {
    /// 物品、附魔名、等级三项同时满足才适用；未配置的模式视为全匹配
    pub fn applies(&self, item_type: &str, enchants: &[String], cost_level: i32) -> bool {
        if let Some(pattern) = &self.item_pattern
            && !pattern.is_match(item_type)
        {
            return false;
        }

        if let Some(pattern) = &self.enchant_pattern
            && !enchants.iter().any(|name| pattern.is_match(name))
        {
            return false;
        }

        (self.min_level..=self.max_level).contains(&cost_level)
    }
}

/// 食物规则：具体材质与通配符分开存放，两轮独立评估
#[derive(Debug, Clone, Default)]
pub struct FoodRules {
    pub specific: IndexMap<Material, DropTable>,
    pub wildcard: DropTable,
}

/// 一次编译产出的全部规则
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub tools: IndexMap<String, ToolRule>,
    pub food: FoodRules,
    pub fishing: DropTable,
    pub enchant: IndexMap<String, EnchantRule>,
}

impl RuleSet {
    pub fn counts(&self) -> RuleCounts {
        RuleCounts {
            tools: self.tools.len(),
            tool_drops: self
                .tools
                .values()
                .flat_map(|t| t.block_drops.values())
                .map(|table| table.len())
                .sum(),
            food_specific: self.food.specific.len(),
            food_wildcard: self.food.wildcard.len(),
            fishing: self.fishing.len(),
            enchant: self.enchant.len(),
        }
    }
}

/// 规则数量统计，用于重载回复与 CLI 输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleCounts {
    pub tools: usize,
    pub tool_drops: usize,
    pub food_specific: usize,
    pub food_wildcard: usize,
    pub fishing: usize,
    pub enchant: usize,
}

impl fmt::Display for RuleCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "工具规则 {} 个（掉落 {} 个），食物 {} 种 + 通配 {} 个，钓鱼 {} 个，附魔 {} 个",
            self.tools,
            self.tool_drops,
            self.food_specific,
            self.food_wildcard,
            self.fishing,
            self.enchant
        )
    }
}

/// 全局倍率广播模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplates {
    pub title: String,
    pub subtitle: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_TEMPLATE.to_string(),
            subtitle: DEFAULT_SUBTITLE_TEMPLATE.to_string(),
        }
    }
}

/// 配置快照
#[derive(Debug, Clone)]
pub struct ConfigurationSnapshot {
    pub rules: Arc<RuleSet>,
    pub global_multiplier: f64,
    pub messages: Arc<MessageTemplates>,
    pub mcmmo_integration_enabled: bool,
    pub loaded_at: DateTime<Utc>,
    /// 编译代次，每次编译递增
    pub generation: u64,
}

impl ConfigurationSnapshot {
    /// 空快照：引擎启动但规则尚未加载时使用
    pub fn empty() -> Self {
        Self {
            rules: Arc::new(RuleSet::default()),
            global_multiplier: 1.0,
            messages: Arc::new(MessageTemplates::default()),
            mcmmo_integration_enabled: true,
            loaded_at: Utc::now(),
            generation: 0,
        }
    }

    /// 只替换全局倍率，规则与模板共享
    pub fn with_global_multiplier(&self, multiplier: f64) -> Self {
        Self {
            rules: Arc::clone(&self.rules),
            global_multiplier: multiplier,
            messages: Arc::clone(&self.messages),
            mcmmo_integration_enabled: self.mcmmo_integration_enabled,
            loaded_at: self.loaded_at,
            generation: self.generation,
        }
    }

    pub fn counts(&self) -> RuleCounts {
        self.rules.counts()
    }
}

impl Default for ConfigurationSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_normalization() {
        assert_eq!(Material::parse("stone").unwrap().as_str(), "STONE");
        assert_eq!(
            Material::parse("minecraft:golden_apple").unwrap().as_str(),
            "GOLDEN_APPLE"
        );
        assert_eq!(
            Material::parse(" deepslate-diamond ore ").unwrap().as_str(),
            "DEEPSLATE_DIAMOND_ORE"
        );
        assert!(Material::parse("").is_none());
        assert!(Material::parse("STONE!").is_none());
        assert!(Material::parse("红石").is_none());
    }

    #[test]
    fn test_pattern_is_full_match() {
        let pattern = Pattern::compile("DIAMOND_.*").unwrap();
        assert!(pattern.is_match("DIAMOND_PICKAXE"));
        assert!(!pattern.is_match("NETHERITE_DIAMOND_PICKAXE"));

        let alt = Pattern::compile("IRON_AXE|GOLDEN_AXE").unwrap();
        assert!(alt.is_match("GOLDEN_AXE"));
        assert!(!alt.is_match("GOLDEN_AXE_X"));
        assert_eq!(alt.source(), "IRON_AXE|GOLDEN_AXE");
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(Pattern::compile("([").is_err());
    }

    #[test]
    fn test_height_limits() {
        let rule = ToolRule {
            key: "pickaxe".into(),
            pattern: Pattern::compile(".*_PICKAXE").unwrap(),
            world_height_limits: HashMap::from([("world".to_string(), 16)]),
            block_drops: IndexMap::new(),
        };
        assert!(rule.allows_height("world", 16));
        assert!(!rule.allows_height("world", 17));
        assert!(rule.allows_height("world_nether", 200));
    }

    #[test]
    fn test_enchant_rule_applies() {
        let rule = EnchantRule {
            drop: DropRule {
                name: "book".into(),
                base_chance: 0.5,
                actions: vec![],
            },
            item_pattern: Some(Pattern::compile(".*_SWORD").unwrap()),
            enchant_pattern: Some(Pattern::compile("sharpness|smite").unwrap()),
            min_level: 10,
            max_level: 30,
        };

        let enchants = vec!["unbreaking".to_string(), "sharpness".to_string()];
        assert!(rule.applies("DIAMOND_SWORD", &enchants, 30));
        assert!(!rule.applies("DIAMOND_AXE", &enchants, 30));
        assert!(!rule.applies("DIAMOND_SWORD", &["unbreaking".to_string()], 30));
        assert!(!rule.applies("DIAMOND_SWORD", &enchants, 9));
        assert!(!rule.applies("DIAMOND_SWORD", &enchants, 31));
    }

    #[test]
    fn test_enchant_rule_without_patterns_matches_everything() {
        let rule = EnchantRule {
            drop: DropRule {
                name: "any".into(),
                base_chance: 0.1,
                actions: vec![],
            },
            item_pattern: None,
            enchant_pattern: None,
            min_level: 1,
            max_level: 30,
        };
        assert!(rule.applies("BOOK", &[], 1));
    }

    #[test]
    fn test_with_global_multiplier_shares_rules() {
        let snapshot = ConfigurationSnapshot::empty();
        let next = snapshot.with_global_multiplier(2.5);
        assert_eq!(next.global_multiplier, 2.5);
        assert!(Arc::ptr_eq(&snapshot.rules, &next.rules));
        assert_eq!(next.generation, snapshot.generation);
    }

    #[test]
    fn test_disabled_drop() {
        let drop = DropRule {
            name: "x".into(),
            base_chance: 0.0,
            actions: vec![],
        };
        assert!(!drop.is_enabled());
    }
}
