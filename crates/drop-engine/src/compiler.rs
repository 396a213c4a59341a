//! 规则编译器
//!
//! 把 [`RawConfig`] 编译成不可变的 [`ConfigurationSnapshot`]。
//! 编译永远不会整体失败：写错的条目跳过并产生 [`ConfigWarning`]，
//! 其余条目照常加载。

use crate::error::Result;
use crate::models::{RawConfig, value_kind};
use crate::snapshot::{
    ConfigurationSnapshot, DEFAULT_SUBTITLE_TEMPLATE, DEFAULT_TITLE_TEMPLATE, DropRule, DropTable,
    EnchantRule, FoodRules, Material, MessageTemplates, Pattern, RuleSet, ToolRule,
};
use chrono::Utc;
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 食物配置中的通配符键
pub const WILDCARD_KEY: &str = "*";

const DEFAULT_MIN_LEVEL: i32 = 1;
const DEFAULT_MAX_LEVEL: i32 = 30;

/// 必须存在的规则配置节
const RULE_SECTIONS: [&str; 4] = ["dig", "consume", "fishing", "enchant"];

/// 配置告警
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// 顶层规则节缺失，对应领域为空
    MissingSection { section: &'static str },
    /// 配置节存在但不是映射
    MalformedSection { path: String, found: &'static str },
    /// 单个条目无法解释
    MalformedEntry { path: String, reason: String },
    /// 工具规则缺少 pattern
    MissingPattern { path: String },
    /// 正则无法编译，整条规则被丢弃
    InvalidRegex {
        path: String,
        pattern: String,
        error: String,
    },
    /// 材质名不合法
    InvalidMaterial { path: String, material: String },
}

impl ConfigWarning {
    /// 告警种类标识（日志字段）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSection { .. } => "missing_section",
            Self::MalformedSection { .. } => "malformed_section",
            Self::MalformedEntry { .. } => "malformed_entry",
            Self::MissingPattern { .. } => "missing_pattern",
            Self::InvalidRegex { .. } => "invalid_regex",
            Self::InvalidMaterial { .. } => "invalid_material",
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSection { section } => write!(f, "配置中没有找到 '{}' 部分", section),
            Self::MalformedSection { path, found } => {
                write!(f, "{} 应为映射，实际为 {}", path, found)
            }
            Self::MalformedEntry { path, reason } => write!(f, "{}: {}", path, reason),
            Self::MissingPattern { path } => write!(f, "{} 缺少 pattern 配置", path),
            Self::InvalidRegex {
                path,
                pattern,
                error,
            } => write!(f, "{} 的正则表达式无效 '{}': {}", path, pattern, error),
            Self::InvalidMaterial { path, material } => {
                write!(f, "{} 的材质无效: {}", path, material)
            }
        }
    }
}

/// 告警收集器，记录的同时输出 warn 日志
#[derive(Default)]
struct Diagnostics {
    warnings: Vec<ConfigWarning>,
}

impl Diagnostics {
    fn push(&mut self, warning: ConfigWarning) {
        warn!(kind = warning.kind(), "{}", warning);
        self.warnings.push(warning);
    }
}

/// 快照编译器
pub struct SnapshotCompiler {
    generation: u64,
}

impl Default for SnapshotCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCompiler {
    pub fn new() -> Self {
        Self { generation: 0 }
    }

    /// 最近一次编译的代次
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 从 YAML 文本编译；只有 YAML 语法错误会返回 Err
    pub fn compile_yaml(
        &mut self,
        text: &str,
        previous_multiplier: Option<f64>,
    ) -> Result<(ConfigurationSnapshot, Vec<ConfigWarning>)> {
        let raw = RawConfig::from_yaml(text)?;
        Ok(self.compile(&raw, previous_multiplier))
    }

    /// 编译原始配置
    ///
    /// `previous_multiplier` 为当前生效快照的全局倍率，首次加载传 `None`（取 1.0）。
    #[instrument(skip(self, raw))]
    pub fn compile(
        &mut self,
        raw: &RawConfig,
        previous_multiplier: Option<f64>,
    ) -> (ConfigurationSnapshot, Vec<ConfigWarning>) {
        let mut diag = Diagnostics::default();

        for section in RULE_SECTIONS {
            if raw.section(section).is_none() {
                diag.push(ConfigWarning::MissingSection { section });
            }
        }

        let (mcmmo_integration_enabled, messages) = compile_global(raw.section("global"), &mut diag);

        let rules = RuleSet {
            tools: raw
                .section("dig")
                .map(|v| compile_tools(v, &mut diag))
                .unwrap_or_default(),
            food: raw
                .section("consume")
                .map(|v| compile_food(v, &mut diag))
                .unwrap_or_default(),
            fishing: raw
                .section("fishing")
                .and_then(|v| section_mapping(v, "fishing", &mut diag))
                .map(|m| compile_drop_table(m, "fishing", &mut diag))
                .unwrap_or_default(),
            enchant: raw
                .section("enchant")
                .map(|v| compile_enchants(v, &mut diag))
                .unwrap_or_default(),
        };

        self.generation += 1;

        let snapshot = ConfigurationSnapshot {
            rules: Arc::new(rules),
            global_multiplier: previous_multiplier.unwrap_or(1.0),
            messages: Arc::new(messages),
            mcmmo_integration_enabled,
            loaded_at: Utc::now(),
            generation: self.generation,
        };

        info!(
            counts = %snapshot.counts(),
            warnings = diag.warnings.len(),
            global_multiplier = snapshot.global_multiplier,
            "规则配置编译完成"
        );

        (snapshot, diag.warnings)
    }
}

fn compile_global(global: Option<&Value>, diag: &mut Diagnostics) -> (bool, MessageTemplates) {
    let mut check_mcmmo = true;
    let mut messages = MessageTemplates::default();

    let Some(global) = global.and_then(|v| section_mapping(v, "global", diag)) else {
        return (check_mcmmo, messages);
    };

    match global.get("check-mcmmo") {
        None => {}
        Some(Value::Bool(b)) => check_mcmmo = *b,
        Some(other) => diag.push(ConfigWarning::MalformedEntry {
            path: "global.check-mcmmo".to_string(),
            reason: format!("应为布尔值，实际为 {}", value_kind(other)),
        }),
    }

    if let Some(message) = global
        .get("message")
        .and_then(|v| section_mapping(v, "global.message", diag))
    {
        messages.title = scalar_string(message.get("title"))
            .unwrap_or_else(|| DEFAULT_TITLE_TEMPLATE.to_string());
        messages.subtitle = scalar_string(message.get("sub-title"))
            .unwrap_or_else(|| DEFAULT_SUBTITLE_TEMPLATE.to_string());
    }

    (check_mcmmo, messages)
}

fn compile_tools(dig: &Value, diag: &mut Diagnostics) -> IndexMap<String, ToolRule> {
    let mut tools = IndexMap::new();
    let Some(dig) = section_mapping(dig, "dig", diag) else {
        return tools;
    };

    for (key, value) in dig {
        let Some(key) = key_string(key) else {
            diag.push(malformed_key("dig", key));
            continue;
        };
        let path = format!("dig.{}", key);
        let Some(section) = section_mapping(value, &path, diag) else {
            continue;
        };

        let Some(pattern_src) = scalar_string(section.get("pattern")).filter(|s| !s.is_empty())
        else {
            diag.push(ConfigWarning::MissingPattern { path });
            continue;
        };
        let Some(pattern) = compile_pattern(&pattern_src, &path, diag) else {
            continue;
        };

        let world_height_limits = section
            .get("y")
            .and_then(|v| section_mapping(v, &format!("{}.y", path), diag))
            .map(|m| compile_height_limits(m, &path, diag))
            .unwrap_or_default();

        let mut block_drops: IndexMap<Material, DropTable> = IndexMap::new();
        if let Some(blocks) = section
            .get("dig-type")
            .and_then(|v| section_mapping(v, &format!("{}.dig-type", path), diag))
        {
            for (block_key, drops) in blocks {
                let Some(block_name) = key_string(block_key) else {
                    diag.push(malformed_key(&format!("{}.dig-type", path), block_key));
                    continue;
                };
                let block_path = format!("{}.dig-type.{}", path, block_name);
                let Some(material) = Material::parse(&block_name) else {
                    diag.push(ConfigWarning::InvalidMaterial {
                        path: block_path,
                        material: block_name,
                    });
                    continue;
                };
                let Some(drops) = section_mapping(drops, &block_path, diag) else {
                    continue;
                };
                let table = compile_drop_table(drops, &block_path, diag);
                block_drops.entry(material).or_default().extend(table);
            }
        }

        tools.insert(
            key.clone(),
            ToolRule {
                key,
                pattern,
                world_height_limits,
                block_drops,
            },
        );
    }

    tools
}

fn compile_height_limits(
    limits: &Mapping,
    path: &str,
    diag: &mut Diagnostics,
) -> HashMap<String, i32> {
    let mut result = HashMap::new();
    for (world, value) in limits {
        let Some(world) = key_string(world) else {
            diag.push(malformed_key(&format!("{}.y", path), world));
            continue;
        };
        match as_i32(value) {
            Some(max_y) => {
                result.insert(world, max_y);
            }
            None => diag.push(ConfigWarning::MalformedEntry {
                path: format!("{}.y.{}", path, world),
                reason: format!("高度应为整数，实际为 {}", value_kind(value)),
            }),
        }
    }
    result
}

fn compile_food(consume: &Value, diag: &mut Diagnostics) -> FoodRules {
    let mut food = FoodRules::default();
    let Some(consume) = section_mapping(consume, "consume", diag) else {
        return food;
    };

    for (key, drops) in consume {
        let Some(food_key) = key_string(key) else {
            diag.push(malformed_key("consume", key));
            continue;
        };
        let path = format!("consume.{}", food_key);
        let Some(drops) = section_mapping(drops, &path, diag) else {
            continue;
        };

        if food_key == WILDCARD_KEY {
            let table = compile_drop_table(drops, &path, diag);
            food.wildcard.extend(table);
            continue;
        }

        let Some(material) = Material::parse(&food_key) else {
            diag.push(ConfigWarning::InvalidMaterial {
                path,
                material: food_key,
            });
            continue;
        };
        let table = compile_drop_table(drops, &path, diag);
        food.specific.entry(material).or_default().extend(table);
    }

    food
}

fn compile_enchants(enchant: &Value, diag: &mut Diagnostics) -> IndexMap<String, EnchantRule> {
    let mut rules = IndexMap::new();
    let Some(enchant) = section_mapping(enchant, "enchant", diag) else {
        return rules;
    };

    for (key, value) in enchant {
        let Some(name) = key_string(key) else {
            diag.push(malformed_key("enchant", key));
            continue;
        };
        let path = format!("enchant.{}", name);
        let Some(section) = section_mapping(value, &path, diag) else {
            continue;
        };

        let item_pattern = match optional_pattern(section, "item-pattern", &path, diag) {
            Ok(p) => p,
            Err(()) => continue,
        };
        let enchant_pattern = match optional_pattern(section, "enchant-pattern", &path, diag) {
            Ok(p) => p,
            Err(()) => continue,
        };

        let Some(min_level) = level_field(section, "min-level", DEFAULT_MIN_LEVEL, &path, diag)
        else {
            continue;
        };
        let Some(max_level) = level_field(section, "max-level", DEFAULT_MAX_LEVEL, &path, diag)
        else {
            continue;
        };
        if min_level > max_level {
            diag.push(ConfigWarning::MalformedEntry {
                path: path.clone(),
                reason: format!("min-level {} 大于 max-level {}", min_level, max_level),
            });
            continue;
        }

        let Some(drop) = compile_drop(&name, section, &path, diag) else {
            continue;
        };

        rules.insert(
            name,
            EnchantRule {
                drop,
                item_pattern,
                enchant_pattern,
                min_level,
                max_level,
            },
        );
    }

    rules
}

fn compile_drop_table(drops: &Mapping, path: &str, diag: &mut Diagnostics) -> DropTable {
    let mut table = DropTable::new();
    for (key, value) in drops {
        let Some(name) = key_string(key) else {
            diag.push(malformed_key(path, key));
            continue;
        };
        let drop_path = format!("{}.{}", path, name);
        let Some(section) = section_mapping(value, &drop_path, diag) else {
            continue;
        };
        if let Some(drop) = compile_drop(&name, section, &drop_path, diag) {
            table.insert(name, drop);
        }
    }
    table
}

/// 解析单个掉落：`chance` 百分比（默认 0）与 `string-action` 列表（默认空）
fn compile_drop(
    name: &str,
    section: &Mapping,
    path: &str,
    diag: &mut Diagnostics,
) -> Option<DropRule> {
    let percent = match section.get("chance") {
        None => 0.0,
        Some(value) => match as_f64(value) {
            Some(p) => p,
            None => {
                diag.push(ConfigWarning::MalformedEntry {
                    path: format!("{}.chance", path),
                    reason: format!("概率应为数字，实际为 {}", value_kind(value)),
                });
                return None;
            }
        },
    };

    let actions = match section.get("string-action") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => {
            let mut actions = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match scalar_string(Some(item)) {
                    Some(action) => actions.push(action),
                    None => diag.push(ConfigWarning::MalformedEntry {
                        path: format!("{}.string-action[{}]", path, i),
                        reason: format!("动作应为字符串，实际为 {}", value_kind(item)),
                    }),
                }
            }
            actions
        }
        Some(other) => {
            diag.push(ConfigWarning::MalformedEntry {
                path: format!("{}.string-action", path),
                reason: format!("动作列表应为序列，实际为 {}", value_kind(other)),
            });
            return None;
        }
    };

    Some(DropRule {
        name: name.to_string(),
        base_chance: percent / 100.0,
        actions,
    })
}

/// 可选正则：缺失或空串为 `None`；编译失败返回 `Err`，调用方丢弃整条规则
fn optional_pattern(
    section: &Mapping,
    field: &str,
    path: &str,
    diag: &mut Diagnostics,
) -> std::result::Result<Option<Pattern>, ()> {
    match scalar_string(section.get(field)).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(src) => compile_pattern(&src, &format!("{}.{}", path, field), diag)
            .map(Some)
            .ok_or(()),
    }
}

fn level_field(
    section: &Mapping,
    field: &str,
    default: i32,
    path: &str,
    diag: &mut Diagnostics,
) -> Option<i32> {
    match section.get(field) {
        None => Some(default),
        Some(value) => {
            let level = as_i32(value);
            if level.is_none() {
                diag.push(ConfigWarning::MalformedEntry {
                    path: format!("{}.{}", path, field),
                    reason: format!("等级应为整数，实际为 {}", value_kind(value)),
                });
            }
            level
        }
    }
}

fn compile_pattern(src: &str, path: &str, diag: &mut Diagnostics) -> Option<Pattern> {
    match Pattern::compile(src) {
        Ok(p) => Some(p),
        Err(e) => {
            diag.push(ConfigWarning::InvalidRegex {
                path: path.to_string(),
                pattern: src.to_string(),
                error: e.to_string(),
            });
            None
        }
    }
}

fn section_mapping<'a>(value: &'a Value, path: &str, diag: &mut Diagnostics) -> Option<&'a Mapping> {
    match value {
        Value::Mapping(m) => Some(m),
        other => {
            diag.push(ConfigWarning::MalformedSection {
                path: path.to_string(),
                found: value_kind(other),
            });
            None
        }
    }
}

fn malformed_key(path: &str, key: &Value) -> ConfigWarning {
    ConfigWarning::MalformedEntry {
        path: path.to_string(),
        reason: format!("键应为标量，实际为 {}", value_kind(key)),
    }
}

/// YAML 键可能被解析成数字或布尔值，统一转成字符串
fn key_string(key: &Value) -> Option<String> {
    scalar_string(Some(key))
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn as_i32(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
