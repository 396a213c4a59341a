//! 规则匹配
//!
//! 纯函数式评估：给定快照、玩家倍率和随机源，按声明顺序遍历规则，
//! 每个候选掉落抽一次签，第一个命中的掉落胜出。冷却、精准采集等
//! 排除条件由引擎在调用前处理。

use crate::models::{CatchState, TriggerKind};
use crate::probability::{Composition, Roller, triggers};
use crate::snapshot::{ConfigurationSnapshot, DropRule, DropTable, Material, ToolRule};

/// 一次命中
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<'a> {
    pub drop: &'a DropRule,
    pub effective_chance: f64,
    pub draw: f64,
}

/// 食用事件的两轮结果，具体材质与通配符各自至多命中一个
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoodSelection<'a> {
    pub specific: Option<Selection<'a>>,
    pub wildcard: Option<Selection<'a>>,
}

impl FoodSelection<'_> {
    pub fn is_empty(&self) -> bool {
        self.specific.is_none() && self.wildcard.is_none()
    }
}

pub struct RuleMatcher<'a> {
    snapshot: &'a ConfigurationSnapshot,
    roller: &'a dyn Roller,
}

impl<'a> RuleMatcher<'a> {
    pub fn new(snapshot: &'a ConfigurationSnapshot, roller: &'a dyn Roller) -> Self {
        Self { snapshot, roller }
    }

    /// 选出唯一参与评估的工具规则：第一个工具匹配且未超高的规则
    pub fn select_tool_rule(&self, tool_type: &str, world: &str, y: i32) -> Option<&'a ToolRule> {
        self.snapshot
            .rules
            .tools
            .values()
            .find(|rule| rule.matches_tool(tool_type) && rule.allows_height(world, y))
    }

    /// 挖掘：只评估选中的工具规则，材质没有配置即不掉落，不再尝试后续规则
    pub fn match_block_break(
        &self,
        tool_type: &str,
        material: &str,
        world: &str,
        y: i32,
        player_multiplier: f64,
    ) -> Option<Selection<'a>> {
        let rule = self.select_tool_rule(tool_type, world, y)?;
        let material = Material::parse(material)?;
        let drops = rule.block_drops.get(&material)?;
        self.first_trigger(drops, TriggerKind::BlockBreak, player_multiplier)
    }

    /// 食用：具体材质与通配符两轮独立评估
    pub fn match_consume(&self, item_type: &str, player_multiplier: f64) -> FoodSelection<'a> {
        let food = &self.snapshot.rules.food;
        let specific = Material::parse(item_type)
            .and_then(|material| food.specific.get(&material))
            .and_then(|drops| self.first_trigger(drops, TriggerKind::Consume, player_multiplier));
        let wildcard = self.first_trigger(&food.wildcard, TriggerKind::Consume, player_multiplier);

        FoodSelection { specific, wildcard }
    }

    /// 钓鱼：只有钓到鱼才评估
    pub fn match_fish(&self, state: CatchState, player_multiplier: f64) -> Option<Selection<'a>> {
        if state != CatchState::CaughtFish {
            return None;
        }
        self.first_trigger(
            &self.snapshot.rules.fishing,
            TriggerKind::Fishing,
            player_multiplier,
        )
    }

    /// 附魔：物品、附魔名、等级都满足的规则才参与抽签
    pub fn match_enchant(
        &self,
        item_type: &str,
        enchants: &[String],
        cost_level: i32,
        player_multiplier: f64,
    ) -> Option<Selection<'a>> {
        let composition = Composition::for_trigger(TriggerKind::Enchant);
        self.snapshot
            .rules
            .enchant
            .values()
            .filter(|rule| rule.applies(item_type, enchants, cost_level))
            .find_map(|rule| self.try_drop(&rule.drop, composition, player_multiplier))
    }

    fn first_trigger(
        &self,
        drops: &'a DropTable,
        kind: TriggerKind,
        player_multiplier: f64,
    ) -> Option<Selection<'a>> {
        let composition = Composition::for_trigger(kind);
        drops
            .values()
            .find_map(|drop| self.try_drop(drop, composition, player_multiplier))
    }

    fn try_drop(
        &self,
        drop: &'a DropRule,
        composition: Composition,
        player_multiplier: f64,
    ) -> Option<Selection<'a>> {
        // 关闭的掉落不抽签
        if !drop.is_enabled() {
            return None;
        }

        let effective_chance = composition.effective_chance(
            drop.base_chance,
            player_multiplier,
            self.snapshot.global_multiplier,
        );
        let draw = self.roller.roll();

        triggers(draw, effective_chance).then_some(Selection {
            drop,
            effective_chance,
            draw,
        })
    }
}
