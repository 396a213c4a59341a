//! 掉落引擎
//!
//! 宿主适配层的唯一入口。每个事件在调用线程上同步完成：
//! 取快照、检查冷却与排除条件、匹配规则、执行奖励。任何失败都退化为
//! "本次无奖励"，不会向宿主抛出。

use crate::bonus::{BonusCache, BonusPermission};
use crate::cooldown::{Clock, CooldownGate, SystemClock};
use crate::error::{DropError, Result};
use crate::executor::{ActionExecutor, ExecutionReport};
use crate::host::{AcquisitionLog, PermissionSource, Presenter, SkillPlacementTracker};
use crate::matcher::{RuleMatcher, Selection};
use crate::models::{
    Actor, BlockBreakEvent, CatchState, ConsumeEvent, EnchantEvent, FishEvent, TriggerKind,
};
use crate::probability::{Roller, ThreadRngRoller};
use crate::snapshot::ConfigurationSnapshot;
use crate::store::{ReloadOutcome, SnapshotStore};
use drops_shared::config::EngineConfig;
use drops_shared::observability::metrics as drop_metrics;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// 被排除的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// 精准采集工具
    SilkTouch,
    /// 技能插件追踪的玩家放置方块
    PlacedBlock,
}

/// 一次命中并执行的奖励
#[derive(Debug, Clone, PartialEq)]
pub struct FiredReward {
    pub drop_name: String,
    pub effective_chance: f64,
    pub report: ExecutionReport,
}

/// 事件处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// 已取消的事件或不参与评估的状态
    Ignored,
    /// 挖掘去重窗口内的重复事件
    Throttled,
    Excluded(Exclusion),
    /// 处于全局防刷冷却中
    OnCooldown,
    NoReward,
    Rewarded(Vec<FiredReward>),
}

impl EventOutcome {
    /// 指标标签
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Throttled => "throttled",
            Self::Excluded(Exclusion::SilkTouch) => "silk_touch",
            Self::Excluded(Exclusion::PlacedBlock) => "placed_block",
            Self::OnCooldown => "cooldown",
            Self::NoReward => "no_reward",
            Self::Rewarded(_) => "rewarded",
        }
    }

    pub fn is_rewarded(&self) -> bool {
        matches!(self, Self::Rewarded(_))
    }

    /// 命中的掉落名，未命中时为空
    pub fn rewarded_drops(&self) -> Vec<&str> {
        match self {
            Self::Rewarded(fired) => fired.iter().map(|f| f.drop_name.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// 引擎构建器
pub struct DropEngineBuilder {
    presenter: Option<Arc<dyn Presenter>>,
    permissions: Option<Arc<dyn PermissionSource>>,
    tracker: Option<Arc<dyn SkillPlacementTracker>>,
    log: Option<Arc<dyn AcquisitionLog>>,
    roller: Arc<dyn Roller>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    rules_path: Option<PathBuf>,
}

impl Default for DropEngineBuilder {
    fn default() -> Self {
        Self {
            presenter: None,
            permissions: None,
            tracker: None,
            log: None,
            roller: Arc::new(ThreadRngRoller),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
            rules_path: None,
        }
    }
}

impl DropEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionSource>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// 不设置时不做放置方块排除
    pub fn skill_tracker(mut self, tracker: Arc<dyn SkillPlacementTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn acquisition_log(mut self, log: Arc<dyn AcquisitionLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn roller(mut self, roller: Arc<dyn Roller>) -> Self {
        self.roller = roller;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// `reload()` 读取的规则文件
    pub fn rules_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<DropEngine> {
        let presenter = self
            .presenter
            .ok_or_else(|| DropError::InvalidInput("缺少 Presenter".to_string()))?;
        let permissions = self
            .permissions
            .ok_or_else(|| DropError::InvalidInput("缺少 PermissionSource".to_string()))?;
        let log = self
            .log
            .ok_or_else(|| DropError::InvalidInput("缺少 AcquisitionLog".to_string()))?;

        let bonus = BonusCache::new(&self.config.bonus_permission_namespace, permissions)?;
        let break_gate = CooldownGate::new(
            Duration::from_millis(self.config.break_cooldown_ms),
            Arc::clone(&self.clock),
        );
        let reward_gate = CooldownGate::new(
            Duration::from_millis(self.config.reward_cooldown_ms),
            Arc::clone(&self.clock),
        );

        info!(
            reward_cooldown_ms = self.config.reward_cooldown_ms,
            break_cooldown_ms = self.config.break_cooldown_ms,
            namespace = %self.config.bonus_permission_namespace,
            "掉落引擎已创建"
        );

        Ok(DropEngine {
            store: SnapshotStore::new(),
            break_gate,
            reward_gate,
            bonus,
            executor: ActionExecutor::new(Arc::clone(&presenter), Arc::clone(&log)),
            presenter,
            log,
            tracker: self.tracker,
            roller: self.roller,
            rules_path: self.rules_path,
        })
    }
}

/// 掉落引擎
pub struct DropEngine {
    store: SnapshotStore,
    /// 挖掘事件自身的短窗口
    break_gate: CooldownGate,
    /// 全部触发源共享的防刷窗口
    reward_gate: CooldownGate,
    bonus: BonusCache,
    executor: ActionExecutor,
    presenter: Arc<dyn Presenter>,
    log: Arc<dyn AcquisitionLog>,
    tracker: Option<Arc<dyn SkillPlacementTracker>>,
    roller: Arc<dyn Roller>,
    rules_path: Option<PathBuf>,
}

impl DropEngine {
    pub fn builder() -> DropEngineBuilder {
        DropEngineBuilder::new()
    }

    pub fn on_block_break(&self, event: &BlockBreakEvent) -> EventOutcome {
        let kind = TriggerKind::BlockBreak;
        let actor = &event.actor;
        if event.cancelled {
            return self.settle(kind, actor, EventOutcome::Ignored);
        }
        // 通过去重窗口的事件才会刷新时间
        if !self.break_gate.try_acquire(actor.id) {
            return self.settle(kind, actor, EventOutcome::Throttled);
        }

        let snapshot = self.store.load();
        if snapshot.mcmmo_integration_enabled
            && let Some(tracker) = &self.tracker
            && tracker.is_tracked_placement(&event.block)
        {
            return self.settle(kind, actor, EventOutcome::Excluded(Exclusion::PlacedBlock));
        }
        if event.tool.has_silk_touch {
            return self.settle(kind, actor, EventOutcome::Excluded(Exclusion::SilkTouch));
        }
        if self.reward_gate.is_on_cooldown(&actor.id) {
            return self.settle(kind, actor, EventOutcome::OnCooldown);
        }

        let player_multiplier = self.bonus.multiplier(actor);
        let matcher = RuleMatcher::new(&snapshot, self.roller.as_ref());
        let selection = matcher.match_block_break(
            &event.tool.type_name,
            &event.block.material,
            &event.block.world,
            event.block.y,
            player_multiplier,
        );
        let outcome = self.fire(kind, actor, selection.into_iter().collect());
        self.settle(kind, actor, outcome)
    }

    /// 具体材质与通配符各自至多命中一个，可能同时发放两份
    pub fn on_consume(&self, event: &ConsumeEvent) -> EventOutcome {
        let kind = TriggerKind::Consume;
        let actor = &event.actor;
        if self.reward_gate.is_on_cooldown(&actor.id) {
            return self.settle(kind, actor, EventOutcome::OnCooldown);
        }

        let snapshot = self.store.load();
        let player_multiplier = self.bonus.multiplier(actor);
        let matcher = RuleMatcher::new(&snapshot, self.roller.as_ref());
        let food = matcher.match_consume(&event.item_type, player_multiplier);
        let selections = food.specific.into_iter().chain(food.wildcard).collect();
        let outcome = self.fire(kind, actor, selections);
        self.settle(kind, actor, outcome)
    }

    pub fn on_fish(&self, event: &FishEvent) -> EventOutcome {
        let kind = TriggerKind::Fishing;
        let actor = &event.actor;
        if event.state != CatchState::CaughtFish {
            return self.settle(kind, actor, EventOutcome::Ignored);
        }
        if self.reward_gate.is_on_cooldown(&actor.id) {
            return self.settle(kind, actor, EventOutcome::OnCooldown);
        }

        let snapshot = self.store.load();
        let player_multiplier = self.bonus.multiplier(actor);
        let matcher = RuleMatcher::new(&snapshot, self.roller.as_ref());
        let selection = matcher.match_fish(event.state, player_multiplier);
        let outcome = self.fire(kind, actor, selection.into_iter().collect());
        self.settle(kind, actor, outcome)
    }

    pub fn on_enchant(&self, event: &EnchantEvent) -> EventOutcome {
        let kind = TriggerKind::Enchant;
        let actor = &event.actor;
        if self.reward_gate.is_on_cooldown(&actor.id) {
            return self.settle(kind, actor, EventOutcome::OnCooldown);
        }

        let snapshot = self.store.load();
        let player_multiplier = self.bonus.multiplier(actor);
        let matcher = RuleMatcher::new(&snapshot, self.roller.as_ref());
        let selection = matcher.match_enchant(
            &event.item_type,
            &event.enchants,
            event.cost_level,
            player_multiplier,
        );
        let outcome = self.fire(kind, actor, selection.into_iter().collect());
        self.settle(kind, actor, outcome)
    }

    fn fire(&self, kind: TriggerKind, actor: &Actor, selections: Vec<Selection<'_>>) -> EventOutcome {
        if selections.is_empty() {
            return EventOutcome::NoReward;
        }

        let fired = selections
            .into_iter()
            .map(|selection| {
                let report = self.executor.execute(actor, selection.drop, kind);
                drop_metrics::record_reward(kind.as_str(), &selection.drop.name);
                info!(
                    player = %actor.name,
                    trigger = %kind,
                    drop = %selection.drop.name,
                    effective_chance = selection.effective_chance,
                    draw = selection.draw,
                    failed_actions = report.failed,
                    "奖励已发放"
                );
                FiredReward {
                    drop_name: selection.drop.name.clone(),
                    effective_chance: selection.effective_chance,
                    report,
                }
            })
            .collect();

        self.reward_gate.mark(actor.id);
        EventOutcome::Rewarded(fired)
    }

    fn settle(&self, kind: TriggerKind, actor: &Actor, outcome: EventOutcome) -> EventOutcome {
        drop_metrics::record_event(kind.as_str(), outcome.as_str());
        debug!(player = %actor.name, trigger = %kind, outcome = outcome.as_str(), "事件处理完成");
        outcome
    }

    /// 重新读取构建时指定的规则文件
    pub fn reload(&self) -> Result<ReloadOutcome> {
        let path = self
            .rules_path
            .as_deref()
            .ok_or_else(|| DropError::InvalidInput("未配置规则文件路径".to_string()))?;
        self.reload_from_path(path)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn reload_from_path(&self, path: &Path) -> Result<ReloadOutcome> {
        let text = fs::read_to_string(path).inspect_err(|e| {
            error!(error = %e, "读取规则文件失败");
            drop_metrics::record_config_reload("failed", 0);
        })?;
        self.reload_yaml(&text)
    }

    /// 编译并发布新快照；YAML 语法错误时保留当前快照
    pub fn reload_yaml(&self, text: &str) -> Result<ReloadOutcome> {
        match self.store.reload_yaml(text) {
            Ok(outcome) => {
                self.bonus.clear();
                drop_metrics::record_config_reload("success", outcome.warnings.len());
                info!(
                    generation = outcome.generation,
                    counts = %outcome.counts,
                    warnings = outcome.warnings.len(),
                    "规则已重载"
                );
                Ok(outcome)
            }
            Err(e) => {
                drop_metrics::record_config_reload("failed", 0);
                error!(code = e.code(), error = %e, "规则重载失败，保留当前配置");
                Err(e)
            }
        }
    }

    /// 设置全局倍率；非有限值或负数拒绝，状态不变
    pub fn set_global_multiplier(&self, multiplier: f64) -> Result<Arc<ConfigurationSnapshot>> {
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(DropError::InvalidInput(format!(
                "全局倍率必须是非负数: {}",
                multiplier
            )));
        }
        let snapshot = self.store.set_global_multiplier(multiplier);
        drop_metrics::record_global_multiplier(multiplier);
        Ok(snapshot)
    }

    pub fn player_multiplier(&self, actor: &Actor) -> f64 {
        self.bonus.multiplier(actor)
    }

    pub fn bonus_permissions(&self, actor: &Actor) -> Vec<BonusPermission> {
        self.bonus.bonus_permissions(actor)
    }

    /// 玩家权限变化后调用
    pub fn invalidate_bonus(&self, player: &Uuid) {
        self.bonus.invalidate(player);
    }

    /// 玩家离线时释放其冷却与加成缓存
    pub fn forget_player(&self, player: &Uuid) {
        self.break_gate.forget(player);
        self.reward_gate.forget(player);
        self.bonus.invalidate(player);
    }

    pub fn snapshot(&self) -> Arc<ConfigurationSnapshot> {
        self.store.load()
    }

    pub fn presenter(&self) -> &Arc<dyn Presenter> {
        &self.presenter
    }

    pub fn acquisition_log(&self) -> &Arc<dyn AcquisitionLog> {
        &self.log
    }

    pub fn rules_path(&self) -> Option<&Path> {
        self.rules_path.as_deref()
    }

    /// 清理已过期的冷却条目，返回移除数量
    pub fn sweep_cooldowns(&self) -> usize {
        self.break_gate.sweep_expired() + self.reward_gate.sweep_expired()
    }

    /// 释放运行期状态；已发布的快照保留
    pub fn shutdown(&self) {
        self.break_gate.clear();
        self.reward_gate.clear();
        self.bonus.clear();
        info!("掉落引擎已关闭");
    }
}
