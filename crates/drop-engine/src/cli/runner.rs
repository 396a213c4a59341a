//! 命令执行器
//!
//! 负责执行各 CLI 子命令的具体逻辑。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use indexmap::IndexMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use uuid::Uuid;

use drops_shared::config::AppConfig;
use drops_shared::config_watcher::{ChangeCallback, ConfigWatcher, FileConfigWatcher};

use crate::acquisition::{FileAcquisitionLog, RetentionSweeper};
use crate::cli::console::ConsolePresenter;
use crate::commands::{CommandService, MAX_LOG_DAYS};
use crate::compiler::SnapshotCompiler;
use crate::engine::{DropEngine, EventOutcome};
use crate::models::{
    Actor, BlockBreakEvent, BlockInfo, CatchState, ConsumeEvent, EnchantEvent, FishEvent, Tool,
    TriggerKind,
};
use crate::probability::{Roller, SeededRoller, ThreadRngRoller};
use crate::testing::{ManualClock, MemoryAcquisitionLog, StaticPermissions};

/// 模拟参数
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub rules: PathBuf,
    pub events: usize,
    pub player: String,
    pub permissions: Vec<String>,
    pub global: Option<f64>,
    pub seed: Option<u64>,
    pub tool: String,
    pub block: String,
    pub y: i32,
    pub world: String,
    pub food: String,
    pub item: String,
    pub enchants: Vec<String>,
    pub level: i32,
}

/// 单个触发源的统计
#[derive(Debug, Clone, Default)]
pub struct TriggerTally {
    pub events: usize,
    pub outcomes: BTreeMap<&'static str, usize>,
    pub drops: BTreeMap<String, usize>,
}

impl TriggerTally {
    fn add(&mut self, outcome: &EventOutcome) {
        self.events += 1;
        *self.outcomes.entry(outcome.as_str()).or_default() += 1;
        for drop in outcome.rewarded_drops() {
            *self.drops.entry(drop.to_string()).or_default() += 1;
        }
    }

    /// 发放了至少一份奖励的事件数
    pub fn rewarded(&self) -> usize {
        self.outcomes.get("rewarded").copied().unwrap_or(0)
    }
}

/// 模拟结果
#[derive(Debug, Clone, Default)]
pub struct SimulationSummary {
    pub player_multiplier: f64,
    pub global_multiplier: f64,
    pub tallies: IndexMap<TriggerKind, TriggerTally>,
    /// 展示动作总数
    pub presented: usize,
    /// 写入获取记录的条数
    pub logged: usize,
}

/// 命令执行器
///
/// 持有服务配置，把子命令参数转化为引擎调用。
pub struct CommandRunner {
    config: AppConfig,
}

impl CommandRunner {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 未指定时使用配置中的规则文件
    pub fn rules_path(&self, rules: Option<PathBuf>) -> PathBuf {
        rules.unwrap_or_else(|| self.config.rules.path.clone())
    }

    /// 执行 check 命令
    pub fn run_check(&self, rules: &Path) -> Result<()> {
        let text = fs::read_to_string(rules)
            .with_context(|| format!("读取规则文件失败: {}", rules.display()))?;
        let (snapshot, warnings) = SnapshotCompiler::new()
            .compile_yaml(&text, None)
            .with_context(|| format!("规则文件语法错误: {}", rules.display()))?;

        println!("\n规则检查结果: {}", rules.display());
        println!("{}", "-".repeat(60));
        println!("{}", snapshot.counts());
        println!(
            "技能插件放置检测: {}",
            if snapshot.mcmmo_integration_enabled { "开启" } else { "关闭" }
        );
        if warnings.is_empty() {
            println!("没有警告");
        } else {
            println!("警告 {} 条:", warnings.len());
            for warning in &warnings {
                println!("  [{}] {}", warning.kind(), warning);
            }
        }
        println!("{}", "-".repeat(60));
        Ok(())
    }

    /// 执行 simulate 命令
    ///
    /// 时钟在事件之间跳过全部冷却窗口，因此每个事件都独立抽签；
    /// 获取记录写入内存，不触碰真实的日志目录。
    pub fn run_simulate(&self, options: &SimulationOptions) -> Result<SimulationSummary> {
        let presenter = Arc::new(ConsolePresenter::new());
        let log = Arc::new(MemoryAcquisitionLog::new());
        let clock = Arc::new(ManualClock::new(0));
        let nodes: Vec<&str> = options.permissions.iter().map(String::as_str).collect();
        let permissions = StaticPermissions::new().with(&options.player, &nodes);
        let roller: Arc<dyn Roller> = match options.seed {
            Some(seed) => Arc::new(SeededRoller::new(seed)),
            None => Arc::new(ThreadRngRoller),
        };

        let engine = DropEngine::builder()
            .presenter(presenter.clone())
            .permissions(Arc::new(permissions))
            .acquisition_log(log.clone())
            .roller(roller)
            .clock(clock.clone())
            .config(self.config.engine.clone())
            .rules_path(&options.rules)
            .build()?;

        let outcome = engine.reload()?;
        for warning in &outcome.warnings {
            warn!(kind = warning.kind(), "{}", warning);
        }
        if let Some(global) = options.global {
            engine.set_global_multiplier(global)?;
        }

        let step = self
            .config
            .engine
            .reward_cooldown_ms
            .max(self.config.engine.break_cooldown_ms) as i64
            + 1;
        let actor = Actor::new(Uuid::new_v4(), options.player.clone(), options.world.clone());

        let mut summary = SimulationSummary {
            player_multiplier: engine.player_multiplier(&actor),
            global_multiplier: engine.snapshot().global_multiplier,
            ..Default::default()
        };

        for kind in TriggerKind::ALL {
            let tally = summary.tallies.entry(kind).or_default();
            for _ in 0..options.events {
                clock.advance_millis(step);
                let outcome = match kind {
                    TriggerKind::BlockBreak => engine.on_block_break(&BlockBreakEvent {
                        actor: actor.clone(),
                        tool: Tool {
                            type_name: options.tool.clone(),
                            has_silk_touch: false,
                        },
                        block: BlockInfo {
                            material: options.block.clone(),
                            world: options.world.clone(),
                            y: options.y,
                        },
                        cancelled: false,
                    }),
                    TriggerKind::Consume => engine.on_consume(&ConsumeEvent {
                        actor: actor.clone(),
                        item_type: options.food.clone(),
                    }),
                    TriggerKind::Fishing => engine.on_fish(&FishEvent {
                        actor: actor.clone(),
                        state: CatchState::CaughtFish,
                    }),
                    TriggerKind::Enchant => engine.on_enchant(&EnchantEvent {
                        actor: actor.clone(),
                        item_type: options.item.clone(),
                        cost_level: options.level,
                        enchants: options.enchants.clone(),
                    }),
                };
                tally.add(&outcome);
            }
        }

        summary.presented = presenter.delivered();
        summary.logged = log.len();
        engine.shutdown();
        Ok(summary)
    }

    /// 打印模拟结果
    pub fn print_simulation(&self, summary: &SimulationSummary) {
        println!("\n模拟结果:");
        println!("{}", "-".repeat(60));
        println!("玩家加成倍率: {}", summary.player_multiplier);
        println!("全局倍率: {}", summary.global_multiplier);
        for (kind, tally) in &summary.tallies {
            let rate = if tally.events == 0 {
                0.0
            } else {
                tally.rewarded() as f64 * 100.0 / tally.events as f64
            };
            println!(
                "{}: 事件 {} 个，发放 {} 次 ({:.2}%)",
                kind.label(),
                tally.events,
                tally.rewarded(),
                rate
            );
            for (drop, count) in &tally.drops {
                println!("    {} x{}", drop, count);
            }
        }
        println!("展示动作: {}，获取记录: {}", summary.presented, summary.logged);
        println!("{}", "-".repeat(60));
    }

    /// 执行 logs 命令
    pub fn run_logs(&self, player: &str, days: u32) -> Result<()> {
        if !(1..=MAX_LOG_DAYS).contains(&days) {
            bail!("天数必须在1-{}之间", MAX_LOG_DAYS);
        }
        let log = FileAcquisitionLog::open(&self.config.log_store.dir)?;
        let entries = log.recent_from(player, days, Local::now().date_naive())?;
        log.shutdown();

        if entries.is_empty() {
            println!("{} 最近{}天内没有获取物品的记录", player, days);
            return Ok(());
        }
        println!("\n{} 的物品获取记录 ({}天内):", player, days);
        println!("{}", "-".repeat(40));
        for entry in &entries {
            println!("{}: {}", entry.timestamp_label, entry.text);
        }
        println!("{}", "-".repeat(40));
        println!("共找到 {} 条记录", entries.len());
        Ok(())
    }

    /// 执行 sweep 命令
    pub fn run_sweep(&self, today: Option<NaiveDate>) -> Result<()> {
        let store = &self.config.log_store;
        let sweeper = RetentionSweeper::new(&store.dir, store.retention_days);
        if !sweeper.is_enabled() {
            println!("保留天数为 {}，不执行清理", store.retention_days);
            return Ok(());
        }

        let report = sweeper.sweep(today.unwrap_or_else(|| Local::now().date_naive()))?;
        println!(
            "清理完成: 删除 {} 天的记录，移除 {} 个空目录",
            report.removed_days.len(),
            report.pruned_dirs
        );
        for day in &report.removed_days {
            println!("  - {}", day);
        }
        Ok(())
    }

    /// 执行 watch 命令
    ///
    /// 规则文件变化时自动重载，按间隔清理过期记录与冷却条目，
    /// 标准输入的每一行按管理指令处理（如 `reload`、`ip 2`）。
    pub async fn run_watch(&self) -> Result<()> {
        let rules_path = self.config.rules.path.clone();
        let store = &self.config.log_store;

        let log = Arc::new(
            FileAcquisitionLog::open(&store.dir)
                .with_context(|| format!("打开获取记录目录失败: {}", store.dir.display()))?,
        );
        let engine = Arc::new(
            DropEngine::builder()
                .presenter(Arc::new(ConsolePresenter::new()))
                .permissions(Arc::new(StaticPermissions::new()))
                .acquisition_log(log.clone())
                .config(self.config.engine.clone())
                .rules_path(&rules_path)
                .build()?,
        );

        // 初次加载失败时以空规则运行，等待文件修复后热更新
        match engine.reload() {
            Ok(outcome) => info!(counts = %outcome.counts, warnings = outcome.warnings.len(), "规则已加载"),
            Err(e) => warn!(error = %e, "初次加载规则失败，以空规则运行"),
        }

        let watcher = if self.config.watch.enabled {
            let reload_engine = Arc::clone(&engine);
            let on_change: ChangeCallback = Arc::new(move || {
                if let Err(e) = reload_engine.reload() {
                    warn!(error = %e, "热更新失败，保留当前规则");
                }
            });
            let watcher = FileConfigWatcher::from_config(&rules_path, &self.config.watch, on_change);
            watcher.start().await.context("启动规则文件监听失败")?;
            Some(watcher)
        } else {
            info!("规则文件监听已关闭");
            None
        };

        let sweeper = Arc::new(RetentionSweeper::new(&store.dir, store.retention_days));
        let mut sweep_timer =
            tokio::time::interval(Duration::from_secs(store.sweep_interval_hours.max(1) * 3600));
        let service = CommandService::new(Arc::clone(&engine));
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        info!(rules = %rules_path.display(), "掉落引擎已启动，输入 help 查看指令");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = sweep_timer.tick() => {
                    let cooldowns = engine.sweep_cooldowns();
                    let sweeper = Arc::clone(&sweeper);
                    let today = Local::now().date_naive();
                    match tokio::task::spawn_blocking(move || sweeper.sweep(today)).await {
                        Ok(Ok(report)) => info!(
                            removed_days = report.removed_days.len(),
                            pruned_dirs = report.pruned_dirs,
                            cooldowns,
                            "定时清理完成"
                        ),
                        Ok(Err(e)) => warn!(error = %e, "清理过期记录失败"),
                        Err(e) => error!(error = %e, "清理任务异常退出"),
                    }
                }
                line = stdin.next_line(), if stdin_open => {
                    match line {
                        Ok(Some(line)) => {
                            let args: Vec<&str> = line.split_whitespace().collect();
                            if matches!(args.first(), Some(&("stop" | "exit" | "quit"))) {
                                break;
                            }
                            if !args.is_empty() {
                                for reply in service.dispatch(None, &args).lines {
                                    println!("{}", reply);
                                }
                            }
                        }
                        Ok(None) => stdin_open = false,
                        Err(e) => {
                            warn!(error = %e, "读取标准输入失败，停止接收指令");
                            stdin_open = false;
                        }
                    }
                }
            }
        }

        info!("正在关闭...");
        if let Some(watcher) = watcher {
            watcher.stop().await?;
        }
        engine.shutdown();
        log.shutdown();
        info!("已关闭");
        Ok(())
    }
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "无法监听 Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "无法监听 SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
