//! 测试辅助实现
//!
//! 宿主协作接口的内存版本，供集成测试、基准测试和 CLI 模拟使用。

use crate::cooldown::Clock;
use crate::error::{DropError, Result};
use crate::host::{AcquisitionLog, LogEntry, PermissionSource, Presenter, SkillPlacementTracker, Title};
use crate::models::{Actor, BlockInfo};
use crate::probability::Roller;
use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use uuid::Uuid;

/// 展示调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presented {
    Command(String),
    Broadcast(String),
    BroadcastTitle(Title),
    Title { player: String, title: Title },
    ActionBar { player: String, message: String },
    Message { player: String, message: String },
}

/// 记录全部调用的展示器
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<Presented>>,
    fail_commands: AtomicBool,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的控制台指令全部返回错误
    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Presented> {
        self.calls.lock().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Presented::Command(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn messages_to(&self, player: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Presented::Message { player: p, message } if p == player => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn push(&self, call: Presented) {
        self.calls.lock().push(call);
    }
}

impl Presenter for RecordingPresenter {
    fn dispatch_command(&self, command: &str) -> Result<()> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(DropError::Presentation(format!("指令执行失败: {}", command)));
        }
        self.push(Presented::Command(command.to_string()));
        Ok(())
    }

    fn broadcast(&self, message: &str) -> Result<()> {
        self.push(Presented::Broadcast(message.to_string()));
        Ok(())
    }

    fn broadcast_title(&self, title: &Title) -> Result<()> {
        self.push(Presented::BroadcastTitle(title.clone()));
        Ok(())
    }

    fn send_title(&self, actor: &Actor, title: &Title) -> Result<()> {
        self.push(Presented::Title {
            player: actor.name.clone(),
            title: title.clone(),
        });
        Ok(())
    }

    fn send_action_bar(&self, actor: &Actor, message: &str) -> Result<()> {
        self.push(Presented::ActionBar {
            player: actor.name.clone(),
            message: message.to_string(),
        });
        Ok(())
    }

    fn send_message(&self, actor: &Actor, message: &str) -> Result<()> {
        self.push(Presented::Message {
            player: actor.name.clone(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// 按玩家名配置的静态权限
#[derive(Debug, Default)]
pub struct StaticPermissions {
    by_player: Mutex<HashMap<String, Vec<String>>>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, player: &str, nodes: &[&str]) -> Self {
        self.set(player, nodes);
        self
    }

    /// 替换玩家的权限列表
    pub fn set(&self, player: &str, nodes: &[&str]) {
        self.by_player.lock().insert(
            player.to_string(),
            nodes.iter().map(|n| n.to_string()).collect(),
        );
    }
}

impl PermissionSource for StaticPermissions {
    fn permissions(&self, actor: &Actor) -> Vec<String> {
        self.by_player
            .lock()
            .get(&actor.name)
            .cloned()
            .unwrap_or_default()
    }
}

/// 以 (世界, 材质, y) 标记的玩家放置方块
#[derive(Debug, Default)]
pub struct PlacedBlocks {
    placed: Mutex<HashSet<(String, String, i32)>>,
}

impl PlacedBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(&self, block: &BlockInfo) {
        self.placed
            .lock()
            .insert((block.world.clone(), block.material.clone(), block.y));
    }
}

impl SkillPlacementTracker for PlacedBlocks {
    fn is_tracked_placement(&self, block: &BlockInfo) -> bool {
        self.placed
            .lock()
            .contains(&(block.world.clone(), block.material.clone(), block.y))
    }
}

/// 每次返回同一个值
#[derive(Debug, Clone, Copy)]
pub struct FixedRoller(pub f64);

impl Roller for FixedRoller {
    fn roll(&self) -> f64 {
        self.0
    }
}

/// 依次返回预设值，用尽后返回 `fallback`
#[derive(Debug)]
pub struct SequenceRoller {
    values: Mutex<VecDeque<f64>>,
    fallback: f64,
}

impl SequenceRoller {
    pub fn new(values: &[f64], fallback: f64) -> Self {
        Self {
            values: Mutex::new(values.iter().copied().collect()),
            fallback,
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.lock().len()
    }
}

impl Roller for SequenceRoller {
    fn roll(&self) -> f64 {
        self.values.lock().pop_front().unwrap_or(self.fallback)
    }
}

/// 手动推进的时钟
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct MemoryRecord {
    player: String,
    at: NaiveDateTime,
    text: String,
}

/// 内存获取记录，"今天" 可固定
#[derive(Debug, Default)]
pub struct MemoryAcquisitionLog {
    records: Mutex<Vec<MemoryRecord>>,
    today: Mutex<Option<NaiveDate>>,
}

impl MemoryAcquisitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定查询基准日期，`record` 也会落在这一天
    pub fn set_today(&self, today: NaiveDate) {
        *self.today.lock() = Some(today);
    }

    pub fn record_at(&self, player: &str, item_label: &str, source_label: &str, at: NaiveDateTime) {
        self.records.lock().push(MemoryRecord {
            player: player.to_string(),
            at,
            text: crate::acquisition::entry_text(item_label, source_label),
        });
    }

    /// 全部记录文本，按记录顺序
    pub fn texts(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn now(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        match *self.today.lock() {
            Some(today) => today.and_time(now.time()),
            None => now,
        }
    }
}

impl AcquisitionLog for MemoryAcquisitionLog {
    fn record(&self, actor: &Actor, item_label: &str, source_label: &str) {
        let at = self.now();
        self.record_at(&actor.name, item_label, source_label, at);
    }

    fn recent(&self, player_name: &str, days: u32) -> Result<Vec<LogEntry>> {
        let today = self.now().date();
        let records = self.records.lock();
        let mut entries = Vec::new();
        for offset in 0..days {
            let Some(date) = today.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };
            entries.extend(
                records
                    .iter()
                    .filter(|r| r.player == player_name && r.at.date() == date)
                    .map(|r| LogEntry {
                        timestamp_label: r.at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        text: r.text.clone(),
                    }),
            );
        }
        Ok(entries)
    }
}

/// 生成测试玩家
pub fn actor(name: &str) -> Actor {
    Actor::new(Uuid::new_v4(), name, "world")
}
