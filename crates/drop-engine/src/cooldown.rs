//! 冷却闸门
//!
//! 每个玩家记录最近一次触发的毫秒时间戳。检查不会重置时间，
//! 只有 `mark` / `try_acquire` 会写入；评估路径上条目只覆盖不过期，
//! 需要控制内存时由外部定期调用 `sweep_expired`。

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 时钟抽象，测试中可手动推进
pub trait Clock: Send + Sync {
    /// 当前毫秒时间戳
    fn now_millis(&self) -> i64;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// 冷却闸门
pub struct CooldownGate {
    window_ms: i64,
    last_trigger: DashMap<Uuid, i64>,
    clock: Arc<dyn Clock>,
}

impl CooldownGate {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            last_trigger: DashMap::new(),
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms.max(0) as u64)
    }

    /// `now - last < window` 时处于冷却中
    pub fn is_on_cooldown(&self, player: &Uuid) -> bool {
        let now = self.clock.now_millis();
        self.last_trigger
            .get(player)
            .is_some_and(|last| self.within_window(now, *last))
    }

    /// 记录当前时间
    pub fn mark(&self, player: Uuid) {
        self.last_trigger.insert(player, self.clock.now_millis());
    }

    /// 原子的检查并记录：不在冷却中则记录并返回 true
    pub fn try_acquire(&self, player: Uuid) -> bool {
        let now = self.clock.now_millis();
        match self.last_trigger.entry(player) {
            Entry::Occupied(mut entry) => {
                if self.within_window(now, *entry.get()) {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// 清除某个玩家的冷却（玩家退出时）
    pub fn forget(&self, player: &Uuid) {
        self.last_trigger.remove(player);
    }

    /// 清空全部状态（关闭时）
    pub fn clear(&self) {
        self.last_trigger.clear();
    }

    /// 移除已经过了冷却窗口的条目，返回移除数量
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.last_trigger.len();
        self.last_trigger
            .retain(|_, last| self.within_window(now, *last));
        before.saturating_sub(self.last_trigger.len())
    }

    pub fn len(&self) -> usize {
        self.last_trigger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_trigger.is_empty()
    }

    fn within_window(&self, now: i64, last: i64) -> bool {
        now.saturating_sub(last) < self.window_ms
    }
}
