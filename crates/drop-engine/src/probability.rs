//! 概率合成
//!
//! 两种合成公式并存：
//!
//! - 乘法（食用、钓鱼、附魔）：`min(1, base * player * global)`
//! - 加法（挖掘）：`min(1, base * global + player)`
//!
//! 挖掘的玩家加成是加法项，所以无加成时的中性值是 0.0 而不是 1.0；
//! 这也意味着没有加成权限的玩家在乘法领域里有效概率恒为 0。
//! 两种行为都保留，不在这里统一。

use crate::models::TriggerKind;

/// 合成方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    Additive,
    Multiplicative,
}

impl Composition {
    pub fn for_trigger(kind: TriggerKind) -> Self {
        match kind {
            TriggerKind::BlockBreak => Self::Additive,
            TriggerKind::Consume | TriggerKind::Fishing | TriggerKind::Enchant => {
                Self::Multiplicative
            }
        }
    }

    /// 计算有效概率，结果总在 `[0, 1]` 内，NaN 视为 0
    pub fn effective_chance(&self, base: f64, player: f64, global: f64) -> f64 {
        let raw = match self {
            Self::Additive => base * global + player,
            Self::Multiplicative => base * player * global,
        };
        clamp_unit(raw)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// 随机抽样来源
///
/// 每个候选掉落抽一次 `[0, 1)` 均匀分布的值。
#[cfg_attr(test, mockall::automock)]
pub trait Roller: Send + Sync {
    fn roll(&self) -> f64;
}

/// 线程本地随机数
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngRoller;

impl Roller for ThreadRngRoller {
    fn roll(&self) -> f64 {
        use rand::Rng;
        rand::rng().random::<f64>()
    }
}

/// 固定种子的随机数，模拟时用于复现结果
pub struct SeededRoller {
    rng: parking_lot::Mutex<rand::rngs::StdRng>,
}

impl SeededRoller {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        Self {
            rng: parking_lot::Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)),
        }
    }
}

impl Roller for SeededRoller {
    fn roll(&self) -> f64 {
        use rand::Rng;
        self.rng.lock().random::<f64>()
    }
}

/// 抽样判定：`draw < effective` 即触发
pub fn triggers(draw: f64, effective: f64) -> bool {
    draw < effective
}
