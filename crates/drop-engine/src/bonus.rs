//! 玩家加成
//!
//! 加成倍率来自 `<namespace>.<N>` 形式的权限，取最大的 N 再除以 100，
//! 没有任何匹配时为 0.0。结果按玩家缓存，重载时整体清空，
//! 权限变化时按玩家失效。

use crate::error::{DropError, Result};
use crate::host::PermissionSource;
use crate::models::Actor;
use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 一条加成权限
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonusPermission {
    pub node: String,
    pub percent: u32,
}

pub struct BonusCache {
    pattern: Regex,
    cache: DashMap<Uuid, f64>,
    source: Arc<dyn PermissionSource>,
}

impl BonusCache {
    pub fn new(namespace: &str, source: Arc<dyn PermissionSource>) -> Result<Self> {
        let pattern = Regex::new(&format!(r"^{}\.(\d+)$", regex::escape(namespace)))
            .map_err(|e| DropError::ConfigParse(format!("加成权限前缀无效: {}", e)))?;
        Ok(Self {
            pattern,
            cache: DashMap::new(),
            source,
        })
    }

    /// 获取玩家加成倍率，首次查询时从权限系统计算
    pub fn multiplier(&self, actor: &Actor) -> f64 {
        if let Some(cached) = self.cache.get(&actor.id) {
            return *cached;
        }

        let value = derive_multiplier(&self.bonus_permissions(actor));
        debug!(player = %actor.name, multiplier = value, "加成倍率已计算");
        self.cache.insert(actor.id, value);
        value
    }

    /// 玩家当前拥有的加成权限（不走缓存）
    pub fn bonus_permissions(&self, actor: &Actor) -> Vec<BonusPermission> {
        self.source
            .permissions(actor)
            .into_iter()
            .filter_map(|node| {
                let percent = self
                    .pattern
                    .captures(&node)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<u32>().ok())?;
                Some(BonusPermission { node, percent })
            })
            .collect()
    }

    /// 权限变化时失效单个玩家
    pub fn invalidate(&self, player: &Uuid) {
        self.cache.remove(player);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// 取最大百分比 / 100，没有加成权限时为 0.0
pub fn derive_multiplier(permissions: &[BonusPermission]) -> f64 {
    permissions
        .iter()
        .map(|p| p.percent)
        .max()
        .map(|max| f64::from(max) / 100.0)
        .unwrap_or(0.0)
}
