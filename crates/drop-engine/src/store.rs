//! 快照存储
//!
//! 单写多读：事件线程通过一次原子 load 拿到完整快照，
//! 重载和倍率调整构造新快照后整体替换，读者看不到半成品。

use crate::compiler::{ConfigWarning, SnapshotCompiler};
use crate::error::Result;
use crate::models::RawConfig;
use crate::snapshot::{ConfigurationSnapshot, RuleCounts};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument};

/// 一次重载的结果
#[derive(Debug, Clone)]
pub struct ReloadOutcome {
    pub generation: u64,
    pub counts: RuleCounts,
    pub global_multiplier: f64,
    pub warnings: Vec<ConfigWarning>,
}

/// 快照存储
pub struct SnapshotStore {
    current: ArcSwap<ConfigurationSnapshot>,
    /// 编译器持有代次计数，同时串行化并发重载
    compiler: Mutex<SnapshotCompiler>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// 以空快照创建
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(ConfigurationSnapshot::empty()),
            compiler: Mutex::new(SnapshotCompiler::new()),
        }
    }

    /// 当前快照
    pub fn load(&self) -> Arc<ConfigurationSnapshot> {
        self.current.load_full()
    }

    /// 直接发布一个已编译的快照
    pub fn publish(&self, snapshot: ConfigurationSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// 从 YAML 文本重载；语法错误时保留当前快照
    #[instrument(skip(self, text), fields(bytes = text.len()))]
    pub fn reload_yaml(&self, text: &str) -> Result<ReloadOutcome> {
        let raw = RawConfig::from_yaml(text)?;
        Ok(self.reload_raw(&raw))
    }

    /// 从原始配置重载，沿用当前全局倍率
    #[instrument(skip(self, raw))]
    pub fn reload_raw(&self, raw: &RawConfig) -> ReloadOutcome {
        let mut compiler = self.compiler.lock();

        // 读取旧倍率与发布新快照之间不加锁，和倍率指令并发时可能丢失最新倍率
        let previous = self.current.load().global_multiplier;

        let (snapshot, warnings) = compiler.compile(raw, Some(previous));
        let outcome = ReloadOutcome {
            generation: snapshot.generation,
            counts: snapshot.counts(),
            global_multiplier: snapshot.global_multiplier,
            warnings,
        };

        self.current.store(Arc::new(snapshot));
        info!(
            generation = outcome.generation,
            warnings = outcome.warnings.len(),
            "规则快照已发布"
        );

        outcome
    }

    /// 设置全局倍率，规则集合原样共享
    #[instrument(skip(self))]
    pub fn set_global_multiplier(&self, multiplier: f64) -> Arc<ConfigurationSnapshot> {
        self.current
            .rcu(|current| Arc::new(current.with_global_multiplier(multiplier)));
        let snapshot = self.current.load_full();
        info!(
            global_multiplier = multiplier,
            generation = snapshot.generation,
            "全局倍率已更新"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const RULES: &str = r#"
fishing:
  a:
    chance: 10
"#;

    #[test]
    fn test_initial_snapshot_is_empty() {
        let store = SnapshotStore::new();
        let snapshot = store.load();
        assert_eq!(snapshot.generation, 0);
        assert_eq!(snapshot.global_multiplier, 1.0);
        assert!(snapshot.rules.fishing.is_empty());
    }

    #[test]
    fn test_reload_preserves_multiplier() {
        let store = SnapshotStore::new();
        store.reload_yaml(RULES).unwrap();
        store.set_global_multiplier(2.0);

        let outcome = store.reload_yaml(RULES).unwrap();
        assert_eq!(outcome.generation, 2);
        assert_eq!(outcome.global_multiplier, 2.0);
        assert_eq!(store.load().global_multiplier, 2.0);
    }

    #[test]
    fn test_first_reload_starts_at_one() {
        let store = SnapshotStore::new();
        let outcome = store.reload_yaml(RULES).unwrap();
        assert_eq!(outcome.global_multiplier, 1.0);
        assert_eq!(outcome.generation, 1);
        assert_eq!(outcome.counts.fishing, 1);
    }

    #[test]
    fn test_failed_reload_keeps_snapshot() {
        let store = SnapshotStore::new();
        store.reload_yaml(RULES).unwrap();
        let before = store.load();

        assert!(store.reload_yaml("fishing: [").is_err());
        let after = store.load();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_set_multiplier_shares_rules() {
        let store = SnapshotStore::new();
        store.reload_yaml(RULES).unwrap();
        let before = store.load();
        let after = store.set_global_multiplier(3.5);

        assert_eq!(after.global_multiplier, 3.5);
        assert!(Arc::ptr_eq(&before.rules, &after.rules));
        // 旧快照不受影响
        assert_eq!(before.global_multiplier, 1.0);
    }

    #[test]
    fn test_concurrent_readers_see_complete_snapshots() {
        let store = Arc::new(SnapshotStore::new());
        store.reload_yaml(RULES).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.load();
                        // 任意时刻读到的都是完整的一代快照
                        assert_eq!(snapshot.rules.fishing.len(), 1);
                        assert!(snapshot.generation >= 1);
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            store.reload_yaml(RULES).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.load().generation, 51);
    }
}
