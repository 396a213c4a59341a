//! 规则文件热更新模块
//!
//! 提供 `ConfigWatcher` trait 和基于文件系统事件的实现。
//!
//! ```text
//! notify 回调 ──mpsc──▶ tokio debounce 循环 ──▶ on_change()
//! ```
//!
//! watcher 只负责"文件变了"这一信号，重载本身由调用方的回调完成，
//! 回调内部的失败不会让监听循环退出。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::{Event, EventKind};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::WatchConfig;

/// 文件变更回调
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// 配置监听器抽象
#[async_trait]
pub trait ConfigWatcher: Send + Sync {
    /// 启动监听，文件变更时触发回调
    async fn start(&self) -> Result<()>;

    /// 停止监听并释放资源
    async fn stop(&self) -> Result<()>;
}

/// 基于文件系统事件的监听器
///
/// 监听目标文件所在目录而不是文件本身：编辑器保存时常常是
/// "写临时文件再 rename"，直接监听文件会在第一次替换后失效。
pub struct FileConfigWatcher {
    /// 监听的文件路径
    watch_path: PathBuf,
    /// debounce 窗口，避免文件连续写入触发多次重载
    debounce: Duration,
    on_change: ChangeCallback,
    /// notify watcher 必须存活，drop 即停止监听
    watcher: Mutex<Option<notify::RecommendedWatcher>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl FileConfigWatcher {
    pub fn new(watch_path: impl AsRef<Path>, debounce: Duration, on_change: ChangeCallback) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            watch_path: watch_path.as_ref().to_path_buf(),
            debounce,
            on_change,
            watcher: Mutex::new(None),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// 从 `[watch]` 配置节构建
    pub fn from_config(
        watch_path: impl AsRef<Path>,
        config: &WatchConfig,
        on_change: ChangeCallback,
    ) -> Self {
        Self::new(
            watch_path,
            Duration::from_millis(config.debounce_ms),
            on_change,
        )
    }

    pub fn watch_path(&self) -> &Path {
        &self.watch_path
    }

    fn watch_dir(&self) -> PathBuf {
        match self.watch_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// 事件是否与目标文件相关（只关心写入/创建/删除）
pub fn is_relevant(event: &Event, target: &Path) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    );
    if !kind_matches {
        return false;
    }

    let Some(target_name) = target.file_name() else {
        return false;
    };
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(target_name))
}

#[async_trait]
impl ConfigWatcher for FileConfigWatcher {
    async fn start(&self) -> Result<()> {
        use notify::{RecursiveMode, Watcher};

        let target = self.watch_path.clone();
        let watch_dir = self.watch_dir();
        let debounce = self.debounce;
        let on_change = Arc::clone(&self.on_change);
        let mut shutdown_rx = self.shutdown_rx.clone();

        // notify 事件通过 channel 转发到 tokio 异步任务
        let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<()>(16);

        let mut watcher = notify::recommended_watcher({
            let target = target.clone();
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if is_relevant(&event, &target) {
                        let _ = event_tx.try_send(());
                    }
                }
                Err(e) => {
                    warn!(error = %e, "文件监听器事件错误");
                }
            }
        })
        .context("创建文件监听器失败")?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("启动文件监听失败: {}", watch_dir.display()))?;

        *self.watcher.lock() = Some(watcher);
        info!(path = %target.display(), "规则文件监听已启动");

        // 异步 debounce 循环：收到文件事件后等待 debounce 窗口再回调
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = event_rx.recv() => {
                        tokio::time::sleep(debounce).await;
                        // 清空积压的重复事件
                        while event_rx.try_recv().is_ok() {}

                        info!(path = %target.display(), "规则文件变更，触发重载");
                        on_change();
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("规则文件监听已停止");
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.watcher.lock().take();
        Ok(())
    }
}
