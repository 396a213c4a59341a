//! 控制台展示器
//!
//! 命令行运行时没有游戏服务器，展示动作全部写入 tracing 日志。

use crate::error::Result;
use crate::executor::strip_colors;
use crate::host::{Presenter, Title};
use crate::models::Actor;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct ConsolePresenter {
    delivered: AtomicUsize,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已展示的动作数
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    fn count(&self) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Presenter for ConsolePresenter {
    fn dispatch_command(&self, command: &str) -> Result<()> {
        info!(command = %command, "控制台指令");
        self.count()
    }

    fn broadcast(&self, message: &str) -> Result<()> {
        info!(message = %strip_colors(message), "全服广播");
        self.count()
    }

    fn broadcast_title(&self, title: &Title) -> Result<()> {
        info!(
            title = %strip_colors(&title.title),
            subtitle = %strip_colors(&title.subtitle),
            "全服标题"
        );
        self.count()
    }

    fn send_title(&self, actor: &Actor, title: &Title) -> Result<()> {
        info!(
            player = %actor.name,
            title = %strip_colors(&title.title),
            subtitle = %strip_colors(&title.subtitle),
            stay = title.stay,
            "标题"
        );
        self.count()
    }

    fn send_action_bar(&self, actor: &Actor, message: &str) -> Result<()> {
        info!(player = %actor.name, message = %strip_colors(message), "动作栏");
        self.count()
    }

    fn send_message(&self, actor: &Actor, message: &str) -> Result<()> {
        info!(player = %actor.name, message = %strip_colors(message), "聊天消息");
        self.count()
    }
}
